//! Client for the Nyaa RSS search feed.
//!
//! Nyaa serves search results as an RSS document; this client builds the
//! query URL from a watch's search parameters, parses the feed with a fixed
//! set of regexes, and slices the parsed items into pages so callers see the
//! same boundary semantics as every other paged surface.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::NyaaConfig;
use crate::pager::{Page, Pager, PagerError};

const DEFAULT_BASE_URL: &str = "https://nyaa.si";
const USER_AGENT: &str = concat!("Miharr/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum NyaaError {
    #[error("Feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Invalid feed url: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid page request: {0}")]
    Page(#[from] PagerError),
}

/// Result filter understood by the feed (`f` query parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NyaaFilter {
    #[default]
    NoFilter,
    NoRemakes,
    TrustedOnly,
}

impl NyaaFilter {
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::NoFilter => "0",
            Self::NoRemakes => "1",
            Self::TrustedOnly => "2",
        }
    }

    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(Self::NoFilter),
            "1" => Some(Self::NoRemakes),
            "2" => Some(Self::TrustedOnly),
            _ => None,
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::NoFilter => "No Filter",
            Self::NoRemakes => "No Remakes",
            Self::TrustedOnly => "Trusted Only",
        }
    }
}

impl std::fmt::Display for NyaaFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for NyaaFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "0" | "none" | "no-filter" => Ok(Self::NoFilter),
            "1" | "no-remakes" => Ok(Self::NoRemakes),
            "2" | "trusted" | "trusted-only" => Ok(Self::TrustedOnly),
            other => Err(format!("Unknown filter: {other}")),
        }
    }
}

/// Category taxonomy of the feed (`c` query parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NyaaCategory {
    #[default]
    AllCategories,
    Anime,
    AnimeMusicVideo,
    AnimeEnglishTranslated,
    AnimeNonEnglishTranslated,
    AnimeRaw,
    Audio,
    AudioLossless,
    AudioLossy,
    Literature,
    LiteratureEnglishTranslated,
    LiteratureNonEnglishTranslated,
    LiteratureRaw,
    LiveAction,
    LiveActionEnglishTranslated,
    LiveActionIdolPromotionalVideo,
    LiveActionNonEnglishTranslated,
    LiveActionRaw,
    Pictures,
    PicturesGraphics,
    PicturesPhotos,
    Software,
    SoftwareApplications,
    SoftwareGames,
}

impl NyaaCategory {
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::AllCategories => "0_0",
            Self::Anime => "1_0",
            Self::AnimeMusicVideo => "1_1",
            Self::AnimeEnglishTranslated => "1_2",
            Self::AnimeNonEnglishTranslated => "1_3",
            Self::AnimeRaw => "1_4",
            Self::Audio => "2_0",
            Self::AudioLossless => "2_1",
            Self::AudioLossy => "2_2",
            Self::Literature => "3_0",
            Self::LiteratureEnglishTranslated => "3_1",
            Self::LiteratureNonEnglishTranslated => "3_2",
            Self::LiteratureRaw => "3_3",
            Self::LiveAction => "4_0",
            Self::LiveActionEnglishTranslated => "4_1",
            Self::LiveActionIdolPromotionalVideo => "4_2",
            Self::LiveActionNonEnglishTranslated => "4_3",
            Self::LiveActionRaw => "4_4",
            Self::Pictures => "5_0",
            Self::PicturesGraphics => "5_1",
            Self::PicturesPhotos => "5_2",
            Self::Software => "6_0",
            Self::SoftwareApplications => "6_1",
            Self::SoftwareGames => "6_2",
        }
    }

    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0_0" => Some(Self::AllCategories),
            "1_0" => Some(Self::Anime),
            "1_1" => Some(Self::AnimeMusicVideo),
            "1_2" => Some(Self::AnimeEnglishTranslated),
            "1_3" => Some(Self::AnimeNonEnglishTranslated),
            "1_4" => Some(Self::AnimeRaw),
            "2_0" => Some(Self::Audio),
            "2_1" => Some(Self::AudioLossless),
            "2_2" => Some(Self::AudioLossy),
            "3_0" => Some(Self::Literature),
            "3_1" => Some(Self::LiteratureEnglishTranslated),
            "3_2" => Some(Self::LiteratureNonEnglishTranslated),
            "3_3" => Some(Self::LiteratureRaw),
            "4_0" => Some(Self::LiveAction),
            "4_1" => Some(Self::LiveActionEnglishTranslated),
            "4_2" => Some(Self::LiveActionIdolPromotionalVideo),
            "4_3" => Some(Self::LiveActionNonEnglishTranslated),
            "4_4" => Some(Self::LiveActionRaw),
            "5_0" => Some(Self::Pictures),
            "5_1" => Some(Self::PicturesGraphics),
            "5_2" => Some(Self::PicturesPhotos),
            "6_0" => Some(Self::Software),
            "6_1" => Some(Self::SoftwareApplications),
            "6_2" => Some(Self::SoftwareGames),
            _ => None,
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::AllCategories => "All Categories",
            Self::Anime => "Anime",
            Self::AnimeMusicVideo => "Anime - Music Video",
            Self::AnimeEnglishTranslated => "Anime - English Translated",
            Self::AnimeNonEnglishTranslated => "Anime - Non-English Translated",
            Self::AnimeRaw => "Anime - Raw",
            Self::Audio => "Audio",
            Self::AudioLossless => "Audio - Lossless",
            Self::AudioLossy => "Audio - Lossy",
            Self::Literature => "Literature",
            Self::LiteratureEnglishTranslated => "Literature - English Translated",
            Self::LiteratureNonEnglishTranslated => "Literature - Non-English Translated",
            Self::LiteratureRaw => "Literature - Raw",
            Self::LiveAction => "Live Action",
            Self::LiveActionEnglishTranslated => "Live Action - English Translated",
            Self::LiveActionIdolPromotionalVideo => "Live Action - Idol/Promotion Video",
            Self::LiveActionNonEnglishTranslated => "Live Action - Non-English Translated",
            Self::LiveActionRaw => "Live Action - Raw",
            Self::Pictures => "Pictures",
            Self::PicturesGraphics => "Pictures - Graphics",
            Self::PicturesPhotos => "Pictures - Photos",
            Self::Software => "Software",
            Self::SoftwareApplications => "Software - Applications",
            Self::SoftwareGames => "Software - Games",
        }
    }
}

impl std::fmt::Display for NyaaCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for NyaaCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| format!("Unknown category code: {s}"))
    }
}

/// One torrent entry parsed from the feed.
///
/// `info_hash` is the stable identifier used to decide whether an item has
/// already been reported for a watch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NyaaTorrent {
    pub title: String,
    pub torrent_url: String,
    pub view_url: String,
    pub pub_date: String,
    pub seeders: u32,
    pub leechers: u32,
    pub downloads: u32,
    pub comments: u32,
    pub info_hash: String,
    pub category_id: Option<NyaaCategory>,
    pub category: String,
    pub size: String,
    pub trusted: bool,
    pub remake: bool,
}

impl NyaaTorrent {
    #[must_use]
    pub fn magnet_link(&self) -> String {
        format!(
            "magnet:?xt=urn:btih:{}&dn={}",
            self.info_hash,
            urlencoding::encode(&self.title)
        )
    }
}

/// Search parameters for one paged feed request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub filter: Option<NyaaFilter>,
    pub category: Option<NyaaCategory>,
    pub uploader: Option<String>,
    pub page_number: usize,
    pub page_size: usize,
}

impl SearchRequest {
    #[must_use]
    pub fn new(query: impl Into<String>, page_number: usize, page_size: usize) -> Self {
        Self {
            query: query.into(),
            filter: None,
            category: None,
            uploader: None,
            page_number,
            page_size,
        }
    }
}

/// Compiled once; the feed's XML never nests the captured tags.
struct FeedRegex {
    item: Regex,
    title: Regex,
    link: Regex,
    guid: Regex,
    pub_date: Regex,
    seeders: Regex,
    leechers: Regex,
    downloads: Regex,
    comments: Regex,
    info_hash: Regex,
    category_id: Regex,
    category: Regex,
    size: Regex,
    trusted: Regex,
    remake: Regex,
}

impl FeedRegex {
    fn get() -> Option<&'static Self> {
        static INSTANCE: OnceLock<Option<FeedRegex>> = OnceLock::new();
        INSTANCE
            .get_or_init(|| {
                Some(Self {
                    item: Regex::new(r"(?s)<item>(.*?)</item>").ok()?,
                    title: Regex::new(r"<title>([^<]*)</title>").ok()?,
                    link: Regex::new(r"<link>([^<]*)</link>").ok()?,
                    guid: Regex::new(r"<guid[^>]*>([^<]*)</guid>").ok()?,
                    pub_date: Regex::new(r"<pubDate>([^<]*)</pubDate>").ok()?,
                    seeders: Regex::new(r"<nyaa:seeders>([^<]*)</nyaa:seeders>").ok()?,
                    leechers: Regex::new(r"<nyaa:leechers>([^<]*)</nyaa:leechers>").ok()?,
                    downloads: Regex::new(r"<nyaa:downloads>([^<]*)</nyaa:downloads>").ok()?,
                    comments: Regex::new(r"<nyaa:comments>([^<]*)</nyaa:comments>").ok()?,
                    info_hash: Regex::new(r"<nyaa:infoHash>([^<]*)</nyaa:infoHash>").ok()?,
                    category_id: Regex::new(r"<nyaa:categoryId>([^<]*)</nyaa:categoryId>").ok()?,
                    category: Regex::new(r"<nyaa:category>([^<]*)</nyaa:category>").ok()?,
                    size: Regex::new(r"<nyaa:size>([^<]*)</nyaa:size>").ok()?,
                    trusted: Regex::new(r"<nyaa:trusted>([^<]*)</nyaa:trusted>").ok()?,
                    remake: Regex::new(r"<nyaa:remake>([^<]*)</nyaa:remake>").ok()?,
                })
            })
            .as_ref()
    }
}

fn capture(xml: &str, re: &Regex) -> String {
    re.captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

fn parse_feed_item(item_xml: &str) -> Option<NyaaTorrent> {
    let re = FeedRegex::get()?;
    Some(NyaaTorrent {
        title: html_escape::decode_html_entities(&capture(item_xml, &re.title)).to_string(),
        torrent_url: capture(item_xml, &re.link),
        view_url: capture(item_xml, &re.guid),
        pub_date: capture(item_xml, &re.pub_date),
        seeders: capture(item_xml, &re.seeders).parse().unwrap_or(0),
        leechers: capture(item_xml, &re.leechers).parse().unwrap_or(0),
        downloads: capture(item_xml, &re.downloads).parse().unwrap_or(0),
        comments: capture(item_xml, &re.comments).parse().unwrap_or(0),
        info_hash: capture(item_xml, &re.info_hash),
        category_id: NyaaCategory::from_code(&capture(item_xml, &re.category_id)),
        category: capture(item_xml, &re.category),
        size: capture(item_xml, &re.size),
        trusted: capture(item_xml, &re.trusted).eq_ignore_ascii_case("yes"),
        remake: capture(item_xml, &re.remake).eq_ignore_ascii_case("yes"),
    })
}

pub(crate) fn parse_feed(xml: &str) -> Vec<NyaaTorrent> {
    let Some(re) = FeedRegex::get() else {
        return Vec::new();
    };
    re.item
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .filter_map(|m| parse_feed_item(m.as_str()))
        .collect()
}

#[derive(Clone)]
pub struct NyaaClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for NyaaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NyaaClient {
    /// Creates a client against the public instance with a 30-second timeout.
    ///
    /// # Panics
    /// Panics if the HTTP client cannot be built (a broken system TLS setup).
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(DEFAULT_BASE_URL, Duration::from_secs(30))
            .expect("Failed to build default HTTP client")
    }

    pub fn from_config(config: &NyaaConfig) -> anyhow::Result<Self> {
        Self::with_options(
            &config.base_url,
            Duration::from_secs(u64::from(config.request_timeout_seconds)),
        )
    }

    pub fn with_options(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn search_url(&self, request: &SearchRequest) -> Result<Url, NyaaError> {
        let mut url = Url::parse(&self.base_url)?;
        url.query_pairs_mut()
            .append_pair("page", "rss")
            .append_pair("q", &request.query)
            .append_pair("c", request.category.unwrap_or_default().as_code())
            .append_pair("f", request.filter.unwrap_or_default().as_code());
        if let Some(uploader) = &request.uploader {
            url.query_pairs_mut().append_pair("u", uploader);
        }
        Ok(url)
    }

    /// Fetches the feed for the request's search parameters and returns the
    /// requested slice of it.
    pub async fn search(&self, request: &SearchRequest) -> Result<Page<NyaaTorrent>, NyaaError> {
        let url = self.search_url(request)?;
        let items = self.fetch_feed(url.as_str()).await?;
        Ok(Pager::new(items, request.page_size)?.into_page(request.page_number))
    }

    /// Fetches and parses a feed document from a fully built URL.
    pub async fn fetch_feed(&self, url: &str) -> Result<Vec<NyaaTorrent>, NyaaError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NyaaError::Status(status));
        }
        let xml = response.text().await?;
        Ok(parse_feed(&xml))
    }
}
