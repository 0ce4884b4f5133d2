//! Watch sweep engine.
//!
//! One sweep walks every owner's saved watches, pages the external feed for
//! each watch until it reaches the previously-reported boundary, extends the
//! persisted seen-sets, and hands the newly appeared items to the notifier.

use async_trait::async_trait;
use futures::future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clients::nyaa::{NyaaError, NyaaTorrent, SearchRequest};
use crate::domain::{OwnerId, WatchId};
use crate::models::watch::Watch;
use crate::pager::Page;

pub const DEFAULT_WATCH_PAGE_SIZE: usize = 100;
pub const DEFAULT_FEED_PAGE_SIZE: usize = 10;

/// Errors that abort part of a sweep. Per-watch feed failures are handled
/// inside the engine and never surface here.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Owner directory error: {0}")]
    OwnerDirectory(String),

    #[error("Watch listing failed for {owner}: {message}")]
    Listing { owner: OwnerId, message: String },
}

/// Paged feed access, keyed by a watch's search parameters.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Page<NyaaTorrent>, NyaaError>;
}

#[async_trait]
impl SearchProvider for crate::clients::nyaa::NyaaClient {
    async fn search(&self, request: &SearchRequest) -> Result<Page<NyaaTorrent>, NyaaError> {
        crate::clients::nyaa::NyaaClient::search(self, request).await
    }
}

/// Persistence contract for watches. `upsert_watch` merges the seen-set by
/// union, never wholesale replacement.
#[async_trait]
pub trait WatchStore: Send + Sync {
    async fn list_watches(
        &self,
        owner: Option<&OwnerId>,
        page_number: usize,
        page_size: usize,
    ) -> anyhow::Result<Page<Watch>>;

    async fn upsert_watch(&self, watch: &Watch) -> anyhow::Result<Watch>;

    async fn delete_watch(&self, owner: &OwnerId, id: &WatchId) -> anyhow::Result<Option<Watch>>;
}

/// Enumerates the identities whose watches are swept.
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn list_owner_ids(&self) -> anyhow::Result<Vec<OwnerId>>;
}

/// Delivery of one owner's batch of changed watches. Failures are logged by
/// the caller and not retried within a sweep.
#[async_trait]
pub trait WatchNotifier: Send + Sync {
    async fn notify(&self, owner_id: &OwnerId, changes: &[WatchChange]) -> anyhow::Result<()>;
}

/// A watch together with the feed items that appeared since the last sweep,
/// in fetch order.
#[derive(Debug, Clone)]
pub struct WatchChange {
    pub watch: Watch,
    pub new_items: Vec<NyaaTorrent>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub owners: usize,
    pub watches_checked: usize,
    pub watches_changed: usize,
    pub new_items: usize,
    pub failed_watches: usize,
}

impl SweepStats {
    fn absorb(&mut self, other: Self) {
        self.watches_checked += other.watches_checked;
        self.watches_changed += other.watches_changed;
        self.new_items += other.new_items;
        self.failed_watches += other.failed_watches;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SweepConfig {
    /// Page size for listing an owner's watches; also the upper bound on
    /// concurrent feed reconciliations.
    pub watch_page_size: usize,
    /// Page size for feed requests during cursor reconciliation.
    pub feed_page_size: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            watch_page_size: DEFAULT_WATCH_PAGE_SIZE,
            feed_page_size: DEFAULT_FEED_PAGE_SIZE,
        }
    }
}

enum Reconciled {
    Changed(WatchChange),
    Unchanged,
    Failed,
}

pub struct WatchSweeper {
    search: Arc<dyn SearchProvider>,
    store: Arc<dyn WatchStore>,
    owners: Arc<dyn OwnerDirectory>,
    notifier: Arc<dyn WatchNotifier>,
    config: SweepConfig,
}

impl WatchSweeper {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        store: Arc<dyn WatchStore>,
        owners: Arc<dyn OwnerDirectory>,
        notifier: Arc<dyn WatchNotifier>,
        config: SweepConfig,
    ) -> Self {
        Self {
            search,
            store,
            owners,
            notifier,
            config,
        }
    }

    /// Runs one full sweep across all owners. Owners are processed
    /// sequentially; a failure for one owner is logged and does not abort
    /// the rest.
    pub async fn sweep(&self) -> Result<SweepStats, SweepError> {
        let owner_ids = self
            .owners
            .list_owner_ids()
            .await
            .map_err(|e| SweepError::OwnerDirectory(e.to_string()))?;

        let mut stats = SweepStats {
            owners: owner_ids.len(),
            ..Default::default()
        };

        for owner_id in &owner_ids {
            match self.sweep_owner(owner_id).await {
                Ok(owner_stats) => stats.absorb(owner_stats),
                Err(e) => warn!(owner = %owner_id, error = %e, "Owner sweep failed"),
            }
        }

        info!(
            event = "sweep_finished",
            owners = stats.owners,
            watches_checked = stats.watches_checked,
            watches_changed = stats.watches_changed,
            new_items = stats.new_items,
            failed_watches = stats.failed_watches,
            "Sweep complete"
        );

        Ok(stats)
    }

    /// Sweeps one owner: pages through their watches, reconciling each page's
    /// watches concurrently, then persists and notifies the accumulated
    /// changes. Persistence and notification are independent best-effort; a
    /// failure in one never suppresses the other.
    async fn sweep_owner(&self, owner_id: &OwnerId) -> Result<SweepStats, SweepError> {
        let mut stats = SweepStats::default();
        let mut changes: Vec<WatchChange> = Vec::new();
        let mut page_number = 0;

        loop {
            let page = self
                .store
                .list_watches(Some(owner_id), page_number, self.config.watch_page_size)
                .await
                .map_err(|e| SweepError::Listing {
                    owner: owner_id.clone(),
                    message: e.to_string(),
                })?;

            let has_next = page.has_next;
            stats.watches_checked += page.items.len();

            let outcomes =
                future::join_all(page.items.into_iter().map(|watch| self.reconcile(watch))).await;

            for outcome in outcomes {
                match outcome {
                    Reconciled::Changed(change) => changes.push(change),
                    Reconciled::Unchanged => {}
                    Reconciled::Failed => stats.failed_watches += 1,
                }
            }

            if !has_next {
                break;
            }
            page_number += 1;
        }

        stats.watches_changed = changes.len();
        stats.new_items = changes.iter().map(|c| c.new_items.len()).sum();

        for change in &changes {
            let mut updated = change.watch.clone();
            updated.extend_seen(change.new_items.iter().map(|item| item.info_hash.clone()));
            if let Err(e) = self.store.upsert_watch(&updated).await {
                warn!(
                    owner = %owner_id,
                    watch = %change.watch.id,
                    error = %e,
                    "Failed to persist seen-set extension"
                );
            }
        }

        if !changes.is_empty() {
            if let Err(e) = self.notifier.notify(owner_id, &changes).await {
                warn!(owner = %owner_id, error = %e, "Notification failed");
            }
        }

        Ok(stats)
    }

    /// Cursor reconciliation for a single watch: fetch successive feed pages
    /// until a previously-seen identifier appears or pagination is
    /// exhausted, collecting the unseen prefix. Items past the first seen
    /// identifier were already reported in an earlier pass, so further
    /// paging is redundant.
    async fn reconcile(&self, watch: Watch) -> Reconciled {
        let mut unseen: Vec<NyaaTorrent> = Vec::new();
        let mut page_number = 0;

        loop {
            let request = SearchRequest {
                query: watch.query.clone(),
                filter: watch.filter,
                category: watch.category,
                uploader: watch.uploader.clone(),
                page_number,
                page_size: self.config.feed_page_size,
            };

            let page = match self.search.search(&request).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        watch = %watch.id,
                        query = %watch.query,
                        error = %e,
                        "Feed fetch failed, skipping watch for this pass"
                    );
                    return Reconciled::Failed;
                }
            };

            if let Some(boundary) = page
                .items
                .iter()
                .position(|item| watch.has_seen(&item.info_hash))
            {
                unseen.extend(page.items.into_iter().take(boundary));
                break;
            }

            let has_next = page.has_next;
            unseen.extend(page.items);
            if !has_next {
                break;
            }
            page_number += 1;
        }

        if unseen.is_empty() {
            return Reconciled::Unchanged;
        }

        debug!(
            watch = %watch.id,
            query = %watch.query,
            count = unseen.len(),
            "New results for watch"
        );
        Reconciled::Changed(WatchChange {
            watch,
            new_items: unseen,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::nyaa::NyaaFilter;
    use crate::models::watch::WatchParams;
    use crate::pager::Pager;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn torrent(info_hash: &str) -> NyaaTorrent {
        NyaaTorrent {
            title: format!("[Group] Release {info_hash} [1080p]"),
            torrent_url: format!("https://nyaa.si/download/{info_hash}.torrent"),
            view_url: format!("https://nyaa.si/view/{info_hash}"),
            pub_date: "Fri, 29 Sep 2023 17:32:17 -0000".to_string(),
            seeders: 10,
            leechers: 1,
            downloads: 100,
            comments: 0,
            info_hash: info_hash.to_string(),
            category_id: None,
            category: "Anime - English-translated".to_string(),
            size: "1.4 GiB".to_string(),
            trusted: false,
            remake: false,
        }
    }

    fn watch_for(owner: &str, query: &str, seen: &[&str]) -> Watch {
        let mut watch = Watch::new(
            OwnerId::new(owner),
            WatchParams {
                query: query.to_string(),
                filter: Some(NyaaFilter::NoRemakes),
                category: None,
                uploader: None,
            },
        );
        watch
            .seen_hashes
            .extend(seen.iter().map(ToString::to_string));
        watch
    }

    /// Serves a fixed item list per query, paged on demand. Queries absent
    /// from the map fail like a transport error would.
    struct ScriptedFeed {
        feeds: HashMap<String, Vec<NyaaTorrent>>,
        calls: AtomicUsize,
    }

    impl ScriptedFeed {
        fn new(feeds: HashMap<String, Vec<NyaaTorrent>>) -> Self {
            Self {
                feeds,
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchProvider for ScriptedFeed {
        async fn search(&self, request: &SearchRequest) -> Result<Page<NyaaTorrent>, NyaaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let items = self
                .feeds
                .get(&request.query)
                .cloned()
                .ok_or(NyaaError::Status(reqwest::StatusCode::BAD_GATEWAY))?;
            Ok(Pager::new(items, request.page_size)?.into_page(request.page_number))
        }
    }

    #[derive(Default)]
    struct InMemoryStore {
        watches: Mutex<Vec<Watch>>,
    }

    impl InMemoryStore {
        fn with_watches(watches: Vec<Watch>) -> Self {
            Self {
                watches: Mutex::new(watches),
            }
        }

        fn seen_for(&self, query: &str) -> std::collections::HashSet<String> {
            self.watches
                .lock()
                .unwrap()
                .iter()
                .find(|w| w.query == query)
                .map(|w| w.seen_hashes.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl WatchStore for InMemoryStore {
        async fn list_watches(
            &self,
            owner: Option<&OwnerId>,
            page_number: usize,
            page_size: usize,
        ) -> anyhow::Result<Page<Watch>> {
            let watches = self.watches.lock().unwrap();
            let scoped: Vec<Watch> = watches
                .iter()
                .filter(|w| owner.is_none_or(|o| &w.owner_id == o))
                .cloned()
                .collect();
            Ok(Pager::new(scoped, page_size)
                .map_err(anyhow::Error::from)?
                .into_page(page_number))
        }

        async fn upsert_watch(&self, watch: &Watch) -> anyhow::Result<Watch> {
            let mut watches = self.watches.lock().unwrap();
            if let Some(existing) = watches.iter_mut().find(|w| w.same_search(watch)) {
                existing
                    .seen_hashes
                    .extend(watch.seen_hashes.iter().cloned());
                existing.updated_at = watch.updated_at.clone();
                Ok(existing.clone())
            } else {
                watches.push(watch.clone());
                Ok(watch.clone())
            }
        }

        async fn delete_watch(
            &self,
            owner: &OwnerId,
            id: &WatchId,
        ) -> anyhow::Result<Option<Watch>> {
            let mut watches = self.watches.lock().unwrap();
            let position = watches
                .iter()
                .position(|w| &w.id == id && &w.owner_id == owner);
            Ok(position.map(|i| watches.remove(i)))
        }
    }

    struct FixedOwners(Vec<OwnerId>);

    #[async_trait]
    impl OwnerDirectory for FixedOwners {
        async fn list_owner_ids(&self) -> anyhow::Result<Vec<OwnerId>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        batches: Mutex<Vec<(OwnerId, Vec<(String, Vec<String>)>)>>,
    }

    impl RecordingNotifier {
        fn batches(&self) -> Vec<(OwnerId, Vec<(String, Vec<String>)>)> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WatchNotifier for RecordingNotifier {
        async fn notify(&self, owner_id: &OwnerId, changes: &[WatchChange]) -> anyhow::Result<()> {
            let summary = changes
                .iter()
                .map(|c| {
                    (
                        c.watch.query.clone(),
                        c.new_items.iter().map(|t| t.info_hash.clone()).collect(),
                    )
                })
                .collect();
            self.batches
                .lock()
                .unwrap()
                .push((owner_id.clone(), summary));
            Ok(())
        }
    }

    struct Fixture {
        feed: Arc<ScriptedFeed>,
        store: Arc<InMemoryStore>,
        notifier: Arc<RecordingNotifier>,
        sweeper: WatchSweeper,
    }

    fn fixture(
        feeds: HashMap<String, Vec<NyaaTorrent>>,
        watches: Vec<Watch>,
        owners: Vec<&str>,
        config: SweepConfig,
    ) -> Fixture {
        let feed = Arc::new(ScriptedFeed::new(feeds));
        let store = Arc::new(InMemoryStore::with_watches(watches));
        let notifier = Arc::new(RecordingNotifier::default());
        let sweeper = WatchSweeper::new(
            Arc::clone(&feed) as Arc<dyn SearchProvider>,
            Arc::clone(&store) as Arc<dyn WatchStore>,
            Arc::new(FixedOwners(owners.into_iter().map(OwnerId::new).collect())),
            Arc::clone(&notifier) as Arc<dyn WatchNotifier>,
            config,
        );
        Fixture {
            feed,
            store,
            notifier,
            sweeper,
        }
    }

    fn feed_config(feed_page_size: usize) -> SweepConfig {
        SweepConfig {
            watch_page_size: 100,
            feed_page_size,
        }
    }

    #[tokio::test]
    async fn reconciliation_stops_at_seen_boundary() {
        // Feed pages of size 5: [a, b, c, seen, d] then [e, f]. The boundary
        // is on the first page, so the second page must never be fetched.
        let items = vec![
            torrent("a"),
            torrent("b"),
            torrent("c"),
            torrent("seen"),
            torrent("d"),
            torrent("e"),
            torrent("f"),
        ];
        let fx = fixture(
            HashMap::from([("frieren".to_string(), items)]),
            vec![watch_for("alice", "frieren", &["seen"])],
            vec!["alice"],
            feed_config(5),
        );

        let stats = fx.sweeper.sweep().await.unwrap();
        assert_eq!(stats.new_items, 3);
        assert_eq!(fx.feed.call_count(), 1);

        let batches = fx.notifier.batches();
        assert_eq!(batches.len(), 1);
        let (_, changes) = &batches[0];
        assert_eq!(changes[0].1, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn reconciliation_returns_full_page_when_nothing_seen() {
        let fx = fixture(
            HashMap::from([("mushoku".to_string(), vec![torrent("x"), torrent("y")])]),
            vec![watch_for("alice", "mushoku", &[])],
            vec!["alice"],
            feed_config(10),
        );

        fx.sweeper.sweep().await.unwrap();

        let batches = fx.notifier.batches();
        assert_eq!(batches[0].1[0].1, vec!["x", "y"]);
        assert_eq!(fx.feed.call_count(), 1);
    }

    #[tokio::test]
    async fn reconciliation_pages_until_exhausted() {
        // Ten unseen items with feed pages of 3: four fetches, all items
        // reported in fetch order.
        let items: Vec<NyaaTorrent> = (0..10).map(|i| torrent(&format!("h{i}"))).collect();
        let fx = fixture(
            HashMap::from([("bleach".to_string(), items)]),
            vec![watch_for("alice", "bleach", &[])],
            vec!["alice"],
            feed_config(3),
        );

        let stats = fx.sweeper.sweep().await.unwrap();
        assert_eq!(stats.new_items, 10);
        assert_eq!(fx.feed.call_count(), 4);

        let hashes: Vec<String> = fx.notifier.batches()[0].1[0].1.clone();
        assert_eq!(hashes, (0..10).map(|i| format!("h{i}")).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn fetch_failure_does_not_block_other_watches() {
        // "broken" has no scripted feed and fails; "works" must still be
        // reconciled and notified in the same sweep.
        let fx = fixture(
            HashMap::from([("works".to_string(), vec![torrent("n1")])]),
            vec![
                watch_for("alice", "broken", &[]),
                watch_for("alice", "works", &[]),
            ],
            vec!["alice"],
            feed_config(10),
        );

        let stats = fx.sweeper.sweep().await.unwrap();
        assert_eq!(stats.failed_watches, 1);
        assert_eq!(stats.watches_changed, 1);

        let batches = fx.notifier.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].1.len(), 1);
        assert_eq!(batches[0].1[0].0, "works");

        // The failed watch keeps an empty seen-set: no partial progress.
        assert!(fx.store.seen_for("broken").is_empty());
    }

    #[tokio::test]
    async fn seen_sets_grow_monotonically_across_sweeps() {
        let fx = fixture(
            HashMap::from([(
                "spy".to_string(),
                vec![torrent("s1"), torrent("s2"), torrent("s3")],
            )]),
            vec![watch_for("alice", "spy", &["s3"])],
            vec!["alice"],
            feed_config(10),
        );

        fx.sweeper.sweep().await.unwrap();
        let after_first = fx.store.seen_for("spy");
        assert!(after_first.contains("s1") && after_first.contains("s2"));

        // Feed unchanged: the second sweep finds nothing new and shrinks
        // nothing.
        let stats = fx.sweeper.sweep().await.unwrap();
        assert_eq!(stats.new_items, 0);
        let after_second = fx.store.seen_for("spy");
        assert!(after_second.is_superset(&after_first));

        assert_eq!(fx.notifier.batches().len(), 1);
    }

    #[tokio::test]
    async fn owner_batch_contains_all_changed_watches() {
        let fx = fixture(
            HashMap::from([
                ("one".to_string(), vec![torrent("o1")]),
                ("two".to_string(), vec![torrent("t1")]),
                ("quiet".to_string(), vec![]),
            ]),
            vec![
                watch_for("bob", "one", &[]),
                watch_for("bob", "two", &[]),
                watch_for("bob", "quiet", &[]),
            ],
            vec!["bob"],
            feed_config(10),
        );

        fx.sweeper.sweep().await.unwrap();

        let batches = fx.notifier.batches();
        assert_eq!(batches.len(), 1, "one notification per owner");
        assert_eq!(batches[0].0, OwnerId::new("bob"));
        assert_eq!(batches[0].1.len(), 2, "unchanged watches are not included");
    }

    #[tokio::test]
    async fn owners_without_changes_are_not_notified() {
        let fx = fixture(
            HashMap::from([("idle".to_string(), vec![torrent("k1")])]),
            vec![watch_for("carol", "idle", &["k1"])],
            vec!["carol"],
            feed_config(10),
        );

        let stats = fx.sweeper.sweep().await.unwrap();
        assert_eq!(stats.watches_checked, 1);
        assert_eq!(stats.watches_changed, 0);
        assert!(fx.notifier.batches().is_empty());
    }

    #[tokio::test]
    async fn walks_every_page_of_watches() {
        // Three watches with a listing page size of 2 forces two listing
        // pages; all three must be reconciled.
        let feeds = HashMap::from([
            ("q0".to_string(), vec![torrent("p0")]),
            ("q1".to_string(), vec![torrent("p1")]),
            ("q2".to_string(), vec![torrent("p2")]),
        ]);
        let watches = (0..3)
            .map(|i| watch_for("dave", &format!("q{i}"), &[]))
            .collect();
        let fx = fixture(
            feeds,
            watches,
            vec!["dave"],
            SweepConfig {
                watch_page_size: 2,
                feed_page_size: 10,
            },
        );

        let stats = fx.sweeper.sweep().await.unwrap();
        assert_eq!(stats.watches_checked, 3);
        assert_eq!(stats.watches_changed, 3);
        assert_eq!(fx.notifier.batches()[0].1.len(), 3);
    }
}
