//! Persisted saved-search model.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::clients::nyaa::{NyaaCategory, NyaaFilter};
use crate::domain::{OwnerId, WatchId};

/// A saved search plus the set of item identifiers already reported for it.
///
/// The tuple (owner, query, filter, category, uploader) is the watch's
/// natural key: saving a watch with a matching tuple merges into the existing
/// record instead of duplicating it. The seen-set only ever grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watch {
    pub id: WatchId,
    pub owner_id: OwnerId,
    pub query: String,
    pub filter: Option<NyaaFilter>,
    pub category: Option<NyaaCategory>,
    pub uploader: Option<String>,
    #[serde(default)]
    pub seen_hashes: HashSet<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Search parameters for a new watch; identity and timestamps are filled in
/// by [`Watch::new`].
#[derive(Debug, Clone, Default)]
pub struct WatchParams {
    pub query: String,
    pub filter: Option<NyaaFilter>,
    pub category: Option<NyaaCategory>,
    pub uploader: Option<String>,
}

impl Watch {
    #[must_use]
    pub fn new(owner_id: OwnerId, params: WatchParams) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: WatchId::generate(),
            owner_id,
            query: params.query,
            filter: params.filter,
            category: params.category,
            uploader: params.uploader,
            seen_hashes: HashSet::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// True when both watches describe the same logical search.
    #[must_use]
    pub fn same_search(&self, other: &Self) -> bool {
        self.owner_id == other.owner_id
            && self.query == other.query
            && self.filter == other.filter
            && self.category == other.category
            && self.uploader == other.uploader
    }

    #[must_use]
    pub fn has_seen(&self, info_hash: &str) -> bool {
        self.seen_hashes.contains(info_hash)
    }

    /// Extends the seen-set (union only) and bumps `updated_at`.
    pub fn extend_seen<I>(&mut self, hashes: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.seen_hashes.extend(hashes);
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}
