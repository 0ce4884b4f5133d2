use anyhow::Result;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Select, Set, TransactionTrait,
};
use std::collections::HashSet;
use tracing::debug;

use crate::clients::nyaa::{NyaaCategory, NyaaFilter};
use crate::domain::{OwnerId, WatchId};
use crate::entities::{prelude::*, watches};
use crate::models::watch::Watch;
use crate::pager::Page;

/// Repository for saved watches.
pub struct WatchRepository {
    conn: DatabaseConnection,
}

impl WatchRepository {
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(row: watches::Model) -> Watch {
        Watch {
            id: WatchId::new(row.id),
            owner_id: OwnerId::new(row.owner_id),
            query: row.query,
            filter: row.filter.as_deref().and_then(NyaaFilter::from_code),
            category: row.category.as_deref().and_then(NyaaCategory::from_code),
            uploader: row.uploader,
            seen_hashes: serde_json::from_str(&row.seen_hashes).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    /// Filters by the watch's natural key, matching absent parameters as
    /// NULL columns.
    fn find_by_natural_key(watch: &Watch) -> Select<Watches> {
        let mut select = Watches::find()
            .filter(watches::Column::OwnerId.eq(watch.owner_id.as_str()))
            .filter(watches::Column::Query.eq(watch.query.as_str()));

        select = match watch.filter {
            Some(filter) => select.filter(watches::Column::Filter.eq(filter.as_code())),
            None => select.filter(watches::Column::Filter.is_null()),
        };
        select = match watch.category {
            Some(category) => select.filter(watches::Column::Category.eq(category.as_code())),
            None => select.filter(watches::Column::Category.is_null()),
        };
        match &watch.uploader {
            Some(uploader) => select.filter(watches::Column::Uploader.eq(uploader.as_str())),
            None => select.filter(watches::Column::Uploader.is_null()),
        }
    }

    /// Inserts the watch, or merges it into the existing record with the
    /// same natural key. The seen-set is extended by union inside one
    /// transaction so a concurrent extension is never overwritten.
    pub async fn add_or_update(&self, watch: &Watch) -> Result<Watch> {
        let txn = self.conn.begin().await?;

        let existing = Self::find_by_natural_key(watch).one(&txn).await?;
        let saved = if let Some(row) = existing {
            let mut seen: HashSet<String> =
                serde_json::from_str(&row.seen_hashes).unwrap_or_default();
            let before = seen.len();
            seen.extend(watch.seen_hashes.iter().cloned());
            debug!(
                watch_id = %row.id,
                added = seen.len() - before,
                "Merging watch into existing record"
            );

            let mut active: watches::ActiveModel = row.into();
            active.seen_hashes = Set(serde_json::to_string(&seen)?);
            active.updated_at = Set(chrono::Utc::now().to_rfc3339());
            active.update(&txn).await?
        } else {
            let active = watches::ActiveModel {
                id: Set(watch.id.as_str().to_string()),
                owner_id: Set(watch.owner_id.as_str().to_string()),
                query: Set(watch.query.clone()),
                filter: Set(watch.filter.map(|f| f.as_code().to_string())),
                category: Set(watch.category.map(|c| c.as_code().to_string())),
                uploader: Set(watch.uploader.clone()),
                seen_hashes: Set(serde_json::to_string(&watch.seen_hashes)?),
                created_at: Set(watch.created_at.clone()),
                updated_at: Set(watch.updated_at.clone()),
            };
            active.insert(&txn).await?
        };

        txn.commit().await?;
        Ok(Self::map_model(saved))
    }

    /// Pages through watches ordered by creation time, optionally scoped to
    /// one owner.
    pub async fn list(
        &self,
        owner: Option<&OwnerId>,
        page_number: usize,
        page_size: usize,
    ) -> Result<Page<Watch>> {
        let mut select = Watches::find().order_by_asc(watches::Column::CreatedAt);
        if let Some(owner) = owner {
            select = select.filter(watches::Column::OwnerId.eq(owner.as_str()));
        }

        let paginator = select.paginate(&self.conn, page_size as u64);
        let total = usize::try_from(paginator.num_items().await?).unwrap_or(usize::MAX);
        let rows = paginator.fetch_page(page_number as u64).await?;

        Ok(Page::new(
            rows.into_iter().map(Self::map_model).collect(),
            total,
            page_number,
            page_size,
        ))
    }

    pub async fn get(&self, id: &WatchId) -> Result<Option<Watch>> {
        let row = Watches::find_by_id(id.as_str().to_string())
            .one(&self.conn)
            .await?;
        Ok(row.map(Self::map_model))
    }

    /// Removes an owner's watch and returns it, or `None` when the id does
    /// not exist or belongs to someone else.
    pub async fn delete(&self, owner: &OwnerId, id: &WatchId) -> Result<Option<Watch>> {
        let Some(row) = Watches::find_by_id(id.as_str().to_string())
            .one(&self.conn)
            .await?
        else {
            return Ok(None);
        };

        if row.owner_id != owner.as_str() {
            return Ok(None);
        }

        Watches::delete_by_id(row.id.clone())
            .exec(&self.conn)
            .await?;
        Ok(Some(Self::map_model(row)))
    }
}
