//! Sqlite-backed persistence for watches and their owners.

use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::domain::{OwnerId, WatchId};
use crate::models::user::User;
use crate::models::watch::Watch;
use crate::pager::Page;
use crate::services::watcher::{OwnerDirectory, WatchStore};

pub mod migrator;
pub mod repositories;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.starts_with(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn watch_repo(&self) -> repositories::watch::WatchRepository {
        repositories::watch::WatchRepository::new(self.conn.clone())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    pub async fn add_or_update_watch(&self, watch: &Watch) -> Result<Watch> {
        self.watch_repo().add_or_update(watch).await
    }

    pub async fn list_watches(
        &self,
        owner: Option<&OwnerId>,
        page_number: usize,
        page_size: usize,
    ) -> Result<Page<Watch>> {
        self.watch_repo().list(owner, page_number, page_size).await
    }

    pub async fn get_watch(&self, id: &WatchId) -> Result<Option<Watch>> {
        self.watch_repo().get(id).await
    }

    pub async fn remove_watch(&self, owner: &OwnerId, id: &WatchId) -> Result<Option<Watch>> {
        self.watch_repo().delete(owner, id).await
    }

    pub async fn add_or_update_user(
        &self,
        id: &OwnerId,
        display_name: Option<&str>,
    ) -> Result<User> {
        self.user_repo().add_or_update(id, display_name).await
    }

    pub async fn list_user_ids(&self) -> Result<Vec<OwnerId>> {
        self.user_repo().list_ids().await
    }
}

#[async_trait]
impl WatchStore for Store {
    async fn list_watches(
        &self,
        owner: Option<&OwnerId>,
        page_number: usize,
        page_size: usize,
    ) -> Result<Page<Watch>> {
        Self::list_watches(self, owner, page_number, page_size).await
    }

    async fn upsert_watch(&self, watch: &Watch) -> Result<Watch> {
        self.add_or_update_watch(watch).await
    }

    async fn delete_watch(&self, owner: &OwnerId, id: &WatchId) -> Result<Option<Watch>> {
        self.remove_watch(owner, id).await
    }
}

#[async_trait]
impl OwnerDirectory for Store {
    async fn list_owner_ids(&self) -> Result<Vec<OwnerId>> {
        self.list_user_ids().await
    }
}
