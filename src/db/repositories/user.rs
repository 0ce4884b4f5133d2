use anyhow::Result;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};

use crate::domain::OwnerId;
use crate::entities::{prelude::*, users};
use crate::models::user::User;

/// Repository for registered watch owners.
pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(row: users::Model) -> User {
        User {
            id: OwnerId::new(row.id),
            display_name: row.display_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    /// Registers an owner, refreshing the display name on re-registration.
    pub async fn add_or_update(&self, id: &OwnerId, display_name: Option<&str>) -> Result<User> {
        let now = chrono::Utc::now().to_rfc3339();

        let existing = Users::find_by_id(id.as_str().to_string())
            .one(&self.conn)
            .await?;

        let saved = if let Some(row) = existing {
            let mut active: users::ActiveModel = row.into();
            if display_name.is_some() {
                active.display_name = Set(display_name.map(ToString::to_string));
            }
            active.updated_at = Set(now);
            active.update(&self.conn).await?
        } else {
            let active = users::ActiveModel {
                id: Set(id.as_str().to_string()),
                display_name: Set(display_name.map(ToString::to_string)),
                created_at: Set(now.clone()),
                updated_at: Set(now),
            };
            active.insert(&self.conn).await?
        };

        Ok(Self::map_model(saved))
    }

    /// All registered owner ids, oldest registration first.
    pub async fn list_ids(&self) -> Result<Vec<OwnerId>> {
        let rows = Users::find()
            .order_by_asc(users::Column::CreatedAt)
            .all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(|row| OwnerId::new(row.id)).collect())
    }
}
