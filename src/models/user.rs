//! Registered watch owner.

use serde::{Deserialize, Serialize};

use crate::domain::OwnerId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: OwnerId,
    pub display_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
