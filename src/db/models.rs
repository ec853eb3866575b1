use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::{Identifier, StoryFragment};

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub name: String,
    pub age: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct StoryRow {
    pub id: i64,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct StoryPageRow {
    pub image_id: String,
    pub story_text: String,
}

#[derive(Debug, Clone)]
pub struct StoryInsert {
    pub user_id: Identifier,
    pub fragments: Vec<StoryFragment>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredStory {
    pub id: i64,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub pages: Vec<StoryFragment>,
}
