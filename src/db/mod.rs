pub mod database;
pub mod models;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::error::StoryResult;
use crate::models::{Identifier, StoryFragment, UserProfile};
use models::StoredStory;

pub use database::Database;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn resolve(&self, user_id: &Identifier) -> StoryResult<UserProfile>;

    async fn save(&self, user_id: &Identifier, profile: &UserProfile) -> Result<()>;
}

/// Receives finished stories. Implementations must not block the request
/// on durable storage.
#[async_trait]
pub trait StoryStore: Send + Sync {
    async fn queue_story(&self, user_id: &Identifier, fragments: &[StoryFragment]) -> Result<()>;

    async fn stories_for_user(&self, _user_key: &str) -> Result<Vec<StoredStory>> {
        Ok(Vec::new())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Resolves every user to the same configured profile.
#[derive(Debug, Clone)]
pub struct DefaultProfileStore {
    profile: UserProfile,
}

impl DefaultProfileStore {
    pub fn new(profile: UserProfile) -> Self {
        DefaultProfileStore { profile }
    }
}

#[async_trait]
impl ProfileStore for DefaultProfileStore {
    async fn resolve(&self, _user_id: &Identifier) -> StoryResult<UserProfile> {
        Ok(self.profile.clone())
    }

    async fn save(&self, _user_id: &Identifier, _profile: &UserProfile) -> Result<()> {
        Err(anyhow!("Profile storage is disabled; set DATABASE_URL to store profiles"))
    }
}

/// Used when no database is configured.
#[derive(Debug, Clone, Default)]
pub struct NoopStoryStore;

#[async_trait]
impl StoryStore for NoopStoryStore {
    async fn queue_story(&self, user_id: &Identifier, fragments: &[StoryFragment]) -> Result<()> {
        tracing::debug!(
            "Persistence disabled; dropping story for user {} ({} pages)",
            user_id,
            fragments.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_store_ignores_the_user_id() {
        let profile = UserProfile {
            name: "John".to_string(),
            age: 25,
        };
        let store = DefaultProfileStore::new(profile.clone());
        assert_eq!(store.resolve(&Identifier::Int(1)).await.unwrap(), profile);
        assert_eq!(store.resolve(&Identifier::from("x")).await.unwrap(), profile);
        assert!(store.save(&Identifier::Int(1), &profile).await.is_err());
    }
}
