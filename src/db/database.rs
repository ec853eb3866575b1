use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::db::models::{StoredStory, StoryInsert, StoryPageRow, StoryRow, UserRow};
use crate::db::{ProfileStore, StoryStore};
use crate::error::{StoryError, StoryResult};
use crate::models::{Identifier, StoryFragment, UserProfile};

const WRITER_QUEUE_CAPACITY: usize = 256;

/// Sqlite-backed profile lookup and story persistence. Stories are queued
/// and written by a background task so requests never wait on the disk.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    sender: mpsc::Sender<StoryInsert>,
    default_profile: UserProfile,
}

impl Database {
    pub async fn init(database_url: &str, default_profile: UserProfile) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool_options = if database_url.contains(":memory:") {
            // Every connection to an in-memory database is a separate database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (\
                user_id TEXT PRIMARY KEY,\
                name TEXT NOT NULL,\
                age INTEGER NOT NULL,\
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS stories (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                user_id TEXT NOT NULL,\
                page_count INTEGER NOT NULL,\
                created_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS story_pages (\
                id INTEGER PRIMARY KEY AUTOINCREMENT,\
                story_id INTEGER NOT NULL,\
                position INTEGER NOT NULL,\
                image_id TEXT NOT NULL,\
                story_text TEXT NOT NULL,\
                UNIQUE(story_id, position),\
                FOREIGN KEY(story_id) REFERENCES stories(id)\
            );",
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_stories_user_id ON stories(user_id);")
            .execute(&pool)
            .await?;

        info!("Database tables created successfully");

        let (sender, receiver) = mpsc::channel(WRITER_QUEUE_CAPACITY);
        let writer_pool = pool.clone();
        tokio::spawn(async move {
            story_writer(writer_pool, receiver).await;
        });

        info!("Story writer task started");

        Ok(Database {
            pool,
            sender,
            default_profile,
        })
    }
}

#[async_trait]
impl ProfileStore for Database {
    async fn resolve(&self, user_id: &Identifier) -> StoryResult<UserProfile> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT name, age FROM users WHERE user_id = ?",
        )
        .bind(user_id.storage_key())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StoryError::ProfileResolutionFailure {
            user_id: user_id.clone(),
            reason: err.to_string(),
        })?;

        let Some(row) = row else {
            debug!("No profile stored for user {}; using default", user_id);
            return Ok(self.default_profile.clone());
        };

        let age = u32::try_from(row.age).map_err(|_| StoryError::ProfileResolutionFailure {
            user_id: user_id.clone(),
            reason: format!("stored age {} is out of range", row.age),
        })?;

        Ok(UserProfile {
            name: row.name,
            age,
        })
    }

    async fn save(&self, user_id: &Identifier, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (user_id, name, age) VALUES (?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
             name = excluded.name, age = excluded.age, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(user_id.storage_key())
        .bind(&profile.name)
        .bind(i64::from(profile.age))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StoryStore for Database {
    async fn queue_story(&self, user_id: &Identifier, fragments: &[StoryFragment]) -> Result<()> {
        self.sender
            .send(StoryInsert {
                user_id: user_id.clone(),
                fragments: fragments.to_vec(),
                created_at: Utc::now(),
            })
            .await
            .map_err(|err| anyhow::anyhow!("Failed to queue story insert: {err}"))
    }

    async fn stories_for_user(&self, user_key: &str) -> Result<Vec<StoredStory>> {
        let stories = sqlx::query_as::<_, StoryRow>(
            "SELECT id, user_id, created_at FROM stories WHERE user_id = ? ORDER BY id",
        )
        .bind(user_key)
        .fetch_all(&self.pool)
        .await?;

        let mut result = Vec::with_capacity(stories.len());
        for story in stories {
            let pages = sqlx::query_as::<_, StoryPageRow>(
                "SELECT image_id, story_text FROM story_pages \
                 WHERE story_id = ? ORDER BY position",
            )
            .bind(story.id)
            .fetch_all(&self.pool)
            .await?;

            let pages = pages
                .into_iter()
                .map(|page| -> Result<StoryFragment> {
                    Ok(StoryFragment {
                        image_id: serde_json::from_str(&page.image_id)?,
                        story_text: page.story_text,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            result.push(StoredStory {
                id: story.id,
                user_id: story.user_id,
                created_at: story.created_at,
                pages,
            });
        }

        Ok(result)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn insert_story(pool: &SqlitePool, story: &StoryInsert) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let story_id = sqlx::query(
        "INSERT INTO stories (user_id, page_count, created_at) VALUES (?, ?, ?)",
    )
    .bind(story.user_id.storage_key())
    .bind(story.fragments.len() as i64)
    .bind(story.created_at)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for (position, fragment) in story.fragments.iter().enumerate() {
        sqlx::query(
            "INSERT INTO story_pages (story_id, position, image_id, story_text) VALUES (?, ?, ?, ?)",
        )
        .bind(story_id)
        .bind(position as i64)
        .bind(serde_json::to_string(&fragment.image_id)?)
        .bind(&fragment.story_text)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(story_id)
}

async fn story_writer(pool: SqlitePool, mut receiver: mpsc::Receiver<StoryInsert>) {
    while let Some(story) = receiver.recv().await {
        match insert_story(&pool, &story).await {
            Ok(story_id) => debug!(
                "Stored story {} for user {} ({} pages)",
                story_id,
                story.user_id,
                story.fragments.len()
            ),
            Err(err) => warn!("Error in story_writer for user {}: {err}", story.user_id),
        }
    }

    let _ = pool.close().await;
    info!("Story writer task stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn default_profile() -> UserProfile {
        UserProfile {
            name: "John".to_string(),
            age: 25,
        }
    }

    async fn memory_db() -> Database {
        Database::init("sqlite::memory:", default_profile())
            .await
            .unwrap()
    }

    async fn wait_for_stories(
        db: &Database,
        user_id: &Identifier,
        count: usize,
    ) -> Vec<StoredStory> {
        for _ in 0..50 {
            let stories = db.stories_for_user(&user_id.storage_key()).await.unwrap();
            if stories.len() >= count {
                return stories;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("story writer did not store {count} stories in time");
    }

    #[tokio::test]
    async fn unknown_user_gets_default_profile() {
        let db = memory_db().await;
        let profile = db.resolve(&Identifier::Int(404)).await.unwrap();
        assert_eq!(profile, default_profile());
    }

    #[tokio::test]
    async fn stored_profile_is_resolved() {
        let db = memory_db().await;
        let user_id = Identifier::from("u-1");
        let stored = UserProfile {
            name: "Asha".to_string(),
            age: 8,
        };
        db.save(&user_id, &stored).await.unwrap();

        assert_eq!(db.resolve(&user_id).await.unwrap(), stored);
    }

    #[tokio::test]
    async fn queued_story_is_written_in_order() {
        let db = memory_db().await;
        let user_id = Identifier::Int(7);
        let fragments = vec![
            StoryFragment {
                image_id: Identifier::Int(1),
                story_text: "First.".to_string(),
            },
            StoryFragment {
                image_id: Identifier::from("two"),
                story_text: "Second.".to_string(),
            },
        ];

        db.queue_story(&user_id, &fragments).await.unwrap();

        let stories = wait_for_stories(&db, &user_id, 1).await;
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].user_id, "7");
        assert_eq!(stories[0].pages, fragments);
    }

    #[tokio::test]
    async fn out_of_range_stored_age_fails_resolution() {
        let db = memory_db().await;
        sqlx::query("INSERT INTO users (user_id, name, age) VALUES (?, ?, ?)")
            .bind("9")
            .bind("Broken")
            .bind(-1_i64)
            .execute(&db.pool)
            .await
            .unwrap();

        let err = db.resolve(&Identifier::Int(9)).await.unwrap_err();
        match err {
            StoryError::ProfileResolutionFailure { user_id, reason } => {
                assert_eq!(user_id, Identifier::Int(9));
                assert!(reason.contains("out of range"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_failure_fails_resolution() {
        let db = memory_db().await;
        sqlx::query("DROP TABLE users")
            .execute(&db.pool)
            .await
            .unwrap();

        let err = db.resolve(&Identifier::from("u-2")).await.unwrap_err();
        assert!(
            matches!(err, StoryError::ProfileResolutionFailure { .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn health_check_succeeds_on_open_pool() {
        let db = memory_db().await;
        db.health_check().await.unwrap();
        assert!(db.stories_for_user("nobody").await.unwrap().is_empty());
    }
}
