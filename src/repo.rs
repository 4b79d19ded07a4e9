use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

/// Document store holding post records.
#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn list_posts(&self) -> RepoResult<Vec<Post>>;
    async fn get_post(&self, id: &PostId) -> RepoResult<Post>;
    async fn add_post(&self, data: FieldMap) -> RepoResult<Post>;
    /// Shallow merge of `fields` into the record's data. Missing ids yield `NotFound`.
    async fn merge_post(&self, id: &PostId, fields: FieldMap) -> RepoResult<Post>;
    /// Deleting an id that does not exist succeeds.
    async fn delete_post(&self, id: &PostId) -> RepoResult<()>;
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Serialize, Deserialize};
    use std::path::{PathBuf, Path};

    const SNAPSHOT_FILE: &str = "posts.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        posts: HashMap<PostId, Post>,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("POSTDECK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded {} posts from snapshot '{}'", s.posts.len(), path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(e) => {
                    log::info!("no snapshot at '{}' ({e}); starting empty", path.display());
                    State::default()
                }
            }
        }

        /// Called with the write guard still held so snapshots land in write order.
        fn persist(&self, state: &State) {
            let Some(path) = self.snapshot_path.as_ref() else { return };
            match serde_json::to_vec_pretty(state) {
                Ok(bytes) => {
                    if let Some(dir) = path.parent() {
                        let _ = std::fs::create_dir_all(dir);
                    }
                    if let Err(e) = std::fs::write(path.as_ref(), bytes) {
                        log::error!("failed to write snapshot '{}': {e}", path.display());
                    }
                }
                Err(e) => log::error!("failed to encode snapshot: {e}"),
            }
        }

        /// Snapshot-backed repository rooted at `POSTDECK_DATA_DIR` (default `data/`).
        pub fn new() -> Self {
            let mut path = Self::data_dir();
            path.push(SNAPSHOT_FILE);
            Self::with_snapshot_path(path)
        }

        pub fn with_snapshot_path(path: impl Into<PathBuf>) -> Self {
            let path = path.into();
            let state = Self::load_state_from(&path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Some(Arc::new(path)),
            }
        }

        /// Never touches the filesystem.
        pub fn ephemeral() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn list_posts(&self) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.posts.values().cloned().collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
            Ok(v)
        }
        async fn get_post(&self, id: &PostId) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts.get(id).cloned().ok_or(RepoError::NotFound)
        }
        async fn add_post(&self, data: FieldMap) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            let post = Post { id: PostId::generate(), data, created_at: Utc::now() };
            s.posts.insert(post.id.clone(), post.clone());
            self.persist(&s);
            Ok(post)
        }
        async fn merge_post(&self, id: &PostId, fields: FieldMap) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            let post = s.posts.get_mut(id).ok_or(RepoError::NotFound)?;
            for (k, v) in fields {
                post.data.insert(k, v);
            }
            let updated = post.clone();
            self.persist(&s);
            Ok(updated)
        }
        async fn delete_post(&self, id: &PostId) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if s.posts.remove(id).is_some() {
                self.persist(&s);
            }
            Ok(())
        }
    }
}

// Postgres implementation; records live in a single JSONB column.
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use chrono::DateTime;
    use sqlx::types::Json;
    use sqlx::{Pool, Postgres};

    #[derive(sqlx::FromRow)]
    struct PostRow {
        id: String,
        data: Json<FieldMap>,
        created_at: DateTime<Utc>,
    }

    impl From<PostRow> for Post {
        fn from(row: PostRow) -> Self {
            Post { id: PostId(row.id), data: row.data.0, created_at: row.created_at }
        }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        log::error!("postgres error: {e}");
        RepoError::Internal(e.to_string())
    }

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn list_posts(&self) -> RepoResult<Vec<Post>> {
            let rows = sqlx::query_as::<_, PostRow>("SELECT id, data, created_at FROM posts ORDER BY created_at, id")
                .fetch_all(&self.pool).await.map_err(internal)?;
            Ok(rows.into_iter().map(Post::from).collect())
        }
        async fn get_post(&self, id: &PostId) -> RepoResult<Post> {
            sqlx::query_as::<_, PostRow>("SELECT id, data, created_at FROM posts WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool).await.map_err(internal)?
                .map(Post::from)
                .ok_or(RepoError::NotFound)
        }
        async fn add_post(&self, data: FieldMap) -> RepoResult<Post> {
            let row = sqlx::query_as::<_, PostRow>(
                "INSERT INTO posts (id, data) VALUES ($1, $2) RETURNING id, data, created_at"
            )
            .bind(PostId::generate().as_str())
            .bind(Json(&data))
            .fetch_one(&self.pool).await.map_err(internal)?;
            Ok(row.into())
        }
        async fn merge_post(&self, id: &PostId, fields: FieldMap) -> RepoResult<Post> {
            // `||` on jsonb is a shallow merge with right-hand precedence.
            sqlx::query_as::<_, PostRow>(
                "UPDATE posts SET data = data || $2 WHERE id = $1 RETURNING id, data, created_at"
            )
            .bind(id.as_str())
            .bind(Json(&fields))
            .fetch_optional(&self.pool).await.map_err(internal)?
            .map(Post::from)
            .ok_or(RepoError::NotFound)
        }
        async fn delete_post(&self, id: &PostId) -> RepoResult<()> {
            sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id.as_str())
                .execute(&self.pool).await.map_err(internal)?;
            Ok(())
        }
    }
}
