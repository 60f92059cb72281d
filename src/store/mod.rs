//! Link store: the only component that touches persisted link state.
//!
//! [`LinkRepository`] is the persistence seam. [`LinkStore`] sits on top of it
//! and owns validation, id allocation and not-found reporting.

mod json;
mod memory;
mod sqlite;

pub use json::JsonFileRepository;
pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    config::{AppConfig, StorageBackend},
    error::AppError,
    models::{Click, Link},
    shortcode,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("link id already exists")]
    Conflict,
    #[error("store file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode store contents: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Persistence operations over whole links and their click histories.
///
/// Implementations must apply each mutation atomically with respect to other
/// mutations, so concurrent clicks are never lost.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Store a new link. Fails with [`StoreError::Conflict`] if the id is taken.
    async fn insert(&self, link: &Link) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Link>, StoreError>;

    /// Append a click to the end of a link's history. Returns `false` if the
    /// link does not exist.
    async fn append_click(&self, id: &str, click: &Click) -> Result<bool, StoreError>;

    /// Every link in creation order, clicks included.
    async fn list(&self) -> Result<Vec<Link>, StoreError>;

    /// Delete a link and all of its clicks. Returns `false` if it was absent.
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;
}

/// Open the repository selected by configuration.
pub async fn open_repository(config: &AppConfig) -> anyhow::Result<Arc<dyn LinkRepository>> {
    let repo: Arc<dyn LinkRepository> = match config.storage {
        StorageBackend::Json => {
            tracing::info!("Using JSON link store at {}", config.data_path.display());
            Arc::new(JsonFileRepository::new(&config.data_path))
        }
        StorageBackend::Sqlite => {
            tracing::info!("Using SQLite link store at {}", config.database_url);
            Arc::new(SqliteRepository::connect(&config.database_url, 10).await?)
        }
    };
    Ok(repo)
}

/// Fresh 6-char ids tried before widening.
const MAX_ID_ATTEMPTS: usize = 10;
/// Length of the final, wider id attempt.
const WIDE_ID_LEN: usize = 8;

#[derive(Clone)]
pub struct LinkStore {
    repo: Arc<dyn LinkRepository>,
}

impl LinkStore {
    pub fn new(repo: Arc<dyn LinkRepository>) -> Self {
        Self { repo }
    }

    /// Validate `destination`, allocate an unused id and persist a new link
    /// with an empty click history.
    pub async fn create(&self, destination: Option<&str>) -> Result<Link, AppError> {
        let destination = validate_destination(destination)?;

        for attempt in 0..=MAX_ID_ATTEMPTS {
            let id = if attempt < MAX_ID_ATTEMPTS {
                shortcode::generate()
            } else {
                shortcode::generate_with_len(WIDE_ID_LEN)
            };
            let link = Link::new(id, destination.clone());

            match self.repo.insert(&link).await {
                Ok(()) => {
                    tracing::info!("Created link '{}' -> {}", link.id, link.destination);
                    return Ok(link);
                }
                Err(StoreError::Conflict) => {
                    tracing::warn!("Link id collision on '{}', retrying", link.id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Conflict.into())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Link, AppError> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    pub async fn record_click(&self, id: &str, click: Click) -> Result<(), AppError> {
        if self.repo.append_click(id, &click).await? {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    pub async fn list_all(&self) -> Result<Vec<Link>, AppError> {
        Ok(self.repo.list().await?)
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<(), AppError> {
        if self.repo.remove(id).await? {
            tracing::info!("Deleted link '{}'", id);
            Ok(())
        } else {
            Err(not_found(id))
        }
    }
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("link '{id}' not found"))
}

/// Check that a destination is an absolute http(s) URL and return it trimmed.
pub fn validate_destination(raw: Option<&str>) -> Result<String, AppError> {
    let url = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("destination is required".into()))?;

    let rest = strip_scheme(url).ok_or_else(|| {
        AppError::Validation("destination must start with http:// or https://".into())
    })?;

    if rest.is_empty() || rest.starts_with('/') {
        return Err(AppError::Validation("destination must include a host".into()));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(AppError::Validation(
            "destination must not contain whitespace".into(),
        ));
    }

    Ok(url.to_owned())
}

fn strip_scheme(url: &str) -> Option<&str> {
    ["https://", "http://"].iter().find_map(|scheme| {
        url.get(..scheme.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
            .map(|_| &url[scheme.len()..])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn click(ip: &str) -> Click {
        Click {
            ip: ip.into(),
            user_agent: "unknown".into(),
            timestamp: Utc::now(),
            referrer: None,
            geo: None,
            device: None,
        }
    }

    fn memory_store() -> (LinkStore, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        (LinkStore::new(repo.clone()), repo)
    }

    #[test]
    fn validate_destination_accepts_http_and_https() {
        assert_eq!(
            validate_destination(Some("  https://example.com/a?b=c ")).unwrap(),
            "https://example.com/a?b=c"
        );
        assert!(validate_destination(Some("http://localhost:8080")).is_ok());
        assert!(validate_destination(Some("HTTPS://EXAMPLE.COM")).is_ok());
    }

    #[test]
    fn validate_destination_rejects_bad_input() {
        for bad in [
            None,
            Some(""),
            Some("   "),
            Some("not-a-url"),
            Some("ftp://example.com"),
            Some("https://"),
            Some("http:///path"),
            Some("https://exa mple.com"),
        ] {
            assert!(
                matches!(validate_destination(bad), Err(AppError::Validation(_))),
                "expected validation error for {bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn create_then_find_returns_same_destination() {
        let (store, _) = memory_store();
        let link = store.create(Some("https://example.com")).await.unwrap();

        assert_eq!(link.id.len(), shortcode::ID_LEN);
        assert!(shortcode::is_valid(&link.id));
        assert!(link.clicks.is_empty());

        let found = store.find_by_id(&link.id).await.unwrap();
        assert_eq!(found.destination, "https://example.com");
    }

    #[tokio::test]
    async fn invalid_create_leaves_store_untouched() {
        let (store, _) = memory_store();
        let err = store.create(Some("not-a-url")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_click_appends_in_order() {
        let (store, _) = memory_store();
        let link = store.create(Some("https://example.com")).await.unwrap();

        store.record_click(&link.id, click("1.1.1.1")).await.unwrap();
        store.record_click(&link.id, click("2.2.2.2")).await.unwrap();

        let found = store.find_by_id(&link.id).await.unwrap();
        let ips: Vec<_> = found.clicks.iter().map(|c| c.ip.as_str()).collect();
        assert_eq!(ips, ["1.1.1.1", "2.2.2.2"]);
    }

    #[tokio::test]
    async fn record_click_on_unknown_id_is_not_found() {
        let (store, _) = memory_store();
        let err = store.record_click("nope42", click("1.1.1.1")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_link_and_second_delete_is_not_found() {
        let (store, _) = memory_store();
        let link = store.create(Some("https://example.com")).await.unwrap();
        store.record_click(&link.id, click("1.1.1.1")).await.unwrap();

        store.delete_by_id(&link.id).await.unwrap();
        assert!(matches!(
            store.find_by_id(&link.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_by_id(&link.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    /// Rejects the first `collisions` inserts as if the id were taken.
    struct CollidingRepository {
        inner: MemoryRepository,
        collisions: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl LinkRepository for CollidingRepository {
        async fn insert(&self, link: &Link) -> Result<(), StoreError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) < self.collisions {
                return Err(StoreError::Conflict);
            }
            self.inner.insert(link).await
        }
        async fn get(&self, id: &str) -> Result<Option<Link>, StoreError> {
            self.inner.get(id).await
        }
        async fn append_click(&self, id: &str, click: &Click) -> Result<bool, StoreError> {
            self.inner.append_click(id, click).await
        }
        async fn list(&self) -> Result<Vec<Link>, StoreError> {
            self.inner.list().await
        }
        async fn remove(&self, id: &str) -> Result<bool, StoreError> {
            self.inner.remove(id).await
        }
    }

    #[tokio::test]
    async fn create_retries_on_collision() {
        let repo = Arc::new(CollidingRepository {
            inner: MemoryRepository::new(),
            collisions: 3,
            attempts: AtomicUsize::new(0),
        });
        let store = LinkStore::new(repo.clone());

        let link = store.create(Some("https://example.com")).await.unwrap();
        assert_eq!(link.id.len(), shortcode::ID_LEN);
        assert_eq!(repo.attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn create_widens_id_after_repeated_collisions() {
        let repo = Arc::new(CollidingRepository {
            inner: MemoryRepository::new(),
            collisions: MAX_ID_ATTEMPTS,
            attempts: AtomicUsize::new(0),
        });
        let store = LinkStore::new(repo);

        let link = store.create(Some("https://example.com")).await.unwrap();
        assert_eq!(link.id.len(), WIDE_ID_LEN);
    }

    #[tokio::test]
    async fn create_gives_up_when_every_id_collides() {
        let repo = Arc::new(CollidingRepository {
            inner: MemoryRepository::new(),
            collisions: usize::MAX,
            attempts: AtomicUsize::new(0),
        });
        let store = LinkStore::new(repo);

        let err = store.create(Some("https://example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::Conflict)));
    }
}
