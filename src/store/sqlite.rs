use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

use super::{LinkRepository, StoreError};
use crate::models::{Click, DeviceInfo, GeoInfo, Link};

/// Repository backed by SQLite. Each click is a single INSERT, so concurrent
/// redirects never overwrite one another.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct LinkRow {
    id: String,
    destination: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ClickRow {
    link_id: String,
    ip: String,
    user_agent: String,
    clicked_at: DateTime<Utc>,
    referrer: Option<String>,
    geo: Option<String>,
    device: Option<String>,
}

impl ClickRow {
    fn into_click(self) -> Click {
        Click {
            ip: self.ip,
            user_agent: self.user_agent,
            timestamp: self.clicked_at,
            referrer: self.referrer,
            geo: decode_column::<GeoInfo>(self.geo.as_deref()),
            device: decode_column::<DeviceInfo>(self.device.as_deref()),
        }
    }
}

/// Decode an optional JSON column; a malformed value is logged and dropped
/// rather than failing the whole read.
fn decode_column<T: serde::de::DeserializeOwned>(raw: Option<&str>) -> Option<T> {
    let raw = raw?;
    serde_json::from_str(raw)
        .map_err(|e| tracing::warn!("Ignoring malformed click column {:?}: {}", raw, e))
        .ok()
}

fn encode_column<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>, StoreError> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(StoreError::Encode)
}

impl SqliteRepository {
    /// Open (creating if missing) the database and apply migrations.
    ///
    /// `sqlite::memory:` databases are per-connection, so callers using one
    /// should pass `max_connections = 1`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = database_url
            .parse::<SqliteConnectOptions>()?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!("SQLite link store migrations applied");

        Ok(Self { pool })
    }

    async fn clicks_for(&self, id: &str) -> Result<Vec<Click>, StoreError> {
        let rows: Vec<ClickRow> = sqlx::query_as(
            "SELECT link_id, ip, user_agent, clicked_at, referrer, geo, device
             FROM clicks WHERE link_id = ?1 ORDER BY seq",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ClickRow::into_click).collect())
    }
}

#[async_trait]
impl LinkRepository for SqliteRepository {
    async fn insert(&self, link: &Link) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO links (id, destination, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(&link.id)
        .bind(&link.destination)
        .bind(link.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Link>, StoreError> {
        let row: Option<LinkRow> =
            sqlx::query_as("SELECT id, destination, created_at FROM links WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let clicks = self.clicks_for(&row.id).await?;
        Ok(Some(Link {
            id: row.id,
            destination: row.destination,
            created_at: row.created_at,
            clicks,
        }))
    }

    async fn append_click(&self, id: &str, click: &Click) -> Result<bool, StoreError> {
        let geo = encode_column(click.geo.as_ref())?;
        let device = encode_column(click.device.as_ref())?;

        // Guarded insert: a deleted link yields zero rows instead of an FK error.
        let affected = sqlx::query(
            "INSERT INTO clicks (link_id, ip, user_agent, clicked_at, referrer, geo, device)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
             WHERE EXISTS (SELECT 1 FROM links WHERE id = ?1)",
        )
        .bind(id)
        .bind(&click.ip)
        .bind(&click.user_agent)
        .bind(click.timestamp)
        .bind(&click.referrer)
        .bind(geo)
        .bind(device)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected > 0)
    }

    async fn list(&self) -> Result<Vec<Link>, StoreError> {
        let rows: Vec<LinkRow> =
            sqlx::query_as("SELECT id, destination, created_at FROM links ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;

        let click_rows: Vec<ClickRow> = sqlx::query_as(
            "SELECT link_id, ip, user_agent, clicked_at, referrer, geo, device
             FROM clicks ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut clicks: HashMap<String, Vec<Click>> = HashMap::new();
        for row in click_rows {
            clicks
                .entry(row.link_id.clone())
                .or_default()
                .push(row.into_click());
        }

        Ok(rows
            .into_iter()
            .map(|row| Link {
                clicks: clicks.remove(&row.id).unwrap_or_default(),
                id: row.id,
                destination: row.destination,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM clicks WHERE link_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let affected = sqlx::query("DELETE FROM links WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(affected > 0)
    }
}
