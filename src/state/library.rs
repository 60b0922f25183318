use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task;
use tracing::info;

use super::data::{ImageCategory, UpdateQuery, UpdateUrls};
use crate::error::PersistenceError;
use crate::sink::Persistence;

/// The Catalog keeps the latest public URL of every booth image in SQLite.
/// Each update query is applied as one upsert transaction.
#[derive(Clone)]
pub struct Catalog {
    db_path: PathBuf,
}

impl Catalog {
    /// Open the catalog at its default location:
    /// - Linux: ~/.local/share/booth-cropper/catalog.db
    /// - macOS: ~/Library/Application Support/booth-cropper/catalog.db
    /// - Windows: %APPDATA%\booth-cropper\catalog.db
    pub fn open_default() -> Result<Self, PersistenceError> {
        Self::open(Self::default_path()?)
    }

    /// Open (or create) a catalog database at `db_path`
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        Self::init_schema(&conn)?;
        info!(path = %db_path.display(), "Catalog initialized");

        Ok(Self { db_path })
    }

    fn default_path() -> Result<PathBuf, PersistenceError> {
        let mut path = dirs::data_dir().or_else(dirs::home_dir).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine user data directory",
            )
        })?;

        path.push("booth-cropper");
        path.push("catalog.db");
        Ok(path)
    }

    /// Thumbnails are keyed by an empty original URL: one per booth
    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS booth_images (
                booth_id        INTEGER NOT NULL,
                category        TEXT NOT NULL,
                original_url    TEXT NOT NULL,
                url             TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                PRIMARY KEY (booth_id, category, original_url)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_booth_images_updated_at
             ON booth_images(booth_id, updated_at DESC)",
            [],
        )?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        Connection::open(&self.db_path)
    }

    fn apply(&self, query: &UpdateQuery) -> Result<usize, PersistenceError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        let thumbnail = query
            .urls
            .thumbnail
            .as_ref()
            .map(|url| (ImageCategory::Thumbnail, "", url.as_str()));
        let articles = query
            .urls
            .article
            .iter()
            .map(|(original, url)| (ImageCategory::Article, original.as_str(), url.as_str()));
        let products = query
            .urls
            .product
            .iter()
            .map(|(original, url)| (ImageCategory::Product, original.as_str(), url.as_str()));

        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO booth_images (booth_id, category, original_url, url, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(booth_id, category, original_url)
                 DO UPDATE SET url = excluded.url, updated_at = excluded.updated_at",
            )?;
            for (category, original, url) in thumbnail.into_iter().chain(articles).chain(products) {
                written += stmt.execute(params![
                    query.booth_id,
                    category.as_str(),
                    original,
                    url,
                    now
                ])?;
            }
        }
        tx.commit()?;

        Ok(written)
    }

    /// Stored URLs of a booth, in update-query shape
    pub fn booth_urls(&self, booth_id: i64) -> Result<UpdateUrls, PersistenceError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT category, original_url, url FROM booth_images WHERE booth_id = ?1",
        )?;

        let rows = stmt.query_map([booth_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut urls = UpdateUrls::default();
        for row in rows {
            let (category, original, url) = row?;
            match category.as_str() {
                "thumbnail" => urls.thumbnail = Some(url),
                "article" => {
                    urls.article.insert(original, url);
                }
                "product" => {
                    urls.product.insert(original, url);
                }
                _ => {}
            }
        }

        Ok(urls)
    }

    /// When the booth was last written, if ever
    pub fn last_updated(&self, booth_id: i64) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        let conn = self.connect()?;
        let stamp: Option<String> = conn
            .query_row(
                "SELECT MAX(updated_at) FROM booth_images WHERE booth_id = ?1",
                [booth_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        Ok(stamp
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc)))
    }
}

#[async_trait]
impl Persistence for Catalog {
    async fn update(&self, query: &UpdateQuery) -> Result<(), PersistenceError> {
        let catalog = self.clone();
        let query = query.clone();

        let written = task::spawn_blocking(move || catalog.apply(&query))
            .await
            .map_err(|e| PersistenceError::Worker(e.to_string()))??;

        info!(rows = written, "Catalog updated");
        Ok(())
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("db_path", &self.db_path)
            .finish()
    }
}
