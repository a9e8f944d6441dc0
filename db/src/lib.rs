//! SQLite bootstrap: open a database file and sync its schema.
//!
//! # Overview
//! `start_db("data/app", groups)` opens (creating if needed) `data/app.db`,
//! flattens the given groups of table definitions and applies an additive
//! migration. The returned `Database` is an owned handle: pass it (or its
//! pool) to whatever needs it and `close` it on the way out.
//!
//! # Design
//! - Table definitions are plain values (`Schema`), usually produced by a
//!   `Model` impl, so modules can each contribute their own group.
//! - An open failure is returned as `DbError::Open`; startup code is expected
//!   to treat it as fatal. Migration failures are returned too, never ignored.

pub mod error;
mod migrate;
pub mod schema;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub use error::DbError;
pub use schema::{flatten, Column, ColumnType, Model, Schema};

/// An open database and the file it lives in.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

/// Open `<path>.db` and migrate it to the union of `groups`.
pub async fn start_db<G>(path: impl AsRef<Path>, groups: G) -> Result<Database, DbError>
where
    G: IntoIterator,
    G::Item: IntoIterator<Item = Schema>,
{
    let db = Database::open(path).await?;
    db.migrate(&flatten(groups)).await?;
    Ok(db)
}

impl Database {
    /// Open `<path>.db`, creating the file if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let file = db_file(path.as_ref());
        let options = SqliteConnectOptions::new()
            .filename(&file)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|source| DbError::Open {
                path: file.clone(),
                source,
            })?;

        tracing::info!(path = %file.display(), "database opened");
        Ok(Self { pool, path: file })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Additively migrate to `schemas`. Same-named tables should already be
    /// merged (see `flatten`).
    pub async fn migrate(&self, schemas: &[Schema]) -> Result<(), DbError> {
        migrate::auto_migrate(&self.pool, schemas).await
    }

    /// Close every pooled connection.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!(path = %self.path.display(), "database closed");
    }
}

fn db_file(path: &Path) -> PathBuf {
    let mut file = OsString::from(path.as_os_str());
    file.push(".db");
    PathBuf::from(file)
}
