//! Additive schema synchronization.
//!
//! Tables that do not exist are created; tables that exist only gain the
//! columns and indexes they are missing. Nothing is dropped, renamed or
//! retyped. The whole pass runs in one transaction.

use std::collections::HashSet;

use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::error::DbError;
use crate::schema::{quote_ident, Schema};

pub(crate) async fn auto_migrate(pool: &SqlitePool, schemas: &[Schema]) -> Result<(), DbError> {
    for schema in schemas {
        if schema.columns.is_empty() {
            return Err(DbError::EmptySchema {
                table: schema.table.clone(),
            });
        }
    }

    let mut tx = pool.begin().await?;
    for schema in schemas {
        migrate_table(&mut *tx, schema)
            .await
            .map_err(|source| DbError::Migrate {
                table: schema.table.clone(),
                source,
            })?;
    }
    tx.commit().await?;
    Ok(())
}

async fn migrate_table(conn: &mut SqliteConnection, schema: &Schema) -> Result<(), sqlx::Error> {
    let existing = existing_columns(conn, &schema.table).await?;

    let mut statements = Vec::new();
    if existing.is_empty() {
        statements.push(schema.create_sql());
        statements.extend(
            schema
                .columns
                .iter()
                .filter_map(|column| schema.index_sql(column, false)),
        );
        tracing::info!(table = %schema.table, "creating table");
    } else {
        for column in &schema.columns {
            let added = !existing.contains(&column.name.to_ascii_lowercase());
            if added {
                tracing::info!(table = %schema.table, column = %column.name, "adding column");
                statements.push(schema.add_column_sql(column));
            }
            statements.extend(schema.index_sql(column, added));
        }
    }

    for statement in statements {
        tracing::debug!(%statement, "migrate");
        sqlx::query(&statement).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Lower-cased names of the columns `table` currently has; empty when the
/// table does not exist.
async fn existing_columns(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<HashSet<String>, sqlx::Error> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(table)))
        .fetch_all(&mut *conn)
        .await?;

    rows.iter()
        .map(|row| {
            row.try_get::<String, _>("name")
                .map(|name| name.to_ascii_lowercase())
        })
        .collect()
}
