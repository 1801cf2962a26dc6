//! PostgreSQL store: every collection lives in one `documents` table as JSONB payloads.
//! Unique fields are enforced by per-collection partial unique indexes.

use super::{Document, Filter, Record, RecordStore};
use crate::config::ResolvedCollection;
use crate::error::{AppError, ConfigError, Violation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;
use uuid::Uuid;

const DOCUMENTS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    id UUID NOT NULL,
    payload JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (collection, id)
)
"#;
const CREATED_AT_INDEX_DDL: &str =
    "CREATE INDEX IF NOT EXISTS documents_collection_created_at_idx ON documents (collection, created_at)";
const PAYLOAD_INDEX_DDL: &str =
    "CREATE INDEX IF NOT EXISTS documents_payload_idx ON documents USING GIN (payload jsonb_path_ops)";

const INSERT_SQL: &str = "INSERT INTO documents (collection, id, payload) VALUES ($1, $2, $3) \
     RETURNING id, payload, created_at, updated_at";
const FETCH_SQL: &str =
    "SELECT id, payload, created_at, updated_at FROM documents WHERE collection = $1 AND id = $2";
const SCAN_SQL: &str = "SELECT id, payload, created_at, updated_at FROM documents \
     WHERE collection = $1 AND payload @> $2 ORDER BY created_at, id";
const REPLACE_SQL: &str = "UPDATE documents SET payload = $3, updated_at = NOW() \
     WHERE collection = $1 AND id = $2 RETURNING id, payload, created_at, updated_at";
const REMOVE_SQL: &str = "DELETE FROM documents WHERE collection = $1 AND id = $2";
const EXISTS_SQL: &str = "SELECT EXISTS(SELECT 1 FROM documents \
     WHERE collection = $1 AND payload @> $2 AND ($3::uuid IS NULL OR id <> $3))";

type RecordRow = (Uuid, Value, DateTime<Utc>, DateTime<Utc>);

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

/// Index name for a unique field; also used to map unique violations back to the field.
fn unique_index_name(collection: &str, field: &str) -> String {
    format!("documents_{}_{}_key", collection, field)
}

/// Names are validated identifiers (see `config::is_identifier`), so interpolation is safe.
/// The key is the JSONB value, so `100` and `100.0` collide like they do in the memory store.
fn unique_index_ddl(collection: &str, field: &str) -> String {
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON documents ((payload->'{}')) WHERE collection = '{}'",
        unique_index_name(collection, field),
        field,
        collection
    )
}

fn record_from_row((id, payload, created_at, updated_at): RecordRow) -> Result<Record, AppError> {
    let fields: Document = serde_json::from_value(payload)?;
    Ok(Record {
        id,
        fields,
        created_at,
        updated_at,
    })
}

fn map_write_error(collection: &ResolvedCollection, err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = db
                .constraint()
                .and_then(|name| {
                    collection
                        .unique_fields()
                        .find(|f| unique_index_name(&collection.name, &f.name) == name)
                })
                .map(|f| f.name.clone())
                .unwrap_or_else(|| "id".into());
            return AppError::from_violations(vec![Violation::DuplicateValue { field }]);
        }
    }
    AppError::Db(err)
}

#[async_trait]
impl RecordStore for PgStore {
    async fn ensure_schema(&self, collections: &[ResolvedCollection]) -> Result<(), AppError> {
        for ddl in [DOCUMENTS_DDL, CREATED_AT_INDEX_DDL, PAYLOAD_INDEX_DDL] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        for c in collections {
            for f in c.unique_fields() {
                let ddl = unique_index_ddl(&c.name, &f.name);
                tracing::debug!(sql = %ddl, "ensure unique index");
                sqlx::query(&ddl).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    async fn insert(&self, collection: &ResolvedCollection, fields: Document) -> Result<Record, AppError> {
        tracing::debug!(sql = %INSERT_SQL, collection = %collection.name, "query");
        let row: RecordRow = sqlx::query_as(INSERT_SQL)
            .bind(collection.name.as_str())
            .bind(Uuid::new_v4())
            .bind(Value::Object(fields))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(collection, e))?;
        record_from_row(row)
    }

    async fn fetch(&self, collection: &str, id: Uuid) -> Result<Option<Record>, AppError> {
        tracing::debug!(sql = %FETCH_SQL, collection = %collection, %id, "query");
        let row: Option<RecordRow> = sqlx::query_as(FETCH_SQL)
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(record_from_row).transpose()
    }

    fn scan<'a>(&'a self, collection: &'a str, filter: Option<&Filter>) -> BoxStream<'a, Result<Record, AppError>> {
        let containment = filter
            .map(Filter::to_containment)
            .unwrap_or_else(|| Value::Object(Default::default()));
        tracing::debug!(sql = %SCAN_SQL, collection = %collection, filter = %containment, "query");
        sqlx::query_as::<_, RecordRow>(SCAN_SQL)
            .bind(collection)
            .bind(containment)
            .fetch(&self.pool)
            .map(|row| row.map_err(AppError::from).and_then(record_from_row))
            .boxed()
    }

    async fn replace(
        &self,
        collection: &ResolvedCollection,
        id: Uuid,
        fields: Document,
    ) -> Result<Option<Record>, AppError> {
        tracing::debug!(sql = %REPLACE_SQL, collection = %collection.name, %id, "query");
        let row: Option<RecordRow> = sqlx::query_as(REPLACE_SQL)
            .bind(collection.name.as_str())
            .bind(id)
            .bind(Value::Object(fields))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(collection, e))?;
        row.map(record_from_row).transpose()
    }

    async fn remove(&self, collection: &str, id: Uuid) -> Result<bool, AppError> {
        tracing::debug!(sql = %REMOVE_SQL, collection = %collection, %id, "query");
        let result = sqlx::query(REMOVE_SQL)
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn exists(&self, collection: &str, filter: &Filter, exclude: Option<Uuid>) -> Result<bool, AppError> {
        tracing::debug!(sql = %EXISTS_SQL, collection = %collection, field = %filter.field, "query");
        let (found,): (bool,) = sqlx::query_as(EXISTS_SQL)
            .bind(collection)
            .bind(filter.to_containment())
            .bind(exclude)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin, db_name) = admin_options(database_url)?;
    let db_name = match db_name {
        Some(name) if name != "postgres" => name,
        _ => return Ok(()),
    };
    let mut conn: sqlx::PgConnection = admin.connect().await?;
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

/// Options for the `postgres` maintenance database on the same server, plus the
/// database named in `url` (if any).
fn admin_options(url: &str) -> Result<(PgConnectOptions, Option<String>), ConfigError> {
    let opts = PgConnectOptions::from_str(url)
        .map_err(|e| ConfigError::Settings(format!("DATABASE_URL: {}", e)))?;
    let db_name = opts.get_database().map(str::to_string);
    Ok((opts.database("postgres"), db_name))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
