//! PostgreSQL store

use super::{CheckpointStore, RowSink};
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::ingest::DestinationRow;
use crate::schema::{all_tables, quote_ident, ColumnType, TableSchema};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info};

/// Rows per INSERT statement; keeps bind parameters well under the
/// PostgreSQL limit of 65535 for the widest table.
pub const INSERT_CHUNK_SIZE: usize = 1000;

const MAX_CONNECTIONS: u32 = 2;
const ACQUIRE_TIMEOUT_SECS: u64 = 30;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        if let Some(port) = config.port {
            options = options.port(port);
        }

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
            .connect_with(options)
            .await?;

        info!(
            host = %config.host,
            database = %config.database,
            "Database connection pool created"
        );

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the checkpoint table and every dataset table if missing
    pub async fn ensure_schema(&self) -> Result<()> {
        for table in all_tables() {
            sqlx::query(&table.create_table_sql())
                .execute(&self.pool)
                .await?;
            debug!(table = table.name, "Ensured table exists");
        }
        Ok(())
    }
}

/// Text form of a JSON value for binding; the statement casts it to the
/// column type.
///
/// Integer columns accept integral floats such as `1.0`, which PostgreSQL
/// would reject in that spelling.
fn bind_text(value: &Value, column_type: ColumnType) -> Option<String> {
    match value {
        Value::Null => None,
        _ if column_type == ColumnType::Jsonb => Some(value.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if matches!(column_type, ColumnType::Integer | ColumnType::BigInt) => {
            match n.as_f64() {
                Some(f) if !n.is_i64() && !n.is_u64() && f.is_finite() && f.fract() == 0.0 => {
                    Some(format!("{:.0}", f))
                },
                _ => Some(n.to_string()),
            }
        },
        other => Some(other.to_string()),
    }
}

/// Multi-row INSERT for `rows`. Every insertable column is listed; columns a
/// row does not carry are bound as NULL.
pub fn build_insert(table: &TableSchema, rows: &[DestinationRow]) -> QueryBuilder<'static, Postgres> {
    let columns = table
        .column_names()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ");

    let mut builder: QueryBuilder<'static, Postgres> =
        QueryBuilder::new(format!("INSERT INTO {} ({}) ", quote_ident(table.name), columns));

    builder.push_values(rows, |mut b, row| {
        for column in table.columns {
            let value = row
                .get(column.name)
                .and_then(|v| bind_text(v, column.column_type));
            b.push_bind(value)
                .push_unseparated(format!("::{}", column.column_type.sql_type()));
        }
    });

    builder
}

#[async_trait]
impl RowSink for PgStore {
    async fn insert_rows(
        &self,
        table: &'static TableSchema,
        rows: Vec<DestinationRow>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
            let result = build_insert(table, chunk).build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }
}

#[async_trait]
impl CheckpointStore for PgStore {
    async fn find_last_job_id(&self, job_type: &str) -> Result<Option<String>> {
        let job_id: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT "jobId"
            FROM "JobId"
            WHERE "jobType" = $1
            ORDER BY ts DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(job_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job_id.flatten())
    }

    async fn record_checkpoint(
        &self,
        job_type: &str,
        job_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(r#"INSERT INTO "JobId" (ts, "jobId", "jobType") VALUES ($1, $2, $3)"#)
            .bind(timestamp.naive_utc())
            .bind(job_id)
            .bind(job_type)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ingest::ingest;
    use crate::schema::{APP_START, CUSTOM, TRANSACTION};
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn row(value: serde_json::Value) -> DestinationRow {
        DestinationRow::from_values(value.as_object().unwrap().clone())
    }

    #[test]
    fn test_build_insert_lists_every_column() {
        let rows = vec![
            row(json!({"userid": "u1", "ts": "2017-07-14 02:40:00"})),
            row(json!({"userid": "u2"})),
        ];

        let builder = build_insert(&APP_START, &rows);
        let sql = builder.sql();

        assert!(sql.starts_with(
            "INSERT INTO \"appStart\" (\"ts\", \"submit_time\", \"userid\", \"remote_ip\", \"platform\", \"user_agent\", \"sdk_ver\") VALUES "
        ), "{}", sql);
        assert!(sql.contains("($1::TIMESTAMP, $2::TIMESTAMP, $3::VARCHAR, $4::INET"), "{}", sql);
        assert!(sql.contains("($8::TIMESTAMP"), "{}", sql);
        assert_eq!(sql.matches("::INET").count(), 2);
    }

    #[test]
    fn test_bind_text() {
        assert_eq!(bind_text(&json!(null), ColumnType::Varchar), None);
        assert_eq!(bind_text(&json!("abc"), ColumnType::Varchar).as_deref(), Some("abc"));
        assert_eq!(bind_text(&json!(12.5), ColumnType::Numeric).as_deref(), Some("12.5"));
        assert_eq!(bind_text(&json!(true), ColumnType::Varchar).as_deref(), Some("true"));
        // JSONB columns always receive serialized JSON
        assert_eq!(bind_text(&json!("abc"), ColumnType::Jsonb).as_deref(), Some("\"abc\""));
        assert_eq!(
            bind_text(&json!({"level": 3}), ColumnType::Jsonb).as_deref(),
            Some("{\"level\":3}")
        );
    }

    #[test]
    fn test_bind_text_integral_float_for_integer_columns() {
        assert_eq!(bind_text(&json!(1.0), ColumnType::Integer).as_deref(), Some("1"));
        assert_eq!(bind_text(&json!(-42.0), ColumnType::BigInt).as_deref(), Some("-42"));
        assert_eq!(bind_text(&json!(7), ColumnType::Integer).as_deref(), Some("7"));
        // non-integral values are left for the database to reject
        assert_eq!(bind_text(&json!(1.5), ColumnType::Integer).as_deref(), Some("1.5"));
        assert_eq!(bind_text(&json!(1.0), ColumnType::Numeric).as_deref(), Some("1.0"));
    }

    #[test]
    fn test_build_insert_casts_jsonb() {
        let rows = vec![row(json!({"name": "level_up", "custom_params": {"level": 3}}))];
        let builder = build_insert(&CUSTOM, &rows);
        assert!(builder.sql().contains("::JSONB)"));
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    async fn schema_store(pool: PgPool) -> Result<PgStore> {
        let store = PgStore::from_pool(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    #[sqlx::test]
    async fn test_ensure_schema_is_idempotent(pool: PgPool) -> Result<()> {
        let store = schema_store(pool.clone()).await?;
        store.ensure_schema().await?;

        let tables: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM information_schema.tables
            WHERE table_schema = current_schema()
              AND table_name IN ('JobId', 'appStart', 'custom', 'transaction')
            "#,
        )
        .fetch_one(&pool)
        .await?;

        assert_eq!(tables, 4);
        Ok(())
    }

    #[sqlx::test]
    async fn test_insert_casts_every_column_type(pool: PgPool) -> Result<()> {
        let store = schema_store(pool.clone()).await?;

        let rows = vec![row(json!({
            "ts": "2017-07-14 02:40:00",
            "submit_time": "2017-07-14 02:40:05",
            "userid": "u1",
            "sessionid": 9007199254740993i64,
            "remote_ip": "10.0.0.1",
            "platform": "IPhonePlayer",
            "currency": "USD",
            "amount": 0.99,
            "transactionid": 1.0,
            "productid": "gems_100",
            "receipt": {"store": "AppleAppStore", "payload": "abc"}
        }))];

        let inserted = store.insert_rows(&TRANSACTION, rows).await?;
        assert_eq!(inserted, 1);

        let (ts, ip, session, amount, transaction_id, store_name): (
            String,
            String,
            i64,
            String,
            i32,
            String,
        ) = sqlx::query_as(
            r#"
            SELECT ts::TEXT, host(remote_ip), sessionid, amount::TEXT, transactionid,
                   receipt->>'store'
            FROM "transaction"
            "#,
        )
        .fetch_one(&pool)
        .await?;

        assert_eq!(ts, "2017-07-14 02:40:00");
        assert_eq!(ip, "10.0.0.1");
        assert_eq!(session, 9007199254740993);
        assert_eq!(amount, "0.99");
        assert_eq!(transaction_id, 1);
        assert_eq!(store_name, "AppleAppStore");
        Ok(())
    }

    #[sqlx::test]
    async fn test_insert_rolls_back_whole_call_on_bad_value(pool: PgPool) -> Result<()> {
        let store = schema_store(pool.clone()).await?;

        let rows = vec![
            row(json!({"userid": "u1", "remote_ip": "10.0.0.1"})),
            row(json!({"userid": "u2", "remote_ip": "not-an-address"})),
        ];
        assert!(store.insert_rows(&APP_START, rows).await.is_err());

        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "appStart""#)
            .fetch_one(&pool)
            .await?;
        assert_eq!(count, 0);
        Ok(())
    }

    #[sqlx::test]
    async fn test_insert_spans_several_chunks(pool: PgPool) -> Result<()> {
        let store = schema_store(pool.clone()).await?;

        let rows = (0..INSERT_CHUNK_SIZE * 2 + 500)
            .map(|i| row(json!({"userid": format!("u{}", i)})))
            .collect::<Vec<_>>();
        let inserted = store.insert_rows(&APP_START, rows).await?;

        assert_eq!(inserted, (INSERT_CHUNK_SIZE * 2 + 500) as u64);
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "appStart""#)
            .fetch_one(&pool)
            .await?;
        assert_eq!(count, inserted as i64);
        Ok(())
    }

    #[sqlx::test]
    async fn test_ingest_two_lines_into_custom(pool: PgPool) -> Result<()> {
        let store = schema_store(pool.clone()).await?;
        let staging = TempDir::new()?;
        std::fs::write(
            staging.path().join("custom.json"),
            concat!(
                r#"{"ts":1500000000000,"userid":"u1","sessionid":42,"name":"level_up","custom_params":{"level":3},"debug_device":true}"#,
                "\n",
                r#"{"ts":1500000010000,"userid":"u2","sessionid":43,"name":"level_up"}"#,
                "\n"
            ),
        )?;

        let summary = ingest(&CUSTOM, staging.path(), &store).await?;
        assert_eq!(summary.rows, 2);

        let rows: Vec<(String, bool, String)> = sqlx::query_as(
            r#"SELECT userid, custom_params IS NULL, ts::TEXT FROM custom ORDER BY id"#,
        )
        .fetch_all(&pool)
        .await?;

        assert_eq!(
            rows,
            vec![
                ("u1".to_string(), false, "2017-07-14 02:40:00".to_string()),
                ("u2".to_string(), true, "2017-07-14 02:40:10".to_string()),
            ]
        );
        Ok(())
    }

    #[sqlx::test]
    async fn test_checkpoint_round_trip(pool: PgPool) -> Result<()> {
        let store = schema_store(pool.clone()).await?;

        // appended out of timestamp order on purpose
        store.record_checkpoint("custom", "job-2", at(2_000)).await?;
        store.record_checkpoint("custom", "job-1", at(1_000)).await?;
        store.record_checkpoint("appStart", "job-9", at(500)).await?;

        assert_eq!(store.find_last_job_id("custom").await?.as_deref(), Some("job-2"));
        assert_eq!(store.find_last_job_id("appStart").await?.as_deref(), Some("job-9"));
        assert_eq!(store.find_last_job_id("transaction").await?, None);

        let entries: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "JobId""#)
            .fetch_one(&pool)
            .await?;
        assert_eq!(entries, 3);
        Ok(())
    }
}
