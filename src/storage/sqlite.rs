//! SQLite 结果存储实现
//!
//! 单表 `checks`，只追加不更新。旧版本建出的表可能没有 `status_code` 列，
//! 打开时会自动补齐，旧行读出时该字段为空。

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::health::{CheckResult, CheckStatus};
use crate::storage::{AppendSummary, ResultStore, UrlMetrics};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS checks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    status TEXT NOT NULL,
    response_time REAL,
    checked_at TEXT NOT NULL,
    status_code INTEGER
)"#;

const CREATE_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_checks_url_checked_at ON checks (url, checked_at)";

const INSERT_SQL: &str = "INSERT INTO checks (url, status, response_time, checked_at, status_code) \
     VALUES (?, ?, ?, ?, ?)";

const SELECT_LATEST_BY_URL_SQL: &str = "SELECT url, status, response_time, checked_at, status_code \
     FROM checks WHERE url = ? ORDER BY checked_at DESC, id DESC LIMIT ?";

const SELECT_LATEST_SQL: &str = "SELECT url, status, response_time, checked_at, status_code \
     FROM checks ORDER BY checked_at DESC, id DESC LIMIT ?";

const METRICS_SQL: &str = r#"
SELECT url,
       COUNT(*) AS total_checks,
       SUM(CASE WHEN status = 'UP' THEN 1 ELSE 0 END) AS up_count,
       SUM(CASE WHEN status_code IS NOT NULL AND status_code >= 400 AND status_code < 600
                THEN 1 ELSE 0 END) AS error_count
FROM checks
GROUP BY url
ORDER BY url"#;

/// 基于 SQLite 连接池的结果存储
#[derive(Debug, Clone)]
pub struct SqliteResultStore {
    pool: SqlitePool,
}

impl SqliteResultStore {
    /// 打开（必要时创建）数据库并完成表结构初始化
    pub async fn connect(config: &StorageConfig) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| StorageError::Connect(format!("{}: {}", config.database_url, e)))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connect(format!("{}: {}", config.database_url, e)))?;

        let store = Self::from_pool(pool);
        store.migrate().await?;

        info!("结果存储已就绪: {}", config.database_url);
        Ok(store)
    }

    /// 使用已有连接池（不执行迁移）
    fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// 建表、补齐 `status_code` 列、建索引
    pub async fn migrate(&self) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(CREATE_TABLE_SQL)
            .execute(&mut *conn)
            .await
            .map_err(|e| StorageError::Migration(format!("建表失败: {e}")))?;

        let columns: Vec<String> = sqlx::query("PRAGMA table_info(checks)")
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| StorageError::Migration(format!("读取表结构失败: {e}")))?
            .iter()
            .filter_map(|row| row.try_get::<String, _>("name").ok())
            .collect();

        if !columns.iter().any(|c| c == "status_code") {
            info!("检测到旧版表结构，补充 status_code 列");
            sqlx::query("ALTER TABLE checks ADD COLUMN status_code INTEGER")
                .execute(&mut *conn)
                .await
                .map_err(|e| StorageError::Migration(format!("添加 status_code 列失败: {e}")))?;
        }

        sqlx::query(CREATE_INDEX_SQL)
            .execute(&mut *conn)
            .await
            .map_err(|e| StorageError::Migration(format!("创建索引失败: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn append(&self, results: &[CheckResult]) -> Result<AppendSummary, StorageError> {
        let mut summary = AppendSummary::default();
        if results.is_empty() {
            return Ok(summary);
        }

        let mut conn = self.pool.acquire().await?;

        for result in results {
            let outcome = sqlx::query(INSERT_SQL)
                .bind(&result.url)
                .bind(result.status.as_str())
                .bind(result.response_time.map(|d| d.as_secs_f64()))
                .bind(format_timestamp(&result.checked_at))
                .bind(result.status_code.map(i64::from))
                .execute(&mut *conn)
                .await;

            match outcome {
                Ok(_) => summary.inserted += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!(url = %result.url, "写入检测结果失败: {}", e);
                }
            }
        }

        debug!(
            inserted = summary.inserted,
            failed = summary.failed,
            "检测结果写入完成"
        );
        Ok(summary)
    }

    async fn latest(
        &self,
        url: Option<&str>,
        limit: u32,
    ) -> Result<Vec<CheckResult>, StorageError> {
        let mut conn = self.pool.acquire().await?;

        let rows = match url {
            Some(url) => {
                sqlx::query(SELECT_LATEST_BY_URL_SQL)
                    .bind(url)
                    .bind(i64::from(limit))
                    .fetch_all(&mut *conn)
                    .await?
            }
            None => {
                sqlx::query(SELECT_LATEST_SQL)
                    .bind(i64::from(limit))
                    .fetch_all(&mut *conn)
                    .await?
            }
        };

        Ok(rows
            .iter()
            .filter_map(|row| match decode_row(row) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!("跳过无法解析的历史记录: {}", e);
                    None
                }
            })
            .collect())
    }

    async fn metrics(&self) -> Result<Vec<UrlMetrics>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(METRICS_SQL).fetch_all(&mut *conn).await?;

        let mut metrics = Vec::with_capacity(rows.len());
        for row in &rows {
            let url: String = row.try_get("url")?;
            let total: i64 = row.try_get("total_checks")?;
            let up: Option<i64> = row.try_get("up_count")?;
            let errors: Option<i64> = row.try_get("error_count")?;

            metrics.push(UrlMetrics::from_counts(
                url,
                non_negative(total),
                non_negative(up.unwrap_or(0)),
                non_negative(errors.unwrap_or(0)),
            ));
        }

        Ok(metrics)
    }

    async fn distinct_urls(&self) -> Result<BTreeSet<String>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query("SELECT DISTINCT url FROM checks")
            .fetch_all(&mut *conn)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("url").map_err(StorageError::from))
            .collect()
    }
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// 存储格式：RFC 3339，UTC，微秒精度，保证字典序即时间序
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// 兼容旧数据中不带时区的 ISO 时间（按 UTC 处理）
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("无效的检测时间 {raw:?}: {e}"))
}

fn decode_row(row: &SqliteRow) -> Result<CheckResult, String> {
    let url: String = row.try_get("url").map_err(|e| e.to_string())?;

    let status: String = row.try_get("status").map_err(|e| e.to_string())?;
    let status = status
        .parse::<CheckStatus>()
        .map_err(|e| format!("{url}: {e}"))?;

    let response_time = row
        .try_get::<Option<f64>, _>("response_time")
        .map_err(|e| e.to_string())?
        .map(Duration::try_from_secs_f64)
        .transpose()
        .map_err(|e| format!("{url}: 无效的响应时间: {e}"))?;

    let checked_at: String = row.try_get("checked_at").map_err(|e| e.to_string())?;
    let checked_at = parse_timestamp(&checked_at)?;

    let status_code = match row.try_get::<Option<i64>, _>("status_code") {
        Ok(code) => code
            .map(u16::try_from)
            .transpose()
            .map_err(|e| format!("{url}: 无效的状态码: {e}"))?,
        Err(sqlx::Error::ColumnNotFound(_)) => None,
        Err(e) => return Err(e.to_string()),
    };

    Ok(CheckResult {
        url,
        status,
        response_time,
        checked_at,
        status_code,
    })
}
