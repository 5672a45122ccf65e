//! 检测结果存储模块
//!
//! 定义结果存储接口（追加写入、最近N条、按URL历史、分组聚合、URL注册表）
//! 以及基于 SQLite 的实现

pub mod sqlite;

use crate::error::StorageError;
use crate::health::CheckResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use sqlite::SqliteResultStore;

/// 单次追加写入的结果统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendSummary {
    /// 写入成功的行数
    pub inserted: usize,
    /// 写入失败的行数（已逐条记录日志）
    pub failed: usize,
}

impl AppendSummary {
    /// 是否全部写入成功
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// 单个URL的聚合指标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlMetrics {
    /// URL
    pub url: String,
    /// 总检测次数
    pub total_checks: u64,
    /// UP 次数
    pub up_count: u64,
    /// UP 百分比（两位小数）
    pub up_percent: f64,
    /// 状态码在 [400, 600) 的次数
    pub error_count: u64,
    /// 错误百分比（两位小数）
    pub error_rate: f64,
}

impl UrlMetrics {
    /// 由计数计算百分比，总数为0时百分比均为0
    pub fn from_counts(url: String, total_checks: u64, up_count: u64, error_count: u64) -> Self {
        Self {
            url,
            total_checks,
            up_count,
            up_percent: percent(up_count, total_checks),
            error_count,
            error_rate: percent(error_count, total_checks),
        }
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = 100.0 * part as f64 / total as f64;
    (raw * 100.0).round() / 100.0
}

/// 结果存储trait
///
/// 每个操作自行获取并释放底层连接，不跨请求持有。
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// 逐行追加写入，单行失败会被记录并继续写入后续行
    async fn append(&self, results: &[CheckResult]) -> Result<AppendSummary, StorageError>;

    /// 按检测时间倒序返回最近 `limit` 条，`url` 为空时跨所有URL
    async fn latest(
        &self,
        url: Option<&str>,
        limit: u32,
    ) -> Result<Vec<CheckResult>, StorageError>;

    /// 某个URL最近 `limit` 条记录，按时间正序（最早的在前）
    async fn history(&self, url: &str, limit: u32) -> Result<Vec<CheckResult>, StorageError> {
        let mut rows = self.latest(Some(url), limit).await?;
        rows.reverse();
        Ok(rows)
    }

    /// 按URL分组的聚合指标；没有任何记录的URL不会出现
    async fn metrics(&self) -> Result<Vec<UrlMetrics>, StorageError>;

    /// 所有出现过的URL（隐式注册表）
    async fn distinct_urls(&self) -> Result<BTreeSet<String>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_percentages() {
        let metrics = UrlMetrics::from_counts("https://a.test".into(), 10, 7, 3);
        assert_eq!(metrics.up_percent, 70.0);
        assert_eq!(metrics.error_rate, 30.0);
    }

    #[test]
    fn test_metrics_rounding_to_two_decimals() {
        let metrics = UrlMetrics::from_counts("https://a.test".into(), 3, 2, 1);
        assert_eq!(metrics.up_percent, 66.67);
        assert_eq!(metrics.error_rate, 33.33);
    }

    #[test]
    fn test_metrics_zero_total_never_divides() {
        let metrics = UrlMetrics::from_counts("https://a.test".into(), 0, 0, 0);
        assert_eq!(metrics.up_percent, 0.0);
        assert_eq!(metrics.error_rate, 0.0);
    }

    #[test]
    fn test_append_summary() {
        assert!(AppendSummary {
            inserted: 3,
            failed: 0
        }
        .is_complete());
        assert!(!AppendSummary {
            inserted: 2,
            failed: 1
        }
        .is_complete());
    }
}
