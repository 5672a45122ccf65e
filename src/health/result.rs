//! 检测结果数据结构
//!
//! 定义单次探测的结果类型和状态枚举

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// 探测状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    /// 收到 [200, 400) 范围内的响应
    Up,
    /// 网络失败、超时或状态码不在 [200, 400)
    Down,
}

impl CheckStatus {
    /// 根据HTTP状态码分类
    pub fn from_status_code(status_code: u16) -> Self {
        if (200..400).contains(&status_code) {
            CheckStatus::Up
        } else {
            CheckStatus::Down
        }
    }

    /// 判断状态是否为健康
    pub fn is_up(&self) -> bool {
        matches!(self, CheckStatus::Up)
    }

    /// 存储层使用的文本表示
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "UP",
            CheckStatus::Down => "DOWN",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(CheckStatus::Up),
            "DOWN" => Ok(CheckStatus::Down),
            other => Err(format!("未知的检测状态: {other}")),
        }
    }
}

/// 探测器返回的原始结果，尚未附加批次时间戳
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// 收到了HTTP响应（无论状态码）
    Responded {
        /// HTTP状态码
        status_code: u16,
        /// 从发出请求到收到响应头的耗时
        elapsed: Duration,
    },
    /// 没有收到响应：连接失败、DNS失败、超时、TLS错误等
    Unreachable {
        /// 便于日志排查的失败原因
        reason: String,
    },
}

impl ProbeOutcome {
    /// 按状态码范围分类
    pub fn status(&self) -> CheckStatus {
        match self {
            ProbeOutcome::Responded { status_code, .. } => {
                CheckStatus::from_status_code(*status_code)
            }
            ProbeOutcome::Unreachable { .. } => CheckStatus::Down,
        }
    }
}

/// 单次探测的检测结果
///
/// `response_time` 与 `status_code` 总是同时存在或同时缺失，
/// 由 [`CheckResult::from_outcome`] 保证。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// 被探测的URL
    pub url: String,
    /// 探测状态
    pub status: CheckStatus,
    /// 响应时间（秒，序列化为浮点数）
    #[serde(with = "optional_seconds")]
    pub response_time: Option<Duration>,
    /// 批次检测时间
    pub checked_at: DateTime<Utc>,
    /// HTTP状态码
    pub status_code: Option<u16>,
}

impl CheckResult {
    /// 由探测结果和批次时间戳构建检测结果
    pub fn from_outcome(url: String, outcome: ProbeOutcome, checked_at: DateTime<Utc>) -> Self {
        let status = outcome.status();
        let (response_time, status_code) = match outcome {
            ProbeOutcome::Responded {
                status_code,
                elapsed,
            } => (Some(elapsed), Some(status_code)),
            ProbeOutcome::Unreachable { .. } => (None, None),
        };

        Self {
            url,
            status,
            response_time,
            checked_at,
            status_code,
        }
    }

    /// 是否健康
    pub fn is_up(&self) -> bool {
        self.status.is_up()
    }
}

/// 单个URL历史曲线上的一个点（不含url字段）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// 探测状态
    pub status: CheckStatus,
    /// 响应时间（秒）
    #[serde(with = "optional_seconds")]
    pub response_time: Option<Duration>,
    /// 检测时间
    pub checked_at: DateTime<Utc>,
    /// HTTP状态码
    pub status_code: Option<u16>,
}

impl From<CheckResult> for HistoryPoint {
    fn from(result: CheckResult) -> Self {
        Self {
            status: result.status,
            response_time: result.response_time,
            checked_at: result.checked_at,
            status_code: result.status_code,
        }
    }
}

/// 可选 Duration 的序列化模块（秒，浮点数）
mod optional_seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs_f64()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<f64>::deserialize(deserializer)?;
        secs.map(|s| Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_status_classification_boundaries() {
        assert_eq!(CheckStatus::from_status_code(199), CheckStatus::Down);
        assert_eq!(CheckStatus::from_status_code(200), CheckStatus::Up);
        assert_eq!(CheckStatus::from_status_code(301), CheckStatus::Up);
        assert_eq!(CheckStatus::from_status_code(399), CheckStatus::Up);
        assert_eq!(CheckStatus::from_status_code(400), CheckStatus::Down);
        assert_eq!(CheckStatus::from_status_code(503), CheckStatus::Down);
    }

    #[test]
    fn test_status_text_round_trip() {
        assert_eq!("UP".parse::<CheckStatus>().unwrap(), CheckStatus::Up);
        assert_eq!("DOWN".parse::<CheckStatus>().unwrap(), CheckStatus::Down);
        assert!("up".parse::<CheckStatus>().is_err());
        assert_eq!(CheckStatus::Down.to_string(), "DOWN");
    }

    #[test]
    fn test_responded_outcome_keeps_latency_even_when_down() {
        let outcome = ProbeOutcome::Responded {
            status_code: 503,
            elapsed: Duration::from_millis(120),
        };
        let result = CheckResult::from_outcome("https://a.test".into(), outcome, fixed_time());

        assert_eq!(result.status, CheckStatus::Down);
        assert_eq!(result.status_code, Some(503));
        assert_eq!(result.response_time, Some(Duration::from_millis(120)));
    }

    #[test]
    fn test_unreachable_outcome_has_neither_code_nor_latency() {
        let outcome = ProbeOutcome::Unreachable {
            reason: "Connection refused".into(),
        };
        let result = CheckResult::from_outcome("https://a.test".into(), outcome, fixed_time());

        assert_eq!(result.status, CheckStatus::Down);
        assert!(result.status_code.is_none());
        assert!(result.response_time.is_none());
    }

    #[test]
    fn test_json_shape() {
        let result = CheckResult::from_outcome(
            "https://a.test".into(),
            ProbeOutcome::Responded {
                status_code: 200,
                elapsed: Duration::from_millis(250),
            },
            fixed_time(),
        );

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "UP");
        assert_eq!(value["status_code"], 200);
        assert_eq!(value["response_time"], 0.25);
        assert_eq!(value["checked_at"], "2024-05-01T12:00:00Z");

        let down = CheckResult::from_outcome(
            "https://b.test".into(),
            ProbeOutcome::Unreachable {
                reason: "timeout".into(),
            },
            fixed_time(),
        );
        let value = serde_json::to_value(&down).unwrap();
        assert!(value["response_time"].is_null());
        assert!(value["status_code"].is_null());
    }

    #[test]
    fn test_history_point_projection() {
        let result = CheckResult::from_outcome(
            "https://a.test".into(),
            ProbeOutcome::Responded {
                status_code: 404,
                elapsed: Duration::from_millis(10),
            },
            fixed_time(),
        );
        let point = HistoryPoint::from(result);
        let value = serde_json::to_value(&point).unwrap();

        assert!(value.get("url").is_none());
        assert_eq!(value["status"], "DOWN");
        assert_eq!(value["status_code"], 404);
    }
}
