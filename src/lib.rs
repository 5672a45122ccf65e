//! URL Health Monitor - URL 可用性与延迟监控服务
//!
//! 这是一个用Rust编写的URL健康监控服务，支持：
//! - 带超时控制的HTTP探测
//! - 检测结果持久化（SQLite）
//! - 聚合可用率/错误率指标
//! - 定时批量检测与按需触发
//! - 服务异常时的邮件告警
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod notification;
pub mod storage;
pub mod web;

// 重新导出主要类型
pub use config::Config;
pub use error::MonitorError;
pub use health::{CheckOrchestrator, CheckResult, CheckStatus, HttpProber, Prober, Scheduler};
pub use storage::{ResultStore, SqliteResultStore};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
