//! 健康检测模块
//!
//! 提供HTTP探测、结果分类、批量编排和定时调度功能

pub mod orchestrator;
pub mod prober;
pub mod result;
pub mod scheduler;

// 重新导出主要类型
pub use orchestrator::{BatchTrigger, CheckOrchestrator, PersistenceQueue};
pub use prober::{HttpProber, Prober, DEFAULT_PROBE_TIMEOUT};
pub use result::{CheckResult, CheckStatus, HistoryPoint, ProbeOutcome};
pub use scheduler::{ScheduleStatus, Scheduler, TriggerOutcome};
