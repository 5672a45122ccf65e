//! 通知模块
//!
//! 提供邮件告警发送、消息模板和告警分发功能

pub mod dispatcher;
pub mod sender;
pub mod smtp;
pub mod template;

// 重新导出主要类型
pub use dispatcher::AlertDispatcher;
pub use sender::{AlertMessage, NoOpSender, NotificationSender};
pub use smtp::SmtpSender;
pub use template::{AlertContext, AlertTemplate};
