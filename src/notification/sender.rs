//! 通知发送器模块
//!
//! 定义通知发送的trait和基础实现

use crate::error::NotificationError;
use async_trait::async_trait;

/// 待发送的告警消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    /// 收件人
    pub recipient: String,
    /// 标题
    pub subject: String,
    /// 正文
    pub body: String,
}

/// 通知发送器trait
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 发送一条告警消息
    ///
    /// # 参数
    /// * `message` - 已渲染的告警消息
    ///
    /// # 返回
    /// * `Result<(), NotificationError>` - 发送结果
    async fn send(&self, message: &AlertMessage) -> Result<(), NotificationError>;
}

/// 空的通知发送器实现（用于测试或禁用通知）
pub struct NoOpSender;

#[async_trait]
impl NotificationSender for NoOpSender {
    async fn send(&self, _message: &AlertMessage) -> Result<(), NotificationError> {
        Ok(())
    }
}
