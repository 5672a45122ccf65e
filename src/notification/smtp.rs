//! SMTP 邮件发送器
//!
//! 通过 STARTTLS/TLS 中继（默认 smtp.gmail.com）用发件人账号登录后发送纯文本邮件

use crate::config::AlertCredentials;
use crate::error::NotificationError;
use crate::notification::sender::{AlertMessage, NotificationSender};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::debug;

/// SMTP 邮件发送器
pub struct SmtpSender {
    /// 连接池化的异步传输
    transport: AsyncSmtpTransport<Tokio1Executor>,
    /// 发件人
    from: Mailbox,
}

impl SmtpSender {
    /// 创建新的 SMTP 发送器
    ///
    /// # 参数
    /// * `host` - SMTP 中继主机
    /// * `credentials` - 发件人账号、密码
    /// * `timeout` - 单次 SMTP 会话超时
    ///
    /// # 返回
    /// * `Result<Self, NotificationError>` - 发件人地址或中继主机无效时返回 ConfigError
    pub fn new(
        host: &str,
        credentials: &AlertCredentials,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let from: Mailbox = credentials.sender.parse().map_err(|e| {
            NotificationError::ConfigError(format!("发件人地址无效 {}: {}", credentials.sender, e))
        })?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| NotificationError::ConfigError(format!("SMTP中继 {} 无效: {}", host, e)))?
            .credentials(Credentials::new(
                credentials.sender.clone(),
                credentials.password.clone(),
            ))
            .timeout(Some(timeout))
            .build();

        Ok(Self { transport, from })
    }

    fn build_message(&self, message: &AlertMessage) -> Result<Message, NotificationError> {
        let to: Mailbox = message.recipient.parse().map_err(|e| {
            NotificationError::ConfigError(format!("收件人地址无效 {}: {}", message.recipient, e))
        })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| NotificationError::SendError(format!("构建邮件失败: {}", e)))
    }
}

#[async_trait]
impl NotificationSender for SmtpSender {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotificationError> {
        let email = self.build_message(message)?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotificationError::SendError(format!("SMTP发送失败: {}", e)))?;

        debug!(recipient = %message.recipient, subject = %message.subject, "告警邮件已发送");
        Ok(())
    }
}
