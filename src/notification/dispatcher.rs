//! 告警分发器
//!
//! 告警能力在启动时根据凭据一次性确定。发送失败或超时只记录日志，
//! 不会影响调用方。

use crate::config::AlertConfig;
use crate::error::NotificationError;
use crate::health::CheckResult;
use crate::notification::sender::{AlertMessage, NotificationSender};
use crate::notification::smtp::SmtpSender;
use crate::notification::template::{AlertContext, AlertTemplate};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

struct ActiveAlerts {
    sender: Arc<dyn NotificationSender>,
    recipient: String,
    template: AlertTemplate,
    timeout: Duration,
}

/// 告警分发器
pub struct AlertDispatcher {
    /// 未配置凭据时为 None
    active: Option<ActiveAlerts>,
}

impl AlertDispatcher {
    /// 创建禁用状态的分发器，notify 不做任何事
    pub fn disabled() -> Self {
        Self { active: None }
    }

    /// 使用指定发送器创建启用状态的分发器
    ///
    /// # 参数
    /// * `sender` - 通知发送器
    /// * `recipient` - 收件人
    /// * `template` - 标题/正文模板
    /// * `timeout` - 单次发送的超时上限
    pub fn new(
        sender: Arc<dyn NotificationSender>,
        recipient: impl Into<String>,
        template: AlertTemplate,
        timeout: Duration,
    ) -> Self {
        Self {
            active: Some(ActiveAlerts {
                sender,
                recipient: recipient.into(),
                template,
                timeout,
            }),
        }
    }

    /// 根据告警配置创建分发器
    ///
    /// 发件人、密码、收件人任一缺失时返回禁用状态的分发器。
    pub fn from_config(config: &AlertConfig) -> Result<Self, NotificationError> {
        let Some(credentials) = config.credentials() else {
            info!("未配置完整的邮件凭据，告警功能已禁用");
            return Ok(Self::disabled());
        };

        let template = AlertTemplate::from_config(config)?;
        let sender = SmtpSender::new(&config.smtp_host, &credentials, config.smtp_timeout())?;

        info!(
            smtp_host = %config.smtp_host,
            recipient = %credentials.recipient,
            "邮件告警已启用"
        );
        Ok(Self::new(
            Arc::new(sender),
            credentials.recipient,
            template,
            config.smtp_timeout(),
        ))
    }

    /// 告警是否启用
    pub fn enabled(&self) -> bool {
        self.active.is_some()
    }

    /// 为一条失败结果发送告警
    ///
    /// 禁用时直接返回；渲染失败、发送失败、超时都只记录日志。
    pub async fn notify(&self, result: &CheckResult) {
        let Some(active) = &self.active else {
            return;
        };

        let context = AlertContext::new(&result.url, result.checked_at, result.status_code);
        let (subject, body) = match active.template.render(&context) {
            Ok(rendered) => rendered,
            Err(e) => {
                error!(url = %result.url, "告警消息渲染失败: {}", e);
                return;
            }
        };

        let message = AlertMessage {
            recipient: active.recipient.clone(),
            subject,
            body,
        };

        match tokio::time::timeout(active.timeout, active.sender.send(&message)).await {
            Ok(Ok(())) => info!(url = %result.url, recipient = %message.recipient, "已发送告警"),
            Ok(Err(e)) => error!(url = %result.url, "发送告警失败: {}", e),
            Err(_) => warn!(
                url = %result.url,
                timeout_secs = active.timeout.as_secs_f64(),
                "发送告警超时"
            ),
        }
    }
}
