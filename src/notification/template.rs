//! 告警消息模板
//!
//! 使用 Handlebars 渲染邮件标题和正文，可用变量为
//! `url`、`checked_at` 和 `status_code`

use crate::config::AlertConfig;
use crate::error::NotificationError;
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;

const SUBJECT: &str = "subject";
const BODY: &str = "body";

/// 模板上下文数据
#[derive(Debug, Clone, Serialize)]
pub struct AlertContext<'a> {
    /// 失败的URL
    pub url: &'a str,
    /// 批次检测时间
    pub checked_at: String,
    /// HTTP状态码，无响应时为空
    pub status_code: Option<u16>,
}

impl<'a> AlertContext<'a> {
    /// 构造上下文，检测时间格式化为 `YYYY-MM-DD HH:MM:SS UTC`
    pub fn new(url: &'a str, checked_at: DateTime<Utc>, status_code: Option<u16>) -> Self {
        Self {
            url,
            checked_at: checked_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            status_code,
        }
    }
}

/// 告警模板，标题和正文在创建时编译
#[derive(Debug)]
pub struct AlertTemplate {
    registry: Handlebars<'static>,
}

impl AlertTemplate {
    /// 编译标题和正文模板
    ///
    /// # 参数
    /// * `subject` - 标题模板
    /// * `body` - 正文模板
    ///
    /// # 返回
    /// * `Result<Self, NotificationError>` - 模板语法错误时返回 TemplateError
    pub fn new(subject: &str, body: &str) -> Result<Self, NotificationError> {
        let mut registry = Handlebars::new();
        // 纯文本邮件，不做 HTML 转义
        registry.register_escape_fn(handlebars::no_escape);

        registry
            .register_template_string(SUBJECT, subject)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))?;
        registry
            .register_template_string(BODY, body)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))?;

        Ok(Self { registry })
    }

    /// 从告警配置创建
    pub fn from_config(config: &AlertConfig) -> Result<Self, NotificationError> {
        Self::new(&config.subject_template, &config.body_template)
    }

    /// 渲染标题和正文
    pub fn render(&self, context: &AlertContext<'_>) -> Result<(String, String), NotificationError> {
        let subject = self
            .registry
            .render(SUBJECT, context)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))?;
        let body = self
            .registry
            .render(BODY, context)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))?;
        Ok((subject, body))
    }
}
