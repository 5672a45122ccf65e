//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// 发件人账号环境变量
pub const ENV_EMAIL_USER: &str = "EMAIL_USER";
/// 发件人密码环境变量
pub const ENV_EMAIL_PASS: &str = "EMAIL_PASS";
/// 收件人环境变量
pub const ENV_ALERT_RECIPIENT: &str = "ALERT_RECIPIENT";

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// HTTP 服务配置
    pub server: ServerConfig,
    /// 探测配置
    pub checks: CheckConfig,
    /// 定时调度配置
    pub schedule: ScheduleConfig,
    /// 存储配置
    pub storage: StorageConfig,
    /// 邮件告警配置
    pub alerts: AlertConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// 绑定地址
    pub bind_address: String,
    /// 监听端口
    pub port: u16,
    /// 允许跨域访问的前端地址
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl ServerConfig {
    /// 解析监听地址
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| format!("无效的监听地址 {}:{}: {}", self.bind_address, self.port, e))
    }
}

/// 探测配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckConfig {
    /// 请求超时时间（秒）
    pub request_timeout_seconds: u64,
    /// 单个批次内的最大并发探测数
    pub max_concurrent_checks: usize,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: 5,
            max_concurrent_checks: 16,
        }
    }
}

impl CheckConfig {
    /// 探测超时
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// 定时调度配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    /// 是否启用定时检测
    pub enabled: bool,
    /// 检测间隔（秒）
    pub interval_seconds: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 300,
        }
    }
}

impl ScheduleConfig {
    /// 调度间隔
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite 连接串
    pub database_url: String,
    /// 连接池大小
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://health_monitor.db".to_string(),
            max_connections: 5,
        }
    }
}

/// 邮件告警配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertConfig {
    /// 发件人账号
    pub email_user: Option<String>,
    /// 发件人密码
    pub email_pass: Option<String>,
    /// 收件人
    pub alert_recipient: Option<String>,
    /// SMTP 中继服务器
    pub smtp_host: String,
    /// 单封邮件发送超时（秒）
    pub smtp_timeout_seconds: u64,
    /// 邮件标题模板
    pub subject_template: String,
    /// 邮件正文模板
    pub body_template: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            email_user: None,
            email_pass: None,
            alert_recipient: None,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_timeout_seconds: 10,
            subject_template: "ALERT: {{url}} is DOWN".to_string(),
            body_template: "{{url}} is DOWN as of {{checked_at}}".to_string(),
        }
    }
}

/// 三项告警凭据齐全时才存在
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertCredentials {
    /// 发件人账号
    pub sender: String,
    /// 发件人密码
    pub password: String,
    /// 收件人
    pub recipient: String,
}

impl AlertConfig {
    /// 用环境变量补齐配置文件中缺失的凭据
    ///
    /// # 参数
    /// * `lookup` - 环境变量读取函数，便于测试替换
    pub fn fill_from_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn fill(slot: &mut Option<String>, value: Option<String>) {
            if non_empty(slot.as_deref()).is_none() {
                *slot = value;
            }
        }

        fill(&mut self.email_user, lookup(ENV_EMAIL_USER));
        fill(&mut self.email_pass, lookup(ENV_EMAIL_PASS));
        fill(&mut self.alert_recipient, lookup(ENV_ALERT_RECIPIENT));
    }

    /// 获取告警凭据，任一项缺失或为空时返回 None
    pub fn credentials(&self) -> Option<AlertCredentials> {
        Some(AlertCredentials {
            sender: non_empty(self.email_user.as_deref())?.to_string(),
            password: non_empty(self.email_pass.as_deref())?.to_string(),
            recipient: non_empty(self.alert_recipient.as_deref())?.to_string(),
        })
    }

    /// 发送超时
    pub fn smtp_timeout(&self) -> Duration {
        Duration::from_secs(self.smtp_timeout_seconds)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    if config.server.bind_address.trim().is_empty() {
        return Err("HTTP服务绑定地址不能为空".to_string());
    }

    if config.server.port == 0 {
        return Err("HTTP服务端口不能为0".to_string());
    }

    config.server.socket_addr()?;

    if config.checks.request_timeout_seconds == 0 {
        return Err("请求超时时间不能为0".to_string());
    }

    if config.checks.max_concurrent_checks == 0 {
        return Err("最大并发检测数不能为0".to_string());
    }

    if config.schedule.interval_seconds == 0 {
        return Err("检测间隔不能为0".to_string());
    }

    if config.storage.database_url.trim().is_empty() {
        return Err("数据库连接串不能为空".to_string());
    }

    if config.storage.max_connections == 0 {
        return Err("数据库连接池大小不能为0".to_string());
    }

    if config.alerts.smtp_timeout_seconds == 0 {
        return Err("邮件发送超时时间不能为0".to_string());
    }

    for (name, template) in [
        ("subject_template", &config.alerts.subject_template),
        ("body_template", &config.alerts.body_template),
    ] {
        handlebars::Template::compile(template)
            .map_err(|e| format!("告警模板 {name} 无效: {e}"))?;
    }

    Ok(())
}
