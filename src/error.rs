//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// URL Health Monitor 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum MonitorError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 存储相关错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    /// 通知相关错误
    #[error("通知错误: {0}")]
    Notification(#[from] NotificationError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// 无法打开数据库
    #[error("数据库连接失败: {0}")]
    Connect(String),

    /// 查询或写入失败
    #[error("数据库操作失败: {0}")]
    Query(#[from] sqlx::Error),

    /// 表结构初始化/迁移失败
    #[error("表结构迁移失败: {0}")]
    Migration(String),
}

/// 通知错误类型
#[derive(Error, Debug)]
pub enum NotificationError {
    /// 发送失败
    #[error("通知发送失败: {0}")]
    SendError(String),

    /// 模板渲染错误
    #[error("模板渲染失败: {0}")]
    TemplateError(String),

    /// 配置错误
    #[error("通知配置错误: {0}")]
    ConfigError(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, MonitorError>;
