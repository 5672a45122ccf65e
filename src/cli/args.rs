//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::logging::LogConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// URL Health Monitor - URL 存活与延迟监控工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "url-health-monitor",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "URL_HEALTH_MONITOR_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// 日志级别
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        help = "日志级别",
        env = "URL_HEALTH_MONITOR_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// 以JSON格式输出日志
    #[arg(long, help = "以JSON格式输出日志")]
    pub json_logs: bool,

    /// 日志文件路径，指定后不再输出到控制台
    #[arg(
        long,
        value_name = "FILE",
        help = "日志文件路径",
        env = "URL_HEALTH_MONITOR_LOG_FILE"
    )]
    pub log_file: Option<PathBuf>,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

impl Args {
    /// 根据命令行参数生成日志配置
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone().into(),
            json_format: self.json_logs,
            file_path: self.log_file.clone(),
            console: self.log_file.is_none(),
            ..Default::default()
        }
    }
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum LogLevel {
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动HTTP服务和定时检测
    Serve {
        /// 绑定地址
        #[arg(long, value_name = "ADDR", help = "绑定地址")]
        bind: Option<String>,

        /// 监听端口
        #[arg(short, long, value_name = "PORT", help = "监听端口")]
        port: Option<u16>,

        /// 检测间隔（秒）
        #[arg(
            short,
            long,
            value_name = "SECONDS",
            help = "检测间隔（秒）",
            env = "URL_HEALTH_MONITOR_INTERVAL"
        )]
        interval: Option<u64>,

        /// 不启动定时检测
        #[arg(long, help = "不启动定时检测")]
        no_schedule: bool,
    },

    /// 立即检测一组URL并输出结果
    Check {
        /// 待检测的URL
        #[arg(value_name = "URL", required = true, help = "待检测的URL")]
        urls: Vec<String>,

        /// 不写入结果存储
        #[arg(long, help = "不写入结果存储")]
        no_persist: bool,
    },

    /// 输出按URL分组的聚合指标
    Metrics,

    /// 输出最近的检测记录
    History {
        /// 只看某个URL
        #[arg(short, long, value_name = "URL", help = "只看某个URL")]
        url: Option<String>,

        /// 返回条数
        #[arg(
            short = 'n',
            long,
            value_name = "COUNT",
            default_value = "50",
            help = "返回条数"
        )]
        limit: u32,
    },

    /// 生成默认配置文件
    Init {
        /// 输出路径
        #[arg(
            short,
            long,
            value_name = "FILE",
            default_value = "config.toml",
            help = "输出路径"
        )]
        output: PathBuf,

        /// 覆盖已存在的文件
        #[arg(short, long, help = "覆盖已存在的文件")]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_overrides() {
        let args = Args::try_parse_from([
            "url-health-monitor",
            "--log-level",
            "debug",
            "serve",
            "--bind",
            "0.0.0.0",
            "--port",
            "9000",
            "--no-schedule",
        ])
        .unwrap();

        assert_eq!(args.log_level, LogLevel::Debug);
        match args.command {
            Commands::Serve {
                bind,
                port,
                interval,
                no_schedule,
            } => {
                assert_eq!(bind.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(9000));
                assert_eq!(interval, None);
                assert!(no_schedule);
            }
            other => panic!("期望 serve 子命令，实际为 {:?}", other),
        }
    }

    #[test]
    fn test_check_requires_urls() {
        assert!(Args::try_parse_from(["url-health-monitor", "check"]).is_err());

        let args =
            Args::try_parse_from(["url-health-monitor", "check", "https://a.test", "https://b.test"])
                .unwrap();
        assert!(matches!(args.command, Commands::Check { ref urls, .. } if urls.len() == 2));
    }

    #[test]
    fn test_history_defaults() {
        let args = Args::try_parse_from(["url-health-monitor", "history"]).unwrap();
        match args.command {
            Commands::History { url, limit } => {
                assert_eq!(url, None);
                assert_eq!(limit, 50);
            }
            other => panic!("期望 history 子命令，实际为 {:?}", other),
        }
    }

    #[test]
    fn test_log_config_from_args() {
        let args =
            Args::try_parse_from(["url-health-monitor", "--json-logs", "-l", "warn", "metrics"])
                .unwrap();
        let log_config = args.log_config();
        assert_eq!(log_config.level, log::LevelFilter::Warn);
        assert!(log_config.json_format);
        assert!(log_config.console);

        let args = Args::try_parse_from([
            "url-health-monitor",
            "--log-file",
            "/tmp/uhm.log",
            "metrics",
        ])
        .unwrap();
        let log_config = args.log_config();
        assert_eq!(log_config.file_path, Some(PathBuf::from("/tmp/uhm.log")));
        assert!(!log_config.console);
    }
}
