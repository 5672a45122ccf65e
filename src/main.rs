//! URL Health Monitor 主程序入口

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};
use url_health_monitor::cli::{self, Args};
use url_health_monitor::logging::LoggingSystem;

#[tokio::main]
async fn main() -> Result<()> {
    // .env 中的告警凭据在解析参数前载入，clap 的 env 回退也能读到
    let dotenv = dotenvy::dotenv();

    let args = Args::parse();

    let _logging_system =
        LoggingSystem::setup_logging(args.log_config()).context("初始化日志系统失败")?;

    match dotenv {
        Ok(path) => debug!("已加载环境变量文件: {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => error!("读取 .env 文件失败: {}", e),
    }

    info!("{} v{} 启动", url_health_monitor::APP_NAME, url_health_monitor::VERSION);

    if let Err(e) = cli::dispatch(&args).await {
        error!("命令执行失败: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
