//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands};
use crate::config::{load_effective_config, validate_config, Config};
use crate::error::{ConfigError, MonitorError, Result};
use crate::health::{CheckOrchestrator, HttpProber, PersistenceQueue, Scheduler};
use crate::notification::AlertDispatcher;
use crate::storage::{ResultStore, SqliteResultStore};
use crate::web::{self, AppState};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 关闭时等待写入队列清空的上限
const PERSISTENCE_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// `init` 命令写出的配置模板
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# URL Health Monitor 配置文件
# 所有字段都有默认值，可以只保留需要修改的部分。
# 字符串中的 ${VAR} 会被替换为环境变量的值。

[server]
bind_address = "127.0.0.1"
port = 8000
# 允许跨域访问的前端地址，"*" 表示任意来源
cors_origins = ["http://localhost:3000", "http://127.0.0.1:3000"]

[checks]
# 单次探测超时（秒），超时记为 DOWN
request_timeout_seconds = 5
# 单个批次内同时进行的探测数上限
max_concurrent_checks = 16

[schedule]
enabled = true
# 对已登记的URL执行定时检测的间隔（秒）
interval_seconds = 300

[storage]
database_url = "sqlite://health_monitor.db"
max_connections = 5

[alerts]
# 三项凭据齐全时才会发送告警邮件；
# 未在此处配置的项会从 EMAIL_USER / EMAIL_PASS / ALERT_RECIPIENT 环境变量读取
# email_user = "monitor@example.com"
# email_pass = "${SMTP_APP_PASSWORD}"
# alert_recipient = "ops@example.com"
smtp_host = "smtp.gmail.com"
smtp_timeout_seconds = 10
subject_template = "ALERT: {{url}} is DOWN"
body_template = "{{url}} is DOWN as of {{checked_at}}"
"#;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 探测与写入组件
struct CheckServices {
    store: Arc<SqliteResultStore>,
    orchestrator: Arc<CheckOrchestrator>,
    persistence_worker: JoinHandle<()>,
}

impl CheckServices {
    /// 打开存储并启动写入队列
    async fn start(config: &Config) -> Result<Self> {
        let store = Arc::new(SqliteResultStore::connect(&config.storage).await?);
        let (queue, persistence_worker) = PersistenceQueue::spawn(store.clone());
        let prober = Arc::new(HttpProber::new(config.checks.timeout())?);
        let orchestrator = Arc::new(CheckOrchestrator::new(
            prober,
            queue,
            config.checks.max_concurrent_checks,
        ));

        Ok(Self {
            store,
            orchestrator,
            persistence_worker,
        })
    }

    /// 等待写入队列清空后关闭存储
    ///
    /// 调用前其余持有编排器的任务都应已结束。
    async fn shutdown(self) {
        let Self {
            store,
            orchestrator,
            persistence_worker,
        } = self;
        drop(orchestrator);

        match tokio::time::timeout(PERSISTENCE_DRAIN_TIMEOUT, persistence_worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("结果写入任务异常退出: {}", e),
            Err(_) => warn!(
                "等待结果写入超时（{}秒），未写入的结果被丢弃",
                PERSISTENCE_DRAIN_TIMEOUT.as_secs()
            ),
        }

        store.close().await;
    }
}

async fn load_config(args: &Args) -> Result<Config> {
    load_effective_config(args.config.as_deref()).await
}

/// 启动服务命令
pub struct ServeCommand;

#[async_trait]
impl Command for ServeCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Serve {
            bind,
            port,
            interval,
            no_schedule,
        } = &args.command
        {
            let mut config = load_config(args).await?;
            apply_serve_overrides(&mut config, bind.as_deref(), *port, *interval, *no_schedule)?;
            self.run(config).await
        } else {
            Ok(())
        }
    }
}

/// 把命令行参数覆盖到配置上并重新校验
fn apply_serve_overrides(
    config: &mut Config,
    bind: Option<&str>,
    port: Option<u16>,
    interval: Option<u64>,
    no_schedule: bool,
) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind_address = bind.to_string();
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(interval) = interval {
        config.schedule.interval_seconds = interval;
    }
    if no_schedule {
        config.schedule.enabled = false;
    }

    validate_config(config).map_err(ConfigError::ValidationError)?;
    Ok(())
}

impl ServeCommand {
    async fn run(&self, config: Config) -> Result<()> {
        let addr = config
            .server
            .socket_addr()
            .map_err(ConfigError::ValidationError)?;

        let services = CheckServices::start(&config).await?;
        let dispatcher = Arc::new(AlertDispatcher::from_config(&config.alerts)?);
        let scheduler = Scheduler::new(
            services.orchestrator.clone(),
            services.store.clone(),
            dispatcher,
            config.schedule.interval(),
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let scheduler_handle = if config.schedule.enabled {
            Some(scheduler.start(shutdown_tx.subscribe()))
        } else {
            info!("定时检测已禁用");
            None
        };

        let store: Arc<dyn ResultStore> = services.store.clone();
        let state = AppState::new(services.orchestrator.clone(), store, scheduler);
        let router = web::build_router(state, &config.server.cors_origins);
        let mut server = tokio::spawn(web::serve(router, addr, shutdown_tx.subscribe()));

        let server_result = tokio::select! {
            result = &mut server => Some(result),
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("监听 Ctrl-C 失败: {}", e);
                }
                info!("收到退出信号，开始关闭...");
                None
            }
        };

        // 接收端可能已全部退出
        let _ = shutdown_tx.send(());

        let server_result = match server_result {
            Some(result) => result,
            None => server.await,
        };

        if let Some(handle) = scheduler_handle {
            if let Err(e) = handle.await {
                warn!("调度任务异常退出: {}", e);
            }
        }

        services.shutdown().await;
        info!("服务已停止");

        server_result.map_err(|e| MonitorError::Other(e.into()))?
    }
}

/// 即席检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { urls, no_persist } = &args.command {
            let config = load_config(args).await?;
            let services = CheckServices::start(&config).await?;

            let results = if *no_persist {
                services
                    .orchestrator
                    .run_batch(urls, crate::health::BatchTrigger::AdHoc)
                    .await
            } else {
                services.orchestrator.check_urls(urls).await
            };

            services.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Ok(())
    }
}

/// 聚合指标命令
pub struct MetricsCommand;

#[async_trait]
impl Command for MetricsCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let config = load_config(args).await?;
        let store = SqliteResultStore::connect(&config.storage).await?;
        let metrics = store.metrics().await;
        store.close().await;

        println!("{}", serde_json::to_string_pretty(&metrics?)?);
        Ok(())
    }
}

/// 历史记录命令
pub struct HistoryCommand;

#[async_trait]
impl Command for HistoryCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::History { url, limit } = &args.command {
            let config = load_config(args).await?;
            let store = SqliteResultStore::connect(&config.storage).await?;
            let rows = store.latest(url.as_deref(), *limit).await;
            store.close().await;

            println!("{}", serde_json::to_string_pretty(&rows?)?);
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { output, force } = &args.command {
            self.create_config_file(output, *force).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 创建配置文件，已存在且未指定 force 时不覆盖
    async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(config_path, DEFAULT_CONFIG_TEMPLATE).await?;

        println!("配置文件已创建: {}", config_path.display());
        Ok(())
    }
}

/// 按子命令分发
pub async fn dispatch(args: &Args) -> Result<()> {
    match &args.command {
        Commands::Serve { .. } => ServeCommand.execute(args).await,
        Commands::Check { .. } => CheckCommand.execute(args).await,
        Commands::Metrics => MetricsCommand.execute(args).await,
        Commands::History { .. } => HistoryCommand.execute(args).await,
        Commands::Init { .. } => InitCommand.execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigLoader, TomlConfigLoader};

    #[tokio::test]
    async fn test_default_template_matches_builtin_defaults() {
        let loader = TomlConfigLoader::new(false);
        let config = loader
            .load_from_string(DEFAULT_CONFIG_TEMPLATE)
            .await
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[tokio::test]
    async fn test_init_respects_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        InitCommand.create_config_file(&path, false).await.unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            DEFAULT_CONFIG_TEMPLATE
        );

        tokio::fs::write(&path, "# edited").await.unwrap();
        InitCommand.create_config_file(&path, false).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "# edited");

        InitCommand.create_config_file(&path, true).await.unwrap();
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            DEFAULT_CONFIG_TEMPLATE
        );
    }

    #[test]
    fn test_serve_overrides_are_validated() {
        let mut config = Config::default();
        apply_serve_overrides(&mut config, Some("0.0.0.0"), Some(9000), Some(60), true).unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.schedule.interval_seconds, 60);
        assert!(!config.schedule.enabled);

        let mut config = Config::default();
        let result = apply_serve_overrides(&mut config, None, None, Some(0), false);
        assert!(matches!(
            result,
            Err(MonitorError::Config(ConfigError::ValidationError(_)))
        ));
    }

    #[tokio::test]
    async fn test_check_services_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.database_url = format!("sqlite://{}", dir.path().join("cli.db").display());

        let services = CheckServices::start(&config).await.unwrap();
        let results = services
            .orchestrator
            .check_urls(&["http://127.0.0.1:1/".to_string()])
            .await;
        assert_eq!(results.len(), 1);
        services.shutdown().await;

        let store = SqliteResultStore::connect(&config.storage).await.unwrap();
        let rows = store.latest(None, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].is_up());
        store.close().await;
    }
}
