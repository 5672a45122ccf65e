//! 定时检测调度器
//!
//! 按固定间隔对已登记的URL（存储中出现过的全部URL）执行批量检测，
//! 支持手动触发。同一时刻最多只有一个调度批次在运行，
//! 运行中收到的新触发会被直接丢弃。

use crate::health::orchestrator::{BatchTrigger, CheckOrchestrator};
use crate::health::result::CheckResult;
use crate::notification::AlertDispatcher;
use crate::storage::ResultStore;
use chrono::{DateTime, TimeDelta, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 调度状态，仅存在于内存中
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ScheduleState {
    /// 最近一次完成的调度批次的检测时间
    last_run: Option<DateTime<Utc>>,
    /// 下一次定时触发时间
    next_run: Option<DateTime<Utc>>,
}

/// 调度器状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleStatus {
    /// 最近一次完成的调度批次的检测时间
    pub last_run: Option<DateTime<Utc>>,
    /// 下一次定时触发时间
    pub next_run: Option<DateTime<Utc>>,
    /// 邮件告警是否启用
    pub email_alerts: bool,
}

/// 一次触发的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// 批次执行完毕
    Completed {
        /// 批次检测时间，同时写入 last_run
        checked_at: DateTime<Utc>,
        /// 检测的URL数
        checked: usize,
        /// DOWN 的URL数
        down: usize,
    },
    /// 没有登记的URL，未执行任何检测
    NoUrls,
    /// 已有调度批次在运行，本次触发被丢弃
    AlreadyRunning,
    /// 读取URL登记表失败
    RegistryUnavailable,
}

/// 运行标志的持有者，释放时（包括 panic 展开）清除标志
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct SchedulerInner {
    orchestrator: Arc<CheckOrchestrator>,
    store: Arc<dyn ResultStore>,
    dispatcher: Arc<AlertDispatcher>,
    interval: Duration,
    state: RwLock<ScheduleState>,
    running: AtomicBool,
}

/// 定时检测调度器
///
/// 克隆开销很小，所有克隆共享同一份状态。
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// 创建新的调度器
    ///
    /// # 参数
    /// * `orchestrator` - 批量检测编排器
    /// * `store` - 结果存储，同时提供URL登记表
    /// * `dispatcher` - 告警分发器
    /// * `interval` - 定时间隔
    pub fn new(
        orchestrator: Arc<CheckOrchestrator>,
        store: Arc<dyn ResultStore>,
        dispatcher: Arc<AlertDispatcher>,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                orchestrator,
                store,
                dispatcher,
                interval,
                state: RwLock::new(ScheduleState::default()),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// 调度间隔
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// 当前是否有调度批次在运行
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// 获取状态快照
    pub async fn status(&self) -> ScheduleStatus {
        let state = *self.inner.state.read().await;
        ScheduleStatus {
            last_run: state.last_run,
            next_run: state.next_run,
            email_alerts: self.inner.dispatcher.enabled(),
        }
    }

    /// 执行一次调度批次并等待其完成
    ///
    /// 已有批次在运行时立即返回 `AlreadyRunning`。
    /// 流程：读取登记表，执行检测，写入结果，为每个 DOWN 结果并发发送告警，最后更新 last_run。
    pub async fn trigger(&self, source: BatchTrigger) -> TriggerOutcome {
        let Some(_guard) = RunGuard::acquire(&self.inner.running) else {
            info!(%source, "已有调度批次在运行，忽略本次触发");
            return TriggerOutcome::AlreadyRunning;
        };

        let urls: Vec<String> = match self.inner.store.distinct_urls().await {
            Ok(urls) => urls.into_iter().collect(),
            Err(e) => {
                error!(%source, "读取URL登记表失败: {}", e);
                return TriggerOutcome::RegistryUnavailable;
            }
        };

        if urls.is_empty() {
            info!(%source, "没有已登记的URL，跳过本次调度");
            return TriggerOutcome::NoUrls;
        }

        let results = self.inner.orchestrator.run_batch(&urls, source).await;
        let Some(checked_at) = results.first().map(|r| r.checked_at) else {
            return TriggerOutcome::NoUrls;
        };

        match self.inner.store.append(&results).await {
            Ok(summary) if summary.is_complete() => {
                debug!(inserted = summary.inserted, "调度批次结果已写入");
            }
            Ok(summary) => {
                warn!(
                    inserted = summary.inserted,
                    failed = summary.failed,
                    "调度批次结果部分写入失败"
                );
            }
            Err(e) => error!("调度批次结果写入失败: {}", e),
        }

        // 告警并发发送，整批最多等待一个发送超时
        let down: Vec<&CheckResult> = results.iter().filter(|r| !r.is_up()).collect();
        join_all(down.iter().map(|result| self.inner.dispatcher.notify(result))).await;

        self.inner.state.write().await.last_run = Some(checked_at);

        TriggerOutcome::Completed {
            checked_at,
            checked: results.len(),
            down: down.len(),
        }
    }

    /// 手动触发一次调度批次，立即返回
    ///
    /// 返回的句柄可用于等待结果；触发仍受互斥规则约束。
    pub fn run_now(&self) -> JoinHandle<TriggerOutcome> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.trigger(BatchTrigger::OnDemand).await })
    }

    /// 启动定时循环
    ///
    /// 第一次触发在一个间隔之后。错过的触发会被跳过而不是补跑。
    /// 收到关闭信号后退出，正在运行的批次会先执行完。
    ///
    /// # 参数
    /// * `shutdown_rx` - 关闭信号接收器
    pub fn start(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let scheduler = self.clone();
        let interval = self.inner.interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            scheduler.set_next_run(Utc::now(), interval).await;

            info!(interval_secs = interval.as_secs(), "定时检测已启动");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        scheduler.set_next_run(Utc::now(), interval).await;

                        let run = scheduler.clone();
                        let handle =
                            tokio::spawn(async move { run.trigger(BatchTrigger::Scheduled).await });
                        match handle.await {
                            Ok(outcome) => debug!(?outcome, "定时检测完成"),
                            Err(e) => error!("定时检测任务异常退出: {}", e),
                        }

                        scheduler.advance_next_run(interval).await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("调度器收到关闭信号，停止定时检测");
                        break;
                    }
                }
            }

            scheduler.inner.state.write().await.next_run = None;
        })
    }

    async fn set_next_run(&self, from: DateTime<Utc>, interval: Duration) {
        let next = TimeDelta::from_std(interval)
            .ok()
            .and_then(|delta| from.checked_add_signed(delta));
        self.inner.state.write().await.next_run = next;
    }

    /// 批次超过一个间隔时，被跳过的触发点不再是下一次运行时间
    async fn advance_next_run(&self, interval: Duration) {
        let Ok(delta) = TimeDelta::from_std(interval) else {
            return;
        };
        if delta <= TimeDelta::zero() {
            return;
        }

        let now = Utc::now();
        let mut state = self.inner.state.write().await;
        while let Some(next) = state.next_run {
            if next > now {
                break;
            }
            state.next_run = next.checked_add_signed(delta);
        }
    }
}
