//! 批量检测编排
//!
//! 为一批URL分配同一个检测时间戳，在并发上限内并行探测，
//! 并把即席批次的结果交给后台写入队列持久化

use crate::health::prober::Prober;
use crate::health::result::CheckResult;
use crate::storage::ResultStore;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 批次触发来源，仅用于日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchTrigger {
    /// 外部请求直接提交的URL列表
    AdHoc,
    /// 定时器触发
    Scheduled,
    /// 手动触发的调度批次
    OnDemand,
}

impl std::fmt::Display for BatchTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchTrigger::AdHoc => write!(f, "ad-hoc"),
            BatchTrigger::Scheduled => write!(f, "scheduled"),
            BatchTrigger::OnDemand => write!(f, "on-demand"),
        }
    }
}

/// 待写入的一个批次
#[derive(Debug)]
struct PersistJob {
    batch_id: Uuid,
    results: Vec<CheckResult>,
}

/// 后台写入队列
///
/// 请求方拿到结果后立即返回，写入在后台任务中完成；
/// 写入失败只记录日志。所有发送端释放后，后台任务处理完剩余批次再退出。
#[derive(Debug, Clone)]
pub struct PersistenceQueue {
    sender: mpsc::UnboundedSender<PersistJob>,
}

impl PersistenceQueue {
    /// 启动后台写入任务
    ///
    /// # 返回
    /// * `(Self, JoinHandle<()>)` - 队列句柄和后台任务句柄
    pub fn spawn(store: Arc<dyn ResultStore>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<PersistJob>();

        let worker = tokio::spawn(async move {
            debug!("结果写入队列已启动");
            while let Some(job) = receiver.recv().await {
                match store.append(&job.results).await {
                    Ok(summary) if summary.is_complete() => {
                        debug!(batch_id = %job.batch_id, inserted = summary.inserted, "批次结果已写入");
                    }
                    Ok(summary) => {
                        warn!(
                            batch_id = %job.batch_id,
                            inserted = summary.inserted,
                            failed = summary.failed,
                            "批次结果部分写入失败"
                        );
                    }
                    Err(e) => {
                        error!(batch_id = %job.batch_id, count = job.results.len(), "批次结果写入失败: {}", e);
                    }
                }
            }
            debug!("结果写入队列已退出");
        });

        (Self { sender }, worker)
    }

    /// 提交一个批次，后台任务已退出时返回 false
    fn enqueue(&self, batch_id: Uuid, results: Vec<CheckResult>) -> bool {
        match self.sender.send(PersistJob { batch_id, results }) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    batch_id = %batch_id,
                    count = e.0.results.len(),
                    "结果写入队列已关闭，批次结果被丢弃"
                );
                false
            }
        }
    }
}

/// 批量检测编排器
pub struct CheckOrchestrator {
    /// 探测器
    prober: Arc<dyn Prober>,
    /// 即席批次的写入队列
    persistence: PersistenceQueue,
    /// 单批次并发上限
    max_concurrent: usize,
}

impl CheckOrchestrator {
    /// 创建新的编排器
    ///
    /// # 参数
    /// * `prober` - 探测器
    /// * `persistence` - 即席批次写入队列
    /// * `max_concurrent` - 单批次内同时进行的探测数上限（最小为1）
    pub fn new(
        prober: Arc<dyn Prober>,
        persistence: PersistenceQueue,
        max_concurrent: usize,
    ) -> Self {
        Self {
            prober,
            persistence,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 执行一个批次并返回全部结果（顺序不保证），不做持久化
    ///
    /// 检测时间戳在探测开始前取一次，整批共享。空列表直接返回空结果。
    pub async fn run_batch(&self, urls: &[String], trigger: BatchTrigger) -> Vec<CheckResult> {
        self.run_batch_with_id(Uuid::new_v4(), urls, trigger).await
    }

    async fn run_batch_with_id(
        &self,
        batch_id: Uuid,
        urls: &[String],
        trigger: BatchTrigger,
    ) -> Vec<CheckResult> {
        if urls.is_empty() {
            debug!(%batch_id, %trigger, "URL列表为空，跳过批次");
            return Vec::new();
        }

        let checked_at = Utc::now();
        info!(%batch_id, %trigger, url_count = urls.len(), "开始批量检测");

        let results: Vec<CheckResult> = stream::iter(urls.iter().cloned())
            .map(|url| {
                let prober = Arc::clone(&self.prober);
                async move {
                    let outcome = prober.probe(&url).await;
                    CheckResult::from_outcome(url, outcome, checked_at)
                }
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let down_count = results.iter().filter(|r| !r.is_up()).count();
        for result in results.iter().filter(|r| !r.is_up()) {
            warn!(%batch_id, url = %result.url, status_code = ?result.status_code, "服务检测失败");
        }
        info!(
            %batch_id,
            %trigger,
            up = results.len() - down_count,
            down = down_count,
            "批量检测完成"
        );

        results
    }

    /// 即席检测：立即返回结果，持久化交给后台队列
    pub async fn check_urls(&self, urls: &[String]) -> Vec<CheckResult> {
        let batch_id = Uuid::new_v4();
        let results = self
            .run_batch_with_id(batch_id, urls, BatchTrigger::AdHoc)
            .await;

        if !results.is_empty() {
            self.persistence.enqueue(batch_id, results.clone());
        }

        results
    }
}
