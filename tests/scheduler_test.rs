//! 定时检测流程测试
//!
//! 真实 SQLite 存储 + mockito 服务端，验证登记表、写入、告警和互斥

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use url_health_monitor::config::{AlertConfig, StorageConfig};
use url_health_monitor::error::NotificationError;
use url_health_monitor::health::{
    BatchTrigger, CheckOrchestrator, HttpProber, PersistenceQueue, ProbeOutcome, Prober,
    Scheduler, TriggerOutcome,
};
use url_health_monitor::notification::{
    AlertDispatcher, AlertMessage, AlertTemplate, NoOpSender, NotificationSender,
};
use url_health_monitor::storage::{ResultStore, SqliteResultStore};

#[derive(Default)]
struct CapturingSender {
    sent: Mutex<Vec<AlertMessage>>,
}

#[async_trait]
impl NotificationSender for CapturingSender {
    async fn send(&self, message: &AlertMessage) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct SlowProber;

#[async_trait]
impl Prober for SlowProber {
    async fn probe(&self, _url: &str) -> ProbeOutcome {
        tokio::time::sleep(Duration::from_millis(300)).await;
        ProbeOutcome::Responded {
            status_code: 200,
            elapsed: Duration::from_millis(300),
        }
    }
}

async fn open_store(dir: &TempDir) -> Arc<SqliteResultStore> {
    let config = StorageConfig {
        database_url: format!("sqlite://{}", dir.path().join("scheduler.db").display()),
        max_connections: 4,
    };
    Arc::new(SqliteResultStore::connect(&config).await.unwrap())
}

fn build(
    store: Arc<SqliteResultStore>,
    prober: Arc<dyn Prober>,
    dispatcher: AlertDispatcher,
) -> (Arc<CheckOrchestrator>, Scheduler) {
    let (queue, _worker) = PersistenceQueue::spawn(store.clone());
    let orchestrator = Arc::new(CheckOrchestrator::new(prober, queue, 8));
    let scheduler = Scheduler::new(
        orchestrator.clone(),
        store,
        Arc::new(dispatcher),
        Duration::from_secs(300),
    );
    (orchestrator, scheduler)
}

fn email_dispatcher(sender: Arc<dyn NotificationSender>) -> AlertDispatcher {
    let template = AlertTemplate::from_config(&AlertConfig::default()).unwrap();
    AlertDispatcher::new(sender, "ops@example.com", template, Duration::from_secs(2))
}

async fn wait_for_registry(store: &SqliteResultStore, expected: usize) {
    for _ in 0..100 {
        if store.distinct_urls().await.unwrap().len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("等待URL登记超时");
}

#[tokio::test]
async fn test_scheduled_run_checks_registry_and_alerts_on_down() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/ok")
        .with_status(200)
        .create_async()
        .await;
    server
        .mock("GET", "/broken")
        .with_status(503)
        .create_async()
        .await;
    let ok_url = format!("{}/ok", server.url());
    let broken_url = format!("{}/broken", server.url());

    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let sender = Arc::new(CapturingSender::default());
    let (orchestrator, scheduler) = build(
        store.clone(),
        Arc::new(HttpProber::new(Duration::from_secs(2)).unwrap()),
        email_dispatcher(sender.clone()),
    );

    // 登记表为空时不做任何事
    assert_eq!(
        scheduler.trigger(BatchTrigger::Scheduled).await,
        TriggerOutcome::NoUrls
    );
    assert!(scheduler.status().await.last_run.is_none());

    // 即席检测不发告警，但会登记URL
    orchestrator
        .check_urls(&[ok_url.clone(), broken_url.clone(), ok_url.clone()])
        .await;
    wait_for_registry(&store, 2).await;
    assert!(sender.sent.lock().unwrap().is_empty());

    let outcome = scheduler.trigger(BatchTrigger::Scheduled).await;
    let TriggerOutcome::Completed {
        checked_at,
        checked,
        down,
    } = outcome
    else {
        panic!("期望批次完成，实际为 {:?}", outcome);
    };
    assert_eq!(checked, 2);
    assert_eq!(down, 1);

    // 调度批次同步写入，共享同一个时间戳
    let scheduled_rows: Vec<_> = store
        .latest(None, 100)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.checked_at.timestamp_micros() == checked_at.timestamp_micros())
        .collect();
    assert_eq!(scheduled_rows.len(), 2);

    let sent = sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, format!("ALERT: {} is DOWN", broken_url));
    assert_eq!(sent[0].recipient, "ops@example.com");

    let status = scheduler.status().await;
    assert_eq!(status.last_run, Some(checked_at));
    assert!(status.email_alerts);
}

#[tokio::test]
async fn test_run_now_while_running_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let (orchestrator, scheduler) = build(
        store.clone(),
        Arc::new(SlowProber),
        AlertDispatcher::disabled(),
    );

    orchestrator
        .check_urls(&["https://a.test".to_string()])
        .await;
    wait_for_registry(&store, 1).await;
    let rows_before = store.latest(None, 100).await.unwrap().len();

    let first = scheduler.run_now();
    while !scheduler.is_running() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let second = scheduler.run_now();

    assert_eq!(second.await.unwrap(), TriggerOutcome::AlreadyRunning);
    let first = first.await.unwrap();
    assert!(matches!(first, TriggerOutcome::Completed { checked: 1, .. }));

    let rows_after = store.latest(None, 100).await.unwrap().len();
    assert_eq!(rows_after, rows_before + 1);
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_alerts_disabled_without_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let dispatcher = AlertDispatcher::from_config(&AlertConfig {
        email_user: Some("monitor@example.com".into()),
        email_pass: Some("app-password".into()),
        alert_recipient: None,
        ..Default::default()
    })
    .unwrap();
    let (orchestrator, scheduler) = build(
        store.clone(),
        Arc::new(HttpProber::new(Duration::from_secs(1)).unwrap()),
        dispatcher,
    );

    orchestrator
        .check_urls(&["http://127.0.0.1:1/".to_string()])
        .await;
    wait_for_registry(&store, 1).await;

    let outcome = scheduler.trigger(BatchTrigger::Scheduled).await;
    assert!(matches!(outcome, TriggerOutcome::Completed { down: 1, .. }));
    assert!(!scheduler.status().await.email_alerts);
}

#[tokio::test]
async fn test_noop_sender_counts_as_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let (_, scheduler) = build(
        store,
        Arc::new(SlowProber),
        email_dispatcher(Arc::new(NoOpSender)),
    );

    let status = scheduler.status().await;
    assert!(status.email_alerts);
    assert!(status.last_run.is_none());
}

#[tokio::test]
async fn test_append_then_registry() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let prober = HttpProber::new(Duration::from_secs(1)).unwrap();

    let outcome = prober.probe("not a url").await;
    let result = url_health_monitor::CheckResult::from_outcome(
        "not a url".to_string(),
        outcome,
        chrono::Utc::now(),
    );
    let summary = tokio_test::assert_ok!(store.append(&[result]).await);
    assert_eq!(summary.inserted, 1);

    let urls = store.distinct_urls().await.unwrap();
    assert!(urls.contains("not a url"));
}
