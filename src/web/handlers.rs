//! HTTP 路由处理函数

use super::{ApiError, AppState};
use crate::health::{CheckResult, HistoryPoint, ScheduleStatus};
use crate::storage::UrlMetrics;
use axum::extract::{Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// `/history` 默认条数
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
/// `/history_by_url` 默认条数
pub const DEFAULT_URL_HISTORY_LIMIT: u32 = 30;

/// 即席检测请求体
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckRequest {
    /// 待检测的URL，不做去重
    pub urls: Vec<String>,
}

/// `/history` 查询参数
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// 只看某个URL，空字符串视为不过滤
    pub url: Option<String>,
    /// 返回条数
    #[serde(default = "default_history_limit")]
    pub limit: u32,
}

fn default_history_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}

/// `/history_by_url` 查询参数
#[derive(Debug, Deserialize)]
pub struct UrlHistoryQuery {
    /// URL，必填
    pub url: String,
    /// 返回条数
    #[serde(default = "default_url_history_limit")]
    pub limit: u32,
}

fn default_url_history_limit() -> u32 {
    DEFAULT_URL_HISTORY_LIMIT
}

/// 简单状态响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// 状态
    pub status: String,
}

/// 即席检测：同步返回结果，写入在后台完成
pub async fn check_urls(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> Json<Vec<CheckResult>> {
    debug!(url_count = request.urls.len(), "收到即席检测请求");
    Json(state.orchestrator.check_urls(&request.urls).await)
}

/// 最近的检测结果，按时间倒序
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<CheckResult>>, ApiError> {
    let url = query.url.as_deref().filter(|u| !u.is_empty());
    let rows = state.store.latest(url, query.limit).await?;
    Ok(Json(rows))
}

/// 单个URL的历史，按时间正序
pub async fn history_by_url(
    State(state): State<AppState>,
    Query(query): Query<UrlHistoryQuery>,
) -> Result<Json<Vec<HistoryPoint>>, ApiError> {
    let rows = state.store.history(&query.url, query.limit).await?;
    Ok(Json(rows.into_iter().map(HistoryPoint::from).collect()))
}

/// 按URL分组的聚合指标
pub async fn metrics(State(state): State<AppState>) -> Result<Json<Vec<UrlMetrics>>, ApiError> {
    Ok(Json(state.store.metrics().await?))
}

/// 调度器状态
pub async fn schedule_status(State(state): State<AppState>) -> Json<ScheduleStatus> {
    Json(state.scheduler.status().await)
}

/// 手动触发调度批次，不等待执行
pub async fn schedule_run_now(State(state): State<AppState>) -> Json<StatusResponse> {
    info!("收到手动调度请求");
    drop(state.scheduler.run_now());
    Json(StatusResponse {
        status: "scheduled".to_string(),
    })
}

/// 服务自身存活检查
pub async fn health() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}
