//! HTTP 接口模块
//!
//! 提供即席检测、历史查询、聚合指标和调度控制的 JSON 接口

use crate::error::StorageError;
use crate::health::{CheckOrchestrator, Scheduler};
use crate::storage::ResultStore;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

pub mod handlers;
pub mod server;

pub use server::{build_router, serve};

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    /// 批量检测编排器（即席检测）
    pub orchestrator: Arc<CheckOrchestrator>,
    /// 结果存储（读接口直接查询）
    pub store: Arc<dyn ResultStore>,
    /// 定时调度器
    pub scheduler: Scheduler,
}

impl AppState {
    /// 创建新的路由状态
    pub fn new(
        orchestrator: Arc<CheckOrchestrator>,
        store: Arc<dyn ResultStore>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            orchestrator,
            store,
            scheduler,
        }
    }
}

/// 接口错误，统一返回 `{"error": "..."}`
#[derive(Error, Debug)]
pub enum ApiError {
    /// 读取存储失败
    #[error("{0}")]
    Storage(#[from] StorageError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Storage(e) => {
                error!("查询检测结果失败: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
