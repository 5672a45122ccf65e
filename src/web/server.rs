//! HTTP 服务器实现
//!
//! 组装路由、CORS 和请求追踪，并支持优雅关闭

use super::{handlers, AppState};
use crate::error::Result;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// 创建路由
///
/// # 参数
/// * `state` - 路由共享状态
/// * `cors_origins` - 允许跨域的来源，包含 `*` 时允许任意来源
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/check_urls", post(handlers::check_urls))
        .route("/history", get(handlers::history))
        .route("/history_by_url", get(handlers::history_by_url))
        .route("/metrics", get(handlers::metrics))
        .route("/schedule/status", get(handlers::schedule_status))
        .route("/schedule/run_now", post(handlers::schedule_run_now))
        .route("/health", get(handlers::health))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::any()
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("忽略无效的CORS来源 {}: {}", origin, e);
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// 启动HTTP服务，收到关闭信号后停止接收新请求并等待进行中的请求完成
///
/// # 参数
/// * `router` - 路由
/// * `addr` - 监听地址
/// * `shutdown_rx` - 关闭信号接收器
pub async fn serve(
    router: Router,
    addr: SocketAddr,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP服务已启动: http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("接收到关闭信号，正在关闭HTTP服务...");
        })
        .await?;

    info!("HTTP服务已关闭");
    Ok(())
}
