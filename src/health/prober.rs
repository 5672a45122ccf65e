//! HTTP探测器实现
//!
//! 对单个URL发起一次带超时的GET请求，并把网络结果转换为 [`ProbeOutcome`]

use crate::error::{MonitorError, Result};
use crate::health::result::ProbeOutcome;
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// 默认探测超时时间
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 探测器trait，定义探测接口
///
/// 实现必须把所有失败编码进返回值，不能返回错误或panic。
#[async_trait]
pub trait Prober: Send + Sync {
    /// 对 `url` 执行一次探测
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// 基于 reqwest 的HTTP探测器
pub struct HttpProber {
    /// HTTP客户端
    client: Client,
    /// 单次探测的硬超时
    timeout: Duration,
}

impl HttpProber {
    /// 创建新的HTTP探测器
    ///
    /// # 参数
    /// * `timeout` - 单次探测超时时间
    ///
    /// # 返回
    /// * `Result<Self>` - 探测器实例
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()
            .map_err(|e| MonitorError::Other(anyhow::anyhow!("创建HTTP客户端失败: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// 格式化请求错误信息，使其更加清晰易读
    fn format_request_error(error: &reqwest::Error) -> String {
        if error.is_timeout() {
            "Request timeout".to_string()
        } else if error.is_connect() {
            "Connection refused".to_string()
        } else if error.is_builder() {
            "Invalid URL".to_string()
        } else if error.is_request() {
            "Invalid request".to_string()
        } else {
            let error_str = error.to_string();
            if error_str.contains("dns") || error_str.contains("DNS") {
                "DNS resolution failed".to_string()
            } else if error_str.contains("certificate")
                || error_str.contains("tls")
                || error_str.contains("ssl")
            {
                "SSL/TLS certificate error".to_string()
            } else {
                format!("Request failed: {error_str}")
            }
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let start_time = Instant::now();

        // 客户端本身带超时，这里再包一层以覆盖连接建立之前的阶段
        let response_result = timeout(self.timeout, self.client.get(url).send()).await;

        match response_result {
            Ok(Ok(response)) => {
                let elapsed = start_time.elapsed();
                let status_code = response.status().as_u16();
                debug!(url, status_code, elapsed_ms = elapsed.as_millis() as u64, "探测完成");
                ProbeOutcome::Responded {
                    status_code,
                    elapsed,
                }
            }
            Ok(Err(e)) => {
                let reason = Self::format_request_error(&e);
                debug!(url, %reason, "探测失败");
                ProbeOutcome::Unreachable { reason }
            }
            Err(_) => {
                debug!(url, "探测超时");
                ProbeOutcome::Unreachable {
                    reason: "Request timeout".to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::result::CheckStatus;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_http_prober_creation() {
        let prober = HttpProber::new(Duration::from_secs(10));
        assert!(prober.is_ok());
        assert_eq!(prober.unwrap().timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_probe_success_records_code_and_latency() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ok")
            .with_status(200)
            .with_body("fine")
            .create_async()
            .await;

        let prober = HttpProber::new(Duration::from_secs(5)).unwrap();
        let outcome = prober.probe(&format!("{}/ok", server.url())).await;

        mock.assert_async().await;
        assert_eq!(outcome.status(), CheckStatus::Up);
        assert!(matches!(
            outcome,
            ProbeOutcome::Responded {
                status_code: 200,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_probe_redirect_range_is_up() {
        let mut server = mockito::Server::new_async().await;
        // 304 不会被重定向策略跟随
        let _mock = server
            .mock("GET", "/moved")
            .with_status(304)
            .create_async()
            .await;

        let prober = HttpProber::new(Duration::from_secs(5)).unwrap();
        let outcome = prober.probe(&format!("{}/moved", server.url())).await;

        assert_eq!(outcome.status(), CheckStatus::Up);
    }

    #[tokio::test]
    async fn test_probe_server_error_is_down_but_responded() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/broken")
            .with_status(500)
            .create_async()
            .await;

        let prober = HttpProber::new(Duration::from_secs(5)).unwrap();
        let outcome = prober.probe(&format!("{}/broken", server.url())).await;

        assert_eq!(outcome.status(), CheckStatus::Down);
        match outcome {
            ProbeOutcome::Responded { status_code, .. } => assert_eq!(status_code, 500),
            other => panic!("应当收到响应: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        // 先占用一个端口再释放，保证没有进程监听
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let prober = HttpProber::new(Duration::from_secs(2)).unwrap();
        let outcome = prober.probe(&format!("http://{addr}/")).await;

        assert_eq!(outcome.status(), CheckStatus::Down);
        assert!(matches!(outcome, ProbeOutcome::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_probe_invalid_url() {
        let prober = HttpProber::new(Duration::from_secs(1)).unwrap();
        let outcome = prober.probe("not a url").await;

        assert_eq!(
            outcome,
            ProbeOutcome::Unreachable {
                reason: "Invalid URL".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_probe_timeout_handling() {
        // 接受连接但从不响应
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let holder = tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let prober = HttpProber::new(Duration::from_millis(200)).unwrap();
        let started = Instant::now();
        let outcome = prober.probe(&format!("http://{addr}/slow")).await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(outcome.status(), CheckStatus::Down);
        assert!(matches!(outcome, ProbeOutcome::Unreachable { .. }));
        holder.abort();
    }
}
