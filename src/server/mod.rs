pub mod handlers;

use crate::config::Config;
use crate::providers::routing::FallbackRouter;
use crate::Result;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// 所有连接共享的只读状态
pub struct AppState {
    pub router: FallbackRouter,
}

impl AppState {
    pub fn new(router: FallbackRouter) -> Self {
        Self { router }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(FallbackRouter::from_config(config)?))
    }
}

/// 启动 HTTP 服务器（带优雅关闭）
pub async fn start_server(state: Arc<AppState>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("RelayGate 服务器运行在 http://{}", addr);

    serve(listener, state, shutdown_signal()).await;
    info!("服务器已优雅关闭");
    Ok(())
}

/// 在已绑定的监听器上启动服务器（仅用于测试，不监听关闭信号）
pub async fn start_server_test(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("RelayGate 测试服务器运行在 http://{}", addr);
    }
    serve(listener, state, std::future::pending::<()>()).await;
    Ok(())
}

/// 接受连接直到 shutdown 完成，然后等待现有连接处理完毕
async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F)
where
    F: Future<Output = ()>,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // 等待新连接
            result = listener.accept() => {
                let (stream, _) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("接受连接失败: {}", e);
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let state = Arc::clone(&state);
                let mut shutdown_rx = shutdown_rx.clone();

                connections.spawn(async move {
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        handlers::handle_request(req, state)
                    });

                    let conn = http1::Builder::new().serve_connection(io, service);
                    tokio::pin!(conn);
                    let mut draining = false;

                    loop {
                        tokio::select! {
                            res = conn.as_mut() => {
                                if let Err(e) = res {
                                    error!("服务连接错误: {}", e);
                                }
                                break;
                            }
                            _ = shutdown_rx.changed(), if !draining => {
                                draining = true;
                                conn.as_mut().graceful_shutdown();
                            }
                        }
                    }
                });
            }
            // 等待关闭信号
            _ = &mut shutdown => {
                info!("收到关闭信号，停止接受新连接");
                break;
            }
        }
    }

    drop(listener);
    let _ = shutdown_tx.send(());

    info!("等待现有连接处理完成...");
    while let Some(res) = connections.join_next().await {
        if let Err(e) = res {
            error!("连接任务异常退出: {}", e);
        }
    }
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("设置 Ctrl+C 信号处理失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("设置 SIGTERM 信号处理失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("收到 Ctrl+C 信号，开始优雅关闭..."),
        _ = terminate => warn!("收到 SIGTERM 信号，开始优雅关闭..."),
    }
}
