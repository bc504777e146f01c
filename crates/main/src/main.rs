//! 主应用程序入口
//!
//! 启动实时通道（WebSocket）和节点注册表 REST 接口。数据库不可用时只提供实时通道。

use std::sync::Arc;

use application::{Hub, NodeService};
use config::AppConfig;
use infrastructure::{create_pg_pool, PgNodeRepository, MIGRATOR};
use tokio::{net::TcpListener, sync::watch};
use tracing_subscriber::EnvFilter;
use web_api::{cors_layer, realtime_router, router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // RUST_LOG 优先，否则使用配置中的日志级别
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(config = %config.sanitize(), "配置已加载");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            return;
        }
        tracing::info!("收到退出信号，开始关闭");
        let _ = shutdown_tx.send(true);
    });

    // 实时通道不依赖数据库，先启动
    let hub = Arc::new(Hub::new(config.realtime.initial_value.clone()));
    let ws_listener = TcpListener::bind((config.server.host.as_str(), config.server.ws_port)).await?;
    tracing::info!(addr = %ws_listener.local_addr()?, "实时通道已启动");
    let realtime = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(ws_listener, realtime_router(hub))
                .with_graceful_shutdown(wait_for_shutdown(shutdown))
                .await
        })
    };

    match connect_repository(&config).await {
        Ok(repository) => {
            let service = NodeService::new(Arc::new(repository));
            let app = router(AppState::new(Arc::new(service)))
                .layer(cors_layer(&config.server.cors_origins));

            let listener =
                TcpListener::bind((config.server.host.as_str(), config.server.http_port)).await?;
            tracing::info!(addr = %listener.local_addr()?, "REST 接口已启动");
            axum::serve(listener, app)
                .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
                .await?;
        }
        Err(err) => {
            tracing::error!(error = %err, "数据库不可用，仅提供实时通道");
        }
    }

    realtime.await??;
    tracing::info!("服务已停止");
    Ok(())
}

/// 连接数据库并执行迁移
async fn connect_repository(config: &AppConfig) -> anyhow::Result<PgNodeRepository> {
    let pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;
    MIGRATOR.run(&pool).await?;
    Ok(PgNodeRepository::new(pool))
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    // 信号监听失败时发送端被丢弃，此时保持运行
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
