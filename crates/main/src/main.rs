//! 主应用程序入口
//!
//! 组装实时投递服务并启动 Axum Web API。

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use infrastructure::{Collaborators, Hub, JwtTokenValidator, PgChatDirectory, PgMessageStore};
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app_config = AppConfig::from_env();

    tracing::info!(
        "连接数据库: {}",
        app_config
            .database
            .url
            .split('@')
            .next_back()
            .unwrap_or("unknown")
    );

    let pg_pool = PgPoolOptions::new()
        .max_connections(app_config.database.max_connections)
        .connect(&app_config.database.url)
        .await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    // 外部协作者：凭证校验、成员目录、消息存储
    let collaborators = Collaborators {
        tokens: Arc::new(JwtTokenValidator::new(&app_config.jwt, pg_pool.clone())),
        directory: Arc::new(PgChatDirectory::new(pg_pool.clone())),
        messages: Arc::new(PgMessageStore::new(pg_pool)),
    };

    let hub = Arc::new(Hub::new(app_config.realtime.queue_capacity));
    let state = AppState::new(hub.clone(), collaborators, app_config.realtime.clone());

    let app = router(state);
    let bind_addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("实时投递服务器启动在 http://{}", bind_addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // 关闭所有出站队列，给连接一个写出关闭帧的宽限期
    hub.shutdown().await;
    tokio::time::sleep(app_config.realtime.shutdown_grace()).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(%err, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
