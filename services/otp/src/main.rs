use std::sync::Arc;

use sea_orm::Database;
use tracing::info;

use otpgate_core::config::Config;
use otpgate_core::tracing::init_tracing;
use otpgate_otp::config::OtpConfig;
use otpgate_otp::domain::repository::PolicyStore;
use otpgate_otp::notify::NotificationDispatcher;
use otpgate_otp::router::build_router;
use otpgate_otp::state::AppState;
use otpgate_otp::sweeper::ExpirationSweeper;

#[tokio::main]
async fn main() {
    init_tracing("info,sqlx=warn");

    let config = OtpConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let dispatcher =
        NotificationDispatcher::from_config(&config).expect("invalid notification configuration");
    info!(channels = ?dispatcher.configured_channels(), "delivery channels ready");

    let state = AppState {
        db,
        dispatcher: Arc::new(dispatcher),
    };

    let created = state
        .policy_store()
        .ensure_initialized()
        .await
        .expect("failed to initialize otp policy");
    if created {
        info!("created default otp policy");
    }

    let sweeper = ExpirationSweeper::new(Arc::new(state.engine()), config.sweep_interval()).start();

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.otp_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!("otp service listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    sweeper.stop().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
