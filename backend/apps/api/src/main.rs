//! API Server Entry Point
//!
//! Wires the auth HTTP surface, the mailer workers and the retention
//! sweeper into one process. Uses `anyhow` for startup errors, but
//! application-level errors should use `kernel::error::AppError`.

mod config;

use std::sync::Arc;

use auth::{
    AuthAppState, AuthService, EmailFlow, PgAuthRepository, RefreshTokenSweeper, SessionService,
    TokenCodec, auth_router,
};
use axum::http::{HeaderValue, Method, StatusCode, header};
use mailer::{EmailDispatcher, EmailKind, EmailSender, LogSender, MailerConfig, SmtpSender};
use platform::broker::{EventBus, MemoryBroker};
use platform::cache::RedisTokenStore;
use platform::password::CredentialHasher;
use platform::supervisor::WorkerSupervisor;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppConfig, EventBusBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "api=info,auth=info,mailer=info,platform=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    // ------------------------------------------------------------------------
    // Storage
    // ------------------------------------------------------------------------

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections.max(1))
        .connect(config.database_url())
        .await?;
    tracing::info!("Connected to database");

    sqlx::migrate!("../../../database/migrations")
        .run(&pool)
        .await?;
    tracing::info!("Migrations completed");

    let cache = Arc::new(RedisTokenStore::connect(config.redis_url()).await?);
    tracing::info!("Connected to token store");

    // ------------------------------------------------------------------------
    // Event bus
    // ------------------------------------------------------------------------

    let broker = match config.event_bus {
        EventBusBackend::Memory => {
            tracing::warn!(
                "Using the in-process event bus; unconsumed events are lost on restart \
                 and are not shared between instances"
            );
            MemoryBroker::new()
        }
    };
    if let Some(dead_letters) = config.mailer.dead_letter_topology() {
        broker.declare_queue(&dead_letters);
    }
    let bus = Arc::new(EventBus::new(Arc::new(broker.clone()), &config.bus));

    // ------------------------------------------------------------------------
    // Auth
    // ------------------------------------------------------------------------

    let mut supervisor = WorkerSupervisor::new();

    let auth_config = Arc::new(config.auth.clone());
    let repo = Arc::new(PgAuthRepository::new(pool.clone()));
    let codec = Arc::new(TokenCodec::new(&auth_config));
    let sessions = Arc::new(SessionService::new(
        repo.clone(),
        codec.clone(),
        auth_config.refresh_token_ttl,
        auth_config.retention,
    ));
    let email_flow = EmailFlow::new(
        cache.clone(),
        bus.clone(),
        auth_config.clone(),
        supervisor.shutdown_token(),
    );
    let service = Arc::new(AuthService::new(
        repo,
        sessions.clone(),
        email_flow,
        CredentialHasher::default(),
    ));

    // ------------------------------------------------------------------------
    // Workers
    // ------------------------------------------------------------------------

    let broker = Arc::new(broker);
    match &config.mailer.smtp {
        Some(smtp) => {
            let sender = Arc::new(SmtpSender::new(smtp)?);
            tracing::info!(host = %smtp.host, port = smtp.port, "SMTP sender configured");
            add_dispatchers(&mut supervisor, &broker, sender, &cache, &config.mailer);
        }
        None => {
            tracing::warn!("SMTP_HOST not set, emails are logged instead of sent");
            add_dispatchers(
                &mut supervisor,
                &broker,
                Arc::new(LogSender),
                &cache,
                &config.mailer,
            );
        }
    }
    supervisor.add(Arc::new(RefreshTokenSweeper::new(
        sessions,
        auth_config.cleanup_interval,
    )));
    supervisor.start().await?;
    tracing::info!(workers = supervisor.len(), "Workers started");

    // ------------------------------------------------------------------------
    // HTTP
    // ------------------------------------------------------------------------

    let state = AuthAppState {
        service,
        codec,
        api_prefix: auth_config.api_prefix(),
    };

    let app = auth_router(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.frontend_origins));

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, prefix = %auth_config.api_prefix(), "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    tracing::info!("Server stopped accepting connections, stopping workers");

    let report = supervisor.stop(config.shutdown_grace).await;
    if report.aborted.is_empty() {
        tracing::info!(finished = report.finished, "Workers stopped");
    } else {
        tracing::warn!(
            finished = report.finished,
            aborted = ?report.aborted,
            "Workers aborted at the grace deadline"
        );
    }

    bus.close().await;
    pool.close().await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// One dispatcher per email kind, all sharing `sender`
fn add_dispatchers<S>(
    supervisor: &mut WorkerSupervisor,
    broker: &Arc<MemoryBroker>,
    sender: Arc<S>,
    cache: &Arc<RedisTokenStore>,
    config: &MailerConfig,
) where
    S: EmailSender + Send + Sync + 'static,
{
    for kind in [EmailKind::Verify, EmailKind::ResetPassword] {
        supervisor.add(Arc::new(EmailDispatcher::new(
            kind,
            broker.clone(),
            sender.clone(),
            cache.clone(),
            config,
        )));
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
        ]))
        .allow_credentials(true)
}

/// Resolves on SIGINT or SIGTERM
///
/// A handler that cannot be installed is logged and never fires; the other
/// signal still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Installing Ctrl-C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Installing SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
