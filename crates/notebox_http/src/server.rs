//! Router assembly and server lifecycle.
//!
//! # Responsibility
//! - Compose CORS, request logging, interceptors and routes into one router.
//! - Bind, serve until a shutdown signal, then close the store.
//!
//! # Invariants
//! - The store is closed only after the server has stopped accepting requests.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::Request,
    http::{header::CONTENT_TYPE, Method},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use log::{error, info, warn};
use notebox_core::{db::DbError, FixedWindowLimiter};
use rusqlite::Connection;
use thiserror::Error;
use tokio::{
    net::TcpListener,
    signal::ctrl_c,
    task::JoinHandle,
    time::{interval, Instant, MissedTickBehavior},
};
use tower_http::cors::CorsLayer;

use crate::{
    config::{AppConfig, ConfigError},
    interceptor::{run_interceptors, Interceptor, InterceptorChain, OriginGuard, RateLimitGate},
    routes::{
        create_note, delete_note, get_note, health_handler, list_notes, route_not_found,
        update_note,
    },
    state::AppState,
    store::NoteStore,
};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("server I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to close store: {0}")]
    Close(#[from] DbError),

    #[error("store close task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Builds the full application router: CORS, request logging, the
/// interceptor chain, then the note routes.
pub fn build_router(state: AppState) -> Result<Router, ConfigError> {
    let allowed_origin = state.config.allowed_origin_header()?;

    let cors = CorsLayer::new()
        .allow_origin(allowed_origin.clone())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let limiter = FixedWindowLimiter::new(state.config.rate_limit);
    let interceptors: Vec<Arc<dyn Interceptor>> = vec![
        Arc::new(OriginGuard::new(allowed_origin)),
        Arc::new(RateLimitGate::new(
            state.store.clone(),
            limiter,
            state.config.rate_limit_key,
        )),
    ];
    let chain = InterceptorChain::new(interceptors);
    info!(
        "event=router_build module=http status=ok interceptors={}",
        chain.names().join(",")
    );

    let app = Router::new()
        .route("/api/notes", get(list_notes).post(create_note))
        .route(
            "/api/notes/{id}",
            get(get_note).put(update_note).delete(delete_note),
        )
        .route("/api/health", get(health_handler))
        .fallback(route_not_found)
        .layer(middleware::from_fn_with_state(chain, run_interceptors))
        .layer(middleware::from_fn(log_requests))
        .layer(cors)
        .with_state(state);

    Ok(app)
}

/// Serves the API on `config.socket_addr()` until Ctrl+C or SIGTERM, then
/// closes the store.
pub async fn start_server(config: AppConfig, conn: Connection) -> Result<(), ServerError> {
    config.validate()?;

    let store = NoteStore::new(conn, config.storage_timeout);
    let address = config.socket_addr();
    let purge_task = spawn_rate_limit_purge(store.clone(), &config);
    let app = build_router(AppState::new(store.clone(), config))?;

    info!("event=server_bind module=http status=start address={address}");
    let listener = TcpListener::bind(address).await?;
    info!("event=server_start module=http status=ok address={address}");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    purge_task.abort();
    info!("event=server_stop module=http status=ok");

    let closing = store.clone();
    tokio::task::spawn_blocking(move || closing.close()).await??;
    served?;

    Ok(())
}

/// Periodically drops counter rows of finished windows.
fn spawn_rate_limit_purge(store: NoteStore, config: &AppConfig) -> JoinHandle<()> {
    let limiter = FixedWindowLimiter::new(config.rate_limit);
    let period = config.rate_limit.window;

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = store.run(move |conn| Ok(limiter.purge_expired(conn)?)).await {
                warn!("event=rate_limit_purge module=http status=error error={e}");
            }
        }
    })
}

async fn log_requests(req: Request, next: Next) -> Response {
    let started_at = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let status = response.status();
    let elapsed = started_at.elapsed().as_millis();
    if status.is_server_error() {
        error!(
            "event=http_request module=http status={} method={} path={} duration_ms={}",
            status.as_u16(),
            method,
            path,
            elapsed
        );
    } else {
        info!(
            "event=http_request module=http status={} method={} path={} duration_ms={}",
            status.as_u16(),
            method,
            path,
            elapsed
        );
    }

    response
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("event=shutdown_signal module=http signal=ctrl_c"),
            Err(e) => {
                error!("event=shutdown_signal module=http status=error error={e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("event=shutdown_signal module=http signal=terminate");
            }
            Err(e) => {
                error!("event=shutdown_signal module=http status=error error={e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
