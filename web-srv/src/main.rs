mod observability;

use anyhow::{Context, Result};
use axum::{Extension, Json, Router, middleware, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use clap::Parser;
use http::{HeaderValue, Method, header};
use observability::observability_middleware;
use oidcgate_auth::{
    axum::{AuthState, require_session, router},
    config::OidcModuleOptions,
    service::OidcService,
    session::MemorySessionStore,
    types::{SessionUser, UserInfo},
};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server port
    #[arg(short, long, default_value = "3000", env = "OIDCGATE_PORT")]
    port: u16,

    /// Origin allowed to call the server with credentials
    #[arg(long, env = "OIDCGATE_WEB_CORS_ORIGIN")]
    cors_origin: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthCheck {
    status: String,
    timestamp: DateTime<Utc>,
    multitenant: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let options = OidcModuleOptions::from_env().context("Failed to load OIDC configuration")?;
    let multitenant = options.is_multitenant();
    let session_ttl = Duration::from_secs(options.session.ttl_secs);

    // without a single-tenant issuer the server has nothing to authenticate against
    let service = match OidcService::init(options).await {
        Ok(service) => service,
        Err(e) => {
            error!("{e}: {e:?}");
            std::process::exit(1);
        }
    };

    let state = AuthState {
        service: Arc::new(service),
        sessions: Arc::new(MemorySessionStore::new(session_ttl)),
    };

    let health_routes = Router::new().route("/health", get(move || health_check(multitenant)));

    let api_routes = Router::new()
        .route("/me", get(me))
        .layer(middleware::from_fn_with_state(state.clone(), require_session));

    let mut app = Router::new()
        .merge(health_routes)
        .merge(api_routes)
        .merge(router(state))
        .layer(middleware::from_fn(observability_middleware));

    if let Some(cors_origin) = &args.cors_origin {
        let origin = cors_origin
            .parse::<HeaderValue>()
            .context("Invalid OIDCGATE_WEB_CORS_ORIGIN format")?;
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE])
                .allow_credentials(true),
        );
        info!("CORS origin configured for: {cors_origin}");
    }

    let addr = format!("0.0.0.0:{}", args.port);
    info!(
        "oidc web server starting on {addr} ({} mode)",
        if multitenant {
            "multitenant"
        } else {
            "single-tenant"
        }
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(multitenant: bool) -> impl IntoResponse {
    Json(HealthCheck {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        multitenant,
    })
}

/// Identity of the caller, behind the session middleware
async fn me(Extension(user): Extension<SessionUser>) -> Json<UserInfo> {
    Json(user.userinfo)
}
