use crate::auth::token::TokenProcessor;
use crate::auth::AuthService;
use crate::cli::globals::GlobalArgs;
use crate::store::{
    mail::{HttpMailDispatcher, LogMailDispatcher},
    postgres::PgIdentityStore,
    qr::QrImageRenderer,
    redis::RedisEphemeralStore,
    vault::VaultSecretStore,
    EphemeralStore, IdentityStore, MailDispatcher, SecretStore, STORE_TIMEOUT,
};
use crate::totp::TotpService;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub mod handlers;
pub mod middleware;

/// Start the server
///
/// # Errors
/// Returns an error if a backing store cannot be reached, key generation
/// fails, or the listener cannot bind.
pub async fn new(port: u16, dsn: &str, redis_url: &str, globals: &GlobalArgs) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .acquire_timeout(STORE_TIMEOUT)
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    let identities: Arc<dyn IdentityStore> = Arc::new(PgIdentityStore::new(pool));
    let sessions: Arc<dyn EphemeralStore> = Arc::new(
        RedisEphemeralStore::connect(redis_url)
            .await
            .context("Failed to connect to redis")?,
    );
    let secrets: Arc<dyn SecretStore> = Arc::new(VaultSecretStore::new(
        &globals.vault_url,
        &globals.vault_mount,
        globals.vault_token.clone(),
    )?);
    let mailer: Arc<dyn MailDispatcher> = match &globals.mail_relay_url {
        Some(url) => Arc::new(HttpMailDispatcher::new(url, globals.mail_api_key.clone())?),
        None => Arc::new(LogMailDispatcher),
    };

    let issuer_label = globals
        .issuer
        .clone()
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
    let totp = Arc::new(TotpService::new(
        secrets.clone(),
        Arc::new(QrImageRenderer),
        issuer_label,
    ));
    let tokens = Arc::new(
        TokenProcessor::generate(globals.access_ttl, globals.refresh_ttl, globals.issuer.clone())
            .context("Failed to generate signing keys")?,
    );
    let service = Arc::new(AuthService::new(
        identities,
        sessions.clone(),
        secrets,
        mailer,
        totp,
        tokens.clone(),
        globals.mail_sender.clone(),
    ));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    // Authenticated routes sit behind the rotation protocol; everything the
    // signup flow needs stays public.
    let protected = Router::new()
        .route("/api/v1/session", get(handlers::session::session))
        .layer(axum::middleware::from_fn(middleware::rotate_session));

    let app = Router::new()
        .route("/api/v1/signup/check", post(handlers::signup::check))
        .route("/api/v1/signup/confirm", post(handlers::signup::confirm))
        .route("/api/v1/signup/qr", post(handlers::signup::qr))
        .route("/api/v1/signup/complete", post(handlers::signup::complete))
        .route(
            "/api/v1/auth/reauthorize",
            post(handlers::authorize::reauthorize),
        )
        .merge(protected)
        .route(
            "/health",
            get(handlers::health::health).options(handlers::health::health),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(service))
                .layer(Extension(tokens))
                .layer(Extension(sessions)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
