//! ops-daemon entry point.
//!
//! Loads config, builds the order engine and push channel, then serves
//! HTTP. Route handlers live in
//! `routes.rs`; shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use ops_config::{load_layered_yaml, report_unused_keys, resolve_secrets, OpsConfig, UnusedKeyPolicy};
use ops_daemon::{routes, state};
use ops_push::{push_url, PushClient, PushConfig, TokioClock, WsTransport};
use ops_runtime::{
    attach_push, spawn_engine, spawn_poll_loop, spawn_slow_order_loop, ConfirmationPolicy,
    EngineConfig, HttpOrderService,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "ops-daemon", about = "Restaurant operations console order engine")]
struct Args {
    /// YAML config layer; repeat to override (later wins).
    #[arg(long = "config", required = true)]
    config: Vec<String>,

    /// Override `daemon.bind_addr`.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Fail instead of warning when a config key is not read by anything.
    #[arg(long)]
    strict_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if missing;
    // production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();
    let args = Args::parse();

    let paths: Vec<&str> = args.config.iter().map(String::as_str).collect();
    let loaded = load_layered_yaml(&paths).context("load config")?;
    let policy = if args.strict_config {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let unused = report_unused_keys(&loaded.config_json, policy)?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config keys not read by anything");
    }
    let cfg = loaded.typed()?;
    cfg.validate()?;
    let secrets = resolve_secrets(&cfg)?;
    info!(config_hash = %loaded.config_hash, tenant = %cfg.service.tenant_id, "config loaded");

    let service = HttpOrderService::new(
        cfg.service.base_url.clone(),
        cfg.service.tenant_id.clone(),
        secrets.service_token.clone(),
        cfg.request_timeout(),
    )
    .context("build order service client")?;

    let clock = Arc::new(TokioClock);
    let (engine, engine_task) = spawn_engine(engine_config(&cfg), Arc::new(service), clock.clone());
    spawn_poll_loop(engine.clone(), cfg.poll_interval());
    spawn_slow_order_loop(engine.clone(), cfg.slow_check_interval());

    let push = match (&secrets.service_token, cfg.push.enabled) {
        (Some(token), true) => {
            let client = PushClient::new(
                PushConfig {
                    url: push_url(&cfg.service.ws_url, token, &cfg.service.tenant_id),
                    channels: cfg.push.channels.clone(),
                    base_delay: cfg.push_base_delay(),
                    max_attempts: cfg.push.max_attempts,
                },
                Arc::new(WsTransport),
                clock,
            );
            attach_push(&client, &engine);
            client.connect();
            Some(client)
        }
        _ => {
            info!("push channel disabled; relying on polling");
            None
        }
    };

    let shared = Arc::new(
        state::AppState::new(engine.clone(), push.clone(), cfg.service.tenant_id.clone())
            .with_config_hash(loaded.config_hash.clone()),
    );
    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    state::spawn_bus_relay(Arc::clone(&shared));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = match args.bind {
        Some(addr) => addr,
        None => cfg
            .daemon
            .bind_addr
            .parse()
            .with_context(|| format!("CONFIG_INVALID: daemon.bind_addr '{}'", cfg.daemon.bind_addr))?,
    };
    info!("ops-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    if let Some(p) = &push {
        p.disconnect();
    }
    engine.shutdown();
    let _ = engine_task.await;
    info!("ops-daemon stopped");
    Ok(())
}

/// Without push there is nothing to confirm an accept but the next poll.
fn engine_config(cfg: &OpsConfig) -> EngineConfig {
    EngineConfig {
        confirmation: if cfg.push.enabled {
            ConfirmationPolicy::AwaitConfirmation
        } else {
            ConfirmationPolicy::OnResponse
        },
        history_cap: cfg.notifications.history_cap,
        slow_threshold: chrono::Duration::minutes(cfg.slow_orders.threshold_mins),
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until killed.
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
