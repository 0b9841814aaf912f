// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, process, sync::Arc};

use mealbox_auth_server::{
    api::router,
    config::ServiceConfig,
    init_tracing,
    mailer::TracingMailer,
    session_pruner::SessionPruner,
    state::AppState,
    tls::{install_crypto_provider, load_rustls_config},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            process::exit(1);
        }
    };
    init_tracing(config.json_logs);

    if let Err(e) = install_crypto_provider() {
        error!(error = %e, "Failed to install rustls crypto provider");
        process::exit(1);
    }

    if config.dev_mode {
        warn!("DEV_MODE enabled: unverified identities can log in");
    }

    let host = config.host.clone();
    let port = config.port;
    let tls = config.tls.clone();
    let seed_admin = config.seed_admin.clone();

    let state = match AppState::new(config, Arc::new(TracingMailer)) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialize application state");
            process::exit(1);
        }
    };

    if let Some(seed) = seed_admin {
        match state.accounts().ensure_admin(&seed.email, &seed.password) {
            Ok(true) => info!(email = %seed.email, "Created bootstrap administrator"),
            Ok(false) => info!(email = %seed.email, "Bootstrap administrator already exists"),
            Err(e) => warn!(error = %e, "Failed to create bootstrap administrator"),
        }
    }

    let shutdown = CancellationToken::new();
    let pruner = SessionPruner::new(Arc::clone(&state.db), state.config.refresh_token_ttl);
    let pruner_handle = tokio::spawn(pruner.run(shutdown.clone()));

    let addr: SocketAddr = match format!("{host}:{port}").parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(%host, port, error = %e, "Failed to parse bind address");
            process::exit(1);
        }
    };

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

    let served = match tls {
        Some(paths) => {
            let tls_config = match load_rustls_config(&paths).await {
                Ok(tls_config) => tls_config,
                Err(e) => {
                    error!(error = %e, "Failed to load TLS configuration");
                    process::exit(1);
                }
            };

            let handle = axum_server::Handle::new();
            let signal_handle = handle.clone();
            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                wait_for_signal().await;
                signal_token.cancel();
                signal_handle.graceful_shutdown(None);
            });

            info!("Mealbox auth listening on https://{addr} (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app)
                .await
        }
        None => {
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!(%addr, error = %e, "Failed to bind");
                    process::exit(1);
                }
            };

            info!("Mealbox auth listening on http://{addr} (docs at /docs)");
            let signal_token = shutdown.clone();
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    wait_for_signal().await;
                    signal_token.cancel();
                })
                .await
        }
    };

    shutdown.cancel();
    if let Err(e) = pruner_handle.await {
        warn!(error = %e, "Session pruner task ended abnormally");
    }

    if let Err(e) = served {
        error!(error = %e, "Server failed");
        process::exit(1);
    }
    info!("Gracefully shutdown");
}

async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
