// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, net::SocketAddr, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use forwardog::{config::Config, gateway::Gateway, server};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("DD_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match Config::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error loading config: {e}");
            return;
        }
    };

    if !config.is_configured() {
        warn!("DD_API_KEY is not set, only DogStatsD and agent file submissions will work");
    }
    debug!(
        "Advertised request rate: {} per second (not enforced)",
        config.max_requests_per_second
    );

    let gateway = Arc::new(Gateway::new(Arc::clone(&config)));
    if !gateway.file_logger().is_available() {
        warn!(
            "Agent log file {} is not writable, agent file submissions will fail",
            config.log_path.display()
        );
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Unable to bind {addr}: {e}");
            return;
        }
    };
    info!(
        "forwardog listening on {addr} (site: {}, dogstatsd: {}:{})",
        config.site, config.agent_host, config.dogstatsd_port
    );

    let shutdown = CancellationToken::new();
    let shutdown_on_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                shutdown_on_signal.cancel();
            }
            Err(e) => error!("Unable to listen for Ctrl-C: {e}"),
        }
    });

    if let Err(e) = server::serve(listener, Arc::clone(&gateway), shutdown).await {
        error!("HTTP server stopped: {e}");
    }

    gateway.shutdown();
    debug!("forwardog stopped");
}
