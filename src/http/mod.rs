//! Debug HTTP server surfaced only in debug feature builds.
//!
//! This module spawns a lightweight Axum server that exposes health, the
//! latest presentation snapshot, telemetry metrics and SSE streams of
//! snapshots and strums for diagnostics.

#[cfg(all(feature = "debug_http", debug_assertions))]
mod routes;
#[cfg(all(feature = "debug_http", debug_assertions))]
mod sse;

use crate::managers::BroadcastChannelManager;

#[cfg(all(feature = "debug_http", debug_assertions))]
use routes::{run_http_server, DebugHttpState};

#[cfg(all(feature = "debug_http", debug_assertions))]
use std::net::SocketAddr;
#[cfg(all(feature = "debug_http", debug_assertions))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(all(feature = "debug_http", debug_assertions))]
use std::thread;

#[cfg(all(feature = "debug_http", debug_assertions))]
static SERVER_STARTED: AtomicBool = AtomicBool::new(false);

/// Spawn the debug HTTP server only when the feature flag and debug builds are enabled.
pub fn spawn_if_enabled(broadcasts: &BroadcastChannelManager) {
    #[cfg(all(feature = "debug_http", debug_assertions))]
    {
        if SERVER_STARTED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("[DebugHttp] Server already running");
            return;
        }

        let addr: SocketAddr = std::env::var("AIR_GUITAR_DEBUG_HTTP_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8787".to_string())
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8787)));

        let token = std::env::var("AIR_GUITAR_DEBUG_TOKEN")
            .unwrap_or_else(|_| "air-guitar-debug".to_string());
        let preview = token.chars().take(4).collect::<String>();
        let broadcasts = broadcasts.clone();

        thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    tracing::error!("[DebugHttp] Failed to build tokio runtime: {}", err);
                    return;
                }
            };

            tracing::info!(
                "[DebugHttp] Binding {} (token prefix {}***)",
                addr,
                preview
            );

            runtime.block_on(async move {
                let state = DebugHttpState::new(broadcasts, token);
                if let Err(err) = run_http_server(state, addr).await {
                    tracing::error!("[DebugHttp] Server stopped: {:#}", err);
                }
            });
        });
    }
    #[cfg(not(all(feature = "debug_http", debug_assertions)))]
    {
        let _ = broadcasts;
    }
}
