// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tether: JSON-lines host for the plugin call bridge.
//
// Entry point. Initialises logging, loads the app descriptor, builds the
// bridge with the bundled plugins and serves envelopes from stdin, writing
// results and events to stdout. Logs go to stderr.

mod services;

use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::runtime::Handle;

use tether_bridge::{BackgroundPool, Bridge, ChannelSink, MainLoop, Scheduler};
use tether_core::error::Result;
use tether_plugins::{GoogleAuthPlugin, UnavailableProvider};

use services::{descriptor, host};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Tether starting");

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "tether host failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let path = descriptor::descriptor_path(
        std::env::args().nth(1),
        std::env::var(descriptor::CONFIG_ENV).ok(),
    );
    let app = descriptor::load_descriptor(path.as_deref())?;
    let config = descriptor::bridge_config(&app)?;

    // Background handlers share this runtime's blocking pool.
    let primary = MainLoop::spawn(config.primary_thread_name.clone())?;
    let scheduler = Scheduler::new(
        Arc::new(primary),
        Arc::new(BackgroundPool::from_handle(Handle::current())),
    );

    let (sink, outbound) = ChannelSink::new();
    let bridge = Bridge::builder(Arc::new(sink))
        .config(config)
        .descriptor(app)
        .scheduler(scheduler)
        .plugin(Arc::new(GoogleAuthPlugin::new(Arc::new(UnavailableProvider))))
        .build()?;
    tracing::info!(plugins = ?bridge.plugin_names(), "bridge ready; reading envelopes from stdin");

    host::serve(
        &bridge,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        outbound,
    )
    .await
}
