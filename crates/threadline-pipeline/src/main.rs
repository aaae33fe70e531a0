mod classify_stage;
mod cli;
mod wiring;

use std::time::Duration;

use clap::Parser;
use threadline_core::config::PipelineConfig;
use threadline_core::metrics::{self, Counters};
use threadline_ingest::IngestOutcome;
use tracing::{error, info};

use cli::{Args, Command};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "threadline=info".into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Run => std::process::exit(run(args.config.as_deref()).await),
        Command::Synthesize { count, start_seqid } => {
            synthesize(start_seqid, count);
            std::process::exit(0);
        }
    }
}

async fn run(config_path: Option<&str>) -> i32 {
    let config = match PipelineConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "configuration error");
            return 1;
        }
    };

    info!(ws_sock = %config.ws_sock, "starting pipeline");
    let counters = Counters::new();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let reporter = metrics::spawn_reporter(counters.clone(), Duration::from_secs(30), shutdown_rx.clone());

    let pipeline = wiring::run_pipeline(config, counters, shutdown_rx);
    tokio::pin!(pipeline);

    let outcome = tokio::select! {
        outcome = &mut pipeline => outcome,
        _ = wait_for_shutdown_signal() => {
            info!("shutdown signal received, closing upstream feed and draining pipeline");
            let _ = shutdown_tx.send(true);
            pipeline.await
        }
    };

    let _ = shutdown_tx.send(true);
    let _ = reporter.await;

    match outcome {
        IngestOutcome::CleanClose | IngestOutcome::DownstreamClosed | IngestOutcome::Cancelled => 0,
        IngestOutcome::AbruptClose => {
            error!("upstream feed connection was lost unexpectedly");
            2
        }
    }
}

/// Waits for Ctrl-C or, on Unix, SIGTERM — whichever arrives first. Used
/// to trigger the `shutdown` watch channel that the Ingestor selects on
/// (spec §5 "Cancellation"): closing its socket and letting the normal
/// closed-channel shutdown propagate downstream in topological order.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn synthesize(start_seqid: i64, count: usize) {
    let start = chrono::Utc::now();
    let messages = threadline_demos::generate(start_seqid, start, count);
    println!("{}", threadline_demos::to_ndjson(&messages));
}
