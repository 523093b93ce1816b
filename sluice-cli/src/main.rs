//! Sluice command-line uploader
//!
//! Thin collaborator around the engine: builds a filesystem selection
//! from the arguments, drives one engine instance, and renders progress.

mod args;
mod format;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sluice_engine::{
    Engine, EngineConfig, EngineEvent, EntryState, FsNode, HttpTransport, SelectionNode,
    flatten_selection,
};

use args::Args;
use format::{human_rate, human_size};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    // Build the selection from the given paths
    let mut selection: Vec<Box<dyn SelectionNode>> = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        match FsNode::new(path.clone()).await {
            Ok(node) => selection.push(Box::new(node)),
            Err(e) => {
                eprintln!("cannot read {}: {}", path.display(), e);
                return ExitCode::from(2);
            }
        }
    }

    let entries = match flatten_selection(selection).await {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("failed to read selection: {e}");
            return ExitCode::from(2);
        }
    };
    if entries.is_empty() {
        println!("Nothing to upload");
        return ExitCode::SUCCESS;
    }

    let total_bytes: u64 = entries.iter().map(|e| e.total_bytes).sum();
    println!(
        "Uploading {} file(s), {} to {}",
        entries.len(),
        human_size(total_bytes),
        args.endpoint
    );

    let transport = match HttpTransport::new() {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            eprintln!("failed to set up HTTP client: {e}");
            return ExitCode::from(2);
        }
    };

    let config = EngineConfig {
        endpoint: args.endpoint.clone(),
        failure_policy: args.on_failure.into(),
    };
    let mut engine = Engine::new(config, transport);
    let mut events = engine.subscribe();

    // Render engine events while the queue runs
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::Started { relative_path, .. } => {
                    println!("-> {relative_path}");
                }
                EngineEvent::Progress {
                    loaded_bytes,
                    total_bytes,
                    progress_percent,
                    rate_bytes_per_sec,
                    ..
                } => {
                    println!(
                        "   {:>3.0}%  {} / {}  {}",
                        progress_percent,
                        human_size(loaded_bytes),
                        human_size(total_bytes),
                        human_rate(rate_bytes_per_sec)
                    );
                }
                EngineEvent::Succeeded { .. } => println!("   done"),
                EngineEvent::Failed { message, .. } => println!("   failed: {message}"),
            }
        }
    });

    engine.enqueue(entries);
    engine.run_until_settled().await;

    // Dropping the engine closes the event channel and ends the printer
    let entries = engine.drain();
    let _ = printer.await;

    let transferred = entries
        .iter()
        .filter(|e| e.state == EntryState::Transferred)
        .count();
    let failed: Vec<_> = entries
        .iter()
        .filter(|e| e.state == EntryState::Failed)
        .collect();
    let skipped = entries.len() - transferred - failed.len();

    println!("Transferred {transferred} of {} file(s)", entries.len());
    for entry in &failed {
        let message = entry.failure_message.as_deref().unwrap_or("unknown error");
        eprintln!("failed: {}: {}", entry.relative_path, message);
    }
    if skipped > 0 {
        eprintln!("{skipped} file(s) not attempted");
    }

    if failed.is_empty() && skipped == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
