//! confab CLI - operator tooling for the conversation engine.
//!
//! # Commands
//!
//! - `confab validate` — load configuration, build the voice-call
//!   chart, run the startup lints, and print a state summary.
//! - `confab simulate --script events.json` — replay a scripted event
//!   sequence through a real engine and print every transition.
//!
//! # Environment Variables
//!
//! - `CONFAB_LOG`: tracing filter (default `info`)
//! - `CONFAB_*`: configuration overrides (see the config loader)

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use confab_engine::checkpoint::MemoryStore;
use confab_engine::config::{ConfabConfig, ConfigLoader};
use confab_engine::machine::charts;
use confab_engine::SessionEngine;
use confab_event::observe::{ChannelSink, ObservationRecord};
use confab_event::{Event, EventKind};
use confab_gateway::{Gateway, ToolRegistry};
use confab_types::{EventSource, Permission, SessionId, TenantId, TraceId};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// confab - real-time conversation orchestration engine.
#[derive(Parser, Debug)]
#[command(name = "confab")]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file path (defaults to ./confab.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load config and verify the state chart lints pass.
    Validate,

    /// Replay a scripted event sequence through a real engine.
    Simulate {
        /// JSON script: an array of `{source, event, delay_ms?}`
        /// entries. The script should end with a `call_end` event.
        #[arg(long)]
        script: PathBuf,
    },
}

/// One scripted event.
#[derive(Debug, Deserialize)]
struct ScriptEntry {
    /// Producer class.
    source: EventSource,
    /// The event payload.
    event: EventKind,
    /// Pause before enqueueing, in milliseconds.
    #[serde(default)]
    delay_ms: u64,
}

fn load_config(path: Option<PathBuf>) -> Result<ConfabConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_file(path);
    }
    loader.load().context("loading configuration")
}

fn validate(config: &ConfabConfig) -> Result<()> {
    // Chart lints run inside build(); reaching here means they passed.
    let chart = charts::voice_call();
    println!("config: ok");
    println!("checkpoint dir: {}", config.checkpoint.dir.display());
    println!(
        "chart:  ok ({} states, initial '{}')",
        chart.state_count(),
        chart.initial()
    );

    for name in [
        "idle",
        "listening",
        "thinking",
        "speaking",
        "tool_wait",
        "processing_payment",
        "api_error",
        "payment_failed",
        "timed_out",
        "escalated",
        "completed",
    ] {
        let state = chart.state(name).expect("shipped state");
        println!(
            "  {:<20} interruptible={:<5} timeout={}",
            state.path().to_string(),
            state.interruptible,
            state
                .timeout
                .map_or("-".to_string(), |t| format!("{}s", t.as_secs())),
        );
    }

    if !config.tools.is_empty() {
        println!("tool overrides:");
        for (name, settings) in &config.tools {
            println!(
                "  {:<20} timeout_ms={:?} cancel_on_interruption={:?}",
                name, settings.timeout_ms, settings.cancel_on_interruption
            );
        }
    }
    Ok(())
}

async fn simulate(config: ConfabConfig, script_path: PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(&script_path)
        .with_context(|| format!("reading script {}", script_path.display()))?;
    let script: Vec<ScriptEntry> = serde_json::from_str(&raw).context("parsing script")?;

    let gateway = Arc::new(Gateway::new(
        Arc::new(ToolRegistry::new()),
        config.gateway.clone(),
    ));
    let context = confab_engine::Context::new(
        SessionId::new(),
        TenantId::from_name("simulate"),
        Permission::ALL,
    );
    let (sink, mut records) = ChannelSink::new();
    let (engine, sender) = SessionEngine::new(
        Arc::new(charts::voice_call()),
        context,
        MemoryStore::new(),
        gateway,
        &config.engine,
    );
    let mut engine = engine.with_sink(Arc::new(sink));

    let printer = tokio::spawn(async move {
        while let Some(record) = records.recv().await {
            match record {
                ObservationRecord::Transition(t) => {
                    let marker = if t.guard_result { "->" } else { "--" };
                    println!(
                        "{:<14} {} {:<20} {} {}",
                        t.event_kind, t.state_from, marker, t.state_to, t.latency_ms
                    );
                }
                ObservationRecord::Invocation(i) => {
                    println!(
                        "tool {:<12} attempt={} outcome={} {}ms",
                        i.tool_name, i.attempt, i.outcome_code, i.latency_ms
                    );
                }
            }
        }
    });

    let run = tokio::spawn(async move {
        engine.run().await.map(|()| engine)
    });

    for entry in script {
        if entry.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(entry.delay_ms)).await;
        }
        sender.enqueue(Event::new(entry.event, entry.source, TraceId::new()))?;
    }

    let engine = run.await?.context("engine run")?;
    drop(sender);
    printer.abort();

    println!();
    println!("final state: {}", engine.current_state());
    println!("turns recorded: {}", engine.context().history.len());
    for turn in &engine.context().history {
        println!("  [{:?}] {}", turn.role, turn.content);
    }
    println!(
        "suppressed interrupts: {}",
        engine.suppressed_interrupts()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CONFAB_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config)?;

    match args.command {
        Command::Validate => validate(&config),
        Command::Simulate { script } => simulate(config, script).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_entry_parses() {
        let raw = r#"
        [
            { "source": "Operator", "event": { "type": "call_start" } },
            { "source": "Stt",
              "event": { "type": "stt_final", "text": "book a flight" },
              "delay_ms": 50 },
            { "source": "Operator", "event": { "type": "call_end" } }
        ]
        "#;
        let script: Vec<ScriptEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(script.len(), 3);
        assert_eq!(script[0].delay_ms, 0);
        assert_eq!(script[1].delay_ms, 50);
        assert_eq!(script[1].event.kind_name(), "stt_final");
    }

    #[test]
    fn validate_runs_against_defaults() {
        validate(&ConfabConfig::default()).unwrap();
    }
}
