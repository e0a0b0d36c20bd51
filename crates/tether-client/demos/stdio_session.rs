//! Connect to an MCP server over stdio, list what it offers, and call a tool.
//!
//! ```text
//! cargo run -p tether-client --example stdio_session -- <server-command> [args...] [--call <tool> <json-args>]
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=tether_client=debug` for frame-level detail.

use std::error::Error;

use serde_json::Value;
use tether_client::{CallOptions, CapabilityKind, ServerNotification, Session, ToolPolicy};
use tether_transport::StdioTransport;
use tokio::process::Command;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let call = match args.iter().position(|a| a == "--call") {
        Some(at) => {
            let rest = args.split_off(at);
            let tool = rest.get(1).ok_or("--call needs a tool name")?.clone();
            let arguments: Value = match rest.get(2) {
                Some(raw) => serde_json::from_str(raw)?,
                None => Value::Null,
            };
            Some((tool, arguments))
        }
        None => None,
    };
    let (program, program_args) = args
        .split_first()
        .ok_or("usage: stdio_session <server-command> [args...] [--call <tool> <json>]")?;

    let mut command = Command::new(program);
    command.args(program_args);
    let transport = StdioTransport::spawn(&mut command)?;

    let session = Session::builder()
        .with_client_info("tether-demo", env!("CARGO_PKG_VERSION"))
        .with_approval_gate(ToolPolicy::new().deny_destructive(true))
        .build();
    session.connect(Box::new(transport)).await?;

    if let Some(info) = session.server_info() {
        eprintln!("Connected to {} {}", info.name, info.version);
    }

    let mut notifications = session.subscribe();
    tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            if let ServerNotification::LogMessage(log) = notification {
                eprintln!("[server {}] {}", log.level, log.data);
            }
        }
    });

    session.discover_all().await?;
    for kind in CapabilityKind::ALL {
        for descriptor in session.list_cached(kind) {
            println!(
                "{kind:<9} {:<32} {}",
                descriptor.key(),
                descriptor.description().unwrap_or("")
            );
        }
    }

    if let Some((tool, arguments)) = call {
        match session.call_tool(&tool, arguments, CallOptions::new()).await {
            Ok(outcome) if outcome.is_success() => println!("{}", outcome.text()),
            Ok(outcome) => eprintln!("{tool} reported failure: {}", outcome.text()),
            Err(e) => eprintln!("{tool}: {e}"),
        }
    }

    session.close().await?;
    Ok(())
}
