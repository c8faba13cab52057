#![forbid(unsafe_code)]

//! `hub-orchestrator-ctl` — local CLI companion for `hub-orchestrator`.
//!
//! Connects to the daemon's IPC socket and sends JSON commands. The
//! `probe` subcommand runs offline: it classifies terminal text read from
//! stdin against the marker table without contacting the daemon.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

use hub_orchestrator::probe::markers::MarkerTable;
use hub_orchestrator::probe::SessionProbe;
use hub_orchestrator::GlobalConfig;

#[derive(Debug, Parser)]
#[command(
    name = "hub-orchestrator-ctl",
    about = "Local CLI for the hub-orchestrator daemon",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the daemon's `ipc.name` config).
    #[arg(long, default_value = "hub-orchestrator")]
    ipc_name: String,

    /// Shared secret, when the daemon sets `ipc.auth_token`.
    #[arg(long)]
    auth_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the latest fleet summary.
    Fleet,

    /// List projects known to the store.
    Projects,

    /// List live project sessions.
    Sessions,

    /// Request teardown of a project.
    Stop {
        /// Project ID.
        id: String,
    },

    /// Probe terminal text from stdin and print the matched markers.
    Probe {
        /// Config file whose `[[markers]]` extend the built-in table.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Only the last N non-blank lines are inspected.
        #[arg(long, default_value_t = 50)]
        lines: usize,
    },
}

fn main() {
    let args = Cli::parse();

    let mut request_json = match &args.command {
        Command::Fleet => serde_json::json!({ "command": "fleet" }),
        Command::Projects => serde_json::json!({ "command": "projects" }),
        Command::Sessions => serde_json::json!({ "command": "sessions" }),
        Command::Stop { id } => serde_json::json!({ "command": "stop", "id": id }),
        Command::Probe { config, lines } => {
            if let Err(err) = run_probe(config.as_ref(), *lines) {
                eprintln!("Error: {err}");
                std::process::exit(1);
            }
            return;
        }
    };

    if let Some(ref token) = args.auth_token {
        request_json["auth_token"] = serde_json::Value::String(token.clone());
    }

    match send_ipc_command(&args.ipc_name, &request_json) {
        Ok(response) => {
            if let Some(obj) = response.as_object() {
                let ok = obj
                    .get("ok")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if ok {
                    if let Some(data) = obj.get("data") {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    } else {
                        println!("OK");
                    }
                } else {
                    let err_msg = obj
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    eprintln!("Error: {err_msg}");
                    std::process::exit(1);
                }
            } else {
                println!("{response}");
            }
        }
        Err(err) => {
            eprintln!("Failed to connect to daemon: {err}");
            eprintln!("Is hub-orchestrator running with ipc name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
    }
}

/// Classify stdin against the marker table and print the signal as JSON.
fn run_probe(
    config: Option<&PathBuf>,
    lines: usize,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let table = match config {
        Some(path) => MarkerTable::with_overrides(&GlobalConfig::load_from_path(path)?.markers)?,
        None => MarkerTable::builtin()?,
    };

    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;

    let probe = SessionProbe::new(table, lines);
    let signal = probe.probe(&raw, Utc::now());
    let answer = probe
        .table()
        .first_answer(&signal.stuck_markers)
        .map(|(marker, answer)| serde_json::json!({ "marker": marker, "answer": answer }));

    let report = serde_json::json!({
        "empty": signal.is_empty(),
        "stuck_markers": signal.stuck_markers,
        "dead_markers": signal.dead_markers,
        "answer": answer,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Connect to the IPC socket, send a JSON command, and read the response.
fn send_ipc_command(
    ipc_name: &str,
    request: &serde_json::Value,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;
    Ok(response)
}
