use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use node_core::cfg::{self, AppId};
use node_core::job::{ArgList, JobArg, JobRecord, OutSlot};
use node_core::{logx, JobManager};

const APP: AppId = AppId {
    qualifier: "com",
    organization: "local",
    application: env!("CARGO_PKG_NAME"),
};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), version, about = "Sensor job manager control CLI")]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one JSON request array to a running daemon.
    Request {
        /// JSON array, e.g. '["ping", "hello"]'.
        json: String,
        /// Daemon intake address.
        #[arg(long, default_value = "127.0.0.1:7171")]
        addr: String,
    },
    /// Run a self-contained in-process demo.
    Demo,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    logx::init(level);
    let _cfg = cfg::load_or_init(&APP)?;

    match cli.cmd {
        Command::Request { json, addr } => request(&json, &addr),
        Command::Demo => demo(),
    }
}

fn request(json: &str, addr: &str) -> Result<()> {
    serde_json::from_str::<serde_json::Value>(json).context("request must be valid JSON")?;

    let mut stream = TcpStream::connect(addr).with_context(|| format!("connect {addr}"))?;
    let mut reader = BufReader::new(stream.try_clone().context("clone stream")?);
    stream.write_all(json.as_bytes())?;
    stream.write_all(b"\n")?;

    let mut reply = String::new();
    reader.read_line(&mut reply)?;
    let reply = reply.trim();
    if let Some(reason) = reply.strip_prefix("err ") {
        bail!("daemon rejected request: {reason}");
    }
    info!(reply, "daemon answered");
    Ok(())
}

fn add_two(params: ArgList<'_>, out: OutSlot<'_>) {
    let x = params[0].as_int().unwrap_or(0);
    let y = params[1].as_int().unwrap_or(0);
    if let Some(slot) = out.and_then(|o| o.downcast_mut::<i64>()) {
        *slot = x + y;
    }
}

fn demo() -> Result<()> {
    let mut manager = JobManager::init(20, 12)?;
    manager.add_job("sum", JobRecord::new(add_two))?;

    let mut out: i64 = 0;
    manager.perform_job("sum", &[JobArg::Int(40), JobArg::Int(2)], Some(&mut out))?;
    info!(out, "direct call answered");

    manager.request_job("[\"sum\", 20, 3]", None)?;
    info!("json request dispatched");

    manager.delete();
    Ok(())
}
