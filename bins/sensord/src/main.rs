use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{info, warn};

use node_core::cfg::{self, AppId};
use node_core::job::{activation, ArgList, JobRecord, OutSlot};
use node_core::{clock, logx, JobManager};

mod intake;

const APP: AppId = AppId {
    qualifier: "com",
    organization: "local",
    application: env!("CARGO_PKG_NAME"),
};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), version, about = "Sensor node job daemon")]
struct Cli {
    /// Run this many scheduler ticks, then exit (0 = run until ctrl-c).
    #[arg(long, default_value_t = 0)]
    ticks: u64,
    /// TCP request intake address override (e.g. 127.0.0.1:7171).
    #[arg(long)]
    listen: Option<String>,
    /// Log level override (info,debug,trace).
    #[arg(long)]
    log: Option<String>,
}

fn ping(params: ArgList<'_>, _out: OutSlot<'_>) {
    let tag = params.first().and_then(|p| p.as_str()).unwrap_or("-");
    info!(tag, "pong");
}

fn uptime(_params: ArgList<'_>, out: OutSlot<'_>) {
    let ms = clock::relative();
    info!(ms, "uptime");
    if let Some(slot) = out.and_then(|o| o.downcast_mut::<u64>()) {
        *slot = ms;
    }
}

fn heartbeat(_params: ArgList<'_>, _out: OutSlot<'_>) {
    info!("heartbeat");
}

fn register_builtin_jobs(manager: &mut JobManager) -> Result<()> {
    manager.add_job("ping", JobRecord::new(ping))?;
    manager.add_job("uptime", JobRecord::new(uptime))?;
    manager.add_job(
        "heartbeat",
        JobRecord::new(heartbeat).with_activation(activation::every(5_000)),
    )?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = cfg::load_or_init(&APP)?;
    logx::init(cli.log.as_deref().unwrap_or(&cfg.log_level));

    info!("{} boot", APP.application);

    let mut manager = JobManager::init(cfg.max_name_size, cfg.max_json_tokens)?;
    clock::set_base(clock::now());
    register_builtin_jobs(&mut manager)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (request_tx, mut requests) = mpsc::channel::<intake::Request>(16);

    let listen = cli
        .listen
        .or_else(|| (!cfg.listen_addr.is_empty()).then(|| cfg.listen_addr.clone()));
    if let Some(addr) = listen {
        let rx = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(error) = intake::listen(addr, request_tx, rx).await {
                warn!(%error, "request intake failed");
            }
        });
    } else {
        drop(request_tx);
    }

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    let mut tick = interval(Duration::from_millis(cfg.tick_ms));
    let mut shutdown = shutdown_rx;
    let mut ticked: u64 = 0;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(error) = manager.queue_scheduled_jobs() {
                    warn!(%error, "scheduler pass failed");
                }
                if let Err(error) = manager.execute_queued_job() {
                    warn!(%error, "queued job failed");
                }
                ticked += 1;
                if cli.ticks > 0 && ticked >= cli.ticks {
                    info!(ticked, "tick budget reached");
                    break;
                }
            }
            Some(request) = requests.recv() => {
                let result = manager.request_job(&request.json, None);
                let _ = request.reply.send(result.map_err(|e| e.to_string()));
            }
            changed = shutdown.changed() => {
                if changed.is_ok() && *shutdown.borrow() {
                    info!("stopping");
                    break;
                }
            }
        }
    }

    manager.close();
    Ok(())
}
