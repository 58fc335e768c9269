//! Drive synthetic traffic through a QoS scheduler and report per-port
//! counters.
//!
//! ```text
//! strata-qos-sim [--config sched.toml] [--ports 4] [--duration-ms 2000]
//!                [--rate-pps 5000] [--size 1200] [--seed 1]
//!                [--set name=value ...]
//! ```

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use strata_qos::{Packet, PortHandle, QosId, QosScheduler, SchedConfig};
use tracing::info;

struct Args {
    config: Option<String>,
    ports: u32,
    duration: Duration,
    rate_pps: u64,
    size: usize,
    seed: Option<u64>,
    overrides: Vec<(String, String)>,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args {
        config: None,
        ports: 4,
        duration: Duration::from_millis(2000),
        rate_pps: 5000,
        size: 1200,
        seed: None,
        overrides: Vec::new(),
    };

    while let Some(arg) = args.next() {
        let mut value = || args.next().with_context(|| format!("missing value for {arg}"));
        match arg.as_str() {
            "--config" => parsed.config = Some(value()?),
            "--ports" => parsed.ports = value()?.parse()?,
            "--duration-ms" => parsed.duration = Duration::from_millis(value()?.parse()?),
            "--rate-pps" => parsed.rate_pps = value()?.parse()?,
            "--size" => parsed.size = value()?.parse()?,
            "--seed" => parsed.seed = Some(value()?.parse()?),
            "--set" => {
                let pair = value()?;
                let (name, val) = pair
                    .split_once('=')
                    .with_context(|| format!("expected name=value, got {pair}"))?;
                parsed.overrides.push((name.to_string(), val.to_string()));
            }
            other => bail!("unknown argument {other}"),
        }
    }
    if parsed.ports == 0 {
        bail!("--ports must be at least 1");
    }
    Ok(parsed)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => {
            let text =
                std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            SchedConfig::from_toml_str(&text)?
        }
        None => SchedConfig::default(),
    };
    let mut qos_ids: Vec<QosId> = config.qos_map.rules().iter().map(|r| r.qos_id).collect();
    if qos_ids.is_empty() {
        qos_ids.push(0);
    }

    let mut sched: QosScheduler<Packet> = QosScheduler::new(config)?;
    if let Some(seed) = args.seed {
        sched.reseed(seed);
    }
    for (name, value) in &args.overrides {
        sched.set_parameter(name, value)?;
    }
    let ports: Vec<PortHandle> = (0..args.ports)
        .map(|id| sched.create_port_state(id))
        .collect::<Result<_, _>>()?;

    info!(
        ports = args.ports,
        rate_pps = args.rate_pps,
        size = args.size,
        duration_ms = args.duration.as_millis() as u64,
        "simulation started"
    );

    let tick = Duration::from_millis(1);
    let per_tick = (args.rate_pps / 1000).max(1);
    let start = Instant::now();
    let mut seq = 0usize;
    let mut released = 0u64;

    while start.elapsed() < args.duration {
        for &port in &ports {
            for _ in 0..per_tick {
                let qos_id = qos_ids[seq % qos_ids.len()];
                seq += 1;
                let _ = sched.enqueue(port, Packet::zeroed(qos_id, args.size))?;
            }
            while sched.dequeue(port).is_some() {
                released += 1;
            }
        }
        std::thread::sleep(tick);
    }

    for &port in &ports {
        let Some(state) = sched.port(port) else {
            continue;
        };
        let stats = state.stats();
        info!(
            port = state.port_id(),
            enqueued = stats.enqueued,
            dequeued = stats.dequeued,
            congestion_drops = stats.congestion_drops,
            pool_drops = stats.pool_drops,
            migrated = stats.migrated,
            migration_drops = stats.migration_drops,
            ecn_marked = stats.ecn_marked,
            backlog = state.count(),
            "port summary"
        );
    }

    let discarded = sched.shutdown();
    info!(released, discarded, "simulation finished");
    Ok(())
}
