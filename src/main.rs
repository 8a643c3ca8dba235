use std::{env, path::PathBuf};

use anyhow::{Context, bail};
use log::{info, warn};
use tokio::{signal, task};

use pass_orchestra::TrainingConfig;

const CONFIG_VAR: &str = "PASS_ORCHESTRA_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = match env::args_os().nth(1).or_else(|| env::var_os(CONFIG_VAR)) {
        Some(path) => PathBuf::from(path),
        None => bail!("usage: pass-orchestra <config.json> (or set {CONFIG_VAR})"),
    };

    let config = TrainingConfig::load(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    let session = pass_orchestra::train(&config).context("failed to prepare the session")?;
    let stop = session.stop_handle();

    let mut training = task::spawn_blocking(move || session.run());

    let report = tokio::select! {
        joined = &mut training => joined,
        _ = signal::ctrl_c() => {
            info!("received SIGINT, wrapping up...");
            stop.stop();
            training.await
        }
    }
    .context("training task failed")?
    .context("training failed")?;

    let episodes = report.episodes.len().max(1) as f64;
    let mean_speedup = report.episodes.iter().map(|e| e.speedup).sum::<f64>() / episodes;
    let rejected: u64 = report.workers.iter().map(|w| w.rows_rejected).sum();

    if rejected > 0 {
        warn!("{rejected} rows arrived after their batch was complete");
    }

    info!(
        "done: episodes={} updates={} mean_speedup={mean_speedup:.4}",
        report.episodes.len(),
        report.updates.len()
    );

    Ok(())
}
