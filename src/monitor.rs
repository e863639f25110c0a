//! Continuous measurement logging.
//!
//! There is no sampling timer: each tick starts as soon as the previous one
//! finishes, so the rate is whatever the device round trips allow (about
//! 1 Hz on a 2220-30-1).
//!
//! # Cancel Safety
//! The shutdown future is only raced against [`Keithley2220::sample`]. A
//! shutdown that lands mid-sample drops that sample; the row for a finished
//! sample is always written and flushed as a single buffer before shutdown is
//! looked at again, so the log never ends in a partial row.

use crate::instrument::Keithley2220;
use crate::report::{log_header, log_row, sample_row};
use crate::shutdown;
use crate::transport::Transport;
use anyhow::{Context, Result};
use std::fs::File;
use std::future::Future;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Stream samples to stdout and `sink` until `shutdown` resolves. Returns the
/// number of rows written.
pub async fn run<T, W, F>(inst: &mut Keithley2220<T>, sink: &mut W, shutdown: F) -> Result<u64>
where
    T: Transport,
    W: Write,
    F: Future<Output = ()>,
{
    sink.write_all(log_header().as_bytes())
        .context("failed to write log header")?;
    sink.flush()?;

    tokio::pin!(shutdown);
    let mut rows = 0;
    loop {
        let sample = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            sample = inst.sample() => sample?,
        };

        println!("{}", sample_row(&sample));
        let row = log_row(unix_time(), &sample);
        sink.write_all(row.as_bytes())
            .context("failed to append log row")?;
        sink.flush()?;
        rows += 1;
    }

    info!("monitor stopped after {rows} samples");
    Ok(rows)
}

/// Log to a freshly truncated file at `path` until Ctrl-C.
pub async fn record<T: Transport>(inst: &mut Keithley2220<T>, path: &Path) -> Result<u64> {
    let mut file = File::create(path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;
    info!("monitoring to {} (Ctrl-C to stop)", path.display());
    run(inst, &mut file, shutdown::interrupted()).await
}

fn unix_time() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
