use tokio::task::JoinSet;

use crate::config::BurstShape;
use crate::error::Result;

use super::RunContext;

/// Split `total` messages across `workers` batches, earlier batches taking the remainder.
///
/// Batches are never empty: with more workers than messages, only `total` batches are returned.
#[must_use]
pub fn partition_batches(total: u64, workers: u64) -> Vec<u64> {
    if total == 0 || workers == 0 {
        return Vec::new();
    }

    let workers = workers.min(total);
    let base = total / workers;
    let extra = total % workers;

    (0..workers)
        .map(|i| base + u64::from(i < extra))
        .collect()
}

pub(super) async fn run(ctx: &RunContext, shape: &BurstShape) -> Result<()> {
    let batches = partition_batches(shape.messages, shape.workers);
    tracing::info!(
        messages = shape.messages,
        workers = batches.len(),
        "burst starting"
    );

    let mut workers = JoinSet::new();
    let mut offset = 0u64;
    for batch in batches {
        let ctx = ctx.clone();
        let pause = shape.pause;
        let first = offset;
        offset += batch;

        workers.spawn(async move {
            for index in first..first + batch {
                let target = ctx.target(index);
                ctx.metrics.record_attempt_started().await;
                ctx.execute(target).await;
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
        });
    }

    while let Some(res) = workers.join_next().await {
        res?;
    }

    Ok(())
}
