use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::SustainedShape;
use crate::error::{Error, Result};

use super::RunContext;

pub(super) async fn run(ctx: &RunContext, shape: &SustainedShape) -> Result<()> {
    let interval = shape.interval()?;
    tracing::info!(
        duration = ?shape.duration,
        rate = shape.rate,
        max_in_flight = shape.max_in_flight,
        "sustained run starting"
    );

    let permits = Arc::new(Semaphore::new(shape.max_in_flight));
    let mut sessions = JoinSet::new();
    let mut launched = 0u64;

    let deadline = shape.deadline().ok_or(Error::InvalidDuration)?;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if Instant::now() >= deadline {
            break;
        }

        // Reap finished sessions so the set does not grow with the run length.
        while let Some(res) = sessions.try_join_next() {
            res?;
        }

        let Ok(permit) = permits.clone().try_acquire_owned() else {
            tracing::debug!(in_flight = sessions.len(), "in-flight cap reached, dropping launch");
            ctx.metrics.record_dropped().await;
            continue;
        };

        let index = launched;
        launched += 1;

        ctx.metrics.record_attempt_started().await;
        let ctx = ctx.clone();
        sessions.spawn(async move {
            let _permit = permit;
            let target = ctx.target(index);
            ctx.execute(target).await;
        });
    }

    tracing::info!(
        launched,
        in_flight = sessions.len(),
        grace = ?shape.grace,
        "send window closed, draining"
    );

    drain(ctx, &mut sessions, shape).await
}

async fn drain(ctx: &RunContext, sessions: &mut JoinSet<()>, shape: &SustainedShape) -> Result<()> {
    let drained = tokio::time::timeout(shape.grace, async {
        while let Some(res) = sessions.join_next().await {
            res?;
        }
        Ok::<_, crate::Error>(())
    })
    .await;

    match drained {
        Ok(res) => res,
        Err(_) => {
            sessions.abort_all();

            let mut abandoned = 0u64;
            while let Some(res) = sessions.join_next().await {
                match res {
                    Ok(()) => {}
                    Err(err) if err.is_cancelled() => abandoned += 1,
                    Err(err) => return Err(err.into()),
                }
            }

            if abandoned > 0 {
                tracing::warn!(abandoned, "sessions still running after grace period were cancelled");
                ctx.metrics.record_abandoned(abandoned).await;
            }
            Ok(())
        }
    }
}
