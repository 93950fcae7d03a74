// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    api::{
        Platform,
        models::{Batch, BatchStatusClass, ProjectId},
    },
    errors::WaitError,
    signal::{SignalHandler, SignalHandlerKind},
    supervise::{BatchSelector, locate_batch},
    time::stopwatch,
};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Polls a batch until it reaches a terminal status, returning the batch in
/// that state.
///
/// The timeout is soft: it is checked after each poll, so even a zero timeout
/// observes the batch's status at least once. A shutdown signal issues a
/// best-effort cancel to the platform before reporting the interruption.
pub async fn wait_for_completion(
    platform: &dyn Platform,
    project_id: ProjectId,
    selector: &BatchSelector,
    timeout: Duration,
    poll_interval: Duration,
    signal_kind: SignalHandlerKind,
) -> Result<Batch, WaitError> {
    let mut signal_handler = signal_kind.build()?;
    wait_with_handler(
        platform,
        project_id,
        selector,
        timeout,
        poll_interval,
        &mut signal_handler,
    )
    .await
}

/// Waiter body. The supervisor passes in its own handler so that signals
/// arriving between generations are not dropped.
pub(crate) async fn wait_with_handler(
    platform: &dyn Platform,
    project_id: ProjectId,
    selector: &BatchSelector,
    timeout: Duration,
    poll_interval: Duration,
    signal_handler: &mut SignalHandler,
) -> Result<Batch, WaitError> {
    let stopwatch = stopwatch();

    loop {
        let batch = locate_batch(platform, project_id, selector).await?;
        let Some(status) = batch.status.clone() else {
            return Err(WaitError::MissingStatus {
                batch_id: batch.batch_id,
            });
        };

        match status.classify() {
            BatchStatusClass::TerminalSuccess | BatchStatusClass::TerminalFailure => {
                info!("batch `{}` reached terminal status {status}", batch.batch_id);
                return Ok(batch);
            }
            BatchStatusClass::Unknown => {
                return Err(WaitError::UnknownStatus {
                    batch_id: batch.batch_id,
                    value: status.to_string(),
                });
            }
            BatchStatusClass::InFlight => {
                let elapsed = stopwatch.snapshot().duration;
                if elapsed > timeout {
                    return Err(WaitError::Timeout {
                        last_status: status.to_string(),
                        last_batch: Box::new(batch),
                    });
                }
                debug!(
                    "batch `{}` status {status}, polling again in {poll_interval:?} \
                     (elapsed: {elapsed:?})",
                    batch.batch_id,
                );
                tokio::select! {
                    _ = sleep(poll_interval) => {}
                    Some(event) = signal_handler.recv() => {
                        info!(
                            "received {}, cancelling batch `{}`",
                            event.name(),
                            batch.batch_id,
                        );
                        // Best effort. The user asked to stop; a failed
                        // cancel must not mask the interruption.
                        if let Err(err) = platform.cancel_batch(project_id, batch.batch_id).await {
                            warn!("failed to cancel batch `{}`: {err}", batch.batch_id);
                        }
                        return Err(WaitError::Interrupted {
                            batch_id: batch.batch_id,
                        });
                    }
                }
            }
        }
    }
}
