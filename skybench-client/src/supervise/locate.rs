// Copyright (c) The skybench Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    api::{
        Platform,
        models::{Batch, ProjectId},
    },
    errors::{ApiError, LocateError},
    supervise::BatchSelector,
};
use tracing::debug;

/// Resolves a selector to the batch it designates.
///
/// Identifiers resolve with a single fetch. Names walk the project's batch
/// list, which the platform returns newest-first, and stop at the first exact
/// match, so a reused name resolves to the most recently created batch
/// carrying it.
pub async fn locate_batch(
    platform: &dyn Platform,
    project_id: ProjectId,
    selector: &BatchSelector,
) -> Result<Batch, LocateError> {
    match selector {
        BatchSelector::ById(batch_id) => match platform.get_batch(project_id, *batch_id).await {
            Ok(batch) => Ok(batch),
            Err(ApiError::NotFound { .. }) => Err(LocateError::NotFound {
                project_id,
                selector: selector.clone(),
            }),
            Err(err) => Err(err.into()),
        },
        BatchSelector::ByName(name) => {
            let mut page_token: Option<String> = None;
            loop {
                let page = platform
                    .list_batches(project_id, page_token.as_deref())
                    .await?;
                let next = page.next_token().map(str::to_owned);
                if let Some(batch) = page
                    .batches
                    .into_iter()
                    .find(|batch| batch.friendly_name.as_deref() == Some(name.as_str()))
                {
                    debug!("resolved batch {selector} to `{}`", batch.batch_id);
                    return Ok(batch);
                }
                match next {
                    Some(token) => page_token = Some(token),
                    None => {
                        return Err(LocateError::NotFound {
                            project_id,
                            selector: selector.clone(),
                        });
                    }
                }
            }
        }
    }
}
