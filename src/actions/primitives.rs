use crate::actions::StepResult;
use crate::core::{BrowserTrait, PageContext};
use crate::errors::{PublishError, Result};
use crate::locator::{LocatorResolver, LocatorSpec};
use crate::types::{ClickMode, ElementHandle};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Split `value` into ordered pieces of at most `size` characters. Splits
/// fall on char boundaries, so multi-byte text is never cut mid-character.
pub fn chunk(value: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (offset, _) in value.char_indices() {
        if count == size {
            chunks.push(&value[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if start < value.len() {
        chunks.push(&value[start..]);
    }
    chunks
}

async fn fill_resolved<B: BrowserTrait>(
    ctx: &PageContext<'_, B>,
    spec: &LocatorSpec,
    value: &str,
) -> Result<(StepResult, ElementHandle)> {
    let started = Instant::now();

    for (index, candidate) in spec.candidates.iter().enumerate() {
        let Some(handle) = LocatorResolver::await_candidate(ctx, &spec.target, index, candidate).await else {
            continue;
        };
        match ctx.browser.fill(ctx.tab, &handle, value).await {
            Ok(()) => {
                info!("Filled {} using strategy #{}", spec.target, index);
                return Ok((StepResult::success(&spec.target, index, started.elapsed()), handle));
            }
            Err(e) => debug!("{} rejected the value via strategy #{}: {}", spec.target, index, e),
        }
    }

    Err(PublishError::FillFailed {
        target: spec.target.clone(),
    })
}

/// Set the value of the first candidate that accepts it.
pub async fn fill_text<B: BrowserTrait>(
    ctx: &PageContext<'_, B>,
    spec: &LocatorSpec,
    value: &str,
) -> Result<StepResult> {
    fill_resolved(ctx, spec, value).await.map(|(step, _)| step)
}

/// Fill, then submit `key` on the same element. Used for tag entry.
pub async fn fill_and_press<B: BrowserTrait>(
    ctx: &PageContext<'_, B>,
    spec: &LocatorSpec,
    value: &str,
    key: &str,
) -> Result<StepResult> {
    let (step, handle) = fill_resolved(ctx, spec, value).await?;
    press_key(ctx, &handle, key).await?;
    Ok(step)
}

/// Type `value` into the target in chunks, as a user pasting a long text in
/// pieces would.
pub async fn type_chunked<B: BrowserTrait>(
    ctx: &PageContext<'_, B>,
    spec: &LocatorSpec,
    value: &str,
    chunk_size: usize,
    inter_chunk_delay: Duration,
) -> Result<StepResult> {
    let started = Instant::now();
    let resolved = LocatorResolver::resolve(ctx, spec).await?;

    if let Err(e) = ctx
        .browser
        .click(ctx.tab, &resolved.handle, ClickMode::Normal)
        .await
    {
        debug!("Focus click on {} failed, typing anyway: {}", spec.target, e);
    }
    ctx.settle(ctx.timing.focus_settle_ms).await;

    let key_delay = Duration::from_millis(ctx.timing.type_delay_ms);
    let chunks = chunk(value, chunk_size);
    let total = chunks.len();

    for (i, piece) in chunks.into_iter().enumerate() {
        if i > 0 && !inter_chunk_delay.is_zero() {
            tokio::time::sleep(inter_chunk_delay).await;
        }
        ctx.browser
            .insert_text(ctx.tab, &resolved.handle, piece, key_delay)
            .await
            .map_err(|e| {
                warn!("Typing chunk {}/{} into {} failed: {}", i + 1, total, spec.target, e);
                PublishError::FillFailed {
                    target: spec.target.clone(),
                }
            })?;
        debug!("Typed chunk {}/{} into {}", i + 1, total, spec.target);
    }

    info!(
        "Typed {} characters into {} in {} chunks",
        value.chars().count(),
        spec.target,
        total
    );
    Ok(StepResult::success(
        &spec.target,
        resolved.strategy_index,
        started.elapsed(),
    ))
}

/// Attach a file. Never fails the run: every problem becomes a warning and an
/// unsuccessful step.
pub async fn upload_file<B: BrowserTrait>(
    ctx: &PageContext<'_, B>,
    spec: &LocatorSpec,
    path: &Path,
) -> StepResult {
    let started = Instant::now();

    if !path.is_file() {
        warn!("{} skipped: {} does not exist", spec.target, path.display());
        return StepResult::failure(&spec.target, started.elapsed());
    }

    let resolved = match LocatorResolver::resolve(ctx, spec).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("{} skipped: {}", spec.target, e);
            return StepResult::failure(&spec.target, started.elapsed());
        }
    };

    match ctx
        .browser
        .set_input_files(ctx.tab, &resolved.handle, &[path.to_path_buf()])
        .await
    {
        Ok(()) => {
            info!("Attached {} to {}", path.display(), spec.target);
            StepResult::success(&spec.target, resolved.strategy_index, started.elapsed())
        }
        Err(e) => {
            warn!("Attaching {} failed: {}", path.display(), e);
            StepResult::failure(&spec.target, started.elapsed())
        }
    }
}

pub async fn click<B: BrowserTrait>(
    ctx: &PageContext<'_, B>,
    spec: &LocatorSpec,
    mode: ClickMode,
) -> Result<StepResult> {
    let started = Instant::now();
    let resolved = LocatorResolver::resolve(ctx, spec).await?;
    ctx.browser.click(ctx.tab, &resolved.handle, mode).await?;
    debug!("Clicked {} ({:?})", spec.target, mode);
    Ok(StepResult::success(
        &spec.target,
        resolved.strategy_index,
        started.elapsed(),
    ))
}

pub async fn press_key<B: BrowserTrait>(
    ctx: &PageContext<'_, B>,
    handle: &ElementHandle,
    key: &str,
) -> Result<()> {
    ctx.browser.press_key(ctx.tab, handle, key).await
}
