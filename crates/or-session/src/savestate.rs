//! Save-state handoff through transient files

use crate::events::{EventDispatcher, StateJob};
use or_core::{Result, SessionError};
use or_engine::Engine;
use std::io::Write;
use std::time::Duration;
use tempfile::TempPath;

fn transient_path() -> std::io::Result<TempPath> {
    Ok(tempfile::Builder::new()
        .prefix("or-state-")
        .suffix(".st")
        .tempfile()?
        .into_temp_path())
}

fn await_completion(
    dispatcher: &EventDispatcher,
    job: StateJob,
    timeout: Duration,
) -> Result<()> {
    match dispatcher.wait_state_job(job, timeout) {
        Some(true) => Ok(()),
        Some(false) => Err(SessionError::EngineRejected(match job {
            StateJob::Save => "state save".to_string(),
            StateJob::Load => "state load".to_string(),
        })),
        None => {
            tracing::warn!("No {:?} completion within {:?}, continuing", job, timeout);
            Ok(())
        }
    }
}

/// Have the engine write a state and return its bytes
pub(crate) fn save(
    engine: &dyn Engine,
    dispatcher: &EventDispatcher,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let path = transient_path()?;
    dispatcher.drain_state_jobs();
    engine.save_state(&path)?;
    await_completion(dispatcher, StateJob::Save, timeout)?;

    let bytes = std::fs::read(&path)?;
    if bytes.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "engine wrote an empty state",
        )
        .into());
    }
    tracing::debug!("Saved state ({} bytes)", bytes.len());
    Ok(bytes)
}

/// Hand `bytes` to the engine as a state to restore
pub(crate) fn load(
    engine: &dyn Engine,
    dispatcher: &EventDispatcher,
    bytes: &[u8],
    timeout: Duration,
) -> Result<()> {
    let mut file = tempfile::Builder::new()
        .prefix("or-state-")
        .suffix(".st")
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    let path = file.into_temp_path();

    dispatcher.drain_state_jobs();
    engine.load_state(&path)?;
    await_completion(dispatcher, StateJob::Load, timeout)?;
    tracing::debug!("Loaded state ({} bytes)", bytes.len());
    Ok(())
}
