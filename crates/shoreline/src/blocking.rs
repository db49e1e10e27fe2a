//! Runs synchronous engine calls off the async runtime, bounded by a timeout.

use std::any::Any;
use std::path::PathBuf;
use std::time::Duration;

use engines::driver::{Cancellation, DriverError};
use thiserror::Error;
use tracing::debug;

/// Why a single external call did not produce a result
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    #[error(transparent)]
    Engine(#[from] DriverError),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("engine panicked: {0}")]
    Panicked(String),

    #[error("output {output} is already claimed by {claimed_by}")]
    OutputClaimed { output: PathBuf, claimed_by: PathBuf },
}

/// Run `call` on the blocking thread pool.
///
/// On timeout the call's [`Cancellation`] is raised and this future keeps
/// waiting until the call has actually returned, so a caller bounding its
/// concurrency never has more calls in flight than it admitted. The late
/// result is discarded in favour of [`CallError::TimedOut`].
pub async fn call_blocking<T, F>(timeout: Option<Duration>, call: F) -> Result<T, CallError>
where
    F: FnOnce(&Cancellation) -> Result<T, DriverError> + Send + 'static,
    T: Send + 'static,
{
    let cancel = Cancellation::new();
    let token = cancel.clone();
    let mut handle = tokio::task::spawn_blocking(move || call(&token));

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                cancel.cancel();
                debug!("Engine call exceeded {:?}; waiting for it to stop", limit);
                let _ = handle.await;
                return Err(CallError::TimedOut(limit));
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(result) => result.map_err(CallError::from),
        Err(e) if e.is_panic() => Err(CallError::Panicked(panic_message(e.into_panic()))),
        Err(e) => Err(CallError::Panicked(e.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
