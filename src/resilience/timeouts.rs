//! Per-attempt deadline enforcement.
//!
//! # Responsibilities
//! - Bound how long one downstream attempt may suspend the caller
//! - Catch panics raised by the attempt so they become ordinary failures
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the abandoned future is dropped
//! - Timeout and thrown failures are distinct variants but are recorded alike

use futures_util::FutureExt;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use super::fallback::DownstreamError;

/// Run one attempt under `deadline`, converting every failure into a
/// [`DownstreamError`].
pub async fn run_attempt<T, E, Fut>(deadline: Duration, attempt: Fut) -> Result<T, DownstreamError>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    match tokio::time::timeout(deadline, AssertUnwindSafe(attempt).catch_unwind()).await {
        Err(_) => Err(DownstreamError::Timeout(deadline)),
        Ok(Err(panic)) => Err(DownstreamError::Thrown(panic_message(panic.as_ref()))),
        Ok(Ok(Err(e))) => Err(DownstreamError::Thrown(e.to_string())),
        Ok(Ok(Ok(value))) => Ok(value),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
