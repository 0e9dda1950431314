//! Blocking bridge over the asynchronous agent call.
//!
//! The controller is synchronous, but the agent is async and the caller may
//! already be running inside a tokio runtime (the CLI drives the controller
//! from its own `#[tokio::main]`). [`run`] works in all three situations:
//!
//! - no runtime on this thread: a current-thread runtime is created, the
//!   operation runs to completion and the runtime is dropped;
//! - inside a multi-thread runtime: the worker is handed off with
//!   `block_in_place` and the operation is driven on the same runtime;
//! - inside a current-thread runtime: that runtime cannot be re-entered from
//!   its own thread, so the operation runs on a scoped helper thread with a
//!   private runtime while the caller blocks.
//!
//! Errors from the operation are returned unmodified. No retry, no timeout.

use std::future::Future;
use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tracing::debug;

/// Run `operation` to completion and return its result.
///
/// `E` must absorb `std::io::Error`, which is only produced when a runtime
/// cannot be created. A panic inside the operation resumes on the caller.
pub fn run<F, Fut, T, E>(operation: F) -> Result<T, E>
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T, E>>,
    T: Send,
    E: From<std::io::Error> + Send,
{
    match Handle::try_current() {
        Err(_) => {
            debug!("No runtime on this thread, creating one for the agent call");
            run_on_fresh_runtime(operation)
        }
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            debug!("Driving agent call on the caller's multi-thread runtime");
            tokio::task::block_in_place(|| handle.block_on(operation()))
        }
        Ok(_) => {
            debug!("Caller owns a current-thread runtime, using a helper thread");
            std::thread::scope(|s| {
                let worker = s.spawn(|| run_on_fresh_runtime(operation));
                match worker.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            })
        }
    }
}

fn run_on_fresh_runtime<F, Fut, T, E>(operation: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<std::io::Error>,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(operation())
}
