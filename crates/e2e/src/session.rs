//! Guaranteed release of a browser session

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{info, warn};

use crate::driver::Page;
use crate::error::{E2eError, E2eResult};

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl-C handler unavailable: {}", e);
        futures::future::pending::<()>().await;
    }
}

/// Run `body` with the page, then close the page exactly once.
///
/// Close happens whether the body succeeds, fails, panics or the process
/// receives Ctrl-C. A panic resumes after the session is closed.
pub async fn run_guarded<P, F, Fut, T>(page: P, body: F) -> E2eResult<T>
where
    P: Page,
    F: FnOnce(Arc<P>) -> Fut,
    Fut: Future<Output = E2eResult<T>>,
{
    let page = Arc::new(page);

    let outcome = {
        let work = AssertUnwindSafe(body(Arc::clone(&page))).catch_unwind();
        tokio::select! {
            result = work => result,
            _ = interrupted() => {
                warn!("Interrupted, closing browser session");
                Ok(Err(E2eError::Interrupted))
            }
        }
    };

    match page.close().await {
        Ok(()) => info!("Browser session closed"),
        Err(e) => warn!("Closing browser session failed: {}", e),
    }

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
