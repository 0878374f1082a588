use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::error::{Result, ScrapingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Poll `check` until it yields a value or `settings.timeout` elapses.
///
/// The check is always run at least once. Check errors end the wait
/// immediately; running out of time gives `ScrapingError::Timeout`.
pub async fn wait_for<T, F, Fut>(
    clock: &dyn Clock,
    settings: WaitSettings,
    what: &str,
    mut check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let started = clock.now();
    let deadline = started + settings.timeout;
    let mut polls = 0u32;

    loop {
        polls += 1;
        if let Some(value) = check().await? {
            debug!("{} satisfied after {} polls", what, polls);
            return Ok(value);
        }

        let now = clock.now();
        if now >= deadline {
            return Err(ScrapingError::Timeout(format!(
                "{} not satisfied within {:?}",
                what, settings.timeout
            )));
        }
        clock.sleep(settings.poll_interval.min(deadline - now)).await;
    }
}
