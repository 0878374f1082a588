use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::browser::wait::WaitSettings;
use crate::browser::PageDriver;
use crate::clock::Clock;
use crate::error::{Result, ScrapingError};

pub type SessionId = Uuid;

/// Exclusive access to the live driver. Drop it before calling `restart`.
pub type DriverGuard<'a> = MappedMutexGuard<'a, Box<dyn PageDriver>>;

/// Fixed browser configuration applied to every session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub page_load_timeout: Duration,
    pub element_wait: WaitSettings,
    pub launch_attempts: u32,
    pub launch_backoff: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            page_load_timeout: Duration::from_secs(300),
            element_wait: WaitSettings::default(),
            launch_attempts: 3,
            launch_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Uninitialized,
    Active,
    Failed,
    Terminated,
}

/// Starts browser sessions. One launch is one attempt; the manager retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn launch(&self, settings: &SessionSettings) -> Result<Box<dyn PageDriver>>;
}

/// One live browser connection and where it is in its lifecycle.
pub struct ScrapeSession {
    id: SessionId,
    state: SessionState,
    driver: Option<Box<dyn PageDriver>>,
    started_at: Option<DateTime<Utc>>,
}

impl ScrapeSession {
    fn new() -> Self {
        Self {
            id: Uuid::nil(),
            state: SessionState::Uninitialized,
            driver: None,
            started_at: None,
        }
    }

    fn activate(&mut self, driver: Box<dyn PageDriver>) {
        self.id = Uuid::new_v4();
        self.state = SessionState::Active;
        self.driver = Some(driver);
        self.started_at = Some(Utc::now());
    }
}

/// Owns the single browser session of a run.
///
/// Collectors and extractors borrow the driver through [`SessionManager::session`]
/// for one attempt at a time. A restart replaces the driver, so anything held
/// from before the restart must be fetched again.
pub struct SessionManager {
    factory: Arc<dyn SessionFactory>,
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    session: Mutex<ScrapeSession>,
    restarts: AtomicU32,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn SessionFactory>, settings: SessionSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            factory,
            settings,
            clock,
            session: Mutex::new(ScrapeSession::new()),
            restarts: AtomicU32::new(0),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state
    }

    pub async fn session_id(&self) -> SessionId {
        self.session.lock().await.id
    }

    pub fn restart_count(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }

    /// Start a session unless one is already active.
    pub async fn acquire(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.state == SessionState::Active {
            return Ok(());
        }

        match self.launch_with_retry().await {
            Ok(driver) => {
                session.activate(driver);
                info!("Browser session {} is active", session.id);
                Ok(())
            }
            Err(e) => {
                session.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Borrow the active driver.
    pub async fn session(&self) -> Result<DriverGuard<'_>> {
        let guard = self.session.lock().await;
        MutexGuard::try_map(guard, |session| {
            if session.state == SessionState::Active {
                session.driver.as_mut()
            } else {
                None
            }
        })
        .map_err(|guard| {
            ScrapingError::Driver(format!("No active browser session (state: {:?})", guard.state))
        })
    }

    /// Tear down a broken session and start a fresh one.
    pub async fn restart(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        warn!("Restarting browser session {}", session.id);

        session.state = SessionState::Failed;
        Self::teardown(&mut session).await;

        let driver = self.launch_with_retry().await?;
        session.activate(driver);
        self.restarts.fetch_add(1, Ordering::SeqCst);
        info!("Browser session restarted as {}", session.id);
        Ok(())
    }

    /// Release the browser. Failures are logged, never returned.
    pub async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        Self::teardown(&mut session).await;
        session.state = SessionState::Terminated;
        info!("Browser session manager shut down");
    }

    async fn teardown(session: &mut ScrapeSession) {
        if let Some(mut driver) = session.driver.take() {
            match driver.close().await {
                Ok(()) => info!("Closed browser session {}", session.id),
                Err(e) => warn!("Ignoring error while closing browser session {}: {}", session.id, e),
            }
        }
    }

    async fn launch_with_retry(&self) -> Result<Box<dyn PageDriver>> {
        let attempts = self.settings.launch_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.factory.launch(&self.settings).await {
                Ok(driver) => {
                    info!(
                        attempt,
                        at = %Utc::now().to_rfc3339(),
                        "Browser session initialized on attempt {}",
                        attempt
                    );
                    return Ok(driver);
                }
                Err(e) => {
                    error!(
                        attempt,
                        at = %Utc::now().to_rfc3339(),
                        "Attempt {} failed to initialize browser session: {}",
                        attempt,
                        e
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        self.clock.sleep(self.settings.launch_backoff).await;
                    }
                }
            }
        }

        Err(ScrapingError::SessionInit(format!(
            "Failed to initialize browser session after {} attempts: {}",
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let session = self.session.get_mut();
        if session.state == SessionState::Active {
            warn!(
                "Session manager dropped while session {} (started {:?}) was still active",
                session.id, session.started_at
            );
        }
    }
}
