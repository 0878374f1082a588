use std::sync::Arc;
use std::time::Duration;

use crate::browser::manager::{MockSessionFactory, SessionFactory, SessionManager, SessionSettings, SessionState};
use crate::browser::mock::FakeBrowser;
use crate::browser::{MockPageDriver, PageDriver};
use crate::clock::ManualClock;
use crate::error::ScrapingError;

fn manager_with(factory: Arc<dyn SessionFactory>, clock: Arc<ManualClock>) -> SessionManager {
    SessionManager::new(factory, SessionSettings::default(), clock)
}

#[test]
fn test_default_session_settings() {
    let settings = SessionSettings::default();

    assert!(settings.headless);
    assert_eq!(settings.page_load_timeout, Duration::from_secs(300));
    assert_eq!(settings.element_wait.timeout, Duration::from_secs(30));
    assert_eq!(settings.launch_attempts, 3);
    assert_eq!(settings.launch_backoff, Duration::from_secs(5));
}

#[tokio::test]
async fn test_acquire_gives_up_after_three_attempts() {
    let mut factory = MockSessionFactory::new();
    factory
        .expect_launch()
        .times(3)
        .returning(|_| Err(ScrapingError::Driver("chrome executable not found".to_string())));

    let clock = Arc::new(ManualClock::new());
    let manager = manager_with(Arc::new(factory), clock.clone());

    let err = manager.acquire().await.unwrap_err();

    assert!(matches!(err, ScrapingError::SessionInit(_)));
    assert!(err.is_fatal());
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5), Duration::from_secs(5)]);
    assert_eq!(manager.state().await, SessionState::Failed);
}

#[tokio::test]
async fn test_acquire_recovers_from_a_failed_launch() {
    let browser = FakeBrowser::new().failing_launches(1);
    let clock = Arc::new(ManualClock::new());
    let manager = manager_with(browser.factory(), clock.clone());

    manager.acquire().await.unwrap();
    // a second acquire reuses the active session
    manager.acquire().await.unwrap();

    assert_eq!(browser.launches(), 2);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    assert_eq!(manager.state().await, SessionState::Active);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_session_requires_acquire() {
    let browser = FakeBrowser::new();
    let manager = manager_with(browser.factory(), Arc::new(ManualClock::new()));

    assert_eq!(manager.state().await, SessionState::Uninitialized);
    assert!(matches!(manager.session().await, Err(ScrapingError::Driver(_))));
}

#[tokio::test]
async fn test_restart_replaces_the_session() {
    let browser = FakeBrowser::new();
    let manager = manager_with(browser.factory(), Arc::new(ManualClock::new()));

    manager.acquire().await.unwrap();
    let first = manager.session_id().await;

    manager.restart().await.unwrap();

    assert_ne!(manager.session_id().await, first);
    assert_eq!(browser.launches(), 2);
    assert_eq!(browser.closes(), 1);
    assert_eq!(manager.restart_count(), 1);
    assert!(manager.session().await.is_ok());
    manager.shutdown().await;
}

#[tokio::test]
async fn test_restart_swallows_teardown_errors() {
    let mut factory = MockSessionFactory::new();
    factory.expect_launch().times(2).returning(|_| {
        let mut driver = MockPageDriver::new();
        driver
            .expect_close()
            .returning(|| Err(ScrapingError::Driver("browser already gone".to_string())));
        Ok(Box::new(driver) as Box<dyn PageDriver>)
    });

    let manager = manager_with(Arc::new(factory), Arc::new(ManualClock::new()));
    manager.acquire().await.unwrap();

    assert!(manager.restart().await.is_ok());
    assert_eq!(manager.state().await, SessionState::Active);

    manager.shutdown().await;
    assert_eq!(manager.state().await, SessionState::Terminated);
}

#[tokio::test]
async fn test_shutdown_terminates_and_closes_once() {
    let browser = FakeBrowser::new();
    let manager = manager_with(browser.factory(), Arc::new(ManualClock::new()));
    manager.acquire().await.unwrap();

    manager.shutdown().await;

    assert_eq!(manager.state().await, SessionState::Terminated);
    assert_eq!(browser.closes(), 1);
    assert!(manager.session().await.is_err());
}
