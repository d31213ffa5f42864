//! Sleep-poll loop shared by every long-running component.
//!
//! Suspension happens only in the sleep between ticks and inside whatever
//! I/O a tick awaits. Cancellation is checked at both: a cancelled sleep ends
//! the loop at once, and a tick receives the token so it can stop between
//! items after finishing the one in hand.
//!
//! An `Err` out of a tick ends the loop and propagates. The CLI turns that
//! into exit status 1 so the external supervisor restarts the process.

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[async_trait]
pub trait Component: Send {
    fn name(&self) -> &str;

    /// One poll cycle. Errors returned here are fatal for the process.
    async fn tick(&mut self, cancel: &CancellationToken) -> Result<()>;

    /// Runs once after the loop ends because of cancellation.
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Drive `component` until `cancel` fires or a tick fails.
pub async fn run_loop(
    component: &mut dyn Component,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    info!(component = component.name(), interval_secs = interval.as_secs(), "loop started");
    while !cancel.is_cancelled() {
        component.tick(cancel).await?;
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        debug!(component = component.name(), "tick");
    }
    component.shutdown().await?;
    info!(component = component.name(), "loop stopped");
    Ok(())
}

/// A token cancelled on SIGINT or SIGTERM.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received, finishing in-flight work");
        trigger.cancel();
    });
    token
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AideError;

    struct Counter {
        ticks: u32,
        stop_after: u32,
        fail_at: Option<u32>,
        shut_down: bool,
    }

    #[async_trait]
    impl Component for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn tick(&mut self, cancel: &CancellationToken) -> Result<()> {
            self.ticks += 1;
            if Some(self.ticks) == self.fail_at {
                return Err(AideError::Fatal("boom".into()));
            }
            if self.ticks >= self.stop_after {
                cancel.cancel();
            }
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<()> {
            self.shut_down = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn stops_on_cancel_and_runs_shutdown() {
        let mut c = Counter {
            ticks: 0,
            stop_after: 3,
            fail_at: None,
            shut_down: false,
        };
        let cancel = CancellationToken::new();
        run_loop(&mut c, Duration::from_millis(1), &cancel).await.unwrap();
        assert_eq!(c.ticks, 3);
        assert!(c.shut_down);
    }

    #[tokio::test]
    async fn cancelled_sleep_returns_promptly() {
        let mut c = Counter {
            ticks: 0,
            stop_after: u32::MAX,
            fail_at: None,
            shut_down: false,
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let started = std::time::Instant::now();
        run_loop(&mut c, Duration::from_secs(3600), &cancel).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(c.ticks, 1);
    }

    #[tokio::test]
    async fn tick_error_propagates_without_shutdown() {
        let mut c = Counter {
            ticks: 0,
            stop_after: u32::MAX,
            fail_at: Some(2),
            shut_down: false,
        };
        let cancel = CancellationToken::new();
        let err = run_loop(&mut c, Duration::from_millis(1), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AideError::Fatal(_)));
        assert!(!c.shut_down);
    }
}
