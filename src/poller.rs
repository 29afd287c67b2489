use crate::config::PollConfig;
use crate::display::{render, render_unavailable, CLEAR_SCREEN};
use crate::error::Result;
use crate::telemetry::{Query, TelemetryClient};
use chrono::NaiveTime;
use std::future::Future;
use std::io::Write;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Drives one exchange per polling interval and prints the resulting screen.
pub struct Poller {
    client: TelemetryClient,
    config: PollConfig,
}

impl Poller {
    pub fn new(client: TelemetryClient, config: PollConfig) -> Self {
        Self { client, config }
    }

    /// Run one exchange for `at` and render either the readings or the unavailable screen.
    /// Failures are logged and rendered, never returned.
    pub async fn poll_once(&self, at: NaiveTime) -> String {
        let query = Query::from_time(&at);

        match self.client.fetch(&query).await {
            Ok(set) => {
                debug!(sources = set.len(), total = set.total(), "poll succeeded");
                render(&set, at, self.config.interval())
            }
            Err(e) => {
                warn!(kind = ?e.kind(), error = %e, "poll failed; will retry next interval");
                render_unavailable(at, &e)
            }
        }
    }

    /// Poll until `shutdown` resolves. The first poll happens immediately, and a shutdown
    /// request drops any exchange still in flight.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            endpoint = %self.client.endpoint().address(),
            interval_secs = self.config.interval_secs,
            "polling started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let at = chrono::Local::now().time();
            let screen = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested; abandoning exchange in progress");
                    break;
                }
                screen = self.poll_once(at) => screen,
            };

            let mut stdout = std::io::stdout().lock();
            if self.config.clear_screen {
                write!(stdout, "{CLEAR_SCREEN}")?;
            }
            write!(stdout, "{screen}")?;
            stdout.flush()?;
        }

        Ok(())
    }
}
