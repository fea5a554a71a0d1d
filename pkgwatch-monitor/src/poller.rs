//! Fetch, process and reschedule loop
//!
//! One fetch is in flight at a time. Failed fetches are retried quickly until
//! the attempt cap is reached; successful ones are handed to the dashboard,
//! whose verdict decides whether another poll is scheduled.

use async_trait::async_trait;
use std::ops::ControlFlow;
use std::time::Duration;

use crate::config::PollConfig;
use crate::error::MonitorError;
use crate::page::Dashboard;
use crate::source::SnapshotSource;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// What the page should show after a cycle
pub enum Frame<'a> {
    /// Nothing loaded yet
    Loading,
    /// Page that will keep refreshing
    Live(&'a Dashboard),
    /// Last page of a finished build
    Final(&'a Dashboard),
    /// Message shown in place of the page
    Failed(&'a str),
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, frame: Frame<'_>) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
    Processing,
    Retrying { attempt: u32 },
    Scheduled,
    Terminated,
}

/// Why the loop ended
#[derive(Debug)]
pub enum Termination {
    /// The build stopped
    Finished,
    /// No data after the configured number of attempts
    GaveUp { attempts: u32 },
    Fatal(MonitorError),
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub update_interval: Duration,
    pub first_load_interval: Duration,
    pub max_load_attempts: u32,
}

impl PollSettings {
    pub fn from_config(config: &PollConfig) -> Self {
        Self {
            update_interval: Duration::from_secs(config.update_interval_secs),
            first_load_interval: Duration::from_secs(config.first_load_interval_secs),
            max_load_attempts: config.max_load_attempts.max(1),
        }
    }
}

pub struct Poller<S, P, Z> {
    source: S,
    publisher: P,
    sleeper: Z,
    dashboard: Dashboard,
    settings: PollSettings,
    state: PollState,
    attempts: u32,
}

impl<S, P, Z> Poller<S, P, Z>
where
    S: SnapshotSource,
    P: Publisher,
    Z: Sleeper,
{
    pub fn new(source: S, publisher: P, sleeper: Z, dashboard: Dashboard, settings: PollSettings) -> Self {
        Self {
            source,
            publisher,
            sleeper,
            dashboard,
            settings,
            state: PollState::Idle,
            attempts: 0,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    async fn publish(&self, frame: Frame<'_>) {
        if let Err(e) = self.publisher.publish(frame).await {
            tracing::warn!("Failed to publish page: {:#}", e);
        }
    }

    /// Poll until the build finishes or polling has to give up.
    pub async fn run(&mut self) -> Termination {
        tracing::info!(
            "Polling {} every {}s",
            self.source.describe(),
            self.settings.update_interval.as_secs()
        );
        self.publish(Frame::Loading).await;

        loop {
            self.state = PollState::Fetching;
            let value = match self.source.fetch().await {
                Ok(value) => value,
                Err(e) => {
                    self.attempts += 1;
                    tracing::warn!(
                        "Fetch {}/{} from {} failed: {:#}",
                        self.attempts,
                        self.settings.max_load_attempts,
                        self.source.describe(),
                        e
                    );
                    if self.attempts < self.settings.max_load_attempts {
                        self.state = PollState::Retrying {
                            attempt: self.attempts,
                        };
                        self.sleeper.sleep(self.settings.first_load_interval).await;
                        continue;
                    }

                    let err = MonitorError::NoDataAvailable {
                        attempts: self.attempts,
                    };
                    self.publish(Frame::Failed(&err.to_string())).await;
                    self.state = PollState::Terminated;
                    return Termination::GaveUp {
                        attempts: self.attempts,
                    };
                }
            };

            self.attempts = 0;
            self.state = PollState::Processing;
            match self.dashboard.process(value) {
                Ok(ControlFlow::Continue(())) => {
                    self.publish(Frame::Live(&self.dashboard)).await;
                    self.state = PollState::Scheduled;
                    self.sleeper.sleep(self.settings.update_interval).await;
                }
                Ok(ControlFlow::Break(())) => {
                    self.publish(Frame::Final(&self.dashboard)).await;
                    self.state = PollState::Terminated;
                    return Termination::Finished;
                }
                Err(e) => {
                    tracing::error!("Cannot process status document: {}", e);
                    self.publish(Frame::Failed(&e.to_string())).await;
                    self.state = PollState::Terminated;
                    return Termination::Fatal(e);
                }
            }
        }
    }
}
