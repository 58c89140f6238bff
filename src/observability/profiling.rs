//! Continuous profiler start-up.
//!
//! # Responsibilities
//! - Connect to the profiling agent in the background
//! - Retry a bounded number of times with linear backoff
//! - Hold the agent session until shutdown
//!
//! # Design Decisions
//! - Never fatal and never on the startup path; the server is already
//!   serving while this runs
//! - The task stops early when shutdown is broadcast
//! - [`AgentProfiler`] works at the connection level only: it opens and holds
//!   a channel to the agent and produces no profile data itself. A real agent
//!   client plugs in behind the [`Profiler`] trait

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tonic::transport::{Channel, Endpoint};

use crate::config::ProfilerConfig;
use crate::resilience::backoff::linear_backoff;
use crate::services::channel::endpoint;

#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("invalid profiler agent address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("profiler agent at '{address}' unreachable: {reason}")]
    Unreachable { address: String, reason: String },
}

/// Something that can start a profiling session.
pub trait Profiler: Send + Sync + 'static {
    /// Held for as long as profiling should continue.
    type Session: Send + 'static;

    fn start(&self) -> impl Future<Output = Result<Self::Session, ProfilerError>> + Send;
}

/// Profiler backed by a gRPC connection to a local profiling agent.
#[derive(Debug, Clone)]
pub struct AgentProfiler {
    address: String,
    endpoint: Endpoint,
}

impl AgentProfiler {
    /// Prepare the agent endpoint, tagged with the service name and version.
    pub fn from_config(config: &ProfilerConfig, setup_timeout: Duration) -> Result<Self, ProfilerError> {
        let invalid = |reason: String| ProfilerError::InvalidAddress {
            address: config.agent_address.clone(),
            reason,
        };

        let endpoint = endpoint(&config.agent_address, setup_timeout)
            .and_then(|e| e.user_agent(format!("{}/{}", config.service_name, config.service_version)))
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            address: config.agent_address.clone(),
            endpoint,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

/// An open connection to the profiling agent.
#[derive(Debug)]
pub struct AgentSession {
    _channel: Channel,
}

impl Profiler for AgentProfiler {
    type Session = AgentSession;

    async fn start(&self) -> Result<AgentSession, ProfilerError> {
        let channel = self
            .endpoint
            .connect()
            .await
            .map_err(|e| ProfilerError::Unreachable {
                address: self.address.clone(),
                reason: e.to_string(),
            })?;
        Ok(AgentSession { _channel: channel })
    }
}

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after the n-th failure is `step × n`.
    pub step: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ProfilerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            step: config.retry_step(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            step: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
pub enum ProfilerOutcome<S> {
    Started { session: S, attempts: u32 },
    GaveUp { attempts: u32 },
    Cancelled { attempts: u32 },
}

/// Try to start `profiler` up to `policy.max_attempts` times.
///
/// Every failure is followed by a wait of `step × attempt`, the last one
/// included, so three failures give up `step × 6` after the first attempt.
pub async fn run_with_retry<P: Profiler>(
    profiler: &P,
    policy: RetryPolicy,
    shutdown: &mut broadcast::Receiver<()>,
) -> ProfilerOutcome<P::Session> {
    for attempt in 1..=policy.max_attempts {
        let result = tokio::select! {
            result = profiler.start() => result,
            _ = shutdown.recv() => return ProfilerOutcome::Cancelled { attempts: attempt - 1 },
        };

        match result {
            Ok(session) => {
                tracing::info!(attempt, "Profiler started");
                return ProfilerOutcome::Started { session, attempts: attempt };
            }
            Err(e) => tracing::warn!(attempt, error = %e, "Failed to start profiler"),
        }

        let delay = linear_backoff(attempt, policy.step);
        tracing::info!(delay_secs = delay.as_secs(), "Sleeping before retrying profiler initialization");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.recv() => return ProfilerOutcome::Cancelled { attempts: attempt },
        }
    }

    tracing::warn!(
        attempts = policy.max_attempts,
        "Could not initialize profiler after retrying, giving up"
    );
    ProfilerOutcome::GaveUp {
        attempts: policy.max_attempts,
    }
}

/// Run the profiler in its own task and keep the session open until shutdown.
pub fn spawn_profiler<P: Profiler>(
    profiler: P,
    policy: RetryPolicy,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match run_with_retry(&profiler, policy, &mut shutdown).await {
            ProfilerOutcome::Started { session, .. } => {
                let _ = shutdown.recv().await;
                drop(session);
                tracing::debug!("Profiler session closed");
            }
            ProfilerOutcome::GaveUp { .. } => {}
            ProfilerOutcome::Cancelled { attempts } => {
                tracing::debug!(attempts, "Profiler initialization cancelled by shutdown");
            }
        }
    })
}
