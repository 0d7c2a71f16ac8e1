// Copyright 2025 Greenbench Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Job submission and polling against the remote GPU executor
//!
//! The executor is opaque infrastructure: submit a comparison, poll for a
//! terminal status, optionally cancel. Job state transitions are
//! forward-only and polling is the only state-discovery mechanism.

use crate::config::ExecutorConfig;
use crate::models::ModelKind;
use crate::orchestrator::{ComparisonRequest, ComparisonResult};
use crate::{GreenbenchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub type JobId = String;

/// Remote job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Forward-only transition check; terminal states absorb
    pub fn can_transition(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Queued => next != JobStatus::Queued,
            JobStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

/// A dispatched comparison job; lifecycle owned by the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub request: ComparisonRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ComparisonResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Polling behavior; interval and attempt budget are caller-configurable
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 150,
        }
    }
}

impl PollConfig {
    pub fn from_executor_config(config: &ExecutorConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            max_attempts: config.poll_max_attempts,
        }
    }
}

/// Status snapshot returned by the remote executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteJobState {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ComparisonResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The opaque GPU job platform
pub trait RemoteExecutor: Send + Sync {
    /// Enqueue a comparison; returns the remote job id and initial status
    fn submit(&self, request: &ComparisonRequest) -> Result<(JobId, JobStatus)>;

    /// Fetch the current remote state of a job
    fn status(&self, job_id: &str) -> Result<RemoteJobState>;

    /// Request cancellation; returns the status the remote settled on
    fn cancel(&self, job_id: &str) -> Result<JobStatus>;
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
    status: JobStatus,
}

#[derive(Debug, Deserialize)]
struct CancelResponse {
    status: JobStatus,
}

/// HTTP client for the remote job platform.
///
/// Transient failures (network errors, 5xx) are retried with exponential
/// backoff up to the configured count before surfacing.
pub struct HttpRemoteExecutor {
    client: reqwest::blocking::Client,
    endpoint: String,
    max_retries: u32,
}

impl HttpRemoteExecutor {
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    fn with_backoff<T>(&self, what: &str, mut call: impl FnMut() -> Result<T>) -> Result<T> {
        let mut backoff = Duration::from_millis(500);
        let mut last_err = None;

        for attempt in 1..=self.max_retries.max(1) {
            match call() {
                Ok(value) => return Ok(value),
                Err(e @ GreenbenchError::RemoteExecutor { .. }) => {
                    log::warn!("{} attempt {} failed: {}", what, attempt, e);
                    last_err = Some(e);
                    if attempt < self.max_retries.max(1) {
                        std::thread::sleep(backoff);
                        backoff *= 2;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| GreenbenchError::RemoteExecutor {
            message: format!("{} failed with no attempts made", what),
        }))
    }

    fn check_status(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retryable = status.is_server_error();
        let message = format!("remote executor returned {}", status);
        if retryable {
            Err(GreenbenchError::RemoteExecutor { message })
        } else {
            // Client errors are not retried
            Err(GreenbenchError::Internal(message))
        }
    }
}

impl RemoteExecutor for HttpRemoteExecutor {
    fn submit(&self, request: &ComparisonRequest) -> Result<(JobId, JobStatus)> {
        let url = format!("{}/jobs", self.endpoint);
        let response: SubmitResponse = self.with_backoff("submit", || {
            let response = self.client.post(&url).json(request).send()?;
            Ok(Self::check_status(response)?.json()?)
        })?;
        Ok((response.id, response.status))
    }

    fn status(&self, job_id: &str) -> Result<RemoteJobState> {
        let url = format!("{}/jobs/{}", self.endpoint, job_id);
        self.with_backoff("status", || {
            let response = self.client.get(&url).send()?;
            Ok(Self::check_status(response)?.json()?)
        })
    }

    fn cancel(&self, job_id: &str) -> Result<JobStatus> {
        let url = format!("{}/jobs/{}/cancel", self.endpoint, job_id);
        let response: CancelResponse = self.with_backoff("cancel", || {
            let response = self.client.post(&url).send()?;
            Ok(Self::check_status(response)?.json()?)
        })?;
        Ok(response.status)
    }
}

/// Submits comparison jobs to a remote executor and tracks their state.
///
/// Submission is not idempotent across retries; callers that retry must
/// dedupe by their own request id.
pub struct JobDispatcher {
    executor: Box<dyn RemoteExecutor>,
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl JobDispatcher {
    pub fn new(executor: Box<dyn RemoteExecutor>) -> Self {
        Self {
            executor,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Submit a comparison for remote execution.
    ///
    /// Both model identifiers are validated against the registry first; an
    /// unsupported model never reaches the remote executor.
    pub fn submit(&self, request: ComparisonRequest) -> Result<JobId> {
        ModelKind::from_identifier(&request.model_a)?;
        ModelKind::from_identifier(&request.model_b)?;

        let (id, status) = self.executor.submit(&request)?;
        log::info!("Submitted job {} ({:?})", id, status);

        let job = Job {
            id: id.clone(),
            status,
            request,
            result: None,
            error: None,
            submitted_at: Utc::now(),
        };
        self.jobs_lock()?.insert(id.clone(), job);
        Ok(id)
    }

    /// Poll until the job reaches a terminal state.
    ///
    /// Exceeding `max_attempts` raises `PollTimeout` without cancelling
    /// the remote job — it may still complete later, and the last known
    /// status stays queryable through [`JobDispatcher::job`].
    pub fn poll(&self, job_id: &str, config: &PollConfig) -> Result<Job> {
        self.ensure_known(job_id)?;

        for attempt in 1..=config.max_attempts {
            let state = self.executor.status(job_id)?;
            let job = self.apply_remote_state(job_id, state)?;

            if job.status.is_terminal() {
                log::info!(
                    "Job {} reached {:?} after {} poll(s)",
                    job_id,
                    job.status,
                    attempt
                );
                return Ok(job);
            }
            // No point sleeping after the last status check
            if attempt < config.max_attempts {
                std::thread::sleep(config.interval);
            }
        }

        log::warn!(
            "Job {} still pending after {} polls; leaving it running",
            job_id,
            config.max_attempts
        );
        Err(GreenbenchError::PollTimeout {
            job_id: job_id.to_string(),
            attempts: config.max_attempts,
        })
    }

    /// Last known state of a job, including after a poll timeout
    pub fn job(&self, job_id: &str) -> Option<Job> {
        self.jobs.lock().ok()?.get(job_id).cloned()
    }

    /// Best-effort cancellation.
    ///
    /// A job already terminal locally or remotely cannot be cancelled; the
    /// call is then a no-op returning the settled status.
    pub fn cancel(&self, job_id: &str) -> Result<JobStatus> {
        let current = self.ensure_known(job_id)?;
        if current.is_terminal() {
            log::debug!("Job {} already {:?}; cancel is a no-op", job_id, current);
            return Ok(current);
        }

        let remote_status = self.executor.cancel(job_id)?;
        let job = self.apply_remote_state(
            job_id,
            RemoteJobState {
                status: remote_status,
                result: None,
                error: None,
            },
        )?;
        Ok(job.status)
    }

    fn ensure_known(&self, job_id: &str) -> Result<JobStatus> {
        self.jobs_lock()?
            .get(job_id)
            .map(|j| j.status)
            .ok_or_else(|| GreenbenchError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Record a remote snapshot, holding the forward-only invariant: a
    /// stale remote read never moves a job backwards
    fn apply_remote_state(&self, job_id: &str, state: RemoteJobState) -> Result<Job> {
        let mut jobs = self.jobs_lock()?;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| GreenbenchError::JobNotFound {
                job_id: job_id.to_string(),
            })?;

        if job.status != state.status {
            if job.status.can_transition(state.status) {
                log::debug!("Job {}: {:?} -> {:?}", job_id, job.status, state.status);
                job.status = state.status;
            } else {
                log::warn!(
                    "Job {}: ignoring backward transition {:?} -> {:?}",
                    job_id,
                    job.status,
                    state.status
                );
            }
        }
        if state.result.is_some() {
            job.result = state.result;
        }
        if state.error.is_some() {
            job.error = state.error;
        }

        Ok(job.clone())
    }

    fn jobs_lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<JobId, Job>>> {
        self.jobs
            .lock()
            .map_err(|_| GreenbenchError::Internal("job table poisoned".to_string()))
    }
}
