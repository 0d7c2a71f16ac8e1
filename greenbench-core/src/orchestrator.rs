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

//! Benchmark orchestration: one comparison request end to end
//!
//! Model runs execute sequentially so each model's resource observation
//! window brackets exactly its own inference calls. Parallel execution
//! would need isolated observers (separate processes) to keep attribution
//! per-model.

use crate::config::Config;
use crate::dataset::GroundTruthImage;
use crate::metrics::MetricBundle;
use crate::models::{ModelCache, ModelKind};
use crate::observer::SystemObserver;
use crate::{GreenbenchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Per-request benchmark options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonOptions {
    pub carbon_tracking: bool,
    pub detailed_metrics: bool,
    pub confidence_threshold: f64,
    pub timeout_seconds: u64,
}

impl Default for ComparisonOptions {
    fn default() -> Self {
        Self {
            carbon_tracking: true,
            detailed_metrics: false,
            confidence_threshold: 0.5,
            timeout_seconds: 300,
        }
    }
}

/// Inbound comparison request from the API layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRequest {
    pub model_a: String,
    pub model_b: String,
    pub images: Vec<GroundTruthImage>,
    #[serde(default)]
    pub options: ComparisonOptions,
}

/// Lifecycle of a comparison run; transitions are forward-only
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ComparisonState {
    Pending,
    RunningModelA,
    RunningModelB,
    Aggregating,
    Completed,
    Failed,
}

/// Which side of the comparison won
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    ModelA,
    ModelB,
    Tie,
}

/// Completion status of a comparison.
///
/// A single failed model run downgrades the result to
/// `CompletedWithErrors`; `Failed` means both model runs failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    Completed,
    CompletedWithErrors,
    Failed,
}

/// One model's outcome within a comparison: a metric bundle or the reason
/// its run failed. Failures are recorded, never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOutcome {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricBundle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelOutcome {
    fn succeeded(identifier: &str, metrics: MetricBundle) -> Self {
        Self {
            identifier: identifier.to_string(),
            metrics: Some(metrics),
            error: None,
        }
    }

    fn failed(identifier: &str, error: &GreenbenchError) -> Self {
        Self {
            identifier: identifier.to_string(),
            metrics: None,
            error: Some(error.to_string()),
        }
    }
}

/// Result of a completed orchestration run; persisted by an external
/// collaborator and never mutated (a re-run is a new record)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub model_a: ModelOutcome,
    pub model_b: ModelOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,
    pub status: ComparisonStatus,
    pub summary: String,
    pub total_duration: Duration,
    pub timestamp: DateTime<Utc>,
}

/// Drives one comparison request end to end: load and run each model over
/// the shared image set, observe resource usage, compute metric bundles
/// and determine a winner.
pub struct BenchmarkOrchestrator {
    config: Config,
    cache: ModelCache,
    state: ComparisonState,
}

impl BenchmarkOrchestrator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cache: ModelCache::new(),
            state: ComparisonState::Pending,
        }
    }

    /// The orchestrator-owned model cache; models stay loaded across
    /// comparisons until the orchestrator is dropped
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn state(&self) -> ComparisonState {
        self.state
    }

    fn advance(&mut self, next: ComparisonState) {
        debug_assert!(self.state < next, "comparison state must move forward");
        log::debug!("Comparison state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run a full comparison.
    ///
    /// Fails fast (with no inference attempted) on an empty image set or an
    /// unregistered model identifier. Per-model failures after that point
    /// are isolated into the result instead of aborting the comparison.
    pub fn run(&mut self, request: &ComparisonRequest) -> Result<ComparisonResult> {
        self.state = ComparisonState::Pending;

        if request.images.is_empty() {
            return Err(GreenbenchError::Configuration(
                "no images provided for benchmarking".to_string(),
            ));
        }
        let kind_a = ModelKind::from_identifier(&request.model_a)?;
        let kind_b = ModelKind::from_identifier(&request.model_b)?;

        log::info!(
            "Comparing {} vs {} over {} images",
            kind_a.identifier(),
            kind_b.identifier(),
            request.images.len()
        );
        let started = Instant::now();

        self.advance(ComparisonState::RunningModelA);
        let outcome_a = self.run_model(kind_a, &request.images, &request.options);

        self.advance(ComparisonState::RunningModelB);
        let outcome_b = self.run_model(kind_b, &request.images, &request.options);

        self.advance(ComparisonState::Aggregating);
        let model_a = match outcome_a {
            Ok(metrics) => ModelOutcome::succeeded(kind_a.identifier(), metrics),
            Err(ref e) => {
                log::error!("Model A run failed: {}", e);
                ModelOutcome::failed(kind_a.identifier(), e)
            }
        };
        let model_b = match outcome_b {
            Ok(metrics) => ModelOutcome::succeeded(kind_b.identifier(), metrics),
            Err(ref e) => {
                log::error!("Model B run failed: {}", e);
                ModelOutcome::failed(kind_b.identifier(), e)
            }
        };

        let (status, winner) = match (&model_a.metrics, &model_b.metrics) {
            (Some(a), Some(b)) => (ComparisonStatus::Completed, Some(determine_winner(a, b))),
            // The surviving side wins by default
            (Some(_), None) => (ComparisonStatus::CompletedWithErrors, Some(Winner::ModelA)),
            (None, Some(_)) => (ComparisonStatus::CompletedWithErrors, Some(Winner::ModelB)),
            (None, None) => (ComparisonStatus::Failed, None),
        };

        let summary = render_summary(&model_a, &model_b, winner, status);
        let total_duration = started.elapsed();

        self.advance(match status {
            ComparisonStatus::Failed => ComparisonState::Failed,
            _ => ComparisonState::Completed,
        });
        log::info!(
            "Comparison finished in {:.1}s: {}",
            total_duration.as_secs_f64(),
            summary
        );

        Ok(ComparisonResult {
            model_a,
            model_b,
            winner,
            status,
            summary,
            total_duration,
            timestamp: Utc::now(),
        })
    }

    /// Load + infer + observe for one model; the observation window exactly
    /// brackets the inference calls
    fn run_model(
        &self,
        kind: ModelKind,
        images: &[GroundTruthImage],
        options: &ComparisonOptions,
    ) -> Result<MetricBundle> {
        // Load failures are not transient; no retry
        let runner = self.cache.get_or_load(kind)?;

        let mut observer = SystemObserver::new(self.config.sample_interval());
        observer.start()?;

        let inference = self.run_with_retry(kind, || {
            runner.run(images, options.confidence_threshold)
        });

        let usage = observer.stop()?;
        // Duration covers the successful attempt only, so retry backoff
        // never inflates the energy estimate. The observer window still
        // spans retries, which can dilute average CPU.
        let (results, run_duration) = inference?;

        if run_duration > Duration::from_secs(options.timeout_seconds) {
            log::warn!(
                "{} run exceeded the {}s budget ({:.1}s)",
                kind.identifier(),
                options.timeout_seconds,
                run_duration.as_secs_f64()
            );
        }

        if options.detailed_metrics {
            for (result, image) in results.iter().zip(images) {
                log::debug!(
                    "{}: {} predicted {} (expected {}) in {:.2} ms",
                    kind.identifier(),
                    image.uri,
                    result.predicted_count,
                    image.expected_count,
                    result.inference_time.as_secs_f64() * 1000.0
                );
            }
        }

        Ok(MetricBundle::compute(
            &results,
            images,
            &usage,
            run_duration,
            &self.config.carbon,
            options.carbon_tracking,
        ))
    }

    /// Retry transient inference failures with exponential backoff.
    ///
    /// Returns the value together with the elapsed time of the attempt that
    /// succeeded; backoff sleeps are excluded.
    fn run_with_retry<T>(
        &self,
        kind: ModelKind,
        mut attempt: impl FnMut() -> Result<T>,
    ) -> Result<(T, Duration)> {
        let retries = self.config.benchmark.inference_retries;
        let mut backoff = Duration::from_millis(250);

        for tried in 0..=retries {
            let started = Instant::now();
            match attempt() {
                Ok(value) => return Ok((value, started.elapsed())),
                Err(e @ GreenbenchError::Inference { .. }) if tried < retries => {
                    log::warn!(
                        "{} inference attempt {} failed, retrying in {:?}: {}",
                        kind.identifier(),
                        tried + 1,
                        backoff,
                        e
                    );
                    std::thread::sleep(backoff);
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("retry loop always returns")
    }
}

/// Metrics where a larger value wins
const HIGHER_IS_BETTER: &[fn(&MetricBundle) -> f64] = &[
    |m| m.accuracy,
    |m| m.f1_score,
    |m| m.green_score,
];

/// Metrics where a smaller value wins
const LOWER_IS_BETTER: &[fn(&MetricBundle) -> f64] = &[
    |m| m.speed_ms,
    |m| m.memory_mb,
    |m| m.carbon_emissions,
    |m| m.latency_ms,
];

/// Decide the winner by counting per-metric wins.
///
/// Direction per metric is fixed (higher: accuracy, F1, throughput, green
/// score; lower: speed, memory, carbon, latency). Equal values win for
/// neither side, so the rule is symmetric: swapping the operands swaps the
/// outcome. Win-count ties fall back to green score, then to `Tie`.
pub fn determine_winner(a: &MetricBundle, b: &MetricBundle) -> Winner {
    let mut wins_a = 0u32;
    let mut wins_b = 0u32;

    for metric in HIGHER_IS_BETTER {
        let (va, vb) = (metric(a), metric(b));
        if va > vb {
            wins_a += 1;
        } else if vb > va {
            wins_b += 1;
        }
    }
    for metric in LOWER_IS_BETTER {
        let (va, vb) = (metric(a), metric(b));
        if va < vb {
            wins_a += 1;
        } else if vb < va {
            wins_b += 1;
        }
    }
    // Throughput only counts when defined on both sides
    if let (Some(ta), Some(tb)) = (a.throughput_fps, b.throughput_fps) {
        if ta > tb {
            wins_a += 1;
        } else if tb > ta {
            wins_b += 1;
        }
    }

    if wins_a > wins_b {
        Winner::ModelA
    } else if wins_b > wins_a {
        Winner::ModelB
    } else if a.green_score > b.green_score {
        Winner::ModelA
    } else if b.green_score > a.green_score {
        Winner::ModelB
    } else {
        Winner::Tie
    }
}

fn render_summary(
    model_a: &ModelOutcome,
    model_b: &ModelOutcome,
    winner: Option<Winner>,
    status: ComparisonStatus,
) -> String {
    let describe = |outcome: &ModelOutcome| match (&outcome.metrics, &outcome.error) {
        (Some(m), _) => format!(
            "{}: accuracy {:.3}, speed {:.1} ms, green score {:.1}",
            outcome.identifier, m.accuracy, m.speed_ms, m.green_score
        ),
        (None, Some(e)) => format!("{}: failed ({})", outcome.identifier, e),
        (None, None) => format!("{}: no result", outcome.identifier),
    };

    let verdict = match (status, winner) {
        (ComparisonStatus::Failed, _) => "both model runs failed".to_string(),
        (_, Some(Winner::ModelA)) => format!("winner: {}", model_a.identifier),
        (_, Some(Winner::ModelB)) => format!("winner: {}", model_b.identifier),
        (_, Some(Winner::Tie)) => "result: tie".to_string(),
        (_, None) => "no winner".to_string(),
    };

    format!("{} | {} | {}", describe(model_a), describe(model_b), verdict)
}
