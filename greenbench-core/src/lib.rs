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

//! Greenbench Core - Vision model comparison benchmarking engine
//!
//! This crate runs a pair of vision models against a shared image set and
//! computes a comparable, multi-dimensional performance score for each:
//!
//! - Count-based detection accuracy, precision/recall and F1
//! - Inference speed, latency and throughput
//! - Peak memory, CPU and GPU resource usage during the run
//! - Estimated carbon emissions and a composite 0-100 green score
//!
//! A comparison is orchestrated end to end by [`BenchmarkOrchestrator`] and
//! can be dispatched to a remote GPU executor through [`JobDispatcher`].

pub mod config;
pub mod dataset;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod models;
pub mod observer;
pub mod orchestrator;

pub use config::Config;
pub use dataset::GroundTruthImage;
pub use dispatcher::{Job, JobDispatcher, JobStatus, PollConfig, RemoteExecutor, RemoteJobState};
pub use error::{GreenbenchError, Result};
pub use metrics::MetricBundle;
pub use models::{ModelCache, ModelKind, ModelRunner, RawInferenceResult};
pub use observer::{ResourceUsage, SystemObserver};
pub use orchestrator::{
    BenchmarkOrchestrator, ComparisonOptions, ComparisonRequest, ComparisonResult,
    ComparisonStatus, Winner,
};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the Greenbench core library with logging
pub fn init() -> Result<()> {
    // Try to initialize logger, but don't fail if already initialized
    let _ = env_logger::try_init();
    log::info!("Greenbench Core v{} initialized", VERSION);
    Ok(())
}
