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

//! Error handling for Greenbench Core

use thiserror::Error;

/// Result type alias for Greenbench operations
pub type Result<T> = std::result::Result<T, GreenbenchError>;

/// Comprehensive error types for Greenbench operations
#[derive(Error, Debug)]
pub enum GreenbenchError {
    #[error("Model not supported: {model}")]
    UnsupportedModel { model: String },

    #[error("Model loading failed for {model}: {reason}")]
    ModelLoad { model: String, reason: String },

    #[error("Inference failed for {model}: {reason}")]
    Inference { model: String, reason: String },

    #[error("Throughput undefined for non-positive speed: {speed_ms} ms")]
    DivisionEdgeCase { speed_ms: f64 },

    #[error("Polling job {job_id} exceeded {attempts} attempts")]
    PollTimeout { job_id: String, attempts: u32 },

    #[error("Remote executor error: {message}")]
    RemoteExecutor { message: String },

    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for GreenbenchError {
    fn from(err: reqwest::Error) -> Self {
        GreenbenchError::RemoteExecutor {
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for GreenbenchError {
    fn from(err: csv::Error) -> Self {
        GreenbenchError::Dataset(err.to_string())
    }
}
