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

//! Configuration management for Greenbench

use crate::{GreenbenchError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Global configuration for Greenbench operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub benchmark: BenchmarkConfig,
    pub observer: ObserverConfig,
    pub carbon: CarbonConfig,
    pub executor: ExecutorConfig,
}

/// Benchmark execution defaults, overridable per comparison request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Track and report carbon emissions
    pub carbon_tracking: bool,
    /// Log per-image detection detail
    pub detailed_metrics: bool,
    /// Minimum confidence for a detection to count
    pub confidence_threshold: f64,
    /// Per-model run timeout in seconds
    pub timeout_seconds: u64,
    /// Retries for transient inference failures
    pub inference_retries: u32,
}

/// Resource observer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Sampling interval in milliseconds
    pub sample_interval_ms: u64,
}

/// Carbon emissions estimation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarbonConfig {
    /// Regional carbon intensity in kg CO2e per kWh
    pub intensity_kg_per_kwh: f64,
    /// Baseline system power draw in watts
    pub base_power_watts: f64,
    /// CPU power draw at full utilization in watts
    pub cpu_power_watts: f64,
    /// GPU power draw when a GPU is active in watts
    pub gpu_power_watts: f64,
}

/// Remote executor connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Base URL of the remote job platform
    pub endpoint: String,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Retries for transient network/5xx failures
    pub max_retries: u32,
    /// Default polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Default maximum polling attempts
    pub poll_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            benchmark: BenchmarkConfig {
                carbon_tracking: true,
                detailed_metrics: false,
                confidence_threshold: 0.5,
                timeout_seconds: 300,
                inference_retries: 1,
            },
            observer: ObserverConfig {
                sample_interval_ms: 100,
            },
            carbon: CarbonConfig {
                intensity_kg_per_kwh: 0.4,
                base_power_watts: 50.0,
                cpu_power_watts: 100.0,
                gpu_power_watts: 150.0,
            },
            executor: ExecutorConfig {
                endpoint: "http://localhost:8000".to_string(),
                request_timeout_secs: 30,
                max_retries: 3,
                poll_interval_ms: 2000,
                poll_max_attempts: 150,
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| GreenbenchError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GreenbenchError::Configuration(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.benchmark.confidence_threshold) {
            return Err(GreenbenchError::Configuration(
                "confidence_threshold must be between 0 and 1".to_string(),
            ));
        }

        if self.observer.sample_interval_ms == 0 {
            return Err(GreenbenchError::Configuration(
                "sample_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.carbon.intensity_kg_per_kwh <= 0.0 {
            return Err(GreenbenchError::Configuration(
                "intensity_kg_per_kwh must be greater than 0".to_string(),
            ));
        }

        if self.executor.endpoint.is_empty() {
            return Err(GreenbenchError::Configuration(
                "executor endpoint must not be empty".to_string(),
            ));
        }

        if self.executor.poll_max_attempts == 0 {
            return Err(GreenbenchError::Configuration(
                "poll_max_attempts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Observer sampling interval as a duration
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.observer.sample_interval_ms)
    }
}
