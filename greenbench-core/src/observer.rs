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

//! Process resource sampling during inference runs
//!
//! The observer runs a background sampling loop concurrent with a model's
//! inference pass and reduces the sampled window to peak/average values.
//! The observation window must exactly bracket one model's inference calls
//! so resource attribution stays per-model.

use crate::{GreenbenchError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use sysinfo::System;

/// One point-in-time reading of process resource usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSample {
    pub timestamp: SystemTime,
    pub cpu_percent: f32,
    pub memory_mb: f64,
    pub gpu_memory_mb: f64,
}

/// Reduction of a sampling window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub peak_memory_mb: f64,
    pub avg_cpu_percent: f64,
    pub peak_gpu_memory_mb: f64,
}

impl ResourceUsage {
    /// Reduce a sample sequence to peak memory, average CPU and peak GPU memory
    pub fn from_samples(samples: &[ResourceSample]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let peak_memory_mb = samples.iter().map(|s| s.memory_mb).fold(0.0, f64::max);
        let avg_cpu_percent =
            samples.iter().map(|s| s.cpu_percent as f64).sum::<f64>() / samples.len() as f64;
        let peak_gpu_memory_mb = samples.iter().map(|s| s.gpu_memory_mb).fold(0.0, f64::max);

        Self {
            peak_memory_mb,
            avg_cpu_percent,
            peak_gpu_memory_mb,
        }
    }
}

/// Source of GPU memory readings.
///
/// The default observer has no GPU provider and reports 0.0; a deployment
/// with NVML or similar plugs in here.
pub trait GpuProbe: Send {
    fn gpu_memory_mb(&mut self) -> Option<f64>;
}

/// Probe for systems without a GPU
pub struct NoGpu;

impl GpuProbe for NoGpu {
    fn gpu_memory_mb(&mut self) -> Option<f64> {
        None
    }
}

/// Background resource sampler for the current process.
///
/// `start()` spawns the sampling loop, `stop()` joins it and returns the
/// reduced [`ResourceUsage`]. Sampling after `stop()` is a programming
/// error: the loop is gone and a new observer must be created.
pub struct SystemObserver {
    interval: Duration,
    gpu_probe: Option<Box<dyn GpuProbe>>,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<Vec<ResourceSample>>>,
}

impl SystemObserver {
    /// Create an observer with the given sampling interval
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            gpu_probe: Some(Box::new(NoGpu)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Replace the GPU memory source
    pub fn with_gpu_probe(mut self, probe: Box<dyn GpuProbe>) -> Self {
        self.gpu_probe = Some(probe);
        self
    }

    /// Start the background sampling loop
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(GreenbenchError::Internal(
                "observer already started".to_string(),
            ));
        }

        let pid = sysinfo::get_current_pid()
            .map_err(|e| GreenbenchError::Internal(format!("cannot resolve pid: {}", e)))?;
        let interval = self.interval;
        let stop_flag = Arc::clone(&self.stop_flag);
        let mut gpu_probe = self
            .gpu_probe
            .take()
            .unwrap_or_else(|| Box::new(NoGpu) as Box<dyn GpuProbe>);

        // The first refresh after System::new() always reads 0% CPU; prime
        // it here so the sampling loop starts from a real baseline
        let mut sys = System::new();
        sys.refresh_process(pid);

        self.stop_flag.store(false, Ordering::SeqCst);
        let handle = std::thread::spawn(move || {
            let mut samples = Vec::new();

            while !stop_flag.load(Ordering::SeqCst) {
                sys.refresh_process(pid);
                if let Some(process) = sys.process(pid) {
                    samples.push(ResourceSample {
                        timestamp: SystemTime::now(),
                        cpu_percent: process.cpu_usage(),
                        memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
                        gpu_memory_mb: gpu_probe.gpu_memory_mb().unwrap_or(0.0),
                    });
                }
                std::thread::sleep(interval);
            }

            samples
        });

        self.handle = Some(handle);
        log::debug!(
            "Resource observer started (interval {} ms)",
            self.interval.as_millis()
        );
        Ok(())
    }

    /// Stop sampling and reduce the window.
    ///
    /// Call exactly once per `start()`.
    pub fn stop(&mut self) -> Result<ResourceUsage> {
        let handle = self.handle.take().ok_or_else(|| {
            GreenbenchError::Internal("observer stopped without being started".to_string())
        })?;

        self.stop_flag.store(true, Ordering::SeqCst);
        let samples = handle
            .join()
            .map_err(|_| GreenbenchError::Internal("observer thread panicked".to_string()))?;

        let usage = ResourceUsage::from_samples(&samples);
        log::debug!(
            "Resource observer stopped: {} samples, peak memory {:.1} MB, avg CPU {:.1}%",
            samples.len(),
            usage.peak_memory_mb,
            usage.avg_cpu_percent
        );
        Ok(usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cpu: f32, mem: f64, gpu: f64) -> ResourceSample {
        ResourceSample {
            timestamp: SystemTime::now(),
            cpu_percent: cpu,
            memory_mb: mem,
            gpu_memory_mb: gpu,
        }
    }

    #[test]
    fn test_reduction_peaks_and_average() {
        let samples = vec![
            sample(10.0, 100.0, 0.0),
            sample(30.0, 250.0, 512.0),
            sample(20.0, 200.0, 256.0),
        ];

        let usage = ResourceUsage::from_samples(&samples);
        assert_eq!(usage.peak_memory_mb, 250.0);
        assert_eq!(usage.peak_gpu_memory_mb, 512.0);
        assert!((usage.avg_cpu_percent - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window_is_zero() {
        let usage = ResourceUsage::from_samples(&[]);
        assert_eq!(usage.peak_memory_mb, 0.0);
        assert_eq!(usage.avg_cpu_percent, 0.0);
        assert_eq!(usage.peak_gpu_memory_mb, 0.0);
    }

    #[test]
    fn test_start_stop_cycle() {
        let mut observer = SystemObserver::new(Duration::from_millis(10));
        observer.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        let usage = observer.stop().unwrap();

        // The current process must show up with some resident memory
        assert!(usage.peak_memory_mb > 0.0);
    }

    #[test]
    fn test_busy_window_reports_cpu() {
        let mut observer = SystemObserver::new(Duration::from_millis(50));
        observer.start().unwrap();

        // Keep this thread busy long enough for the sampler to see it
        let until = std::time::Instant::now() + Duration::from_millis(400);
        let mut x: u64 = 0;
        while std::time::Instant::now() < until {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        }
        std::hint::black_box(x);

        let usage = observer.stop().unwrap();
        assert!(usage.avg_cpu_percent > 0.0);
    }

    #[test]
    fn test_double_start_rejected() {
        let mut observer = SystemObserver::new(Duration::from_millis(10));
        observer.start().unwrap();
        assert!(observer.start().is_err());
        observer.stop().unwrap();
    }

    #[test]
    fn test_stop_without_start_rejected() {
        let mut observer = SystemObserver::new(Duration::from_millis(10));
        assert!(observer.stop().is_err());
    }
}
