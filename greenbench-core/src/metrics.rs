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

//! Metric calculators for vision model benchmarks
//!
//! Every calculator is a pure function over raw run observations. The
//! formulas and edge-case policy are fixed so results stay comparable
//! across historical runs: do not change the green score weights or the
//! accuracy denominator.

use crate::config::CarbonConfig;
use crate::dataset::GroundTruthImage;
use crate::models::RawInferenceResult;
use crate::observer::ResourceUsage;
use crate::{GreenbenchError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Green score weight caps: accuracy / speed / memory / carbon
pub const GREEN_ACCURACY_POINTS: f64 = 40.0;
pub const GREEN_SPEED_POINTS: f64 = 30.0;
pub const GREEN_MEMORY_POINTS: f64 = 20.0;
pub const GREEN_CARBON_POINTS: f64 = 10.0;

/// Count-based detection accuracy for one image.
///
/// `max(0, 1 - |predicted - truth| / max(truth, 1))`. A zero-object image
/// scores 1.0 for a zero prediction and 0.0 for any false positive.
pub fn accuracy(predicted: u32, truth: u32) -> f64 {
    let denom = truth.max(1) as f64;
    let diff = (predicted as f64 - truth as f64).abs();
    (1.0 - diff / denom).max(0.0)
}

/// Mean per-image accuracy over a batch of (predicted, truth) pairs
pub fn batch_accuracy(pairs: &[(u32, u32)]) -> f64 {
    if pairs.is_empty() {
        return 0.0;
    }
    pairs.iter().map(|&(p, t)| accuracy(p, t)).sum::<f64>() / pairs.len() as f64
}

/// Precision and recall from per-image count matching.
///
/// Per image: `tp = min(predicted, truth)`, `fp = max(0, predicted - truth)`,
/// `fn = max(0, truth - predicted)`, summed over the batch. A batch with no
/// predictions and no ground truth objects is a perfect score.
pub fn precision_recall(pairs: &[(u32, u32)]) -> (f64, f64) {
    let mut tp = 0u64;
    let mut fp = 0u64;
    let mut fne = 0u64;

    for &(predicted, truth) in pairs {
        tp += predicted.min(truth) as u64;
        fp += predicted.saturating_sub(truth) as u64;
        fne += truth.saturating_sub(predicted) as u64;
    }

    if tp + fp + fne == 0 {
        // Nothing to detect and nothing detected
        return (1.0, 1.0);
    }

    let precision = if tp + fp > 0 {
        tp as f64 / (tp + fp) as f64
    } else {
        0.0
    };
    let recall = if tp + fne > 0 {
        tp as f64 / (tp + fne) as f64
    } else {
        0.0
    };

    (precision, recall)
}

/// Harmonic mean of precision and recall; 0.0 when both are 0
pub fn f1_score(precision: f64, recall: f64) -> f64 {
    if precision + recall <= 0.0 {
        return 0.0;
    }
    2.0 * precision * recall / (precision + recall)
}

/// Mean per-image inference time in milliseconds
pub fn mean_speed_ms(results: &[RawInferenceResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results
        .iter()
        .map(|r| r.inference_time.as_secs_f64() * 1000.0)
        .sum::<f64>()
        / results.len() as f64
}

/// Images per second from mean inference time.
///
/// Non-positive speed is signalled as an error rather than divided silently.
pub fn throughput_fps(speed_ms: f64) -> Result<f64> {
    if speed_ms <= 0.0 {
        return Err(GreenbenchError::DivisionEdgeCase { speed_ms });
    }
    Ok(1000.0 / speed_ms)
}

/// Estimate energy draw over a run window in watt-hours.
///
/// Base system draw plus CPU draw scaled by average utilization, plus GPU
/// draw when GPU memory was observed in use.
pub fn estimate_energy_wh(
    duration: Duration,
    avg_cpu_percent: f64,
    gpu_active: bool,
    carbon: &CarbonConfig,
) -> f64 {
    let cpu_watts = (avg_cpu_percent / 100.0).clamp(0.0, 1.0) * carbon.cpu_power_watts;
    let gpu_watts = if gpu_active { carbon.gpu_power_watts } else { 0.0 };
    let total_watts = carbon.base_power_watts + cpu_watts + gpu_watts;
    total_watts * duration.as_secs_f64() / 3600.0
}

/// Carbon emissions in kg CO2e from estimated energy and regional intensity
pub fn carbon_emissions_kg(energy_wh: f64, intensity_kg_per_kwh: f64) -> f64 {
    energy_wh / 1000.0 * intensity_kg_per_kwh
}

/// Composite 0-100 efficiency rating.
///
/// Accuracy contributes up to 40 points, speed up to 30 (inversely),
/// memory up to 20 (inversely), carbon up to 10 (inversely). The weights
/// are fixed; changing them breaks comparability with stored results.
pub fn green_score(accuracy: f64, speed_ms: f64, memory_mb: f64, carbon_kg: f64) -> f64 {
    let speed_ms = if speed_ms <= 0.0 { 1.0 } else { speed_ms };
    let memory_mb = if memory_mb <= 0.0 { 100.0 } else { memory_mb };
    let carbon_kg = if carbon_kg <= 0.0 { 0.001 } else { carbon_kg };

    let accuracy_points = accuracy * GREEN_ACCURACY_POINTS;
    let speed_points = (GREEN_SPEED_POINTS * (1000.0 / speed_ms)).min(GREEN_SPEED_POINTS);
    let memory_points = (GREEN_MEMORY_POINTS * (1000.0 / memory_mb)).min(GREEN_MEMORY_POINTS);
    let carbon_points = (GREEN_CARBON_POINTS * (0.1 / carbon_kg)).min(GREEN_CARBON_POINTS);

    (accuracy_points + speed_points + memory_points + carbon_points).clamp(0.0, 100.0)
}

/// The full set of computed performance metrics for one model in one
/// comparison. Derived wholesale from raw results plus the resource
/// observation window; never mutated after computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricBundle {
    /// Count-based detection accuracy, 0 to 1
    pub accuracy: f64,
    /// Mean inference time in milliseconds
    pub speed_ms: f64,
    /// Peak resident memory in MB during the run
    pub memory_mb: f64,
    /// Estimated emissions in kg CO2e
    pub carbon_emissions: f64,
    /// Composite efficiency rating, 0 to 100
    pub green_score: f64,
    /// Harmonic mean of precision and recall, 0 to 1
    pub f1_score: f64,
    /// Same as speed_ms at single-inference granularity
    pub latency_ms: f64,
    /// Images per second; absent when speed was non-positive
    pub throughput_fps: Option<f64>,
    pub precision: f64,
    pub recall: f64,
    pub avg_cpu_percent: f64,
    pub gpu_memory_mb: f64,
    pub inference_count: u32,
    /// Non-fatal anomalies hit while computing this bundle
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl MetricBundle {
    /// Compute the bundle from one model's raw run observations.
    ///
    /// `carbon_tracking = false` reports zero emissions; the green score
    /// carbon term then falls back to its guard value.
    pub fn compute(
        results: &[RawInferenceResult],
        images: &[GroundTruthImage],
        usage: &ResourceUsage,
        run_duration: Duration,
        carbon_config: &CarbonConfig,
        carbon_tracking: bool,
    ) -> Self {
        let pairs: Vec<(u32, u32)> = results
            .iter()
            .zip(images.iter())
            .map(|(r, img)| (r.predicted_count, img.expected_count))
            .collect();

        let accuracy = batch_accuracy(&pairs);
        let (precision, recall) = precision_recall(&pairs);
        let f1 = f1_score(precision, recall);
        let speed_ms = mean_speed_ms(results);

        // Latency equals speed at single-image granularity by design;
        // queueing and transfer time are outside this measurement.
        let latency_ms = speed_ms;

        let mut warnings = Vec::new();
        let throughput = match throughput_fps(speed_ms) {
            Ok(fps) => Some(fps),
            Err(e) => {
                log::warn!("Throughput unavailable: {}", e);
                warnings.push(e.to_string());
                None
            }
        };

        let memory_mb = usage.peak_memory_mb;
        let carbon = if carbon_tracking {
            let energy_wh = estimate_energy_wh(
                run_duration,
                usage.avg_cpu_percent,
                usage.peak_gpu_memory_mb > 0.0,
                carbon_config,
            );
            carbon_emissions_kg(energy_wh, carbon_config.intensity_kg_per_kwh)
        } else {
            0.0
        };

        MetricBundle {
            accuracy,
            speed_ms,
            memory_mb,
            carbon_emissions: carbon,
            green_score: green_score(accuracy, speed_ms, memory_mb, carbon),
            f1_score: f1,
            latency_ms,
            throughput_fps: throughput,
            precision,
            recall,
            avg_cpu_percent: usage.avg_cpu_percent,
            gpu_memory_mb: usage.peak_gpu_memory_mb,
            inference_count: results.len() as u32,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    #[test]
    fn test_accuracy_exact_match() {
        assert_eq!(accuracy(3, 3), 1.0);
        assert_eq!(accuracy(0, 0), 1.0);
    }

    #[test]
    fn test_accuracy_zero_ground_truth_false_positive() {
        assert_eq!(accuracy(1, 0), 0.0);
        assert_eq!(accuracy(5, 0), 0.0);
    }

    #[test]
    fn test_accuracy_off_by_one() {
        assert!((accuracy(2, 3) - (1.0 - 1.0 / 3.0)).abs() < 1e-9);
        assert!((accuracy(4, 3) - (1.0 - 1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_accuracy_clamped_at_zero() {
        assert_eq!(accuracy(10, 2), 0.0);
    }

    #[test]
    fn test_batch_accuracy_scenario() {
        // images [{count:3},{count:1}]; exact predictions score 1.0
        assert_eq!(batch_accuracy(&[(3, 3), (1, 1)]), 1.0);

        // predictions [2,1] score (1 - 1/3 + 1)/2
        let expected = ((1.0 - 1.0 / 3.0) + 1.0) / 2.0;
        assert!((batch_accuracy(&[(2, 3), (1, 1)]) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_throughput_exact() {
        assert!((throughput_fps(50.0).unwrap() - 20.0).abs() < 1e-6);
        assert!((throughput_fps(8.0).unwrap() - 125.0).abs() < 1e-6);
    }

    #[test]
    fn test_throughput_non_positive_errors() {
        assert!(matches!(
            throughput_fps(0.0),
            Err(GreenbenchError::DivisionEdgeCase { .. })
        ));
        assert!(matches!(
            throughput_fps(-4.0),
            Err(GreenbenchError::DivisionEdgeCase { .. })
        ));
    }

    #[test]
    fn test_f1_edge_cases() {
        assert_eq!(f1_score(0.0, 0.0), 0.0);
        assert_eq!(f1_score(1.0, 1.0), 1.0);
        assert!((f1_score(0.5, 1.0) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_precision_recall_exact() {
        let (p, r) = precision_recall(&[(3, 3), (1, 1)]);
        assert_eq!(p, 1.0);
        assert_eq!(r, 1.0);
    }

    #[test]
    fn test_precision_recall_over_and_under() {
        // 4 predicted vs 3 truth: tp=3, fp=1; 0 predicted vs 1 truth: fn=1
        let (p, r) = precision_recall(&[(4, 3), (0, 1)]);
        assert!((p - 3.0 / 4.0).abs() < 1e-9);
        assert!((r - 3.0 / 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_precision_recall_empty_scene() {
        let (p, r) = precision_recall(&[(0, 0), (0, 0)]);
        assert_eq!(p, 1.0);
        assert_eq!(r, 1.0);
    }

    #[test]
    fn test_green_score_clamped() {
        // Arbitrary valid inputs always land in [0, 100]
        let cases = [
            (1.0, 0.001, 0.001, 0.0),
            (0.0, 100000.0, 100000.0, 50.0),
            (0.5, 30.0, 400.0, 0.002),
            (1.0, 1.0, 1.0, 0.000001),
        ];
        for (acc, speed, mem, carbon) in cases {
            let score = green_score(acc, speed, mem, carbon);
            assert!((0.0..=100.0).contains(&score), "score {} out of range", score);
        }
    }

    #[test]
    fn test_green_score_weights() {
        // Slow, heavy, dirty run: only the accuracy term contributes
        let score = green_score(1.0, 1_000_000.0, 1_000_000.0, 1000.0);
        assert!((score - GREEN_ACCURACY_POINTS).abs() < 0.1);

        // Fast, light, clean run with perfect accuracy maxes every term
        let score = green_score(1.0, 1.0, 1.0, 0.0001);
        assert_eq!(score, 100.0);
    }

    #[test]
    fn test_energy_and_carbon_estimate() {
        let carbon = CarbonConfig {
            intensity_kg_per_kwh: 0.4,
            base_power_watts: 50.0,
            cpu_power_watts: 100.0,
            gpu_power_watts: 150.0,
        };

        // One hour at 50% CPU, no GPU: 50 + 50 = 100 Wh
        let wh = estimate_energy_wh(Duration::from_secs(3600), 50.0, false, &carbon);
        assert!((wh - 100.0).abs() < 1e-9);
        assert!((carbon_emissions_kg(wh, carbon.intensity_kg_per_kwh) - 0.04).abs() < 1e-9);

        // GPU adds its full draw
        let wh_gpu = estimate_energy_wh(Duration::from_secs(3600), 50.0, true, &carbon);
        assert!((wh_gpu - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_bundle_compute() {
        use crate::models::RawInferenceResult;

        let images = vec![
            GroundTruthImage::new("a.jpg", 3),
            GroundTruthImage::new("b.jpg", 1),
        ];
        let results = vec![
            RawInferenceResult {
                predicted_count: 3,
                confidence: 0.9,
                inference_time: Duration::from_millis(40),
            },
            RawInferenceResult {
                predicted_count: 1,
                confidence: 0.8,
                inference_time: Duration::from_millis(60),
            },
        ];
        let usage = ResourceUsage {
            peak_memory_mb: 512.0,
            avg_cpu_percent: 40.0,
            peak_gpu_memory_mb: 0.0,
        };

        let bundle = MetricBundle::compute(
            &results,
            &images,
            &usage,
            Duration::from_secs(2),
            &CarbonConfig {
                intensity_kg_per_kwh: 0.4,
                base_power_watts: 50.0,
                cpu_power_watts: 100.0,
                gpu_power_watts: 150.0,
            },
            true,
        );

        assert_eq!(bundle.accuracy, 1.0);
        assert_eq!(bundle.f1_score, 1.0);
        assert!((bundle.speed_ms - 50.0).abs() < 1e-9);
        assert_eq!(bundle.latency_ms, bundle.speed_ms);
        assert!((bundle.throughput_fps.unwrap() - 20.0).abs() < 1e-6);
        assert_eq!(bundle.memory_mb, 512.0);
        assert!(bundle.carbon_emissions > 0.0);
        assert!((0.0..=100.0).contains(&bundle.green_score));
        assert_eq!(bundle.inference_count, 2);
        assert!(bundle.warnings.is_empty());
    }

    #[test]
    fn test_bundle_without_carbon_tracking() {
        let images = vec![GroundTruthImage::new("a.jpg", 1)];
        let results = vec![crate::models::RawInferenceResult {
            predicted_count: 1,
            confidence: 0.9,
            inference_time: Duration::from_millis(10),
        }];

        let bundle = MetricBundle::compute(
            &results,
            &images,
            &ResourceUsage::default(),
            Duration::from_secs(1),
            &Config::default().carbon,
            false,
        );
        assert_eq!(bundle.carbon_emissions, 0.0);
    }
}
