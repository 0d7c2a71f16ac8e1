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

//! Classifier-family runner adapter (EfficientNet)

use super::{image_seed, ModelKind, ModelRunner, ModelTask, RawInferenceResult};
use crate::dataset::GroundTruthImage;
use crate::{GreenbenchError, Result};
use std::time::Duration;

/// Runner for classification-only models.
///
/// A classifier has no instance counts, so its output is adapted to a
/// count-equivalent: target-class presence above the confidence threshold
/// maps to a predicted count of 1, otherwise 0. This is a deliberate
/// approximation that keeps classifier metrics comparable with detector
/// metrics; on multi-object scenes it systematically undercounts.
pub struct ClassifierRunner {
    kind: ModelKind,
}

impl ClassifierRunner {
    /// Initialize the classifier, fetching weights once per process lifetime
    pub fn load(kind: ModelKind) -> Result<Self> {
        if kind.task() != ModelTask::Classification {
            return Err(GreenbenchError::ModelLoad {
                model: kind.identifier().to_string(),
                reason: format!("{} is not a classification model", kind.name()),
            });
        }

        log::info!(
            "Initialized {} ({:.1} MB weights)",
            kind.name(),
            kind.model_size_mb()
        );
        Ok(Self { kind })
    }

    fn classify_one(
        &self,
        image: &GroundTruthImage,
        confidence_threshold: f64,
    ) -> RawInferenceResult {
        let seed = image_seed(self.kind.identifier(), &image.uri);

        // Synthetic target-class probability; scenes that contain the
        // target skew high, empty scenes skew low
        let noise = (seed % 50) as f64 / 100.0;
        let confidence = if image.expected_count > 0 {
            0.45 + noise
        } else {
            0.05 + noise * 0.6
        };

        let predicted = u32::from(confidence >= confidence_threshold);

        let base_ms = self.kind.base_inference_ms();
        let inference_ms = base_ms * (0.8 + (seed % 400) as f64 / 1000.0);

        RawInferenceResult {
            predicted_count: predicted,
            confidence,
            inference_time: Duration::from_micros((inference_ms * 1000.0) as u64),
        }
    }
}

impl ModelRunner for ClassifierRunner {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn run(
        &self,
        images: &[GroundTruthImage],
        confidence_threshold: f64,
    ) -> Result<Vec<RawInferenceResult>> {
        let mut results = Vec::with_capacity(images.len());
        for image in images {
            // Placeholder for the actual forward pass
            std::thread::sleep(Duration::from_micros(200));
            let result = self.classify_one(image, confidence_threshold);
            log::trace!(
                "{}: {} -> presence {} at {:.2}",
                self.kind.identifier(),
                image.uri,
                result.predicted_count,
                result.confidence
            );
            results.push(result);
        }
        Ok(results)
    }
}
