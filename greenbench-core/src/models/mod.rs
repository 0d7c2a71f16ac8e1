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

//! Model registry and runner adapters
//!
//! Supported models form a closed registry resolved by exact identifier
//! lookup; an unknown identifier fails fast with `UnsupportedModel` before
//! any inference or remote contact happens.

pub mod classifier;
pub mod detector;

pub use classifier::ClassifierRunner;
pub use detector::DetectorRunner;

use crate::dataset::GroundTruthImage;
use crate::{GreenbenchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Capability family of a registered model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelTask {
    Detection,
    Classification,
}

/// A supported model variant.
///
/// Closed set; adding a variant means adding it here and wiring a runner,
/// never substring-matching a free-form name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    YoloV5,
    YoloV8,
    Detectron2,
    EfficientNetB0,
}

impl ModelKind {
    /// Resolve an opaque model identifier against the registry
    pub fn from_identifier(identifier: &str) -> Result<Self> {
        match identifier {
            "Trained_yolov5" => Ok(ModelKind::YoloV5),
            "Trained_yolov8" => Ok(ModelKind::YoloV8),
            "detectron2" => Ok(ModelKind::Detectron2),
            "efficientnet_b0" => Ok(ModelKind::EfficientNetB0),
            _ => Err(GreenbenchError::UnsupportedModel {
                model: identifier.to_string(),
            }),
        }
    }

    /// Registry identifier for this variant
    pub fn identifier(&self) -> &'static str {
        match self {
            ModelKind::YoloV5 => "Trained_yolov5",
            ModelKind::YoloV8 => "Trained_yolov8",
            ModelKind::Detectron2 => "detectron2",
            ModelKind::EfficientNetB0 => "efficientnet_b0",
        }
    }

    /// Human-readable model name
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::YoloV5 => "YOLOv5",
            ModelKind::YoloV8 => "YOLOv8",
            ModelKind::Detectron2 => "Detectron2 Faster R-CNN",
            ModelKind::EfficientNetB0 => "EfficientNet-B0",
        }
    }

    pub fn task(&self) -> ModelTask {
        match self {
            ModelKind::YoloV5 | ModelKind::YoloV8 | ModelKind::Detectron2 => ModelTask::Detection,
            ModelKind::EfficientNetB0 => ModelTask::Classification,
        }
    }

    /// Typical weights size in MB
    pub fn model_size_mb(&self) -> f64 {
        match self {
            ModelKind::YoloV5 => 14.4,
            ModelKind::YoloV8 => 22.5,
            ModelKind::Detectron2 => 165.3,
            ModelKind::EfficientNetB0 => 21.4,
        }
    }

    /// Baseline single-image inference time in milliseconds
    pub fn base_inference_ms(&self) -> f64 {
        match self {
            ModelKind::YoloV5 => 45.0,
            ModelKind::YoloV8 => 38.0,
            ModelKind::Detectron2 => 120.0,
            ModelKind::EfficientNetB0 => 18.0,
        }
    }

    /// All registered variants
    pub fn all() -> &'static [ModelKind] {
        &[
            ModelKind::YoloV5,
            ModelKind::YoloV8,
            ModelKind::Detectron2,
            ModelKind::EfficientNetB0,
        ]
    }
}

/// Per-image, per-model raw inference output; immutable once produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInferenceResult {
    /// Detected target-class instance count, or binary presence for
    /// classifier adapters
    pub predicted_count: u32,
    /// Top confidence score for this image
    pub confidence: f64,
    /// Wall-clock inference duration
    pub inference_time: Duration,
}

/// Polymorphic interface over vision model families.
///
/// Detector adapters return a predicted object count per image; classifier
/// adapters adapt their label/score output to a count-equivalent (binary
/// presence), a deliberate approximation documented on
/// [`ClassifierRunner`].
pub trait ModelRunner: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Run inference over the image batch.
    ///
    /// Produces exactly one result per input image, in input order.
    fn run(
        &self,
        images: &[GroundTruthImage],
        confidence_threshold: f64,
    ) -> Result<Vec<RawInferenceResult>>;
}

/// Explicitly owned model cache, keyed by model kind.
///
/// Created alongside the orchestrator, dropped on process teardown. Load
/// exclusion is per model kind: a slow load of one model never blocks cache
/// hits, and loads of different models proceed in parallel. Loaded runners
/// are shared through `Arc` so concurrent comparisons can read an
/// already-loaded model.
pub struct ModelCache {
    loaded: RwLock<HashMap<ModelKind, Arc<dyn ModelRunner>>>,
    load_guards: Mutex<HashMap<ModelKind, Arc<Mutex<()>>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self {
            loaded: RwLock::new(HashMap::new()),
            load_guards: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a cached runner, loading and caching it on first use
    pub fn get_or_load(&self, kind: ModelKind) -> Result<Arc<dyn ModelRunner>> {
        if let Some(runner) = self.lookup(kind)? {
            log::debug!("Model cache hit: {}", kind.identifier());
            return Ok(runner);
        }

        // One loader per kind; the loaded map stays unlocked during the load
        let guard = {
            let mut guards = self
                .load_guards
                .lock()
                .map_err(|_| GreenbenchError::Internal("model cache poisoned".to_string()))?;
            Arc::clone(guards.entry(kind).or_insert_with(|| Arc::new(Mutex::new(()))))
        };
        let _loading = guard
            .lock()
            .map_err(|_| GreenbenchError::Internal("model cache poisoned".to_string()))?;

        // A racing loader may have finished while we waited on the guard
        if let Some(runner) = self.lookup(kind)? {
            return Ok(runner);
        }

        log::info!("Loading model: {}", kind.identifier());
        let runner: Arc<dyn ModelRunner> = match kind.task() {
            ModelTask::Detection => Arc::new(DetectorRunner::load(kind)?),
            ModelTask::Classification => Arc::new(ClassifierRunner::load(kind)?),
        };

        self.loaded
            .write()
            .map_err(|_| GreenbenchError::Internal("model cache poisoned".to_string()))?
            .insert(kind, Arc::clone(&runner));
        Ok(runner)
    }

    /// Replace or pre-register the runner for a model kind.
    ///
    /// Seam for plugging real inference backends in place of the built-in
    /// adapters.
    pub fn register(&self, kind: ModelKind, runner: Arc<dyn ModelRunner>) -> Result<()> {
        let mut loaded = self
            .loaded
            .write()
            .map_err(|_| GreenbenchError::Internal("model cache poisoned".to_string()))?;
        loaded.insert(kind, runner);
        Ok(())
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.read().map(|m| m.len()).unwrap_or(0)
    }

    fn lookup(&self, kind: ModelKind) -> Result<Option<Arc<dyn ModelRunner>>> {
        let loaded = self
            .loaded
            .read()
            .map_err(|_| GreenbenchError::Internal("model cache poisoned".to_string()))?;
        Ok(loaded.get(&kind).map(Arc::clone))
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic per-image seed shared by the synthetic adapters
pub(crate) fn image_seed(identifier: &str, uri: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    identifier.hash(&mut hasher);
    uri.hash(&mut hasher);
    hasher.finish()
}
