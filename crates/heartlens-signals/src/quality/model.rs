//! Quality model runtime
//!
//! A small feed-forward network stored as JSON, evaluated with ndarray.
//! Per-call buffers are leased from a `TensorArena` and released on drop.

use ndarray::{Array1, Array2};
use serde::Deserialize;
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::error::ModelError;
use super::features::FEATURE_COUNT;

/// Number of quality classes: bad, acceptable, excellent.
pub const CLASS_COUNT: usize = 3;

/// A loaded quality model. Calls are serialized by the owner.
pub trait QualityModel: Send {
    /// Expected feature vector length
    fn input_dim(&self) -> usize {
        FEATURE_COUNT
    }

    /// Probability distribution over `[bad, acceptable, excellent]`
    fn predict(&self, features: &[f32]) -> Result<[f32; CLASS_COUNT], ModelError>;
}

// ============================================================================
// Scoped tensors
// ============================================================================

/// Tracks transient buffers handed out during inference.
#[derive(Debug, Clone, Default)]
pub struct TensorArena {
    live: Arc<AtomicUsize>,
    leased: Arc<AtomicUsize>,
}

impl TensorArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lease(&self, data: Array1<f32>) -> ScopedTensor {
        self.live.fetch_add(1, Ordering::AcqRel);
        self.leased.fetch_add(1, Ordering::Relaxed);
        ScopedTensor {
            data,
            live: Arc::clone(&self.live),
        }
    }

    /// Buffers currently outstanding
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Buffers handed out since creation
    pub fn total_leased(&self) -> usize {
        self.leased.load(Ordering::Relaxed)
    }
}

/// Buffer released back to its arena when dropped.
#[derive(Debug)]
pub struct ScopedTensor {
    data: Array1<f32>,
    live: Arc<AtomicUsize>,
}

impl Deref for ScopedTensor {
    type Target = Array1<f32>;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for ScopedTensor {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl Drop for ScopedTensor {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

// ============================================================================
// Dense network
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

impl Activation {
    fn apply(self, x: &mut Array1<f32>) {
        match self {
            Activation::Linear => {}
            Activation::Relu => x.mapv_inplace(|v| v.max(0.0)),
            Activation::Sigmoid => x.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => x.mapv_inplace(f32::tanh),
            Activation::Softmax => softmax_inplace(x),
        }
    }
}

fn softmax_inplace(x: &mut Array1<f32>) {
    let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    x.mapv_inplace(|v| (v - max).exp());
    let sum = x.sum();
    if sum > 0.0 {
        x.mapv_inplace(|v| v / sum);
    }
}

#[derive(Debug, Deserialize)]
struct LayerSpec {
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
    #[serde(default = "default_activation")]
    activation: Activation,
}

fn default_activation() -> Activation {
    Activation::Linear
}

#[derive(Debug, Deserialize)]
struct NormalizerSpec {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ModelSpec {
    input_dim: usize,
    #[serde(default)]
    normalizer: Option<NormalizerSpec>,
    layers: Vec<LayerSpec>,
}

#[derive(Debug)]
struct DenseLayer {
    /// out × in
    weights: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

#[derive(Debug)]
struct Normalizer {
    mean: Array1<f32>,
    scale: Array1<f32>,
}

/// Feed-forward classifier network.
#[derive(Debug)]
pub struct DenseModel {
    input_dim: usize,
    normalizer: Option<Normalizer>,
    layers: Vec<DenseLayer>,
    arena: TensorArena,
}

fn check_finite(values: &[f32], what: &str) -> Result<(), ModelError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ModelError::NonFiniteParameter(what.to_string()))
    }
}

impl DenseModel {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        let spec: ModelSpec = serde_json::from_str(json)?;
        Self::from_spec(spec)
    }

    fn from_spec(spec: ModelSpec) -> Result<Self, ModelError> {
        if spec.input_dim != FEATURE_COUNT {
            return Err(ModelError::Shape(format!(
                "model expects {} inputs, feature layout has {}",
                spec.input_dim, FEATURE_COUNT
            )));
        }
        if spec.layers.is_empty() {
            return Err(ModelError::Shape("model has no layers".to_string()));
        }

        let normalizer = match spec.normalizer {
            Some(norm) => {
                if norm.mean.len() != spec.input_dim || norm.scale.len() != spec.input_dim {
                    return Err(ModelError::Shape(
                        "normalizer length does not match input_dim".to_string(),
                    ));
                }
                check_finite(&norm.mean, "normalizer.mean")?;
                check_finite(&norm.scale, "normalizer.scale")?;
                Some(Normalizer {
                    mean: Array1::from(norm.mean),
                    scale: Array1::from(norm.scale).mapv(|s| if s == 0.0 { 1.0 } else { s }),
                })
            }
            None => None,
        };

        let mut layers = Vec::with_capacity(spec.layers.len());
        let mut width = spec.input_dim;
        for (i, layer) in spec.layers.into_iter().enumerate() {
            let out = layer.weights.len();
            if out == 0 {
                return Err(ModelError::Shape(format!("layer {} has no units", i)));
            }
            if layer.bias.len() != out {
                return Err(ModelError::Shape(format!(
                    "layer {}: {} weight rows but {} biases",
                    i,
                    out,
                    layer.bias.len()
                )));
            }
            if let Some(row) = layer.weights.iter().find(|row| row.len() != width) {
                return Err(ModelError::Shape(format!(
                    "layer {}: expected {} inputs per unit, found {}",
                    i,
                    width,
                    row.len()
                )));
            }

            let flat: Vec<f32> = layer.weights.into_iter().flatten().collect();
            check_finite(&flat, &format!("layer {} weights", i))?;
            check_finite(&layer.bias, &format!("layer {} bias", i))?;
            let weights = Array2::from_shape_vec((out, width), flat)
                .map_err(|e| ModelError::Shape(format!("layer {}: {}", i, e)))?;

            layers.push(DenseLayer {
                weights,
                bias: Array1::from(layer.bias),
                activation: layer.activation,
            });
            width = out;
        }

        if width != CLASS_COUNT {
            return Err(ModelError::Shape(format!(
                "model outputs {} classes, expected {}",
                width, CLASS_COUNT
            )));
        }

        Ok(Self {
            input_dim: spec.input_dim,
            normalizer,
            layers,
            arena: TensorArena::new(),
        })
    }

    pub fn arena(&self) -> &TensorArena {
        &self.arena
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

impl QualityModel for DenseModel {
    fn input_dim(&self) -> usize {
        self.input_dim
    }

    fn predict(&self, features: &[f32]) -> Result<[f32; CLASS_COUNT], ModelError> {
        if features.len() != self.input_dim {
            return Err(ModelError::Inference(format!(
                "expected {} features, got {}",
                self.input_dim,
                features.len()
            )));
        }

        let mut current = self.arena.lease(Array1::from(features.to_vec()));
        if let Some(norm) = &self.normalizer {
            *current = (&*current - &norm.mean) / &norm.scale;
        }

        let mut last_activation = Activation::Linear;
        for layer in &self.layers {
            let mut next = self.arena.lease(layer.weights.dot(&*current) + &layer.bias);
            layer.activation.apply(&mut next);
            last_activation = layer.activation;
            current = next;
        }

        if last_activation != Activation::Softmax {
            softmax_inplace(&mut current);
        }

        if current.iter().any(|p| !p.is_finite()) {
            return Err(ModelError::Inference(
                "model produced non-finite probabilities".to_string(),
            ));
        }

        let mut probabilities = [0.0f32; CLASS_COUNT];
        for (dst, &src) in probabilities.iter_mut().zip(current.iter()) {
            *dst = src;
        }
        Ok(probabilities)
    }
}

// ============================================================================
// Fixed model
// ============================================================================

/// Model returning a preset distribution. Used by tests and demos.
#[derive(Debug, Clone)]
pub struct FixedModel {
    probabilities: [f32; CLASS_COUNT],
    fail: bool,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl FixedModel {
    pub fn new(probabilities: [f32; CLASS_COUNT]) -> Self {
        Self {
            probabilities,
            fail: false,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every prediction fails with an inference error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new([0.0; CLASS_COUNT])
        }
    }

    /// Sleep before answering, to simulate a slow backend.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared prediction counter, readable after the model is moved.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl QualityModel for FixedModel {
    fn predict(&self, features: &[f32]) -> Result<[f32; CLASS_COUNT], ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            return Err(ModelError::Inference("backend failure".to_string()));
        }
        if features.len() != self.input_dim() {
            return Err(ModelError::Inference(format!(
                "expected {} features, got {}",
                self.input_dim(),
                features.len()
            )));
        }
        Ok(self.probabilities)
    }
}
