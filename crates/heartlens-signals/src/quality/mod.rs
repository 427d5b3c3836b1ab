//! PPG signal-quality assessment
//!
//! - `FeatureExtractor` - raw window → 12-slot `FeatureVector`
//! - `QualityClassifier` - feature vector → `QualityVerdict` via a loaded model
//! - `QualityMonitor` - inline re-assessment on every buffer-growth event
//! - `BackgroundMonitor` - the same, with the model on a worker thread

mod classifier;
mod error;
mod features;
mod model;
mod monitor;
mod verdict;
mod worker;

pub use classifier::{ModelStatus, QualityClassifier};
pub use error::{ModelError, QualityError};
pub use features::{FeatureExtractor, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use model::{
    Activation, DenseModel, FixedModel, QualityModel, ScopedTensor, TensorArena, CLASS_COUNT,
};
pub use monitor::{MonitorState, QualityMonitor};
pub use verdict::{QualityLabel, QualityVerdict, VerdictSnapshot, UNKNOWN_LABEL};
pub use worker::{BackgroundMonitor, ModelLoader, VerdictHandle};
