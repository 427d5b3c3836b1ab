//! Quality classifier
//!
//! Owns the session's model and turns feature vectors into verdicts.
//! While the model is loading (or failed to load) every assessment yields
//! the unknown verdict instead of blocking.

use std::path::Path;

use super::error::QualityError;
use super::features::{FeatureVector, FEATURE_NAMES};
use super::model::{DenseModel, QualityModel};
use super::verdict::QualityVerdict;

/// Load state of the classifier's model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    Loading,
    Ready,
    Failed(String),
}

pub struct QualityClassifier {
    model: Option<Box<dyn QualityModel>>,
    status: ModelStatus,
}

impl QualityClassifier {
    /// Classifier with no model yet; assessments report unknown.
    pub fn loading() -> Self {
        Self {
            model: None,
            status: ModelStatus::Loading,
        }
    }

    pub fn with_model<M: QualityModel + 'static>(model: M) -> Self {
        let mut classifier = Self::loading();
        classifier.install(Box::new(model));
        classifier
    }

    /// Load a `DenseModel` from disk. Failure is logged and leaves the
    /// classifier in `Failed` until a later reload.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let mut classifier = Self::loading();
        classifier.reload_from_path(path);
        classifier
    }

    pub fn reload_from_path<P: AsRef<Path>>(&mut self, path: P) -> &ModelStatus {
        let path = path.as_ref();
        match DenseModel::from_path(path) {
            Ok(model) => {
                log::info!("PPG quality model loaded from {}", path.display());
                self.install(Box::new(model));
            }
            Err(e) => {
                log::error!("Failed to load quality model from {}: {}", path.display(), e);
                self.model = None;
                self.status = ModelStatus::Failed(e.to_string());
            }
        }
        &self.status
    }

    pub fn install(&mut self, model: Box<dyn QualityModel>) {
        self.model = Some(model);
        self.status = ModelStatus::Ready;
    }

    /// Release the model at session end.
    pub fn unload(&mut self) {
        if self.model.take().is_some() {
            log::info!("PPG quality model released");
        }
        self.status = ModelStatus::Loading;
    }

    pub fn status(&self) -> &ModelStatus {
        &self.status
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    /// Classify a feature vector.
    ///
    /// Returns the unknown verdict when no model is loaded. Non-finite
    /// features and backend failures are errors for the caller to absorb.
    pub fn assess(&self, features: &FeatureVector) -> Result<QualityVerdict, QualityError> {
        let Some(model) = self.model.as_ref() else {
            return Ok(QualityVerdict::unknown());
        };

        if let Some(index) = features.as_slice().iter().position(|v| !v.is_finite()) {
            return Err(QualityError::NonFiniteFeature {
                index,
                name: FEATURE_NAMES[index],
            });
        }

        let probabilities = model.predict(features.as_slice())?;
        Ok(QualityVerdict::from_probabilities(probabilities))
    }

    /// Like `assess`, but an unloaded model is an error.
    pub fn try_assess(&self, features: &FeatureVector) -> Result<QualityVerdict, QualityError> {
        if !self.is_ready() {
            return Err(QualityError::ModelUnavailable);
        }
        self.assess(features)
    }
}

impl std::fmt::Debug for QualityClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityClassifier")
            .field("status", &self.status)
            .finish()
    }
}
