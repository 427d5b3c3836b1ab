//! Quality monitor
//!
//! Drives extraction and classification from "buffer grew" events. Every
//! event at or above the minimum window re-derives the verdict from the
//! full current window.

use super::classifier::QualityClassifier;
use super::features::FeatureExtractor;
use super::verdict::QualityVerdict;
use crate::config::QualityConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Too few samples, or no model loaded
    Idle,
    /// Minimum window present and model loaded
    Ready,
}

pub struct QualityMonitor {
    config: QualityConfig,
    extractor: FeatureExtractor,
    classifier: QualityClassifier,
    state: MonitorState,
    latest: QualityVerdict,
    assessments: u64,
    failures: u64,
}

impl QualityMonitor {
    pub fn new(config: QualityConfig, classifier: QualityClassifier) -> Self {
        log::info!(
            "Quality monitor started (min_window={}, model={:?})",
            config.min_window,
            classifier.status()
        );
        Self {
            extractor: FeatureExtractor::with_config(&config),
            config,
            classifier,
            state: MonitorState::Idle,
            latest: QualityVerdict::unknown(),
            assessments: 0,
            failures: 0,
        }
    }

    /// Handle a buffer-growth notification with the current full window.
    ///
    /// Returns the fresh verdict when an assessment pass ran.
    pub fn on_buffer_grew(&mut self, window: &[f32]) -> Option<QualityVerdict> {
        if window.len() < self.config.min_window {
            if self.state == MonitorState::Ready {
                log::debug!("Window shrank to {} samples, monitor idle", window.len());
                self.latest = QualityVerdict::unknown();
            }
            self.state = MonitorState::Idle;
            return None;
        }

        if !self.classifier.is_ready() {
            self.state = MonitorState::Idle;
            return None;
        }

        if self.state == MonitorState::Idle {
            log::debug!("Quality monitor ready at {} samples", window.len());
            self.state = MonitorState::Ready;
        }

        let features = self.extractor.extract(window);
        match self.classifier.assess(&features) {
            Ok(verdict) => {
                self.latest = verdict;
                self.assessments += 1;
                Some(verdict)
            }
            Err(e) => {
                // Keep the last good verdict; the acquisition loop carries on.
                self.failures += 1;
                log::warn!("Quality assessment failed at {} samples: {}", window.len(), e);
                None
            }
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn latest(&self) -> QualityVerdict {
        self.latest
    }

    /// Completed assessment passes
    pub fn assessments(&self) -> u64 {
        self.assessments
    }

    /// Assessment passes that ended in an inference error
    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    pub fn classifier(&self) -> &QualityClassifier {
        &self.classifier
    }

    pub fn classifier_mut(&mut self) -> &mut QualityClassifier {
        &mut self.classifier
    }

    /// Buffer cleared by the acquisition layer: back to Idle, verdict unknown.
    pub fn reset(&mut self) {
        self.state = MonitorState::Idle;
        self.latest = QualityVerdict::unknown();
    }

    /// Tear down the session and release the model.
    pub fn end_session(mut self) -> QualityVerdict {
        self.classifier.unload();
        log::info!(
            "Quality monitor stopped after {} assessments ({} failed)",
            self.assessments,
            self.failures
        );
        self.latest
    }
}
