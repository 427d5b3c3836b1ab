//! # heartlens-signals
//!
//! Signal-quality assessment for camera-derived PPG waveforms.
//!
//! This crate provides:
//! - **Feature extraction**: time-domain statistics, histogram entropy and the
//!   dominant FFT bin of a raw amplitude window
//! - **Spectral estimation**: magnitude spectra and Welch PSD estimates
//! - **Quality classification**: a loaded model maps a feature vector to
//!   `bad` / `acceptable` / `excellent` with a confidence score
//! - **Monitoring**: re-assessment every time the sample buffer grows, either
//!   inline or on a background worker
//!
//! ## Example
//!
//! ```ignore
//! use heartlens_signals::{QualityClassifier, QualityConfig, QualityMonitor};
//!
//! let config = QualityConfig::default();
//! let classifier = QualityClassifier::load_from_path(&config.model_path);
//! let mut monitor = QualityMonitor::new(config, classifier);
//!
//! let mut window = Vec::new();
//! for sample in ppg_stream {
//!     window.push(sample);
//!     if let Some(verdict) = monitor.on_buffer_grew(&window) {
//!         println!("quality: {} ({:.1}%)", verdict.label_str(), verdict.confidence);
//!     }
//! }
//! ```

pub mod config;
pub mod dsp;
pub mod quality;
pub mod record;

pub use config::{ConfigError, QualityConfig, WelchConfig};
pub use dsp::{SpectralEstimate, SpectralEstimator};
pub use quality::{
    BackgroundMonitor, DenseModel, FeatureExtractor, FeatureVector, FixedModel, ModelError,
    ModelStatus, MonitorState, QualityClassifier, QualityError, QualityLabel, QualityModel,
    QualityMonitor, QualityVerdict, VerdictHandle, VerdictSnapshot, FEATURE_COUNT, FEATURE_NAMES,
};
pub use record::{HeartRate, HistoricalAverages, Hrv, RecordError, RecordHistory, SessionRecord};
