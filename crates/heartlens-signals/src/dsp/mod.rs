//! DSP (Digital Signal Processing) module
//!
//! Spectral estimation used by PPG quality features and diagnostics:
//! - `SpectralEstimator` - FFT magnitude spectrum and Welch PSD
//! - `SpectralEstimate` - paired frequency / power arrays

mod spectrum;

pub use spectrum::{bin_frequency, hann_window, SpectralEstimate, SpectralEstimator};
