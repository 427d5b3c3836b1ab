//! PPG quality features
//!
//! Fixed 12-slot feature layout consumed by the quality model. Slot order is
//! part of the model's input contract and must not change.

use ndarray::Array1;
use serde::Serialize;

use crate::config::QualityConfig;
use crate::dsp::SpectralEstimator;

/// Number of features in the model's input layout.
pub const FEATURE_COUNT: usize = 12;

/// Feature names, in slot order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "mean",
    "median",
    "std",
    "variance",
    "skewness",
    "kurtosis",
    "signalRange",
    "zeroCrossings",
    "rms",
    "peakToPeak",
    "dominantFreqIndex",
    "signalEntropy",
];

/// Fixed-length feature vector; values are always finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    values: [f32; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn zeros() -> Self {
        Self {
            values: [0.0; FEATURE_COUNT],
        }
    }

    /// Build from raw values, replacing NaN / ±Inf with 0.
    pub fn sanitized(values: [f32; FEATURE_COUNT]) -> Self {
        Self {
            values: values.map(|v| if v.is_finite() { v } else { 0.0 }),
        }
    }

    /// Build from raw values without sanitizing. Only for exercising the
    /// classifier's own finiteness check.
    #[doc(hidden)]
    pub fn from_raw(values: [f32; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn to_array(&self) -> Array1<f32> {
        Array1::from(self.values.to_vec())
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        FEATURE_NAMES
            .iter()
            .position(|&n| n == name)
            .map(|i| self.values[i])
    }

    pub fn iter_named(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }

    pub fn mean(&self) -> f32 {
        self.values[0]
    }
    pub fn median(&self) -> f32 {
        self.values[1]
    }
    pub fn std(&self) -> f32 {
        self.values[2]
    }
    pub fn variance(&self) -> f32 {
        self.values[3]
    }
    pub fn skewness(&self) -> f32 {
        self.values[4]
    }
    pub fn kurtosis(&self) -> f32 {
        self.values[5]
    }
    pub fn signal_range(&self) -> f32 {
        self.values[6]
    }
    pub fn zero_crossings(&self) -> f32 {
        self.values[7]
    }
    pub fn rms(&self) -> f32 {
        self.values[8]
    }
    pub fn peak_to_peak(&self) -> f32 {
        self.values[9]
    }
    pub fn dominant_freq_index(&self) -> f32 {
        self.values[10]
    }
    pub fn signal_entropy(&self) -> f32 {
        self.values[11]
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::zeros()
    }
}

/// Raw-window → feature-vector extractor.
///
/// Holds only the FFT plan for the last window length; output depends on
/// the window alone.
pub struct FeatureExtractor {
    histogram_bins: usize,
    epsilon: f32,
    spectral: SpectralEstimator,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::with_config(&QualityConfig::default())
    }

    pub fn with_config(config: &QualityConfig) -> Self {
        Self {
            histogram_bins: config.histogram_bins.max(1),
            epsilon: config.epsilon,
            spectral: SpectralEstimator::with_config(config.welch.clone(), config.epsilon),
        }
    }

    pub fn histogram_bins(&self) -> usize {
        self.histogram_bins
    }

    /// Window length of the FFT plan currently held.
    pub fn cached_plan_len(&self) -> Option<usize> {
        self.spectral.cached_plan_len()
    }

    /// Extract features from a window. An empty window yields a zero vector.
    pub fn extract(&mut self, window: &[f32]) -> FeatureVector {
        let n = window.len();
        if n == 0 {
            return FeatureVector::zeros();
        }
        let nf = n as f32;
        let eps = self.epsilon;

        let (min, max) = min_max(window);
        // Flat window: take the value itself so every deviation is exactly zero
        let mean = if min == max {
            min
        } else {
            window.iter().sum::<f32>() / nf
        };
        let median = median(window);

        let (m2, m3, m4) = window.iter().fold((0.0f32, 0.0f32, 0.0f32), |acc, &x| {
            let d = x - mean;
            let d2 = d * d;
            (acc.0 + d2, acc.1 + d2 * d, acc.2 + d2 * d2)
        });
        let variance = m2 / nf;
        let std = variance.sqrt();
        let skewness = (m3 / nf) / (std.powi(3) + eps);
        let kurtosis = (m4 / nf) / (std.powi(4) + eps);

        let signal_range = max - min;
        let zero_crossings = zero_crossings(window) as f32;
        let rms = (window.iter().map(|x| x * x).sum::<f32>() / nf).sqrt();
        let peak_to_peak = signal_range;
        let dominant_freq_index = self.spectral.dominant_bin(window) as f32;
        let signal_entropy = histogram_entropy(window, self.histogram_bins, eps);

        FeatureVector::sanitized([
            mean,
            median,
            std,
            std * std,
            skewness,
            kurtosis,
            signal_range,
            zero_crossings,
            rms,
            peak_to_peak,
            dominant_freq_index,
            signal_entropy,
        ])
    }

    pub fn extract_array(&mut self, window: &Array1<f32>) -> FeatureVector {
        match window.as_slice() {
            Some(slice) => self.extract(slice),
            None => self.extract(&window.to_vec()),
        }
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn median(window: &[f32]) -> f32 {
    let mut sorted = window.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

fn min_max(window: &[f32]) -> (f32, f32) {
    window
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        })
}

/// Sign flips between consecutive samples, with `x > 0` positive and `x <= 0` not.
pub(crate) fn zero_crossings(window: &[f32]) -> usize {
    window
        .windows(2)
        .filter(|pair| (pair[0] > 0.0) != (pair[1] > 0.0))
        .count()
}

/// Normalized `bins`-bin histogram over [min, max]. A flat window puts
/// everything in bin 0.
pub(crate) fn histogram(window: &[f32], bins: usize) -> Vec<f32> {
    let mut hist = vec![0.0f32; bins];
    if window.is_empty() || bins == 0 {
        return hist;
    }
    let (min, max) = min_max(window);
    let range = max - min;
    let bin_size = range / bins as f32;

    for &x in window {
        let idx = if bin_size > 0.0 && bin_size.is_finite() {
            (((x - min) / bin_size).floor() as usize).min(bins - 1)
        } else {
            0
        };
        hist[idx] += 1.0;
    }

    let n = window.len() as f32;
    hist.iter_mut().for_each(|h| *h /= n);
    hist
}

/// Shannon entropy (bits) of the window's histogram, in [0, log2(bins)].
pub(crate) fn histogram_entropy(window: &[f32], bins: usize, eps: f32) -> f32 {
    if bins == 0 {
        return 0.0;
    }
    let hist = histogram(window, bins);
    let norm = 1.0 + bins as f32 * eps;
    let entropy = -hist
        .iter()
        .map(|&p| {
            let q = (p + eps) / norm;
            q * q.log2()
        })
        .sum::<f32>();
    entropy.clamp(0.0, (bins as f32).log2())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    #[test]
    fn test_empty_window_is_zero_vector() {
        let mut extractor = FeatureExtractor::new();
        let features = extractor.extract(&[]);
        assert_eq!(features, FeatureVector::zeros());
        assert_eq!(features.as_slice().len(), FEATURE_COUNT);
    }

    #[test]
    fn test_basic_statistics() {
        let mut extractor = FeatureExtractor::new();
        let features = extractor.extract(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_relative_eq!(features.mean(), 3.0, epsilon = 1e-6);
        assert_relative_eq!(features.median(), 3.0, epsilon = 1e-6);
        assert_relative_eq!(features.std(), std::f32::consts::SQRT_2, epsilon = 1e-5);
        assert_relative_eq!(features.variance(), 2.0, epsilon = 1e-5);
        assert_relative_eq!(features.skewness(), 0.0, epsilon = 1e-5);
        // Population kurtosis of a uniform 5-point ramp: 6.8 / 4 = 1.7
        assert_relative_eq!(features.kurtosis(), 1.7, epsilon = 1e-4);
        assert_relative_eq!(features.signal_range(), 4.0);
        assert_relative_eq!(features.rms(), 11.0f32.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_median_even_length() {
        assert_relative_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_relative_eq!(median(&[7.0]), 7.0);
    }

    #[test]
    fn test_zero_crossings_counts_sign_flips() {
        assert_eq!(zero_crossings(&[1.0, -1.0, 1.0, -1.0]), 3);
        // Zero counts as non-positive
        assert_eq!(zero_crossings(&[1.0, 0.0, 0.0, 1.0]), 2);
        assert_eq!(zero_crossings(&[-1.0, 0.0, -2.0]), 0);
        assert_eq!(zero_crossings(&[1.0]), 0);
    }

    #[test]
    fn test_histogram_max_lands_in_last_bin() {
        let hist = histogram(&[0.0, 10.0], 10);
        assert_relative_eq!(hist[0], 0.5);
        assert_relative_eq!(hist[9], 0.5);
    }

    #[test]
    fn test_histogram_flat_signal_single_bin() {
        let hist = histogram(&[2.5; 50], 10);
        assert_relative_eq!(hist[0], 1.0);
        assert!(hist[1..].iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_entropy_uniform_reaches_upper_bound() {
        let window: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let entropy = histogram_entropy(&window, 10, 1e-7);
        assert_relative_eq!(entropy, 10.0f32.log2(), epsilon = 1e-4);
        assert!(entropy <= 10.0f32.log2());
    }

    #[test]
    fn test_constant_signal_degrades_gracefully() {
        let mut extractor = FeatureExtractor::new();
        let features = extractor.extract(&[0.75; 120]);

        assert_eq!(features.std(), 0.0);
        assert_eq!(features.variance(), 0.0);
        assert!(features.skewness().is_finite());
        assert!(features.kurtosis().is_finite());
        assert!(features.signal_entropy() < 1e-3);
        assert_eq!(features.signal_range(), 0.0);
        assert_eq!(features.dominant_freq_index(), 0.0);
    }

    #[test]
    fn test_non_finite_samples_are_sanitized() {
        let mut extractor = FeatureExtractor::new();
        let mut window = vec![0.5f32; 100];
        window[10] = f32::NAN;
        window[20] = f32::INFINITY;
        let features = extractor.extract(&window);
        assert!(features.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_sanitized_replaces_non_finite() {
        let mut raw = [1.0f32; FEATURE_COUNT];
        raw[3] = f32::NAN;
        raw[7] = f32::NEG_INFINITY;
        let features = FeatureVector::sanitized(raw);
        assert_eq!(features.variance(), 0.0);
        assert_eq!(features.zero_crossings(), 0.0);
        assert_eq!(features.mean(), 1.0);
    }

    #[test]
    fn test_named_lookup() {
        let mut extractor = FeatureExtractor::new();
        let window: Vec<f32> = (0..100)
            .map(|i| (2.0 * PI * i as f32 / 25.0).sin())
            .collect();
        let features = extractor.extract(&window);
        assert_eq!(features.get("peakToPeak"), Some(features.signal_range()));
        assert_eq!(features.get("nope"), None);
        let names: Vec<&str> = features.iter_named().map(|(n, _)| n).collect();
        assert_eq!(names, FEATURE_NAMES.to_vec());
    }

    #[test]
    fn test_extract_array_matches_slice() {
        let mut extractor = FeatureExtractor::new();
        let window: Vec<f32> = (0..128).map(|i| (i as f32 * 0.3).cos()).collect();
        let from_slice = extractor.extract(&window);
        let from_array = extractor.extract_array(&Array1::from(window));
        assert_eq!(from_slice, from_array);
    }

    #[test]
    fn test_growing_window_holds_single_plan() {
        let mut extractor = FeatureExtractor::new();
        let window: Vec<f32> = (0..600).map(|i| (i as f32 * 0.2).sin()).collect();
        for end in 100..=window.len() {
            extractor.extract(&window[..end]);
            assert_eq!(extractor.cached_plan_len(), Some(end));
        }
        extractor.extract(&[]);
        assert_eq!(extractor.cached_plan_len(), Some(600));
    }
}
