//! Spectral estimation for PPG windows
//!
//! Magnitude spectrum (first half, up to Nyquist) for the dominant-bin
//! feature, plus a Welch averaged periodogram for PSD diagnostics.

use ndarray::Array1;
use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use serde::Serialize;
use std::f32::consts::PI;
use std::sync::Arc;

use crate::config::WelchConfig;

/// Power spectral density estimate: equal-length frequency (Hz) and power arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpectralEstimate {
    pub frequencies: Vec<f32>,
    pub power: Vec<f32>,
    /// Number of segments averaged into `power`
    pub segments: usize,
}

impl SpectralEstimate {
    pub fn is_empty(&self) -> bool {
        self.power.is_empty()
    }

    /// Largest power value and its frequency (first occurrence on ties).
    pub fn peak(&self) -> Option<(f32, f32)> {
        let mut best: Option<(f32, f32)> = None;
        for (&f, &p) in self.frequencies.iter().zip(self.power.iter()) {
            match best {
                Some((_, bp)) if p <= bp => {}
                _ => best = Some((f, p)),
            }
        }
        best
    }

    pub fn max_power(&self) -> f32 {
        self.peak().map(|(_, p)| p).unwrap_or(0.0)
    }

    pub fn mean_power(&self) -> f32 {
        if self.power.is_empty() {
            return 0.0;
        }
        self.power.iter().sum::<f32>() / self.power.len() as f32
    }
}

/// Frequency in Hz of FFT bin `bin` for an `n`-point transform at `fs` Hz.
pub fn bin_frequency(bin: usize, n: usize, fs: f32) -> f32 {
    if n == 0 {
        return 0.0;
    }
    bin as f32 * fs / n as f32
}

/// Symmetric Hann window coefficients.
pub fn hann_window(size: usize) -> Array1<f32> {
    if size <= 1 {
        return Array1::ones(size);
    }
    let denom = (size - 1) as f32;
    Array1::from_iter((0..size).map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / denom).cos())))
}

/// FFT-based spectral estimator
///
/// Holds a single forward plan for the most recent transform length. A
/// growing window changes length on every sample, and an `FftPlanner` keeps
/// every plan it has built, so the planner is only used to build the plan.
pub struct SpectralEstimator {
    welch: WelchConfig,
    epsilon: f32,
    cached_fft: Option<(usize, Arc<dyn Fft<f32>>)>,
}

impl SpectralEstimator {
    pub fn new() -> Self {
        Self::with_config(WelchConfig::default(), 1e-7)
    }

    pub fn with_config(welch: WelchConfig, epsilon: f32) -> Self {
        Self {
            welch,
            epsilon,
            cached_fft: None,
        }
    }

    /// Transform length of the plan currently held, if any.
    pub fn cached_plan_len(&self) -> Option<usize> {
        self.cached_fft.as_ref().map(|(n, _)| *n)
    }

    fn plan(&mut self, n: usize) -> Arc<dyn Fft<f32>> {
        if let Some((size, fft)) = &self.cached_fft {
            if *size == n {
                return Arc::clone(fft);
            }
        }
        let fft = FftPlanner::new().plan_fft_forward(n);
        self.cached_fft = Some((n, Arc::clone(&fft)));
        fft
    }

    fn fft(&mut self, samples: impl Iterator<Item = f32>, n: usize) -> Vec<Complex32> {
        let mut buffer: Vec<Complex32> = samples.map(|s| Complex32::new(s, 0.0)).collect();
        self.plan(n).process(&mut buffer);
        buffer
    }

    /// |FFT(x)| for bins `0..n/2`; the conjugate-symmetric upper half is dropped.
    pub fn magnitude_spectrum(&mut self, signal: &[f32]) -> Vec<f32> {
        let n = signal.len();
        if n == 0 {
            return Vec::new();
        }
        let buffer = self.fft(signal.iter().copied(), n);
        buffer.iter().take(n / 2).map(|c| c.norm()).collect()
    }

    /// Magnitude spectrum scaled to sum to ~1.
    pub fn normalized_spectrum(&mut self, signal: &[f32]) -> Vec<f32> {
        let magnitudes = self.magnitude_spectrum(signal);
        let total: f32 = magnitudes.iter().sum();
        let denom = total + self.epsilon;
        magnitudes.into_iter().map(|m| m / denom).collect()
    }

    /// Index of the largest magnitude bin in the first half of the spectrum.
    /// Ties keep the lowest index; returns 0 when there is no bin.
    pub fn dominant_bin(&mut self, signal: &[f32]) -> usize {
        let magnitudes = self.magnitude_spectrum(signal);
        let mut peak_bin = 0;
        let mut peak = f32::NEG_INFINITY;
        for (i, &m) in magnitudes.iter().enumerate() {
            if m > peak {
                peak = m;
                peak_bin = i;
            }
        }
        peak_bin
    }

    /// Welch PSD: Hann-windowed overlapping segments, averaged one-sided density.
    ///
    /// Windows shorter than the configured segment length are estimated as a
    /// single segment spanning the whole window.
    pub fn welch_psd(&mut self, signal: &[f32], fs: f32) -> SpectralEstimate {
        let n = signal.len();
        if n == 0 || !fs.is_finite() || fs <= 0.0 {
            return SpectralEstimate::default();
        }

        let seg_len = self.welch.segment_len.min(n).max(1);
        let step = self.welch.step(seg_len);
        let window = hann_window(seg_len);
        let window_power: f32 = window.iter().map(|w| w * w).sum();
        let scale = 1.0 / (fs * window_power + self.epsilon);

        let n_bins = seg_len / 2 + 1;
        let mut accum = vec![0.0f32; n_bins];
        let mut segments = 0usize;

        let mut start = 0;
        while start + seg_len <= n {
            let segment = &signal[start..start + seg_len];
            let mean = segment.iter().sum::<f32>() / seg_len as f32;
            let buffer = self.fft(
                segment
                    .iter()
                    .zip(window.iter())
                    .map(|(&s, &w)| (s - mean) * w),
                seg_len,
            );
            for (acc, c) in accum.iter_mut().zip(buffer.iter()) {
                *acc += c.norm_sqr();
            }
            segments += 1;
            start += step;
        }

        let nyquist = if seg_len % 2 == 0 { Some(seg_len / 2) } else { None };
        let power = accum
            .iter()
            .enumerate()
            .map(|(k, &p)| {
                let one_sided = if k == 0 || Some(k) == nyquist { 1.0 } else { 2.0 };
                one_sided * p * scale / segments as f32
            })
            .collect();
        let frequencies = (0..n_bins).map(|k| bin_frequency(k, seg_len, fs)).collect();

        SpectralEstimate {
            frequencies,
            power,
            segments,
        }
    }
}

impl Default for SpectralEstimator {
    fn default() -> Self {
        Self::new()
    }
}
