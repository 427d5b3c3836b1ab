//! Session records
//!
//! The payload submitted per recording (heart rate, HRV and the raw PPG
//! sequence the quality monitor saw) and per-subject historical averages.
//! Storage itself lives outside this crate; `RecordHistory` is an owned,
//! explicitly constructed collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("Record is missing a subject id")]
    MissingSubject,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeartRate {
    pub bpm: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Hrv {
    pub sdnn: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub subject_id: String,
    pub heart_rate: HeartRate,
    pub hrv: Hrv,
    pub ppg_data: Vec<f32>,
    pub timestamp: DateTime<Utc>,
}

fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

impl SessionRecord {
    /// Build a record; erratic (NaN / infinite) measurements are stored as 0.
    pub fn new(
        subject_id: impl Into<String>,
        heart_rate: HeartRate,
        hrv: Hrv,
        ppg_data: Vec<f32>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, RecordError> {
        let subject_id = subject_id.into().trim().to_string();
        if subject_id.is_empty() {
            return Err(RecordError::MissingSubject);
        }
        Ok(Self {
            subject_id,
            heart_rate: HeartRate {
                bpm: finite_or_zero(heart_rate.bpm),
                confidence: finite_or_zero(heart_rate.confidence),
            },
            hrv: Hrv {
                sdnn: finite_or_zero(hrv.sdnn),
                confidence: finite_or_zero(hrv.confidence),
            },
            ppg_data,
            timestamp,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalAverages {
    pub avg_heart_rate: f32,
    #[serde(rename = "avgHRV")]
    pub avg_hrv: f32,
    pub count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RecordHistory {
    records: Vec<SessionRecord>,
}

impl RecordHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<SessionRecord>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: SessionRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn for_subject<'a>(&'a self, subject_id: &'a str) -> impl Iterator<Item = &'a SessionRecord> {
        self.records.iter().filter(move |r| r.subject_id == subject_id)
    }

    /// Mean bpm and SDNN over a subject's records, `None` if there are none.
    pub fn averages(&self, subject_id: &str) -> Option<HistoricalAverages> {
        let (count, bpm_sum, sdnn_sum) = self
            .for_subject(subject_id)
            .fold((0usize, 0.0f64, 0.0f64), |(n, b, s), r| {
                (n + 1, b + r.heart_rate.bpm as f64, s + r.hrv.sdnn as f64)
            });
        if count == 0 {
            return None;
        }
        Some(HistoricalAverages {
            avg_heart_rate: (bpm_sum / count as f64) as f32,
            avg_hrv: (sdnn_sum / count as f64) as f32,
            count,
        })
    }

    /// Timestamp of the subject's most recent record
    pub fn last_access(&self, subject_id: &str) -> Option<DateTime<Utc>> {
        self.for_subject(subject_id).map(|r| r.timestamp).max()
    }
}
