use serde::{Deserialize, Serialize};
use std::fmt;

use super::model::CLASS_COUNT;

/// Quality tier, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLabel {
    Bad,
    Acceptable,
    Excellent,
}

impl QualityLabel {
    pub const ALL: [QualityLabel; CLASS_COUNT] = [
        QualityLabel::Bad,
        QualityLabel::Acceptable,
        QualityLabel::Excellent,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityLabel::Bad => "bad",
            QualityLabel::Acceptable => "acceptable",
            QualityLabel::Excellent => "excellent",
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one assessment pass. `label == None` means unknown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityVerdict {
    pub label: Option<QualityLabel>,
    /// Probability of `label`, as a percentage in [0, 100]
    pub confidence: f32,
}

/// Label shown while quality is unknown
pub const UNKNOWN_LABEL: &str = "--";

impl QualityVerdict {
    pub const fn unknown() -> Self {
        Self {
            label: None,
            confidence: 0.0,
        }
    }

    /// Arg-max over `[bad, acceptable, excellent]`; ties go to the lowest index.
    pub fn from_probabilities(probabilities: [f32; CLASS_COUNT]) -> Self {
        let mut best = 0;
        for (i, &p) in probabilities.iter().enumerate().skip(1) {
            if p > probabilities[best] {
                best = i;
            }
        }
        let confidence = (probabilities[best] * 100.0).clamp(0.0, 100.0);
        Self {
            label: QualityLabel::from_index(best),
            confidence: if confidence.is_finite() { confidence } else { 0.0 },
        }
    }

    pub fn is_known(&self) -> bool {
        self.label.is_some()
    }

    pub fn label_str(&self) -> &'static str {
        self.label.map(QualityLabel::as_str).unwrap_or(UNKNOWN_LABEL)
    }

    pub fn snapshot(&self) -> VerdictSnapshot {
        VerdictSnapshot {
            label: self.label_str().to_string(),
            confidence: self.confidence,
        }
    }
}

impl Default for QualityVerdict {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictSnapshot {
    pub label: String,
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_argmax() {
        let verdict = QualityVerdict::from_probabilities([0.1, 0.7, 0.2]);
        assert_eq!(verdict.label, Some(QualityLabel::Acceptable));
        assert_relative_eq!(verdict.confidence, 70.0, epsilon = 1e-4);
    }

    #[test]
    fn test_tie_breaks_to_lowest_index() {
        let verdict = QualityVerdict::from_probabilities([0.5, 0.5, 0.0]);
        assert_eq!(verdict.label, Some(QualityLabel::Bad));

        let verdict = QualityVerdict::from_probabilities([0.2, 0.4, 0.4]);
        assert_eq!(verdict.label, Some(QualityLabel::Acceptable));
    }

    #[test]
    fn test_excellent_and_confidence_bounds() {
        let verdict = QualityVerdict::from_probabilities([0.0, 0.0, 1.0]);
        assert_eq!(verdict.label_str(), "excellent");
        assert_relative_eq!(verdict.confidence, 100.0);
    }

    #[test]
    fn test_unknown_snapshot() {
        let snapshot = QualityVerdict::unknown().snapshot();
        assert_eq!(snapshot.label, "--");
        assert_eq!(snapshot.confidence, 0.0);
        assert!(!QualityVerdict::default().is_known());
    }

    #[test]
    fn test_snapshot_serializes_plain_label() {
        let snapshot = QualityVerdict::from_probabilities([0.9, 0.05, 0.05]).snapshot();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["label"], "bad");
    }

    #[test]
    fn test_label_index_roundtrip() {
        for label in QualityLabel::ALL {
            assert_eq!(QualityLabel::from_index(label.index()), Some(label));
        }
        assert_eq!(QualityLabel::from_index(3), None);
    }
}
