//! `DriftCheckpoint` (spec.md §3), appended to by G5.

/// A single alignment measurement taken during a gate's drift checks.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DriftCheckpoint {
    /// When the check ran.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Cumulative tokens consumed by the worker at this checkpoint.
    pub tokens_used: u64,
    /// Alignment score in `[0.0, 1.0]`.
    pub alignment_score: f64,
    /// Human-readable issues found, if any.
    pub issues: Vec<String>,
    /// Whether this checkpoint passed G5's thresholds.
    pub passed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_roundtrips_through_json() {
        let checkpoint = DriftCheckpoint {
            timestamp: chrono::Utc::now(),
            tokens_used: 500,
            alignment_score: 0.82,
            issues: vec!["missing scenario: X".into()],
            passed: true,
        };
        let json = serde_json::to_string(&checkpoint).expect("serializes");
        let back: DriftCheckpoint = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back.tokens_used, 500);
        assert!(back.passed);
    }
}
