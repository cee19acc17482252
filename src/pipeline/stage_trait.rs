//! Pipeline stage abstraction
//!
//! One stage per artifact type. A stage owns its model configuration,
//! drives the controller over its input records, and reports which records
//! could not be resolved to an accepted artifact. A single record's failure
//! never aborts the batch.

use anyhow::Result;
use async_trait::async_trait;

/// Operator-tunable knobs for one stage run
#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    /// First input record index to process (0-based, inclusive)
    pub from: Option<usize>,
    /// Last input record index to process (exclusive)
    pub to: Option<usize>,
    /// Free-text extra generation instructions appended to every prompt
    pub instructions: Option<String>,
    /// Disables the verifier pass for this run
    pub no_verify: bool,
    /// Overrides the stage's configured attempt budget
    pub tries: Option<u32>,
}

impl StageOptions {
    /// Clamps a record index range to the table size
    pub fn clamp_range(&self, len: usize) -> (usize, usize) {
        let start = self.from.unwrap_or(0).min(len);
        let end = self.to.unwrap_or(len).min(len);
        (start, end.max(start))
    }
}

/// Outcome of a full stage run
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: &'static str,
    /// Rows handed to the output collaborator
    pub produced: usize,
    /// Identifiers of records that never reached an accepted artifact;
    /// callers must treat these as "needs rerun"
    pub unresolved: Vec<String>,
}

impl StageReport {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            produced: 0,
            unresolved: Vec::new(),
        }
    }
}

/// A per-artifact-type orchestrator
#[async_trait]
pub trait PipelineStage {
    fn name(&self) -> &'static str;

    async fn execute(&self, options: &StageOptions) -> Result<StageReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_range_defaults_to_full_table() {
        let options = StageOptions::default();
        assert_eq!(options.clamp_range(5), (0, 5));
    }

    #[test]
    fn test_clamp_range_bounds() {
        let options = StageOptions {
            from: Some(2),
            to: Some(4),
            ..Default::default()
        };
        assert_eq!(options.clamp_range(10), (2, 4));
        // beyond the table end
        assert_eq!(options.clamp_range(3), (2, 3));
        // start past the end yields an empty range
        let options = StageOptions {
            from: Some(8),
            to: Some(4),
            ..Default::default()
        };
        assert_eq!(options.clamp_range(5), (5, 5));
    }
}
