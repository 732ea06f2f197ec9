use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Source
// =============================================================================

/// Flat record of short strings the whole pipeline conditions on. Only
/// `title` and `summary` are expected; everything else is optional angle
/// guidance supplied by whatever acquired the content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub suggested_angle: String,
    #[serde(default)]
    pub company_connection: String,
    #[serde(default)]
    pub target_icp: String,
}

impl SourceContent {
    pub fn new(title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            ..Default::default()
        }
    }

    /// Short textual digest handed to the judge for relevance scoring.
    pub fn digest(&self) -> String {
        format!("Title: {}\nSummary: {}", self.title, self.summary)
    }
}

// =============================================================================
// Creativity context
// =============================================================================

/// Randomized generation parameters for one worker. Produced once by the
/// context mixer and never mutated; the seed reproduces it exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativityContext {
    pub persona_id: String,
    pub hook_pattern: String,
    pub hook_description: String,
    pub structure: String,
    pub structure_description: String,
    pub structure_guidance: Option<String>,
    pub structure_anti_patterns: Vec<String>,
    pub few_shot_examples: Vec<String>,
    pub style_reference: Option<String>,
    pub tone_perturbation: Option<String>,
    pub structural_break: Option<String>,
    pub content_angle: String,
    pub seed: u64,
}

// =============================================================================
// Candidates
// =============================================================================

/// Stable composite key of a candidate: producing worker, then its position
/// in that worker's output. Orders the same way candidates are flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateKey {
    pub worker_id: u32,
    pub sequence_id: u32,
}

impl fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}#{}", self.worker_id, self.sequence_id)
    }
}

/// One generated text artifact plus its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub content: String,
    pub hook_type: String,
    pub structure: String,
    pub persona_id: String,
    pub worker_id: u32,
    pub sequence_id: u32,
    /// Generator's own note on what sets this variant apart.
    pub distinctiveness_note: String,
}

impl Candidate {
    pub fn key(&self) -> CandidateKey {
        CandidateKey {
            worker_id: self.worker_id,
            sequence_id: self.sequence_id,
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    /// 0-10, higher means fewer machine-prose tells.
    pub score: f64,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
}

// =============================================================================
// Judging
// =============================================================================

pub const HOOK_STRENGTH_WEIGHT: f64 = 0.30;
pub const RULE_COMPLIANCE_WEIGHT: f64 = 0.25;
pub const DISTINCTIVENESS_WEIGHT: f64 = 0.20;
pub const RELEVANCE_WEIGHT: f64 = 0.15;
pub const PERSONA_FIT_WEIGHT: f64 = 0.10;

/// Marker carried in `CriterionScore::notes` when the winner was chosen
/// without a usable judging response.
pub const FALLBACK_MARKER: &str = "[fallback selection]";

/// The five judged criteria, each on a 0-10 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub hook_strength: f64,
    pub rule_compliance: f64,
    pub distinctiveness: f64,
    pub relevance: f64,
    pub persona_fit: f64,
}

impl SubScores {
    pub fn uniform(value: f64) -> Self {
        Self {
            hook_strength: value,
            rule_compliance: value,
            distinctiveness: value,
            relevance: value,
            persona_fit: value,
        }
    }

    /// Every sub-score clamped to [0, 10]. NaN becomes 0.
    pub fn clamped(self) -> Self {
        fn clamp(v: f64) -> f64 {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(0.0, 10.0)
            }
        }
        Self {
            hook_strength: clamp(self.hook_strength),
            rule_compliance: clamp(self.rule_compliance),
            distinctiveness: clamp(self.distinctiveness),
            relevance: clamp(self.relevance),
            persona_fit: clamp(self.persona_fit),
        }
    }

    /// Fixed weighted sum over the clamped sub-scores.
    pub fn weighted_total(&self) -> f64 {
        let s = self.clamped();
        s.hook_strength * HOOK_STRENGTH_WEIGHT
            + s.rule_compliance * RULE_COMPLIANCE_WEIGHT
            + s.distinctiveness * DISTINCTIVENESS_WEIGHT
            + s.relevance * RELEVANCE_WEIGHT
            + s.persona_fit * PERSONA_FIT_WEIGHT
    }
}

/// Judged score for one candidate. Built only through [`CriterionScore::new`]
/// so `weighted_total` always matches the sub-scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub candidate: CandidateKey,
    #[serde(flatten)]
    pub scores: SubScores,
    pub weighted_total: f64,
    pub notes: String,
}

impl CriterionScore {
    pub fn new(candidate: CandidateKey, scores: SubScores, notes: impl Into<String>) -> Self {
        let scores = scores.clamped();
        Self {
            candidate,
            weighted_total: scores.weighted_total(),
            scores,
            notes: notes.into(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.notes.contains(FALLBACK_MARKER)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgmentResult {
    pub winner: Candidate,
    pub winner_score: CriterionScore,
    pub rationale: String,
    pub all_scores: Vec<CriterionScore>,
    pub improvement_notes: Option<String>,
    pub candidates_judged: usize,
    /// True when the judging response was unusable and candidate 0 won by default.
    pub fallback: bool,
}

impl JudgmentResult {
    pub fn score_for(&self, key: CandidateKey) -> Option<&CriterionScore> {
        self.all_scores.iter().find(|s| s.candidate == key)
    }
}

// =============================================================================
// Pipeline run
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_workers: usize,
    pub generation_errors: usize,
    pub total_candidates: usize,
    pub rule_violations: usize,
    pub valid_candidates: usize,
    pub judged_candidates: usize,
    /// Every candidate failed validation, so the judge saw unfiltered ones.
    pub used_unfiltered_pool: bool,
    pub judge_fallback: bool,
    pub candidates_per_persona: BTreeMap<String, usize>,
    pub duration_ms: u64,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Pipeline Run Complete ===")?;
        writeln!(f, "Workers:            {}", self.total_workers)?;
        writeln!(f, "Generation errors:  {}", self.generation_errors)?;
        writeln!(f, "Candidates:         {}", self.total_candidates)?;
        writeln!(f, "Rule violations:    {}", self.rule_violations)?;
        writeln!(f, "Valid candidates:   {}", self.valid_candidates)?;
        writeln!(f, "Judged candidates:  {}", self.judged_candidates)?;
        if self.used_unfiltered_pool {
            writeln!(f, "  (no candidate passed validation; judged unfiltered)")?;
        }
        if self.judge_fallback {
            writeln!(f, "  (judge response unusable; fallback winner)")?;
        }
        writeln!(f, "Duration:           {:.1}s", self.duration_ms as f64 / 1000.0)?;
        writeln!(f, "\nBy persona:")?;
        for (persona, count) in &self.candidates_per_persona {
            writeln!(f, "  {persona}: {count}")?;
        }
        Ok(())
    }
}

/// Everything one generate-filter-judge run produced. `validations[i]`
/// belongs to `candidates[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub source: SourceContent,
    pub contexts: Vec<CreativityContext>,
    pub candidates: Vec<Candidate>,
    pub validations: Vec<ValidationOutcome>,
    pub valid_candidates: Vec<Candidate>,
    pub judgment: JudgmentResult,
    pub stats: RunStats,
}

impl PipelineRun {
    pub fn validation_for(&self, key: CandidateKey) -> Option<&ValidationOutcome> {
        self.candidates
            .iter()
            .position(|c| c.key() == key)
            .and_then(|i| self.validations.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CandidateKey {
        CandidateKey {
            worker_id: 1,
            sequence_id: 0,
        }
    }

    #[test]
    fn weighted_total_follows_fixed_weights() {
        let scores = SubScores {
            hook_strength: 8.0,
            rule_compliance: 6.0,
            distinctiveness: 7.0,
            relevance: 5.0,
            persona_fit: 9.0,
        };
        let score = CriterionScore::new(key(), scores, "");
        let expected = 8.0 * 0.30 + 6.0 * 0.25 + 7.0 * 0.20 + 5.0 * 0.15 + 9.0 * 0.10;
        assert!((score.weighted_total - expected).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_sub_scores_are_clamped_before_weighting() {
        let scores = SubScores {
            hook_strength: 14.0,
            rule_compliance: -3.0,
            distinctiveness: f64::NAN,
            relevance: 10.0,
            persona_fit: 10.0,
        };
        let score = CriterionScore::new(key(), scores, "");
        assert_eq!(score.scores.hook_strength, 10.0);
        assert_eq!(score.scores.rule_compliance, 0.0);
        assert_eq!(score.scores.distinctiveness, 0.0);
        let expected = 10.0 * 0.30 + 10.0 * 0.15 + 10.0 * 0.10;
        assert!((score.weighted_total - expected).abs() < 1e-9);
    }

    #[test]
    fn uniform_five_scores_total_five() {
        let score = CriterionScore::new(key(), SubScores::uniform(5.0), FALLBACK_MARKER);
        assert!((score.weighted_total - 5.0).abs() < 1e-9);
        assert!(score.is_fallback());
    }

    #[test]
    fn candidate_keys_order_by_worker_then_sequence() {
        let mut keys = vec![
            CandidateKey { worker_id: 2, sequence_id: 0 },
            CandidateKey { worker_id: 0, sequence_id: 1 },
            CandidateKey { worker_id: 0, sequence_id: 0 },
        ];
        keys.sort();
        assert_eq!(keys[0], CandidateKey { worker_id: 0, sequence_id: 0 });
        assert_eq!(keys[2].to_string(), "w2#0");
    }

    #[test]
    fn criterion_score_serializes_flat() {
        let score = CriterionScore::new(key(), SubScores::uniform(7.0), "solid");
        let value = serde_json::to_value(&score).unwrap();
        assert_eq!(value["hook_strength"], 7.0);
        assert_eq!(value["candidate"]["worker_id"], 1);
        assert!(value.get("scores").is_none());
    }

    #[test]
    fn source_parses_from_title_and_summary_only() {
        let source: SourceContent =
            serde_json::from_str(r#"{"title": "X", "summary": "Y"}"#).unwrap();
        assert_eq!(source.digest(), "Title: X\nSummary: Y");
        assert!(source.target_icp.is_empty());
    }
}
