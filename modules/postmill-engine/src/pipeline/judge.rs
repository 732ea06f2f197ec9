//! Weighted multi-criteria judge.
//!
//! Scoring is delegated to a judging capability; this module builds the
//! criteria digest it is given, checks what comes back, recomputes every
//! weighted total locally, and falls back to candidate 0 when the reply is
//! unusable.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use ai_client::truncate_to_char_boundary;
use postmill_common::{
    Candidate, CriterionScore, JudgmentResult, PostmillError, SubScores, DISTINCTIVENESS_WEIGHT,
    FALLBACK_MARKER, HOOK_STRENGTH_WEIGHT, PERSONA_FIT_WEIGHT, RELEVANCE_WEIGHT,
    RULE_COMPLIANCE_WEIGHT,
};

use super::worker::{parse_json_value, OBJECT_FIRST};

/// Reported totals further than this from the local formula are replaced.
const TOTAL_TOLERANCE: f64 = 0.01;

/// Everything one judging call sees.
#[derive(Debug, Clone, Copy)]
pub struct JudgeRequest<'a> {
    pub candidates: &'a [Candidate],
    /// Criteria, weights and scoring bands.
    pub criteria: &'a str,
    pub source_digest: &'a str,
    /// Writing rules, for the rule-compliance criterion.
    pub rules: &'a str,
}

#[async_trait]
pub trait JudgingCapability: Send + Sync {
    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<String>;
}

struct Criterion {
    key: &'static str,
    title: &'static str,
    weight: f64,
    questions: &'static [&'static str],
    /// Descriptions for the 1-3, 4-6, 7-8 and 9-10 bands.
    bands: [&'static str; 4],
}

const CRITERIA: [Criterion; 5] = [
    Criterion {
        key: "hook_strength",
        title: "HOOK STRENGTH",
        weight: HOOK_STRENGTH_WEIGHT,
        questions: &[
            "Would the first two lines stop a reader from scrolling?",
            "Does it create curiosity or tension?",
            "Is there a specific detail that grabs attention?",
        ],
        bands: [
            "Generic, forgettable opener",
            "Decent but not compelling",
            "Strong, would make most people pause",
            "Exceptional, impossible to scroll past",
        ],
    },
    Criterion {
        key: "rule_compliance",
        title: "RULE COMPLIANCE",
        weight: RULE_COMPLIANCE_WEIGHT,
        questions: &[
            "Any banned words or phrases?",
            "Any machine-prose tells (em-dash framing, snappy triads, weak openers)?",
            "Any engagement bait or emoji spam?",
        ],
        bands: [
            "Multiple violations",
            "Some machine patterns visible",
            "Clean, sounds human",
            "Distinctively human voice",
        ],
    },
    Criterion {
        key: "distinctiveness",
        title: "DISTINCTIVENESS",
        weight: DISTINCTIVENESS_WEIGHT,
        questions: &[
            "Is there a point of view, or could anyone have written it?",
            "Is there something surprising or contrarian?",
            "Would a reader remember it tomorrow?",
        ],
        bands: [
            "Generic, could be anyone",
            "Some personality but safe",
            "Clear voice and perspective",
            "Memorable, quotable",
        ],
    },
    Criterion {
        key: "relevance",
        title: "RELEVANCE",
        weight: RELEVANCE_WEIGHT,
        questions: &[
            "Does it connect the source to the reader's world naturally?",
            "Is any company mention earned rather than forced?",
            "Would the target audience find it valuable?",
        ],
        bands: [
            "Forced connection",
            "Logical but obvious",
            "Natural, insightful connection",
            "An angle nobody else would have found",
        ],
    },
    Criterion {
        key: "persona_fit",
        title: "PERSONA FIT",
        weight: PERSONA_FIT_WEIGHT,
        questions: &[
            "Does it sound like the intended persona?",
            "Is the tone consistent throughout?",
        ],
        bands: [
            "Wrong voice entirely",
            "Somewhat matches",
            "Good persona match",
            "Perfect embodiment of the persona",
        ],
    },
];

const BAND_LABELS: [&str; 4] = ["1-3", "4-6", "7-8", "9-10"];

/// The scoring criteria as sent to the judging capability. Weights come
/// straight from the constants behind [`SubScores::weighted_total`].
pub fn criteria_digest() -> String {
    let mut out = String::from("SCORING CRITERIA (weighted):\n");
    for (i, c) in CRITERIA.iter().enumerate() {
        let _ = writeln!(
            out,
            "\n{}. {} ({:.0}%) [field: {}]",
            i + 1,
            c.title,
            c.weight * 100.0,
            c.key
        );
        for q in c.questions {
            let _ = writeln!(out, "   - {q}");
        }
        for (label, band) in BAND_LABELS.iter().zip(c.bands) {
            let _ = writeln!(out, "   - Score {label}: {band}");
        }
    }
    let _ = write!(
        out,
        "\nweighted_total = {:.2}*hook_strength + {:.2}*rule_compliance + {:.2}*distinctiveness + {:.2}*relevance + {:.2}*persona_fit\n",
        HOOK_STRENGTH_WEIGHT,
        RULE_COMPLIANCE_WEIGHT,
        DISTINCTIVENESS_WEIGHT,
        RELEVANCE_WEIGHT,
        PERSONA_FIT_WEIGHT
    );
    out
}

// --- Reply parsing ---

#[derive(Debug, Deserialize)]
struct JudgeReply {
    #[serde(alias = "all_scores", alias = "per_candidate")]
    scores: Vec<ReportedScore>,
    winner_index: i64,
    #[serde(default, alias = "winner_reasoning")]
    rationale: String,
    #[serde(default)]
    improvement_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportedScore {
    hook_strength: f64,
    #[serde(alias = "anti_slop")]
    rule_compliance: f64,
    distinctiveness: f64,
    relevance: f64,
    persona_fit: f64,
    #[serde(default)]
    weighted_total: Option<f64>,
    #[serde(default)]
    notes: String,
}

impl ReportedScore {
    fn sub_scores(&self) -> SubScores {
        SubScores {
            hook_strength: self.hook_strength,
            rule_compliance: self.rule_compliance,
            distinctiveness: self.distinctiveness,
            relevance: self.relevance,
            persona_fit: self.persona_fit,
        }
    }
}

pub struct Judge {
    capability: Arc<dyn JudgingCapability>,
    rules: String,
    criteria: String,
}

impl Judge {
    pub fn new(capability: Arc<dyn JudgingCapability>, rules: impl Into<String>) -> Self {
        Self {
            capability,
            rules: rules.into(),
            criteria: criteria_digest(),
        }
    }

    /// Score `candidates` and pick a winner. Never fails on a bad reply;
    /// an empty candidate list is a caller bug and is reported as
    /// [`PostmillError::EmptyJudgeInput`].
    pub async fn judge(
        &self,
        candidates: &[Candidate],
        source_digest: &str,
    ) -> Result<JudgmentResult, PostmillError> {
        if candidates.is_empty() {
            return Err(PostmillError::EmptyJudgeInput);
        }

        let request = JudgeRequest {
            candidates,
            criteria: &self.criteria,
            source_digest,
            rules: &self.rules,
        };

        let raw = match self.capability.judge(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Judging call failed, using fallback winner");
                return Ok(fallback(candidates, "judging call failed"));
            }
        };

        match score_reply(&raw, candidates) {
            Ok(result) => {
                info!(
                    winner = %result.winner.key(),
                    score = result.winner_score.weighted_total,
                    judged = result.candidates_judged,
                    "Judging complete"
                );
                Ok(result)
            }
            Err(reason) => {
                warn!(
                    reason,
                    output = truncate_to_char_boundary(&raw, 200),
                    "Unusable judging response, using fallback winner"
                );
                Ok(fallback(candidates, reason))
            }
        }
    }
}

fn score_reply(raw: &str, candidates: &[Candidate]) -> Result<JudgmentResult, &'static str> {
    let value = parse_json_value(raw, &OBJECT_FIRST).map_err(|_| "no JSON in response")?;
    let reply: JudgeReply =
        serde_json::from_value(value).map_err(|_| "response missing required fields")?;

    if reply.scores.len() != candidates.len() {
        return Err("score count does not match candidate count");
    }

    let all_scores: Vec<CriterionScore> = candidates
        .iter()
        .zip(&reply.scores)
        .map(|(candidate, reported)| {
            let score = CriterionScore::new(candidate.key(), reported.sub_scores(), &reported.notes);
            if let Some(total) = reported.weighted_total {
                if (total - score.weighted_total).abs() > TOTAL_TOLERANCE {
                    debug!(
                        candidate = %candidate.key(),
                        reported = total,
                        computed = score.weighted_total,
                        "Replaced inconsistent weighted total"
                    );
                }
            }
            score
        })
        .collect();

    let winner_index = match usize::try_from(reply.winner_index) {
        Ok(i) if i < candidates.len() => i,
        _ => {
            warn!(
                winner_index = reply.winner_index,
                candidates = candidates.len(),
                "winner_index out of range, clamping to 0"
            );
            0
        }
    };

    Ok(JudgmentResult {
        winner: candidates[winner_index].clone(),
        winner_score: all_scores[winner_index].clone(),
        rationale: reply.rationale,
        all_scores,
        improvement_notes: reply.improvement_notes.filter(|n| !n.trim().is_empty()),
        candidates_judged: candidates.len(),
        fallback: false,
    })
}

/// Candidate 0 wins with a flat 5.0 on every criterion. Every score carries
/// [`FALLBACK_MARKER`] so the result is distinguishable from a judged win.
fn fallback(candidates: &[Candidate], reason: &str) -> JudgmentResult {
    let notes = format!("{FALLBACK_MARKER} {reason}");
    let all_scores: Vec<CriterionScore> = candidates
        .iter()
        .map(|c| CriterionScore::new(c.key(), SubScores::uniform(5.0), notes.clone()))
        .collect();

    JudgmentResult {
        winner: candidates[0].clone(),
        winner_score: all_scores[0].clone(),
        rationale: format!("Selected the first candidate without judging: {reason}"),
        all_scores,
        improvement_notes: None,
        candidates_judged: candidates.len(),
        fallback: true,
    }
}
