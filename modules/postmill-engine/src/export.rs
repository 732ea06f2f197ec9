//! Run export: one timestamped directory of JSON and Markdown per run.
//!
//! Layout of `{output_dir}/{YYYY-MM-DD_HH-MM-SS}_{run_id8}/`:
//! - `winner.json`: winning candidate, its score, rationale
//! - `winner.md`: the same for humans
//! - `candidates.json`: every candidate with validation and score
//! - `run_log.json`: stats, per-worker contexts, timing
//! - `source.json`: the input

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use postmill_common::{
    Candidate, CreativityContext, CriterionScore, PipelineRun, RunStats, ValidationOutcome,
};

pub struct RunExporter {
    output_dir: PathBuf,
}

impl RunExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Write every artifact of `run`. Returns the run directory.
    pub fn save(&self, run: &PipelineRun) -> Result<PathBuf> {
        let dir = self.output_dir.join(run_dir_name(run));
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create run directory {}", dir.display()))?;

        write_json(&dir.join("winner.json"), &WinnerRecord::from(run))?;
        fs::write(dir.join("winner.md"), winner_markdown(run))
            .context("Failed to write winner.md")?;
        write_json(&dir.join("candidates.json"), &candidate_records(run))?;
        write_json(&dir.join("run_log.json"), &RunLogRecord::from(run))?;
        write_json(&dir.join("source.json"), &run.source)?;

        info!(
            path = %dir.display(),
            candidates = run.candidates.len(),
            "Run exported"
        );
        Ok(dir)
    }
}

fn run_dir_name(run: &PipelineRun) -> String {
    let id = run.run_id.simple().to_string();
    format!("{}_{}", run.started_at.format("%Y-%m-%d_%H-%M-%S"), &id[..8])
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
}

// ---------------------------------------------------------------------------
// Serialization wrappers
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct WinnerRecord<'a> {
    run_id: Uuid,
    generated_at: DateTime<Utc>,
    source_title: &'a str,
    winner: &'a Candidate,
    score: &'a CriterionScore,
    rationale: &'a str,
    improvement_notes: Option<&'a str>,
    fallback: bool,
}

impl<'a> From<&'a PipelineRun> for WinnerRecord<'a> {
    fn from(run: &'a PipelineRun) -> Self {
        let j = &run.judgment;
        Self {
            run_id: run.run_id,
            generated_at: run.started_at,
            source_title: &run.source.title,
            winner: &j.winner,
            score: &j.winner_score,
            rationale: &j.rationale,
            improvement_notes: j.improvement_notes.as_deref(),
            fallback: j.fallback,
        }
    }
}

#[derive(Serialize)]
struct CandidateRecord<'a> {
    index: usize,
    #[serde(flatten)]
    candidate: &'a Candidate,
    validation: Option<&'a ValidationOutcome>,
    /// Absent when the candidate was not handed to the judge.
    score: Option<&'a CriterionScore>,
    is_winner: bool,
}

fn candidate_records(run: &PipelineRun) -> Vec<CandidateRecord<'_>> {
    let winner = run.judgment.winner.key();
    run.candidates
        .iter()
        .enumerate()
        .map(|(index, c)| CandidateRecord {
            index,
            candidate: c,
            validation: run.validations.get(index),
            score: run.judgment.score_for(c.key()),
            is_winner: c.key() == winner,
        })
        .collect()
}

#[derive(Serialize)]
struct RunLogRecord<'a> {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    stats: &'a RunStats,
    contexts: &'a [CreativityContext],
}

impl<'a> From<&'a PipelineRun> for RunLogRecord<'a> {
    fn from(run: &'a PipelineRun) -> Self {
        Self {
            run_id: run.run_id,
            started_at: run.started_at,
            finished_at: run.started_at
                + chrono::Duration::milliseconds(run.stats.duration_ms as i64),
            stats: &run.stats,
            contexts: &run.contexts,
        }
    }
}

pub fn winner_markdown(run: &PipelineRun) -> String {
    let j = &run.judgment;
    let w = &j.winner;
    let s = &j.winner_score.scores;
    let mut md = String::new();

    let _ = writeln!(md, "# Post - {}\n", run.started_at.format("%Y-%m-%d %H:%M"));
    let _ = writeln!(md, "## Source\n");
    let _ = writeln!(md, "**Title:** {}", run.source.title);
    if !run.source.source.is_empty() {
        let _ = writeln!(md, "**Source:** {}", run.source.source);
    }
    if !run.source.suggested_angle.is_empty() {
        let _ = writeln!(md, "**Suggested angle:** {}", run.source.suggested_angle);
    }

    let _ = writeln!(md, "\n---\n\n## Winning Post\n");
    let _ = writeln!(md, "**Persona:** {}", w.persona_id);
    let _ = writeln!(md, "**Hook:** {}", w.hook_type);
    let _ = writeln!(md, "**Structure:** {}", w.structure);
    let _ = writeln!(md, "\n---\n\n{}\n\n---\n", w.content);

    if j.fallback {
        let _ = writeln!(
            md,
            "> Fallback selection: the judging response was unusable, so the first candidate won by default.\n"
        );
    }

    let _ = writeln!(md, "## Scores\n");
    let _ = writeln!(md, "| Criterion | Score |");
    let _ = writeln!(md, "|-----------|-------|");
    for (name, value) in [
        ("Hook strength", s.hook_strength),
        ("Rule compliance", s.rule_compliance),
        ("Distinctiveness", s.distinctiveness),
        ("Relevance", s.relevance),
        ("Persona fit", s.persona_fit),
    ] {
        let _ = writeln!(md, "| {name} | {value:.1}/10 |");
    }
    let _ = writeln!(
        md,
        "| **Weighted total** | **{:.1}/10** |",
        j.winner_score.weighted_total
    );

    let _ = writeln!(md, "\n## Judge's Rationale\n\n{}", j.rationale);
    if let Some(notes) = &j.improvement_notes {
        let _ = writeln!(md, "\n## Suggested Improvements\n\n{notes}");
    }

    let st = &run.stats;
    let _ = writeln!(md, "\n## Generation Stats\n");
    let _ = writeln!(md, "- Workers: {} ({} failed or empty)", st.total_workers, st.generation_errors);
    let _ = writeln!(md, "- Candidates generated: {}", st.total_candidates);
    let _ = writeln!(md, "- Rule violations filtered: {}", st.rule_violations);
    let _ = writeln!(md, "- Candidates judged: {}", st.judged_candidates);
    let _ = writeln!(md, "- Duration: {:.1}s", st.duration_ms as f64 / 1000.0);
    let by_persona: Vec<String> = st
        .candidates_per_persona
        .iter()
        .map(|(p, n)| format!("{p}: {n}"))
        .collect();
    let _ = writeln!(md, "- Candidates by persona: {}", by_persona.join(", "));

    md
}
