// Test mocks for the generate-filter-judge pipeline.
//
// Two mocks matching the two capability boundaries:
// - MockGenerator (GenerationCapability): per-worker scripted replies, failures, delays
// - MockJudge (JudgingCapability): fixed reply, failure, or "pick index N"
//
// Plus builders for creativity pools, personas, contexts, candidates and runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use postmill_common::{
    Candidate, CandidateKey, CreativityContext, CriterionScore, JudgmentResult, PipelineRun,
    RunStats, SourceContent, SubScores, ValidationOutcome,
};

use crate::creativity::{
    ContentAngle, ContextMixer, CreativityConfig, HookPattern, OptionalPool, StructureTemplate,
    StyleReference,
};
use crate::creativity::pools::{FewShotSettings, StyleReferences};
use crate::personas::{PersonaProfile, PersonaSet};
use crate::pipeline::judge::{Judge, JudgeRequest, JudgingCapability};
use crate::pipeline::orchestrator::Orchestrator;
use crate::pipeline::worker::{GenerationCapability, GenerationRequest};
use crate::validation::CandidateValidator;

// ---------------------------------------------------------------------------
// Text fixtures
// ---------------------------------------------------------------------------

/// A post that passes every validation rule. Varies with its arguments so
/// candidates stay distinguishable.
pub fn clean_post(worker_id: u32, sequence_id: u32) -> String {
    format!(
        "Worker {worker_id} variant {sequence_id}: 37 of our 120 deploys failed on Fridays. \
         We moved releases to Tuesday. Incidents dropped by half within 6 weeks, and nobody \
         missed the Friday scramble."
    )
}

/// A post that trips several rules.
pub fn sloppy_post(worker_id: u32) -> String {
    format!("Let's dive in!! Worker {worker_id} will leverage synergy to unlock value.")
}

// ---------------------------------------------------------------------------
// MockGenerator
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Script {
    Reply(String),
    Fail,
}

/// Scripted generation capability. Unregistered workers reply with
/// `variant_count` clean posts. Builder pattern: `.on_worker()`,
/// `.fail_worker()`, `.delay_worker()`, `.sloppy_worker()`.
pub struct MockGenerator {
    scripts: HashMap<u32, Script>,
    delays: HashMap<u32, Duration>,
    calls: Mutex<Vec<GenerationCall>>,
}

/// What one generation call asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationCall {
    pub worker_id: u32,
    pub persona_id: String,
    pub variant_count: u32,
    pub seed: u64,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            delays: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_worker(mut self, worker_id: u32, reply: impl Into<String>) -> Self {
        self.scripts.insert(worker_id, Script::Reply(reply.into()));
        self
    }

    pub fn fail_worker(mut self, worker_id: u32) -> Self {
        self.scripts.insert(worker_id, Script::Fail);
        self
    }

    pub fn sloppy_worker(self, worker_id: u32) -> Self {
        let reply = json!([{ "content": sloppy_post(worker_id) }]).to_string();
        self.on_worker(worker_id, reply)
    }

    pub fn delay_worker(mut self, worker_id: u32, delay: Duration) -> Self {
        self.delays.insert(worker_id, delay);
        self
    }

    pub fn calls(&self) -> Vec<GenerationCall> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort_by_key(|c| c.worker_id);
        calls
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationCapability for MockGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let worker_id = request.worker_id;
        self.calls.lock().unwrap().push(GenerationCall {
            worker_id,
            persona_id: request.context.persona_id.clone(),
            variant_count: request.variant_count,
            seed: request.context.seed,
        });

        if let Some(delay) = self.delays.get(&worker_id) {
            tokio::time::sleep(*delay).await;
        }

        match self.scripts.get(&worker_id) {
            Some(Script::Reply(reply)) => Ok(reply.clone()),
            Some(Script::Fail) => bail!("MockGenerator: worker {worker_id} scripted to fail"),
            None => {
                let variants: Vec<_> = (0..request.variant_count)
                    .map(|seq| {
                        json!({
                            "content": clean_post(worker_id, seq),
                            "hook_type": request.context.hook_pattern,
                            "what_makes_it_different": format!("variant {seq}"),
                        })
                    })
                    .collect();
                Ok(serde_json::Value::Array(variants).to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MockJudge
// ---------------------------------------------------------------------------

enum JudgeScript {
    Reply(String),
    Fail,
    /// Uniform 7s for every candidate, winner at this index.
    Pick(i64),
}

/// Scripted judging capability. Records the keys of every candidate set it
/// was asked to judge.
pub struct MockJudge {
    script: JudgeScript,
    seen: Mutex<Vec<Vec<CandidateKey>>>,
}

impl MockJudge {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self::with_script(JudgeScript::Reply(reply.into()))
    }

    pub fn failing() -> Self {
        Self::with_script(JudgeScript::Fail)
    }

    pub fn picking(index: i64) -> Self {
        Self::with_script(JudgeScript::Pick(index))
    }

    fn with_script(script: JudgeScript) -> Self {
        Self {
            script,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<Vec<CandidateKey>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl JudgingCapability for MockJudge {
    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<String> {
        self.seen
            .lock()
            .unwrap()
            .push(request.candidates.iter().map(Candidate::key).collect());

        match &self.script {
            JudgeScript::Reply(reply) => Ok(reply.clone()),
            JudgeScript::Fail => bail!("MockJudge: scripted to fail"),
            JudgeScript::Pick(index) => {
                let scores: Vec<_> = request
                    .candidates
                    .iter()
                    .map(|c| {
                        json!({
                            "hook_strength": 7, "rule_compliance": 7, "distinctiveness": 7,
                            "relevance": 7, "persona_fit": 7, "notes": format!("ok {}", c.key()),
                        })
                    })
                    .collect();
                Ok(json!({
                    "scores": scores,
                    "winner_index": index,
                    "rationale": "mock pick",
                })
                .to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config and record builders
// ---------------------------------------------------------------------------

pub fn sample_creativity_config() -> CreativityConfig {
    let hooks = [
        ("contrarian", 3.0, "Open by disagreeing with the consensus"),
        ("number_first", 2.0, "Lead with a specific, surprising number"),
        ("confession", 1.0, "Admit a mistake in the first line"),
    ];
    let angles = [
        ("speed", 2.0, "Shorter feedback loops beat bigger teams"),
        ("cost", 1.0, "Most cost overruns are decided in week one"),
    ];

    CreativityConfig {
        hook_patterns: hooks
            .into_iter()
            .map(|(id, weight, description)| {
                (
                    id.to_string(),
                    HookPattern {
                        weight,
                        description: description.to_string(),
                    },
                )
            })
            .collect(),
        structures: vec![
            StructureTemplate {
                id: "story".into(),
                weight: 2.0,
                description: "A short story, then the lesson".into(),
                guidance: Some("Keep the story under five sentences".into()),
                anti_patterns: vec!["Moralizing in the last line".into()],
            },
            StructureTemplate {
                id: "list_free_argument".into(),
                weight: 1.0,
                description: "One claim, defended in prose".into(),
                guidance: None,
                anti_patterns: Vec::new(),
            },
        ],
        content_angles: angles
            .into_iter()
            .map(|(id, weight, msg)| {
                (
                    id.to_string(),
                    ContentAngle {
                        weight,
                        key_message: msg.to_string(),
                    },
                )
            })
            .collect(),
        few_shot: FewShotSettings {
            num_examples: 2,
            pools: BTreeMap::from([
                (
                    "professional".to_string(),
                    vec![
                        "We cut onboarding from 14 days to 3.".to_string(),
                        "Our worst quarter taught us one thing.".to_string(),
                        "I fired our best client in 2021.".to_string(),
                    ],
                ),
                (
                    "witty".to_string(),
                    vec!["My calendar has more meetings than my team has ideas.".to_string()],
                ),
            ]),
        },
        style_references: StyleReferences {
            probability: 0.5,
            styles: vec![
                StyleReference {
                    id: "pg".into(),
                    name: "Paul Graham".into(),
                    essence: "Plain words, short declarative sentences".into(),
                    sample: None,
                    use_for: vec!["professional".into()],
                },
                StyleReference {
                    id: "wodehouse".into(),
                    name: "P. G. Wodehouse".into(),
                    essence: "Absurd similes delivered with a straight face".into(),
                    sample: Some("He had the look of one who has drunk the cup of life and found a dead beetle at the bottom.".into()),
                    use_for: vec!["witty".into()],
                },
            ],
        },
        tone_perturbations: OptionalPool {
            probability: 0.4,
            options: vec![
                "Write it like a field report.".into(),
                "Slightly impatient, as if the reader should know this already.".into(),
            ],
        },
        structural_breaks: OptionalPool {
            probability: 0.3,
            options: vec!["End on a question you then refuse to answer.".into()],
        },
    }
}

pub fn sample_personas() -> PersonaSet {
    let mut professional = PersonaProfile::new("professional", "The Operator");
    professional.voice_traits = vec!["direct".into(), "numbers first".into()];
    let mut witty = PersonaProfile::new("witty", "The Wit");
    witty.voice_traits = vec!["dry".into()];
    let storyteller = PersonaProfile::new("storyteller", "The Storyteller");

    // Infallible: ids are distinct and non-empty.
    PersonaSet::new(vec![professional, witty, storyteller]).unwrap()
}

pub fn sample_context(persona_id: &str) -> CreativityContext {
    CreativityContext {
        persona_id: persona_id.to_string(),
        hook_pattern: "contrarian".into(),
        hook_description: "Open by disagreeing with the consensus".into(),
        structure: "story".into(),
        structure_description: "A short story, then the lesson".into(),
        structure_guidance: None,
        structure_anti_patterns: Vec::new(),
        few_shot_examples: Vec::new(),
        style_reference: Some("Write with influence from Paul Graham: plain words".into()),
        tone_perturbation: None,
        structural_break: None,
        content_angle: "Shorter feedback loops beat bigger teams".into(),
        seed: 42,
    }
}

pub fn candidate(worker_id: u32, sequence_id: u32, content: &str) -> Candidate {
    Candidate {
        content: content.to_string(),
        hook_type: "contrarian".into(),
        structure: "story".into(),
        persona_id: "professional".into(),
        worker_id,
        sequence_id,
        distinctiveness_note: String::new(),
    }
}

/// Orchestrator over the sample pools and personas with the given mocks.
pub fn orchestrator(generator: Arc<MockGenerator>, judge: Arc<MockJudge>) -> Orchestrator {
    let validator = CandidateValidator::new();
    let judge = Judge::new(judge, validator.rules_for_prompt());
    // Infallible: the sample config validates.
    let mixer = ContextMixer::new(sample_creativity_config()).unwrap();
    Orchestrator::new(mixer, validator, sample_personas(), generator, judge)
}

/// A finished two-candidate run where worker 1 won.
pub fn sample_run() -> PipelineRun {
    let candidates = vec![
        candidate(0, 0, &clean_post(0, 0)),
        candidate(1, 0, &clean_post(1, 0)),
    ];
    let validator = CandidateValidator::new();
    let validations: Vec<ValidationOutcome> =
        candidates.iter().map(|c| validator.validate(&c.content)).collect();
    let all_scores: Vec<CriterionScore> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| CriterionScore::new(c.key(), SubScores::uniform(6.0 + i as f64), "fine"))
        .collect();

    PipelineRun {
        run_id: Uuid::new_v4(),
        started_at: Utc::now(),
        source: SourceContent::new("X", "Y"),
        contexts: vec![sample_context("professional"), sample_context("witty")],
        candidates: candidates.clone(),
        validations,
        valid_candidates: candidates.clone(),
        judgment: JudgmentResult {
            winner: candidates[1].clone(),
            winner_score: all_scores[1].clone(),
            rationale: "Sharper hook".into(),
            all_scores,
            improvement_notes: Some("Cut the last line".into()),
            candidates_judged: 2,
            fallback: false,
        },
        stats: RunStats {
            total_workers: 2,
            total_candidates: 2,
            valid_candidates: 2,
            judged_candidates: 2,
            candidates_per_persona: BTreeMap::from([("professional".to_string(), 2)]),
            duration_ms: 1_500,
            ..Default::default()
        },
    }
}
