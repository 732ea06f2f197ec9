//! Fan-out/fan-in orchestration of one generate-filter-judge run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use postmill_common::{
    Candidate, CreativityContext, PipelineRun, PostmillError, RunStats, SourceContent,
};

use crate::creativity::ContextMixer;
use crate::personas::PersonaSet;
use crate::validation::CandidateValidator;

use super::judge::Judge;
use super::worker::{GenerationCapability, GenerationWorker, WorkerError};

/// Most unfiltered candidates handed to the judge when none pass validation.
pub const UNFILTERED_POOL_LIMIT: usize = 10;

pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(180);

/// How workers are assigned personas.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PersonaPolicy {
    /// Round-robin until every persona has two workers, then uniform random.
    #[default]
    Balanced,
    /// Every worker writes as one persona.
    Fixed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Collecting,
    Validating,
    Judging,
    Complete,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Collecting => "collecting",
            RunPhase::Validating => "validating",
            RunPhase::Judging => "judging",
            RunPhase::Complete => "complete",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One worker's planned call.
struct WorkerPlan {
    context: CreativityContext,
    variant_count: u32,
}

pub struct Orchestrator {
    mixer: ContextMixer,
    validator: CandidateValidator,
    personas: PersonaSet,
    generator: Arc<dyn GenerationCapability>,
    judge: Judge,
    variants_min: u32,
    variants_max: u32,
    worker_timeout: Duration,
    seed: Option<u64>,
}

impl Orchestrator {
    pub fn new(
        mixer: ContextMixer,
        validator: CandidateValidator,
        personas: PersonaSet,
        generator: Arc<dyn GenerationCapability>,
        judge: Judge,
    ) -> Self {
        Self {
            mixer,
            validator,
            personas,
            generator,
            judge,
            variants_min: 1,
            variants_max: 1,
            worker_timeout: DEFAULT_WORKER_TIMEOUT,
            seed: None,
        }
    }

    /// Each worker asks for a uniformly drawn count in `min..=max`.
    /// Zero and inverted ranges are raised to at least one variant.
    pub fn with_variants(mut self, min: u32, max: u32) -> Self {
        self.variants_min = min.max(1);
        self.variants_max = max.max(self.variants_min);
        self
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    /// Make persona assignment, variant counts and every context
    /// reproducible. Worker `w` gets context seed `seed + w`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validator(&self) -> &CandidateValidator {
        &self.validator
    }

    pub fn personas(&self) -> &PersonaSet {
        &self.personas
    }

    /// Run the pipeline once. Only a run with no candidates at all fails;
    /// every other problem is recorded in the returned stats.
    pub async fn run(
        &self,
        source: &SourceContent,
        num_workers: usize,
        policy: &PersonaPolicy,
    ) -> Result<PipelineRun, PostmillError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        let plans = self.plan(num_workers, policy)?;

        // --- Collecting ---
        log_phase(run_id, RunPhase::Collecting);
        info!(
            workers = plans.len(),
            title = source.title.as_str(),
            "Launching generation workers"
        );

        let calls = plans.iter().enumerate().map(|(w, plan)| {
            let worker = GenerationWorker::new(w as u32, self.generator.clone(), self.worker_timeout);
            async move { worker.run(source, &plan.context, plan.variant_count).await }
        });
        let outcomes: Vec<Result<Vec<Candidate>, WorkerError>> = join_all(calls).await;

        let mut generation_errors = 0;
        let mut candidates = Vec::new();
        for (w, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(batch) if batch.is_empty() => {
                    warn!(worker = w, "Worker produced no candidates");
                    generation_errors += 1;
                }
                Ok(batch) => candidates.extend(batch),
                Err(e) => {
                    warn!(worker = w, error = %e, "Worker failed");
                    generation_errors += 1;
                }
            }
        }
        candidates.sort_by_key(Candidate::key);

        info!(
            candidates = candidates.len(),
            generation_errors, "Generation settled"
        );

        if candidates.is_empty() {
            log_phase(run_id, RunPhase::Failed);
            error!(workers = plans.len(), generation_errors, "No candidates produced");
            return Err(PostmillError::NoCandidates {
                workers: plans.len(),
                generation_errors,
            });
        }

        // --- Validating ---
        log_phase(run_id, RunPhase::Validating);
        let validations: Vec<_> = candidates
            .iter()
            .map(|c| {
                let outcome = self.validator.validate(&c.content);
                debug!(
                    candidate = %c.key(),
                    valid = outcome.is_valid,
                    score = outcome.score,
                    violations = ?outcome.violations,
                    "Validated candidate"
                );
                outcome
            })
            .collect();

        let valid_candidates: Vec<Candidate> = candidates
            .iter()
            .zip(&validations)
            .filter(|(_, v)| v.is_valid)
            .map(|(c, _)| c.clone())
            .collect();
        let rule_violations = candidates.len() - valid_candidates.len();

        let used_unfiltered_pool = valid_candidates.is_empty();
        let judge_input: Vec<Candidate> = if used_unfiltered_pool {
            let take = candidates.len().min(UNFILTERED_POOL_LIMIT);
            warn!(
                candidates = candidates.len(),
                judged = take,
                "No candidate passed validation, judging unfiltered candidates"
            );
            candidates[..take].to_vec()
        } else {
            valid_candidates.clone()
        };

        info!(
            valid = valid_candidates.len(),
            rule_violations, "Validation complete"
        );

        // --- Judging ---
        log_phase(run_id, RunPhase::Judging);
        let judgment = self.judge.judge(&judge_input, &source.digest()).await?;

        let mut candidates_per_persona = BTreeMap::new();
        for c in &candidates {
            *candidates_per_persona.entry(c.persona_id.clone()).or_insert(0) += 1;
        }

        let stats = RunStats {
            total_workers: plans.len(),
            generation_errors,
            total_candidates: candidates.len(),
            rule_violations,
            valid_candidates: valid_candidates.len(),
            judged_candidates: judge_input.len(),
            used_unfiltered_pool,
            judge_fallback: judgment.fallback,
            candidates_per_persona,
            duration_ms: clock.elapsed().as_millis() as u64,
        };

        log_phase(run_id, RunPhase::Complete);
        info!(
            winner = %judgment.winner.key(),
            persona = judgment.winner.persona_id.as_str(),
            score = judgment.winner_score.weighted_total,
            fallback = judgment.fallback,
            duration_ms = stats.duration_ms,
            "Run complete"
        );

        Ok(PipelineRun {
            run_id,
            started_at,
            source: source.clone(),
            contexts: plans.into_iter().map(|p| p.context).collect(),
            candidates,
            validations,
            valid_candidates,
            judgment,
            stats,
        })
    }

    /// Persona, context and variant count for every worker, drawn before
    /// any call is made.
    fn plan(
        &self,
        num_workers: usize,
        policy: &PersonaPolicy,
    ) -> Result<Vec<WorkerPlan>, PostmillError> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        let personas = assign_personas(&self.personas, num_workers, policy, &mut rng)?;

        Ok(personas
            .into_iter()
            .enumerate()
            .map(|(w, persona)| {
                let context_seed = self.seed.map(|s| s.wrapping_add(w as u64));
                let variant_count = rng.random_range(self.variants_min..=self.variants_max);
                WorkerPlan {
                    context: self.mixer.generate(&persona, context_seed),
                    variant_count,
                }
            })
            .collect())
    }
}

/// Persona id for each of `num_workers` workers.
pub fn assign_personas(
    personas: &PersonaSet,
    num_workers: usize,
    policy: &PersonaPolicy,
    rng: &mut impl Rng,
) -> Result<Vec<String>, PostmillError> {
    match policy {
        PersonaPolicy::Fixed(id) => {
            let persona = personas.require(id)?;
            Ok(vec![persona.id.clone(); num_workers])
        }
        PersonaPolicy::Balanced => {
            let n = personas.len();
            Ok((0..num_workers)
                .map(|w| {
                    let index = if w < 2 * n { w } else { rng.random_range(0..n) };
                    personas.at(index).id.clone()
                })
                .collect())
        }
    }
}

fn log_phase(run_id: Uuid, phase: RunPhase) {
    info!(run_id = %run_id, phase = %phase, "Run phase");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personas::PersonaProfile;

    fn personas(ids: &[&str]) -> PersonaSet {
        PersonaSet::new(ids.iter().map(|id| PersonaProfile::new(*id, *id)).collect()).unwrap()
    }

    #[test]
    fn balanced_covers_every_persona_twice() {
        let set = personas(&["a", "b", "c"]);
        let mut rng = StdRng::seed_from_u64(7);
        for workers in 6..20 {
            let assigned = assign_personas(&set, workers, &PersonaPolicy::Balanced, &mut rng).unwrap();
            assert_eq!(assigned.len(), workers);
            for id in ["a", "b", "c"] {
                assert!(assigned.iter().filter(|p| *p == id).count() >= 2);
            }
            assert_eq!(&assigned[..6], ["a", "b", "c", "a", "b", "c"]);
        }
    }

    #[test]
    fn balanced_round_robins_small_counts() {
        let set = personas(&["a", "b", "c"]);
        let mut rng = StdRng::seed_from_u64(1);
        let assigned = assign_personas(&set, 4, &PersonaPolicy::Balanced, &mut rng).unwrap();
        assert_eq!(assigned, ["a", "b", "c", "a"]);
    }

    #[test]
    fn fixed_policy_rejects_unknown_persona() {
        let set = personas(&["a", "b"]);
        let mut rng = StdRng::seed_from_u64(1);
        let fixed = assign_personas(&set, 3, &PersonaPolicy::Fixed("b".into()), &mut rng).unwrap();
        assert_eq!(fixed, ["b", "b", "b"]);

        let err = assign_personas(&set, 3, &PersonaPolicy::Fixed("z".into()), &mut rng).unwrap_err();
        assert!(matches!(err, PostmillError::UnknownPersona(_)));
    }

    #[test]
    fn phases_render_lowercase() {
        assert_eq!(RunPhase::Collecting.to_string(), "collecting");
        assert_eq!(RunPhase::Failed.to_string(), "failed");
    }
}
