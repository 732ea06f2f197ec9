pub mod judge;
pub mod orchestrator;
pub mod worker;

pub use judge::{criteria_digest, Judge, JudgeRequest, JudgingCapability};
pub use orchestrator::{assign_personas, Orchestrator, PersonaPolicy};
pub use worker::{
    parse_variants, GenerationCapability, GenerationRequest, GenerationWorker, ParseError,
    RawVariant, WorkerError,
};
