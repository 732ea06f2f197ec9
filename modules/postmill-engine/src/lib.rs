pub mod creativity;
pub mod export;
pub mod llm;
pub mod personas;
pub mod pipeline;
pub mod prompts;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod validation;

pub use creativity::{ContextMixer, CreativityConfig};
pub use export::RunExporter;
pub use personas::{PersonaProfile, PersonaSet};
pub use pipeline::{Judge, Orchestrator, PersonaPolicy};
pub use validation::CandidateValidator;
