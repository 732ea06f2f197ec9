use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostmillError {
    #[error("No candidates produced: {generation_errors} of {workers} workers failed and the rest returned nothing")]
    NoCandidates {
        workers: usize,
        generation_errors: usize,
    },

    #[error("Judge called with an empty candidate list")]
    EmptyJudgeInput,

    #[error("Unknown persona: {0}")]
    UnknownPersona(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
