pub mod claude;
pub mod error;
pub mod openai;
pub mod traits;
pub mod util;

pub use claude::Claude;
pub use error::AiError;
pub use openai::OpenAi;
pub use traits::{CompletionRequest, Message, MessageRole, TextModel};
pub use util::{extract_code_block, extract_json_span, strip_code_blocks, truncate_to_char_boundary};
