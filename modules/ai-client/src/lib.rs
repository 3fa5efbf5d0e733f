mod client;
mod types;
pub mod util;

pub use client::OpenAi;
pub use types::{ChatRequest, ChatResponse, Choice, ChoiceMessage, WireMessage};
pub use util::{extract_json, strip_code_blocks, truncate_to_char_boundary};
