pub mod client;
pub mod error;
pub mod json;
pub mod types;

pub use client::{DEFAULT_API_URL, LlmClient, MessageSender};
pub use error::LlmError;
pub use json::{ask_json, extract_json_object, parse_json_reply};
pub use types::{ContentBlock, Message, MessagesRequest, MessagesResponse, Usage};
