pub mod message;
pub mod openai;
pub mod util;

pub use message::{Message, MessageRole};
pub use openai::OpenAi;
pub use util::strip_code_blocks;
