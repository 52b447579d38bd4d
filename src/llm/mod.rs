pub mod gemini;
pub mod persona;
pub mod provider;

pub use gemini::GeminiClient;
pub use provider::{GenerateError, GenerateRequest, TextGenerator};
