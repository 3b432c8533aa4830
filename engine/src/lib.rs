pub mod encoding;
pub mod gallery;
pub mod gemini_api;
pub mod model;
pub mod notice;
pub mod params;
pub mod session;

pub use gemini_api::{GeminiClient, GenerationError, Transport};
pub use model::Model;
pub use session::{GenerateOutcome, Session, Settings};

pub const APP_NAME: &str = "NanoGen";
