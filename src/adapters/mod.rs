// Adapters layer: concrete implementations for external systems (database, AI service, filesystem).

pub mod gemini;
pub mod output;
pub mod store;

pub use gemini::GeminiClient;
pub use output::LocalStorage;
pub use store::CoordinateStore;
