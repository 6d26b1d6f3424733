pub mod analysis;
pub mod engine;
pub mod evaluation;
pub mod orchestrator;
pub mod progress;
pub mod protocol;
pub mod results_store;
pub mod stats;

pub use crate::domain::model::{Configuration, DebateResult, EvaluationScore, Scenario};
pub use crate::domain::ports::{ConfigProvider, InferenceClient, Storage};
pub use crate::utils::error::Result;
