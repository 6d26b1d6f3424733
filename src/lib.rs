pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::cli::LocalStorage;

pub use adapters::ollama::OllamaClient;
pub use crate::core::{
    analysis::ResultsAnalyzer,
    engine::{EngineSettings, ExperimentEngine},
    evaluation::DebateEvaluator,
    orchestrator::EnsembleOrchestrator,
    protocol::DebateProtocol,
    results_store::ResultsStore,
};
pub use utils::error::{DebateError, Result};
