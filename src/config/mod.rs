pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use self::args::{CliConfig, LogFormat, RunMode};

#[cfg(feature = "cli")]
mod args {
    use super::toml_config::{ExperimentToml, MAX_ROUNDS};
    use crate::adapters::ollama::{GenerationOptions, DEFAULT_OLLAMA_URL};
    use crate::core::engine::EngineSettings;
    use crate::core::evaluation::{DEFAULT_EVALUATOR_MODEL, DEFAULT_FALLBACK_SCORE};
    use crate::core::orchestrator::{default_baselines, default_ensembles, ExperimentScale};
    use crate::domain::model::Configuration;
    use crate::domain::ports::ConfigProvider;
    use crate::domain::scenarios::all_scenarios;
    use crate::utils::error::{DebateError, Result};
    use crate::utils::validation::{
        validate_model_name, validate_path, validate_range, validate_url, Validate,
    };
    use clap::{ArgGroup, Parser, ValueEnum};
    use std::path::{Path, PathBuf};

    const DEFAULT_OUTPUT_DIR: &str = "./results";

    #[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
    pub enum LogFormat {
        Compact,
        Json,
    }

    /// 這次執行要做的事
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum RunMode {
        Experiment,
        Resume(PathBuf),
        EvaluateOnly(PathBuf),
        Analyze(PathBuf),
    }

    #[derive(Debug, Clone, Parser)]
    #[command(name = "ensemble-debates")]
    #[command(about = "Run multi-model debates on AI alignment topics against a local Ollama server")]
    #[command(group(ArgGroup::new("scale").args(["quick_test", "small", "full"])))]
    #[command(group(ArgGroup::new("mode").args(["evaluate_only", "resume", "analyze"])))]
    pub struct CliConfig {
        #[arg(long, help = "2 scenarios, 1 round")]
        pub quick_test: bool,

        #[arg(long, help = "5 scenarios, 2 rounds")]
        pub small: bool,

        #[arg(long, help = "15 scenarios, 2 rounds")]
        pub full: bool,

        #[arg(long, value_name = "RESULTS_JSON", help = "Score an existing results file")]
        pub evaluate_only: Option<PathBuf>,

        #[arg(long, value_name = "RESULTS_JSON", help = "Continue an interrupted experiment")]
        pub resume: Option<PathBuf>,

        #[arg(long, value_name = "RESULTS_JSON", help = "Only regenerate the report for a results file")]
        pub analyze: Option<PathBuf>,

        #[arg(long, value_name = "TOML", help = "Experiment configuration file")]
        pub config: Option<PathBuf>,

        #[arg(long)]
        pub ollama_url: Option<String>,

        #[arg(long)]
        pub output_dir: Option<String>,

        #[arg(long)]
        pub rounds: Option<usize>,

        #[arg(long)]
        pub scenarios: Option<usize>,

        #[arg(long, help = "Seed for scenario sampling")]
        pub seed: Option<u64>,

        #[arg(long)]
        pub evaluator_model: Option<String>,

        #[arg(long, help = "Skip the quality evaluation stage")]
        pub skip_evaluation: bool,

        #[arg(long, help = "Log CPU and memory usage per stage")]
        pub monitor: bool,

        #[arg(long, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, value_enum)]
        pub log_format: Option<LogFormat>,

        #[arg(skip)]
        pub toml: Option<ExperimentToml>,
    }

    impl CliConfig {
        /// 讀取 `--config` 指定的 TOML；沒有指定時什麼都不做
        pub fn load_toml(&mut self) -> Result<()> {
            if let Some(path) = &self.config {
                let toml = ExperimentToml::from_file(path)?;
                tracing::debug!("Loaded TOML config from {}", path.display());
                self.toml = Some(toml);
            }
            Ok(())
        }

        pub fn with_toml(mut self, toml: ExperimentToml) -> Self {
            self.toml = Some(toml);
            self
        }

        pub fn mode(&self) -> RunMode {
            if let Some(path) = &self.resume {
                RunMode::Resume(path.clone())
            } else if let Some(path) = &self.evaluate_only {
                RunMode::EvaluateOnly(path.clone())
            } else if let Some(path) = &self.analyze {
                RunMode::Analyze(path.clone())
            } else {
                RunMode::Experiment
            }
        }

        pub fn scale(&self) -> ExperimentScale {
            if self.full {
                ExperimentScale::Full
            } else if self.small {
                ExperimentScale::Small
            } else if self.quick_test {
                ExperimentScale::QuickTest
            } else {
                self.toml
                    .as_ref()
                    .and_then(|t| t.experiment.scale)
                    .unwrap_or(ExperimentScale::QuickTest)
            }
        }

        pub fn log_format(&self) -> LogFormat {
            self.log_format.unwrap_or_else(|| {
                match self.toml.as_ref().and_then(|t| t.output.log_format.as_deref()) {
                    Some("json") => LogFormat::Json,
                    _ => LogFormat::Compact,
                }
            })
        }

        pub fn generation_options(&self) -> GenerationOptions {
            self.toml
                .as_ref()
                .map(|t| t.generation_options())
                .unwrap_or_default()
        }

        pub fn baselines(&self) -> Vec<Configuration> {
            self.toml
                .as_ref()
                .and_then(|t| t.baselines())
                .unwrap_or_else(default_baselines)
        }

        pub fn ensembles(&self) -> Vec<Configuration> {
            self.toml
                .as_ref()
                .and_then(|t| t.ensembles())
                .unwrap_or_else(default_ensembles)
        }

        pub fn fallback_score(&self) -> f64 {
            self.toml
                .as_ref()
                .and_then(|t| t.evaluation.fallback_score)
                .unwrap_or(DEFAULT_FALLBACK_SCORE)
        }

        pub fn skip_evaluation(&self) -> bool {
            self.skip_evaluation
                || self
                    .toml
                    .as_ref()
                    .and_then(|t| t.evaluation.skip)
                    .unwrap_or(false)
        }

        pub fn engine_settings(&self) -> EngineSettings {
            EngineSettings {
                fallback_score: self.fallback_score(),
                skip_evaluation: self.skip_evaluation(),
                baselines: self.baselines(),
                ensembles: self.ensembles(),
                ..EngineSettings::from_provider(self)
            }
        }
    }

    impl ConfigProvider for CliConfig {
        fn ollama_url(&self) -> &str {
            self.ollama_url
                .as_deref()
                .or_else(|| self.toml.as_ref().and_then(|t| t.inference.ollama_url.as_deref()))
                .unwrap_or(DEFAULT_OLLAMA_URL)
        }

        fn output_dir(&self) -> &str {
            self.output_dir
                .as_deref()
                .or_else(|| self.toml.as_ref().and_then(|t| t.output.dir.as_deref()))
                .unwrap_or(DEFAULT_OUTPUT_DIR)
        }

        fn rounds(&self) -> usize {
            self.rounds
                .or_else(|| self.toml.as_ref().and_then(|t| t.experiment.rounds))
                .unwrap_or_else(|| self.scale().rounds())
        }

        fn num_scenarios(&self) -> usize {
            self.scenarios
                .or_else(|| self.toml.as_ref().and_then(|t| t.experiment.scenarios))
                .unwrap_or_else(|| self.scale().scenarios())
        }

        fn evaluator_model(&self) -> &str {
            self.evaluator_model
                .as_deref()
                .or_else(|| self.toml.as_ref().and_then(|t| t.evaluation.model.as_deref()))
                .unwrap_or(DEFAULT_EVALUATOR_MODEL)
        }

        fn seed(&self) -> Option<u64> {
            self.seed
                .or_else(|| self.toml.as_ref().and_then(|t| t.experiment.seed))
        }
    }

    fn validate_results_file(field: &str, path: &Path) -> Result<()> {
        validate_path(field, &path.to_string_lossy())?;
        if !path.is_file() {
            return Err(DebateError::InvalidConfigValueError {
                field: field.to_string(),
                value: path.display().to_string(),
                reason: "Results file does not exist".to_string(),
            });
        }
        Ok(())
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            if let Some(toml) = &self.toml {
                toml.validate()?;
            }

            validate_url("ollama_url", self.ollama_url())?;
            validate_path("output_dir", self.output_dir())?;
            validate_range("rounds", self.rounds(), 1, MAX_ROUNDS)?;
            validate_range("scenarios", self.num_scenarios(), 1, all_scenarios().len())?;
            validate_model_name("evaluator_model", self.evaluator_model())?;

            for configuration in self.baselines().iter().chain(self.ensembles().iter()) {
                validate_model_name("proponent", &configuration.proponent)?;
                validate_model_name("opponent", &configuration.opponent)?;
                validate_model_name("judge", &configuration.judge)?;
            }
            if self.baselines().is_empty() && self.ensembles().is_empty() {
                return Err(DebateError::MissingConfigError {
                    field: "baseline_models / ensembles".to_string(),
                });
            }

            match self.mode() {
                RunMode::Experiment => Ok(()),
                RunMode::Resume(path) => validate_results_file("resume", &path),
                RunMode::EvaluateOnly(path) => validate_results_file("evaluate_only", &path),
                RunMode::Analyze(path) => validate_results_file("analyze", &path),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn parse(args: &[&str]) -> CliConfig {
            let mut argv = vec!["ensemble-debates"];
            argv.extend_from_slice(args);
            CliConfig::try_parse_from(argv).unwrap()
        }

        #[test]
        fn test_defaults_are_quick_test() {
            let config = parse(&[]);
            assert_eq!(config.mode(), RunMode::Experiment);
            assert_eq!(config.scale(), ExperimentScale::QuickTest);
            assert_eq!(config.rounds(), 1);
            assert_eq!(config.num_scenarios(), 2);
            assert_eq!(config.ollama_url(), DEFAULT_OLLAMA_URL);
            assert_eq!(config.evaluator_model(), DEFAULT_EVALUATOR_MODEL);
            assert_eq!(config.log_format(), LogFormat::Compact);
            assert_eq!(config.baselines().len(), 5);
            assert_eq!(config.ensembles().len(), 5);
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_scale_flags() {
            let config = parse(&["--full"]);
            assert_eq!(config.num_scenarios(), 15);
            assert_eq!(config.rounds(), 2);

            let config = parse(&["--small", "--rounds", "3"]);
            assert_eq!(config.num_scenarios(), 5);
            assert_eq!(config.rounds(), 3);
        }

        #[test]
        fn test_conflicting_flags_rejected() {
            assert!(CliConfig::try_parse_from(["ensemble-debates", "--small", "--full"]).is_err());
            assert!(CliConfig::try_parse_from([
                "ensemble-debates",
                "--resume",
                "a.json",
                "--analyze",
                "a.json"
            ])
            .is_err());
        }

        #[test]
        fn test_cli_overrides_toml() {
            let toml = ExperimentToml::from_toml_str(
                r#"
baseline_models = ["phi3:3.8b"]

[inference]
ollama_url = "http://toml-host:11434"

[experiment]
scale = "full"
rounds = 3

[evaluation]
model = "deepseek-r1:14b"
skip = true

[output]
log_format = "json"
"#,
            )
            .unwrap();

            let config = parse(&["--ollama-url", "http://cli-host:11434"]).with_toml(toml);
            assert_eq!(config.ollama_url(), "http://cli-host:11434");
            assert_eq!(config.rounds(), 3);
            assert_eq!(config.num_scenarios(), 15);
            assert_eq!(config.evaluator_model(), "deepseek-r1:14b");
            assert_eq!(config.log_format(), LogFormat::Json);
            assert!(config.skip_evaluation());

            let settings = config.engine_settings();
            assert_eq!(settings.baselines.len(), 1);
            assert_eq!(settings.ensembles.len(), 5);
            assert_eq!(settings.rounds, 3);
        }

        #[test]
        fn test_validation_failures() {
            assert!(parse(&["--rounds", "0"]).validate().is_err());
            assert!(parse(&["--scenarios", "500"]).validate().is_err());
            assert!(parse(&["--ollama-url", "not a url"]).validate().is_err());
            assert!(parse(&["--resume", "/definitely/missing.json"]).validate().is_err());
        }
    }
}
