use crate::adapters::ollama::GenerationOptions;
use crate::core::orchestrator::ExperimentScale;
use crate::domain::model::Configuration;
use crate::utils::error::{DebateError, Result};
use crate::utils::validation::{
    validate_model_name, validate_non_empty_string, validate_path, validate_positive_number,
    validate_range, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}]+)\}").unwrap_or_else(|e| panic!("invalid env var pattern: {e}"))
});

pub const MAX_ROUNDS: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentToml {
    #[serde(default)]
    pub inference: InferenceSection,
    #[serde(default)]
    pub experiment: ExperimentSection,
    #[serde(default)]
    pub evaluation: EvaluationSection,
    #[serde(default)]
    pub output: OutputSection,
    pub baseline_models: Option<Vec<String>>,
    pub ensembles: Option<Vec<EnsembleEntry>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferenceSection {
    pub ollama_url: Option<String>,
    pub num_predict: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentSection {
    pub scale: Option<ExperimentScale>,
    pub rounds: Option<usize>,
    pub scenarios: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationSection {
    pub model: Option<String>,
    pub fallback_score: Option<f64>,
    pub skip: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSection {
    pub dir: Option<String>,
    pub log_format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleEntry {
    pub name: String,
    pub proponent: String,
    pub opponent: String,
    pub judge: String,
}

impl ExperimentToml {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(DebateError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);
        Ok(toml::from_str(&processed_content)?)
    }

    /// 替換環境變數 (例如 ${OLLAMA_HOST})，未設定的保持原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn validate_config(&self) -> Result<()> {
        if let Some(url) = &self.inference.ollama_url {
            validate_url("inference.ollama_url", url)?;
        }
        if let Some(temperature) = self.inference.temperature {
            validate_range("inference.temperature", temperature, 0.0, 2.0)?;
        }
        if let Some(top_p) = self.inference.top_p {
            validate_range("inference.top_p", top_p, 0.0, 1.0)?;
        }
        if let Some(timeout) = self.inference.timeout_seconds {
            validate_positive_number("inference.timeout_seconds", timeout as usize, 1)?;
        }

        if let Some(rounds) = self.experiment.rounds {
            validate_range("experiment.rounds", rounds, 1, MAX_ROUNDS)?;
        }
        if let Some(scenarios) = self.experiment.scenarios {
            validate_positive_number("experiment.scenarios", scenarios, 1)?;
        }

        if let Some(model) = &self.evaluation.model {
            validate_model_name("evaluation.model", model)?;
        }
        if let Some(fallback) = self.evaluation.fallback_score {
            validate_range("evaluation.fallback_score", fallback, 0.0, 10.0)?;
        }

        if let Some(dir) = &self.output.dir {
            validate_path("output.dir", dir)?;
        }
        if let Some(format) = &self.output.log_format {
            if !["compact", "json"].contains(&format.as_str()) {
                return Err(DebateError::InvalidConfigValueError {
                    field: "output.log_format".to_string(),
                    value: format.clone(),
                    reason: "Valid formats: compact, json".to_string(),
                });
            }
        }

        if let Some(models) = &self.baseline_models {
            for model in models {
                validate_model_name("baseline_models", model)?;
            }
        }
        if let Some(ensembles) = &self.ensembles {
            for entry in ensembles {
                validate_non_empty_string("ensembles.name", &entry.name)?;
                validate_model_name("ensembles.proponent", &entry.proponent)?;
                validate_model_name("ensembles.opponent", &entry.opponent)?;
                validate_model_name("ensembles.judge", &entry.judge)?;
            }
        }

        Ok(())
    }

    pub fn baselines(&self) -> Option<Vec<Configuration>> {
        self.baseline_models
            .as_ref()
            .map(|models| models.iter().map(|m| Configuration::baseline(m)).collect())
    }

    pub fn ensembles(&self) -> Option<Vec<Configuration>> {
        self.ensembles.as_ref().map(|entries| {
            entries
                .iter()
                .map(|e| Configuration::ensemble(&e.name, &e.proponent, &e.opponent, &e.judge))
                .collect()
        })
    }

    /// 以 TOML 中有設定的欄位覆蓋預設生成參數
    pub fn generation_options(&self) -> GenerationOptions {
        let defaults = GenerationOptions::default();
        GenerationOptions {
            num_predict: self.inference.num_predict.unwrap_or(defaults.num_predict),
            temperature: self.inference.temperature.unwrap_or(defaults.temperature),
            top_p: self.inference.top_p.unwrap_or(defaults.top_p),
            timeout_seconds: self.inference.timeout_seconds.unwrap_or(defaults.timeout_seconds),
        }
    }
}

impl Validate for ExperimentToml {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
