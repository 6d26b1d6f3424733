use crate::config::cli::LocalStorage;
use crate::core::analysis::ResultsAnalyzer;
use crate::core::evaluation::{evaluation_path_for, DebateEvaluator, DEFAULT_EVALUATOR_MODEL, DEFAULT_FALLBACK_SCORE};
use crate::core::orchestrator::{default_baselines, default_ensembles, EnsembleOrchestrator, ExperimentScale, OrchestrationSummary};
use crate::core::results_store::{load_results, sibling_path};
use crate::domain::model::Configuration;
use crate::domain::ports::{ConfigProvider, InferenceClient, Storage};
use crate::domain::scenarios::random_scenarios;
use crate::utils::error::{DebateError, Result};
use crate::utils::monitor::RunMonitor;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub output_dir: PathBuf,
    pub rounds: usize,
    pub num_scenarios: usize,
    pub seed: Option<u64>,
    pub evaluator_model: String,
    pub fallback_score: f64,
    pub skip_evaluation: bool,
    pub baselines: Vec<Configuration>,
    pub ensembles: Vec<Configuration>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let scale = ExperimentScale::QuickTest;
        Self {
            output_dir: PathBuf::from("./results"),
            rounds: scale.rounds(),
            num_scenarios: scale.scenarios(),
            seed: None,
            evaluator_model: DEFAULT_EVALUATOR_MODEL.to_string(),
            fallback_score: DEFAULT_FALLBACK_SCORE,
            skip_evaluation: false,
            baselines: default_baselines(),
            ensembles: default_ensembles(),
        }
    }
}

impl EngineSettings {
    pub fn from_provider<P: ConfigProvider + ?Sized>(config: &P) -> Self {
        Self {
            output_dir: PathBuf::from(config.output_dir()),
            rounds: config.rounds(),
            num_scenarios: config.num_scenarios(),
            seed: config.seed(),
            evaluator_model: config.evaluator_model().to_string(),
            ..Self::default()
        }
    }
}

/// 一次執行留下的檔案
#[derive(Debug, Clone)]
pub struct EngineReport {
    pub orchestration: Option<OrchestrationSummary>,
    pub results_path: PathBuf,
    pub evaluation_path: Option<PathBuf>,
    pub report_path: PathBuf,
    pub bundle_path: PathBuf,
}

/// 依序跑 辯論 → 評分 → 分析 三個階段
pub struct ExperimentEngine<C: InferenceClient> {
    client: C,
    settings: EngineSettings,
    monitor: RunMonitor,
}

impl<C: InferenceClient> ExperimentEngine<C> {
    pub fn new(client: C, settings: EngineSettings) -> Self {
        Self::new_with_monitoring(client, settings, false)
    }

    pub fn new_with_monitoring(client: C, settings: EngineSettings, monitor_enabled: bool) -> Self {
        Self {
            client,
            settings,
            monitor: RunMonitor::new(monitor_enabled),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn orchestrator(&self) -> EnsembleOrchestrator<'_, C> {
        EnsembleOrchestrator::new(&self.client)
            .with_configurations(self.settings.baselines.clone(), self.settings.ensembles.clone())
    }

    pub async fn run(&self) -> Result<EngineReport> {
        tracing::info!("🚀 Starting ensemble debate experiment");
        self.monitor.log_stats("start");

        let scenarios = random_scenarios(self.settings.num_scenarios, self.settings.seed);
        if scenarios.len() < self.settings.num_scenarios {
            tracing::warn!(
                "⚠️ Only {} scenarios available, requested {}",
                scenarios.len(),
                self.settings.num_scenarios
            );
        }
        for scenario in &scenarios {
            tracing::debug!("Selected scenario {}: {}", scenario.id, scenario.topic);
        }

        let summary = self
            .orchestrator()
            .run(&scenarios, self.settings.rounds, &self.settings.output_dir)
            .await?;
        self.monitor.log_stats("debates");

        self.finish(summary).await
    }

    pub async fn resume(&self, results_path: &Path) -> Result<EngineReport> {
        tracing::info!("🔁 Resuming experiment from {}", results_path.display());
        self.monitor.log_stats("start");

        let summary = self.orchestrator().resume(results_path).await?;
        self.monitor.log_stats("debates");

        self.finish(summary).await
    }

    /// 只對既有結果檔評分並重新分析
    pub async fn evaluate_only(&self, results_path: &Path) -> Result<EngineReport> {
        let evaluation_path = self.evaluate(results_path).await?;
        let (report_path, bundle_path) = self.analyze(results_path).await?;
        Ok(EngineReport {
            orchestration: None,
            results_path: results_path.to_path_buf(),
            evaluation_path: Some(evaluation_path),
            report_path,
            bundle_path,
        })
    }

    pub async fn analyze_only(&self, results_path: &Path) -> Result<EngineReport> {
        let (report_path, bundle_path) = self.analyze(results_path).await?;
        let evaluation_path = evaluation_path_for(results_path);
        Ok(EngineReport {
            orchestration: None,
            results_path: results_path.to_path_buf(),
            evaluation_path: evaluation_path.exists().then_some(evaluation_path),
            report_path,
            bundle_path,
        })
    }

    async fn finish(&self, summary: OrchestrationSummary) -> Result<EngineReport> {
        let results_path = summary.results_path.clone();

        let evaluation_path = if self.settings.skip_evaluation {
            tracing::info!("⏭️ Skipping evaluation");
            None
        } else {
            Some(self.evaluate(&results_path).await?)
        };

        let (report_path, bundle_path) = self.analyze(&results_path).await?;
        Ok(EngineReport {
            orchestration: Some(summary),
            results_path,
            evaluation_path,
            report_path,
            bundle_path,
        })
    }

    async fn evaluate(&self, results_path: &Path) -> Result<PathBuf> {
        let results = load_results(results_path)?;
        if results.is_empty() {
            return Err(DebateError::results_file(
                &results_path.display().to_string(),
                "no debates to evaluate",
            ));
        }

        let evaluation_path = evaluation_path_for(results_path);
        let evaluator = DebateEvaluator::new(&self.client, &self.settings.evaluator_model)
            .with_fallback(self.settings.fallback_score);
        let file = evaluator.evaluate_into_file(&results, &evaluation_path).await?;
        self.monitor.log_stats("evaluation");

        let failures: usize = file.scores.iter().map(|s| s.parse_failures).sum();
        if failures > 0 {
            tracing::warn!("⚠️ {} scores fell back to {:.1}", failures, self.settings.fallback_score);
        }
        if let Some(overall) = file.comparison.overall() {
            tracing::info!(
                "📈 Overall: ensemble {:.2} vs baseline {:.2} ({:+.2})",
                overall.ensemble.mean,
                overall.baseline.mean,
                overall.improvement
            );
        }
        tracing::info!("💾 Evaluation saved to {}", evaluation_path.display());
        Ok(evaluation_path)
    }

    async fn analyze(&self, results_path: &Path) -> Result<(PathBuf, PathBuf)> {
        let analyzer = ResultsAnalyzer::load(results_path)?;

        let base_dir = results_path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string());
        let storage = LocalStorage::new(base_dir);

        let report_path = sibling_path(results_path, "_report.md");
        let report_name = file_name(&report_path);
        storage
            .write_file(&report_name, analyzer.render_markdown_report().as_bytes())
            .await?;

        let bundle_path = sibling_path(results_path, "_analysis.zip");
        analyzer.export_bundle(&storage, &file_name(&bundle_path)).await?;

        self.monitor.log_stats("analysis");
        self.monitor.log_final_stats(analyzer.frame().len());
        tracing::info!("📝 Report saved to {}", report_path.display());
        tracing::info!("📦 Analysis bundle saved to {}", bundle_path.display());
        Ok((report_path, bundle_path))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct EchoClient;

    #[async_trait]
    impl InferenceClient for EchoClient {
        async fn generate(&self, _model: &str, prompt: &str, system: Option<&str>) -> Result<String> {
            if prompt.contains("scale of 0-10") {
                return Ok("Score: 7".to_string());
            }
            match system {
                Some(s) if s.contains("JUDGE") => Ok("Winner: OPPONENT".to_string()),
                _ => Ok("An argument.".to_string()),
            }
        }
    }

    fn settings(dir: &Path) -> EngineSettings {
        EngineSettings {
            output_dir: dir.to_path_buf(),
            rounds: 1,
            num_scenarios: 2,
            seed: Some(7),
            baselines: vec![Configuration::baseline("mistral:7b")],
            ensembles: vec![Configuration::ensemble("lightweight", "deepseek-r1:7b", "mistral:7b", "phi3:3.8b")],
            ..EngineSettings::default()
        }
    }

    #[tokio::test]
    async fn test_full_run_writes_every_artifact() {
        let dir = TempDir::new().unwrap();
        let engine = ExperimentEngine::new(EchoClient, settings(dir.path()));

        let report = engine.run().await.unwrap();
        let summary = report.orchestration.unwrap();
        assert_eq!(summary.completed, 4);
        assert_eq!(load_results(&report.results_path).unwrap().len(), 4);

        let evaluation_path = report.evaluation_path.unwrap();
        assert!(evaluation_path.exists());
        assert!(report.report_path.exists());
        assert!(report.bundle_path.exists());

        let markdown = std::fs::read_to_string(&report.report_path).unwrap();
        assert!(markdown.contains("- **Total Debates Conducted**: 4"));
    }

    #[tokio::test]
    async fn test_skip_evaluation() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(dir.path());
        settings.skip_evaluation = true;
        let engine = ExperimentEngine::new(EchoClient, settings);

        let report = engine.run().await.unwrap();
        assert!(report.evaluation_path.is_none());
        assert!(!evaluation_path_for(&report.results_path).exists());
        assert!(report.report_path.exists());
    }

    #[tokio::test]
    async fn test_oversized_scenario_request_is_capped_to_catalogue() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(dir.path());
        settings.num_scenarios = 500;
        settings.ensembles = vec![];
        settings.skip_evaluation = true;
        let engine = ExperimentEngine::new(EchoClient, settings);

        let report = engine.run().await.unwrap();
        let catalogue = crate::domain::scenarios::all_scenarios().len();
        assert_eq!(report.orchestration.unwrap().completed, catalogue);
        assert_eq!(load_results(&report.results_path).unwrap().len(), catalogue);
    }

    #[tokio::test]
    async fn test_evaluate_only_on_empty_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "[]").unwrap();

        let engine = ExperimentEngine::new(EchoClient, settings(dir.path()));
        let err = engine.evaluate_only(&path).await.unwrap_err();
        assert!(matches!(err, DebateError::ResultsFileError { .. }));
    }
}
