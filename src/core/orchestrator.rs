use crate::core::protocol::DebateProtocol;
use crate::core::results_store::{run_key, ResultsStore, RunManifest};
use crate::domain::model::{Configuration, Scenario};
use crate::domain::ports::InferenceClient;
use crate::utils::error::{DebateError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// 實驗規模：情境數量與回合數的預設組合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperimentScale {
    QuickTest,
    Small,
    Full,
}

impl ExperimentScale {
    pub fn scenarios(&self) -> usize {
        match self {
            Self::QuickTest => 2,
            Self::Small => 5,
            Self::Full => 15,
        }
    }

    pub fn rounds(&self) -> usize {
        match self {
            Self::QuickTest => 1,
            Self::Small | Self::Full => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuickTest => "quick-test",
            Self::Small => "small",
            Self::Full => "full",
        }
    }
}

pub const DEFAULT_BASELINE_MODELS: [&str; 5] = [
    "deepseek-r1:7b",
    "deepseek-r1:8b",
    "deepseek-r1:14b",
    "mistral:7b",
    "phi3:3.8b",
];

pub fn default_baselines() -> Vec<Configuration> {
    DEFAULT_BASELINE_MODELS
        .iter()
        .map(|m| Configuration::baseline(m))
        .collect()
}

pub fn default_ensembles() -> Vec<Configuration> {
    vec![
        Configuration::ensemble("lightweight", "deepseek-r1:7b", "mistral:7b", "phi3:3.8b"),
        Configuration::ensemble("balanced", "deepseek-r1:14b", "deepseek-r1:8b", "deepseek-r1:7b"),
        Configuration::ensemble("heavyweight", "deepseek-r1:32b", "deepseek-r1:14b", "deepseek-r1:8b"),
        Configuration::ensemble("creative_mix", "gpt-oss:20b", "deepseek-r1:14b", "deepseek-r1:8b"),
        Configuration::ensemble(
            "reasoning_focused",
            "deepseek-r1:32b",
            "deepseek-r1:14b",
            "deepseek-r1:8b",
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed_turns: usize,
    pub results_path: PathBuf,
}

pub struct EnsembleOrchestrator<'a, C: InferenceClient + ?Sized> {
    client: &'a C,
    baselines: Vec<Configuration>,
    ensembles: Vec<Configuration>,
}

impl<'a, C: InferenceClient + ?Sized> EnsembleOrchestrator<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            baselines: default_baselines(),
            ensembles: default_ensembles(),
        }
    }

    pub fn with_configurations(
        mut self,
        baselines: Vec<Configuration>,
        ensembles: Vec<Configuration>,
    ) -> Self {
        self.baselines = baselines;
        self.ensembles = ensembles;
        self
    }

    /// 基準組態在前，集成組態在後
    pub fn configurations(&self) -> Vec<Configuration> {
        self.baselines
            .iter()
            .chain(self.ensembles.iter())
            .cloned()
            .collect()
    }

    /// 在 `output_dir` 開一個新的結果檔並跑完整批實驗
    pub async fn run(
        &self,
        scenarios: &[Scenario],
        rounds: usize,
        output_dir: &Path,
    ) -> Result<OrchestrationSummary> {
        if scenarios.is_empty() {
            return Err(DebateError::ConfigValidationError {
                field: "scenarios".to_string(),
                message: "At least one scenario is required".to_string(),
            });
        }

        let manifest = RunManifest {
            created_at: Utc::now(),
            rounds,
            scenarios: scenarios.to_vec(),
            configurations: self.configurations(),
        };
        let mut store = ResultsStore::create(output_dir)?;
        manifest.save(store.path())?;

        self.execute(&manifest, &mut store).await
    }

    /// 從既有結果檔與它的 manifest 接續，只跑還沒完成的格子
    pub async fn resume(&self, results_path: &Path) -> Result<OrchestrationSummary> {
        let manifest = RunManifest::load(results_path)?;
        let mut store = ResultsStore::open(results_path)?;

        tracing::info!(
            "🔁 Resuming {}: {}/{} debates already stored",
            results_path.display(),
            store.len(),
            manifest.expected_runs()
        );
        self.execute(&manifest, &mut store).await
    }

    pub async fn execute(
        &self,
        manifest: &RunManifest,
        store: &mut ResultsStore,
    ) -> Result<OrchestrationSummary> {
        let protocol = DebateProtocol::new(self.client);
        let total = manifest.expected_runs();
        let start = Instant::now();

        let mut completed = 0;
        let mut skipped = 0;
        let mut failed_turns = 0;

        tracing::info!(
            "🚀 Running {} scenarios × {} configurations ({} rounds each)",
            manifest.scenarios.len(),
            manifest.configurations.len(),
            manifest.rounds
        );

        for configuration in &manifest.configurations {
            let kind = if configuration.baseline { "baseline" } else { "ensemble" };
            tracing::info!("🧪 Testing {} configuration: {}", kind, configuration.name);

            for scenario in &manifest.scenarios {
                let key = run_key(scenario, configuration, manifest.rounds);
                if store.contains(&key) {
                    skipped += 1;
                    tracing::debug!("⏭️ {} / {} already done", configuration.name, scenario.id);
                    continue;
                }

                let result = protocol.run(scenario, configuration, manifest.rounds).await?;
                failed_turns += result.failed_turns();
                tracing::info!(
                    "✅ [{}/{}] {} / {}: winner {} in {:.1}s",
                    store.len() + 1,
                    total,
                    configuration.name,
                    scenario.id,
                    result.winner,
                    result.total_time_secs
                );
                store.append(result)?;
                completed += 1;
            }
        }

        tracing::info!(
            "🏁 Orchestration finished in {:.1}s: {} completed, {} skipped, {} failed turns",
            start.elapsed().as_secs_f64(),
            completed,
            skipped,
            failed_turns
        );

        Ok(OrchestrationSummary {
            completed,
            skipped,
            failed_turns,
            results_path: store.path().to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress::ProgressReport;
    use crate::core::results_store::load_results;
    use crate::domain::scenarios::find_scenario;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// 每次呼叫都成功，裁判永遠判正方勝；記錄呼叫次數
    #[derive(Default)]
    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceClient for CountingClient {
        async fn generate(&self, model: &str, _prompt: &str, system: Option<&str>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if model == "broken:1b" {
                return Err(DebateError::inference(model, "model not found"));
            }
            match system {
                Some(s) if s.contains("JUDGE") => Ok("Winner: PROPONENT".to_string()),
                _ => Ok(format!("argument from {}", model)),
            }
        }
    }

    fn scenarios() -> Vec<Scenario> {
        vec![find_scenario("safety-1").unwrap(), find_scenario("economics-1").unwrap()]
    }

    fn small_configs() -> (Vec<Configuration>, Vec<Configuration>) {
        (
            vec![Configuration::baseline("mistral:7b")],
            vec![Configuration::ensemble("lightweight", "deepseek-r1:7b", "mistral:7b", "phi3:3.8b")],
        )
    }

    #[test]
    fn test_default_configurations() {
        let baselines = default_baselines();
        assert_eq!(baselines.len(), 5);
        assert!(baselines.iter().all(|c| c.baseline));

        let ensembles = default_ensembles();
        let names: Vec<_> = ensembles.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["lightweight", "balanced", "heavyweight", "creative_mix", "reasoning_focused"]
        );
        assert_eq!(ensembles[3].proponent, "gpt-oss:20b");
    }

    #[test]
    fn test_scales() {
        assert_eq!(ExperimentScale::QuickTest.scenarios(), 2);
        assert_eq!(ExperimentScale::QuickTest.rounds(), 1);
        assert_eq!(ExperimentScale::Small.scenarios(), 5);
        assert_eq!(ExperimentScale::Full.scenarios(), 15);
        assert_eq!(ExperimentScale::Full.rounds(), 2);
    }

    #[tokio::test]
    async fn test_run_baselines_first_and_saves_every_cell() {
        let dir = TempDir::new().unwrap();
        let client = CountingClient::default();
        let (baselines, ensembles) = small_configs();
        let orchestrator = EnsembleOrchestrator::new(&client).with_configurations(baselines, ensembles);

        let summary = orchestrator.run(&scenarios(), 1, dir.path()).await.unwrap();
        assert_eq!(summary.completed, 4);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed_turns, 0);
        // 4 場辯論，每場 1*2+1 次呼叫
        assert_eq!(client.calls.load(Ordering::SeqCst), 12);

        let results = load_results(&summary.results_path).unwrap();
        assert_eq!(results.len(), 4);
        assert!(!results[0].ensemble_used);
        assert!(!results[1].ensemble_used);
        assert!(results[2].ensemble_used);
        assert!(RunManifest::path_for(&summary.results_path).exists());
    }

    #[tokio::test]
    async fn test_default_grid_runs_every_configuration() {
        let dir = TempDir::new().unwrap();
        let client = CountingClient::default();
        let orchestrator = EnsembleOrchestrator::new(&client);

        let summary = orchestrator.run(&scenarios(), 1, dir.path()).await.unwrap();
        assert_eq!(summary.completed, 20);
        assert_eq!(summary.skipped, 0);

        let results = load_results(&summary.results_path).unwrap();
        assert_eq!(results.len(), 20);
        for configuration in orchestrator.configurations() {
            let runs = results
                .iter()
                .filter(|r| r.configuration.name == configuration.name)
                .count();
            assert_eq!(runs, 2, "{} should have one run per scenario", configuration.name);
        }

        let progress = ProgressReport::load(&summary.results_path).unwrap();
        assert_eq!(progress.completed, 20);
        assert!(progress.is_complete());
    }

    #[tokio::test]
    async fn test_resume_runs_only_missing_cells() {
        let dir = TempDir::new().unwrap();
        let client = CountingClient::default();
        let (baselines, ensembles) = small_configs();
        let orchestrator = EnsembleOrchestrator::new(&client).with_configurations(baselines, ensembles);

        // 模擬中途中斷：只寫入 manifest 與第一格結果
        let manifest = RunManifest {
            created_at: Utc::now(),
            rounds: 1,
            scenarios: scenarios(),
            configurations: orchestrator.configurations(),
        };
        let path = dir.path().join("experiment_results_partial_incremental.json");
        let mut store = ResultsStore::create_at(&path).unwrap();
        manifest.save(&path).unwrap();
        let first = DebateProtocol::new(&client)
            .run(&manifest.scenarios[0], &manifest.configurations[0], 1)
            .await
            .unwrap();
        store.append(first).unwrap();
        drop(store);
        client.calls.store(0, Ordering::SeqCst);

        let summary = orchestrator.resume(&path).await.unwrap();
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 9);
        assert_eq!(load_results(&path).unwrap().len(), 4);

        // 全部完成後再接續一次什麼都不做
        let again = orchestrator.resume(&path).await.unwrap();
        assert_eq!(again.completed, 0);
        assert_eq!(again.skipped, 4);
        assert_eq!(load_results(&path).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_turns_are_counted() {
        let dir = TempDir::new().unwrap();
        let client = CountingClient::default();
        let orchestrator = EnsembleOrchestrator::new(&client).with_configurations(
            vec![],
            vec![Configuration::ensemble("flaky", "mistral:7b", "broken:1b", "phi3:3.8b")],
        );

        let summary = orchestrator
            .run(&scenarios()[..1], 2, dir.path())
            .await
            .unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed_turns, 2);
    }

    #[tokio::test]
    async fn test_empty_scenarios_rejected() {
        let dir = TempDir::new().unwrap();
        let client = CountingClient::default();
        let orchestrator = EnsembleOrchestrator::new(&client);
        assert!(orchestrator.run(&[], 1, dir.path()).await.is_err());
    }
}
