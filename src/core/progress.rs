use crate::core::results_store::{load_results, run_key, RunManifest};
use crate::core::stats::Summary;
use crate::domain::model::DebateResult;
use crate::utils::error::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigProgress {
    pub name: String,
    pub done: usize,
    pub expected: usize,
}

/// 一個結果檔目前的進度。沒有 manifest 時只能回報已完成的部分。
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub completed: usize,
    pub expected: Option<usize>,
    pub per_configuration: Vec<ConfigProgress>,
    pub debate_time: Summary,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl ProgressReport {
    pub fn from_results(manifest: Option<&RunManifest>, results: &[DebateResult]) -> Self {
        let done: HashSet<&str> = results.iter().map(|r| r.run_key.as_str()).collect();

        let per_configuration = match manifest {
            Some(m) => m
                .configurations
                .iter()
                .map(|c| ConfigProgress {
                    name: c.name.clone(),
                    done: m
                        .scenarios
                        .iter()
                        .filter(|s| done.contains(run_key(s, c, m.rounds).as_str()))
                        .count(),
                    expected: m.scenarios.len(),
                })
                .collect(),
            None => {
                let mut names: Vec<&str> = Vec::new();
                for r in results {
                    if !names.contains(&r.configuration.name.as_str()) {
                        names.push(&r.configuration.name);
                    }
                }
                names
                    .into_iter()
                    .map(|name| {
                        let count = results.iter().filter(|r| r.configuration.name == name).count();
                        ConfigProgress {
                            name: name.to_string(),
                            done: count,
                            expected: count,
                        }
                    })
                    .collect()
            }
        };

        let times: Vec<f64> = results.iter().map(|r| r.total_time_secs).collect();
        Self {
            completed: results.len(),
            expected: manifest.map(|m| m.expected_runs()),
            per_configuration,
            debate_time: Summary::of(&times),
            last_completed_at: results.iter().map(|r| r.completed_at).max(),
        }
    }

    pub fn load(results_path: &Path) -> Result<Self> {
        let results = load_results(results_path)?;
        let manifest = if RunManifest::path_for(results_path).exists() {
            Some(RunManifest::load(results_path)?)
        } else {
            tracing::warn!("⚠️ No manifest next to {}, expected total unknown", results_path.display());
            None
        };
        Ok(Self::from_results(manifest.as_ref(), &results))
    }

    pub fn remaining(&self) -> Option<usize> {
        self.expected.map(|e| e.saturating_sub(self.completed))
    }

    pub fn percent(&self) -> Option<f64> {
        self.expected
            .filter(|e| *e > 0)
            .map(|e| self.completed as f64 / e as f64 * 100.0)
    }

    /// 以平均每場秒數估計剩餘時間
    pub fn eta_secs(&self) -> Option<f64> {
        if self.debate_time.is_empty() {
            return None;
        }
        self.remaining().map(|r| r as f64 * self.debate_time.mean)
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == Some(0)
    }

    pub fn render(&self, now: DateTime<Utc>) -> String {
        let mut lines = vec!["Experiment Progress".to_string(), "=".repeat(50)];

        match (self.expected, self.percent()) {
            (Some(expected), Some(pct)) => {
                lines.push(format!("Completed: {}/{} ({:.1}%)", self.completed, expected, pct))
            }
            _ => lines.push(format!("Completed: {} (expected total unknown)", self.completed)),
        }

        if !self.debate_time.is_empty() {
            lines.push(format!(
                "Mean debate time: {:.1}s (±{:.1}s)",
                self.debate_time.mean, self.debate_time.std
            ));
        }
        if let Some(last) = self.last_completed_at {
            let since = (now - last).num_seconds().max(0);
            lines.push(format!("Last result: {}s ago", since));
        }

        lines.push(String::new());
        for config in &self.per_configuration {
            let mark = if config.done >= config.expected { "✅" } else { "⏳" };
            lines.push(format!("{} {:<24} {}/{}", mark, config.name, config.done, config.expected));
        }

        lines.push(String::new());
        if self.is_complete() {
            lines.push("All debates complete".to_string());
        } else if let Some(eta) = self.eta_secs() {
            let finish = now + Duration::seconds(eta.round() as i64);
            lines.push(format!(
                "Estimated remaining: {:.0} minutes (done around {})",
                eta / 60.0,
                finish.with_timezone(&chrono::Local).format("%H:%M")
            ));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Configuration, Winner};
    use crate::domain::scenarios::find_scenario;

    fn manifest() -> RunManifest {
        RunManifest {
            created_at: Utc::now(),
            rounds: 1,
            scenarios: vec![find_scenario("safety-1").unwrap(), find_scenario("safety-2").unwrap()],
            configurations: vec![
                Configuration::baseline("mistral:7b"),
                Configuration::ensemble("lightweight", "deepseek-r1:7b", "mistral:7b", "phi3:3.8b"),
            ],
        }
    }

    fn result(m: &RunManifest, scenario: usize, config: usize, time: f64) -> DebateResult {
        let s = &m.scenarios[scenario];
        let c = &m.configurations[config];
        DebateResult {
            run_key: run_key(s, c, m.rounds),
            scenario_id: s.id.clone(),
            configuration: c.clone(),
            topic: s.topic.clone(),
            category: s.category.clone(),
            alignment_focus: s.alignment_focus.clone(),
            rounds: m.rounds,
            turns: Vec::new(),
            winner: Winner::Proponent,
            judge_reasoning: String::new(),
            total_time_secs: time,
            ensemble_used: !c.baseline,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_progress_with_manifest() {
        let m = manifest();
        let results = vec![result(&m, 0, 0, 20.0), result(&m, 1, 0, 40.0), result(&m, 0, 1, 30.0)];
        let report = ProgressReport::from_results(Some(&m), &results);

        assert_eq!(report.completed, 3);
        assert_eq!(report.expected, Some(4));
        assert_eq!(report.remaining(), Some(1));
        assert_eq!(report.percent(), Some(75.0));
        assert_eq!(report.eta_secs(), Some(30.0));
        assert_eq!(report.per_configuration[0].done, 2);
        assert_eq!(report.per_configuration[1].done, 1);
        assert!(!report.is_complete());

        let text = report.render(Utc::now());
        assert!(text.contains("Completed: 3/4 (75.0%)"));
        assert!(text.contains("Estimated remaining"));
    }

    #[test]
    fn test_progress_without_manifest() {
        let m = manifest();
        let results = vec![result(&m, 0, 1, 10.0)];
        let report = ProgressReport::from_results(None, &results);

        assert_eq!(report.expected, None);
        assert_eq!(report.eta_secs(), None);
        assert_eq!(report.per_configuration.len(), 1);
        assert!(report.render(Utc::now()).contains("expected total unknown"));
    }

    #[test]
    fn test_empty_results() {
        let m = manifest();
        let report = ProgressReport::from_results(Some(&m), &[]);
        assert_eq!(report.remaining(), Some(4));
        assert_eq!(report.eta_secs(), None);
        assert_eq!(report.last_completed_at, None);
    }
}
