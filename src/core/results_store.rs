//! Incremental results file.
//!
//! The file is a JSON array with one object per finished debate. Every append
//! rewrites the whole array through a temp file and a rename, so a crash
//! leaves either the previous array or the new one on disk, never a torn
//! write. A sidecar manifest records what the batch was supposed to cover,
//! which is what `--resume` needs to rebuild the work list.

use crate::domain::model::{Configuration, DebateResult, Scenario};
use crate::utils::error::{DebateError, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// 情境 × 組態 × 回合數 的內容定址鍵。組態名稱、模型或回合數不同就是另一個鍵，
/// 所以模型相同但名稱不同的兩個組態各自佔一格。
pub fn run_key(scenario: &Scenario, configuration: &Configuration, rounds: usize) -> String {
    let mut hasher = Sha256::new();
    for part in [
        scenario.topic.as_str(),
        configuration.name.as_str(),
        configuration.proponent.as_str(),
        configuration.opponent.as_str(),
        configuration.judge.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update((rounds as u64).to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// `dir/experiment_results_20250101_120000_incremental.json` -> `dir/experiment_results_20250101_120000_incremental<suffix>`
pub fn sibling_path(results_path: &Path, suffix: &str) -> PathBuf {
    let stem = results_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("experiment_results");
    results_path.with_file_name(format!("{}{}", stem, suffix))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub created_at: DateTime<Utc>,
    pub rounds: usize,
    pub scenarios: Vec<Scenario>,
    pub configurations: Vec<Configuration>,
}

impl RunManifest {
    pub fn expected_runs(&self) -> usize {
        self.scenarios.len() * self.configurations.len()
    }

    pub fn path_for(results_path: &Path) -> PathBuf {
        sibling_path(results_path, "_manifest.json")
    }

    pub fn load(results_path: &Path) -> Result<Self> {
        let path = Self::path_for(results_path);
        let content = fs::read_to_string(&path).map_err(|e| {
            DebateError::results_file(&path.display().to_string(), format!("cannot read manifest: {}", e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, results_path: &Path) -> Result<()> {
        let path = Self::path_for(results_path);
        write_atomically(&path, serde_json::to_string_pretty(self)?.as_bytes())
    }
}

#[derive(Debug)]
pub struct ResultsStore {
    path: PathBuf,
    results: Vec<DebateResult>,
    keys: HashSet<String>,
}

impl ResultsStore {
    /// 在 `dir` 底下建立一個新的帶時間戳記的結果檔，內容為 `[]`。
    /// 同一秒內已有同名檔案時加上序號 `_2`、`_3`…
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

        let mut attempt = 1;
        loop {
            let name = if attempt == 1 {
                format!("experiment_results_{}_incremental.json", timestamp)
            } else {
                format!("experiment_results_{}_{}_incremental.json", timestamp, attempt)
            };
            let path = dir.join(name);
            if !path.exists() && !RunManifest::path_for(&path).exists() {
                return Self::create_at(path);
            }
            attempt += 1;
        }
    }

    pub fn create_at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // 不覆蓋既有的結果檔
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| DebateError::results_file(&path.display().to_string(), e.to_string()))?;
        file.write_all(b"[]")?;
        file.sync_all()?;

        tracing::info!("📁 Writing incremental results to {}", path.display());
        Ok(Self {
            path,
            results: Vec::new(),
            keys: HashSet::new(),
        })
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let results = load_results(&path)?;
        let keys = results.iter().map(|r| r.run_key.clone()).collect();

        tracing::info!(
            "📂 Loaded {} completed debates from {}",
            results.len(),
            path.display()
        );
        Ok(Self { path, results, keys })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn results(&self) -> &[DebateResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn contains(&self, run_key: &str) -> bool {
        self.keys.contains(run_key)
    }

    /// 寫入一筆結果並立刻落盤。已經有同一個鍵時不寫，回傳 false。
    pub fn append(&mut self, result: DebateResult) -> Result<bool> {
        if self.keys.contains(&result.run_key) {
            tracing::warn!("⚠️ Run {} already stored, skipping duplicate", result.run_key);
            return Ok(false);
        }

        self.keys.insert(result.run_key.clone());
        self.results.push(result);

        let data = serde_json::to_vec_pretty(&self.results)?;
        write_atomically(&self.path, &data)?;
        tracing::debug!("Saved {} results to {}", self.results.len(), self.path.display());
        Ok(true)
    }
}

pub fn load_results(path: &Path) -> Result<Vec<DebateResult>> {
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(&content)?;
    if !value.is_array() {
        return Err(DebateError::results_file(
            &path.display().to_string(),
            "expected a JSON array of debate results",
        ));
    }
    Ok(serde_json::from_value(value)?)
}

pub(crate) fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = sibling_path(path, ".json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
