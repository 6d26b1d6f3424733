use crate::core::evaluation::{evaluation_path_for, render_report, EvaluationFile};
use crate::core::results_store::load_results;
use crate::core::stats::Summary;
use crate::domain::model::{DebateResult, EvaluationScore, ScoreDimension, Winner};
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;
use zip::write::{FileOptions, ZipWriter};

const CHART_WIDTH: usize = 40;

/// 分析用的扁平資料列，一場辯論一列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRow {
    pub kind: String,
    pub configuration: String,
    pub scenario_id: String,
    pub topic: String,
    pub category: String,
    pub winner: Winner,
    pub time: f64,
    pub proponent_model: String,
    pub opponent_model: String,
    pub judge_model: String,
    pub failed_turns: usize,
    pub argument_quality: Option<f64>,
    pub alignment_focus: Option<f64>,
    pub reasoning_depth: Option<f64>,
    pub safety_consideration: Option<f64>,
    pub coherence: Option<f64>,
    pub overall: Option<f64>,
}

impl FrameRow {
    fn dimension(&self, dimension: ScoreDimension) -> Option<f64> {
        match dimension {
            ScoreDimension::ArgumentQuality => self.argument_quality,
            ScoreDimension::AlignmentFocus => self.alignment_focus,
            ScoreDimension::ReasoningDepth => self.reasoning_depth,
            ScoreDimension::SafetyConsideration => self.safety_consideration,
            ScoreDimension::Coherence => self.coherence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group: String,
    pub kind: String,
    pub count: usize,
    pub time: Summary,
    pub winners: BTreeMap<Winner, usize>,
    pub dimensions: BTreeMap<String, Summary>,
    pub overall: Summary,
}

pub struct ResultsAnalyzer {
    source: String,
    rows: Vec<FrameRow>,
    evaluation: Option<EvaluationFile>,
}

fn kind_of(ensemble_used: bool) -> &'static str {
    if ensemble_used {
        "ensemble"
    } else {
        "baseline"
    }
}

impl ResultsAnalyzer {
    pub fn new(source: &str, results: &[DebateResult], evaluation: Option<EvaluationFile>) -> Self {
        let scores: HashMap<&str, &EvaluationScore> = evaluation
            .as_ref()
            .map(|e| e.scores.iter().map(|s| (s.run_key.as_str(), s)).collect())
            .unwrap_or_default();

        let rows = results
            .iter()
            .map(|r| {
                let score = scores.get(r.run_key.as_str());
                let dim = |d: ScoreDimension| score.map(|s| s.score(d));
                FrameRow {
                    kind: kind_of(r.ensemble_used).to_string(),
                    configuration: r.configuration.name.clone(),
                    scenario_id: r.scenario_id.clone(),
                    topic: r.topic.clone(),
                    category: r.category.clone(),
                    winner: r.winner,
                    time: r.total_time_secs,
                    proponent_model: r.configuration.proponent.clone(),
                    opponent_model: r.configuration.opponent.clone(),
                    judge_model: r.configuration.judge.clone(),
                    failed_turns: r.failed_turns(),
                    argument_quality: dim(ScoreDimension::ArgumentQuality),
                    alignment_focus: dim(ScoreDimension::AlignmentFocus),
                    reasoning_depth: dim(ScoreDimension::ReasoningDepth),
                    safety_consideration: dim(ScoreDimension::SafetyConsideration),
                    coherence: dim(ScoreDimension::Coherence),
                    overall: score.map(|s| s.overall),
                }
            })
            .collect();

        Self {
            source: source.to_string(),
            rows,
            evaluation,
        }
    }

    /// 讀取結果檔；旁邊有 `_evaluation.json` 時一併載入分數
    pub fn load(results_path: &Path) -> Result<Self> {
        let results = load_results(results_path)?;
        let evaluation_path = evaluation_path_for(results_path);
        let evaluation = if evaluation_path.exists() {
            Some(EvaluationFile::load(&evaluation_path)?)
        } else {
            None
        };

        let source = results_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("results");
        tracing::info!(
            "📊 Loaded {} debates from {}{}",
            results.len(),
            source,
            if evaluation.is_some() { " (with evaluation scores)" } else { "" }
        );
        Ok(Self::new(source, &results, evaluation))
    }

    pub fn frame(&self) -> &[FrameRow] {
        &self.rows
    }

    pub fn has_scores(&self) -> bool {
        self.rows.iter().any(|r| r.overall.is_some())
    }

    fn summarize<'r>(group: &str, kind: &str, rows: &[&'r FrameRow]) -> GroupSummary {
        let times: Vec<f64> = rows.iter().map(|r| r.time).collect();
        let mut winners = BTreeMap::new();
        for row in rows {
            *winners.entry(row.winner).or_insert(0) += 1;
        }

        let dimensions = ScoreDimension::ALL
            .iter()
            .map(|d| {
                let values: Vec<f64> = rows.iter().filter_map(|r| r.dimension(*d)).collect();
                (d.key().to_string(), Summary::of(&values))
            })
            .collect();
        let overall: Vec<f64> = rows.iter().filter_map(|r| r.overall).collect();

        GroupSummary {
            group: group.to_string(),
            kind: kind.to_string(),
            count: rows.len(),
            time: Summary::of(&times),
            winners,
            dimensions,
            overall: Summary::of(&overall),
        }
    }

    fn group_by<F>(&self, key: F) -> Vec<GroupSummary>
    where
        F: Fn(&FrameRow) -> String,
    {
        let mut groups: BTreeMap<(String, String), Vec<&FrameRow>> = BTreeMap::new();
        for row in &self.rows {
            groups
                .entry((row.kind.clone(), key(row)))
                .or_default()
                .push(row);
        }

        groups
            .iter()
            .map(|((kind, group), rows)| Self::summarize(group, kind, rows))
            .collect()
    }

    pub fn summary_by_configuration(&self) -> Vec<GroupSummary> {
        self.group_by(|r| r.configuration.clone())
    }

    pub fn summary_by_category(&self) -> Vec<GroupSummary> {
        self.group_by(|r| r.category.clone())
    }

    pub fn summary_by_kind(&self) -> Vec<GroupSummary> {
        self.group_by(|r| r.kind.clone())
    }

    pub fn winner_distribution(&self) -> BTreeMap<String, BTreeMap<Winner, usize>> {
        self.summary_by_kind()
            .into_iter()
            .map(|s| (s.kind, s.winners))
            .collect()
    }

    /// 以文字長條圖代替圖片：平均時間與平均總分
    pub fn render_text_charts(&self) -> String {
        let summaries = self.summary_by_configuration();
        let mut out = Vec::new();

        out.push("Average debate time (s)".to_string());
        out.extend(bar_chart(
            summaries.iter().map(|s| (s.group.as_str(), s.time.mean)),
        ));

        if self.has_scores() {
            out.push(String::new());
            out.push("Average overall score (0-10)".to_string());
            out.extend(bar_chart(
                summaries
                    .iter()
                    .filter(|s| !s.overall.is_empty())
                    .map(|s| (s.group.as_str(), s.overall.mean)),
            ));
        }

        out.join("\n")
    }

    pub fn render_markdown_report(&self) -> String {
        let mut report = Vec::new();
        report.push("# Ensemble Debates for AI Alignment - Research Results".to_string());
        report.push(String::new());
        report.push(format!("Source: `{}`", self.source));
        report.push(String::new());

        let by_kind = self.summary_by_kind();
        let baseline = by_kind.iter().find(|s| s.kind == "baseline");
        let ensemble = by_kind.iter().find(|s| s.kind == "ensemble");
        let topics: BTreeSet<&str> = self.rows.iter().map(|r| r.topic.as_str()).collect();
        let categories: BTreeSet<&str> = self.rows.iter().map(|r| r.category.as_str()).collect();

        report.push("## Executive Summary".to_string());
        report.push(String::new());
        report.push(format!("- **Total Debates Conducted**: {}", self.rows.len()));
        report.push(format!("- **Baseline Debates**: {}", baseline.map_or(0, |s| s.count)));
        report.push(format!("- **Ensemble Debates**: {}", ensemble.map_or(0, |s| s.count)));
        report.push(format!("- **Unique Scenarios**: {}", topics.len()));
        report.push(format!(
            "- **Categories Tested**: {}",
            categories.into_iter().collect::<Vec<_>>().join(", ")
        ));
        let failed: usize = self.rows.iter().map(|r| r.failed_turns).sum();
        if failed > 0 {
            report.push(format!("- **Failed Turns (error markers)**: {}", failed));
        }
        report.push(String::new());

        if let (Some(b), Some(e)) = (baseline, ensemble) {
            let diff = e.time.mean - b.time.mean;
            report.push("## Timing Analysis".to_string());
            report.push(String::new());
            report.push(format!("- **Baseline Average Time**: {:.2} seconds", b.time.mean));
            report.push(format!("- **Ensemble Average Time**: {:.2} seconds", e.time.mean));
            if b.time.mean > 0.0 {
                report.push(format!(
                    "- **Time Difference**: {:+.2} seconds ({:+.1}%)",
                    diff,
                    diff / b.time.mean * 100.0
                ));
            }
            report.push(String::new());
        }

        report.push("## Winner Distribution".to_string());
        report.push(String::new());
        for summary in &by_kind {
            report.push(format!("**{} results:**", capitalize(&summary.kind)));
            for (winner, count) in &summary.winners {
                report.push(format!(
                    "- {}: {} ({:.1}%)",
                    winner,
                    count,
                    *count as f64 / summary.count as f64 * 100.0
                ));
            }
            report.push(String::new());
        }

        report.push("## Analysis by Category".to_string());
        report.push(String::new());
        report.push("| Category | Kind | Debates | Time (s) | Proponent wins | Overall |".to_string());
        report.push("|---|---|---|---|---|---|".to_string());
        for s in self.summary_by_category() {
            report.push(format!(
                "| {} | {} | {} | {:.2} ± {:.2} | {} | {} |",
                s.group,
                s.kind,
                s.count,
                s.time.mean,
                s.time.std,
                s.winners.get(&Winner::Proponent).copied().unwrap_or(0),
                format_score(&s.overall)
            ));
        }
        report.push(String::new());

        report.push("## Model Performance".to_string());
        report.push(String::new());
        let mut header = "| Configuration | Kind | Debates | Time (s) |".to_string();
        let mut divider = "|---|---|---|---|".to_string();
        for d in ScoreDimension::ALL {
            header.push_str(&format!(" {} |", d.title()));
            divider.push_str("---|");
        }
        header.push_str(" Overall |");
        divider.push_str("---|");
        report.push(header);
        report.push(divider);
        for s in self.summary_by_configuration() {
            let mut line = format!(
                "| {} | {} | {} | {:.2} ± {:.2} |",
                s.group, s.kind, s.count, s.time.mean, s.time.std
            );
            for d in ScoreDimension::ALL {
                let summary = s.dimensions.get(d.key()).copied().unwrap_or_default();
                line.push_str(&format!(" {} |", format_score(&summary)));
            }
            line.push_str(&format!(" {} |", format_score(&s.overall)));
            report.push(line);
        }
        report.push(String::new());

        report.push("## Charts".to_string());
        report.push(String::new());
        report.push("```text".to_string());
        report.push(self.render_text_charts());
        report.push("```".to_string());

        if let Some(evaluation) = &self.evaluation {
            report.push(String::new());
            report.push(format!("_Quality scores by `{}`_", evaluation.evaluator_model));
            report.push(String::new());
            // 評估報告自帶一級標題，往下降一級
            for line in render_report(&evaluation.comparison).lines() {
                if line.starts_with('#') {
                    report.push(format!("#{}", line));
                } else {
                    report.push(line.to_string());
                }
            }
        }

        report.join("\n")
    }

    pub fn export_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &self.rows {
            writer.serialize(row)?;
        }
        let data = writer.into_inner().map_err(|e| e.into_error())?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// 把 report.md、frame.csv（以及評分 JSON）打包成 zip 寫進 storage
    pub async fn export_bundle<S: Storage>(&self, storage: &S, filename: &str) -> Result<String> {
        let report = self.render_markdown_report();
        let csv = self.export_csv()?;

        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

            zip.start_file::<_, ()>("report.md", FileOptions::default())?;
            zip.write_all(report.as_bytes())?;

            zip.start_file::<_, ()>("frame.csv", FileOptions::default())?;
            zip.write_all(csv.as_bytes())?;

            if let Some(evaluation) = &self.evaluation {
                zip.start_file::<_, ()>("evaluation.json", FileOptions::default())?;
                zip.write_all(serde_json::to_string_pretty(evaluation)?.as_bytes())?;
            }

            zip.finish()?.into_inner()
        };

        tracing::debug!("Writing analysis bundle ({} bytes)", zip_data.len());
        storage.write_file(filename, &zip_data).await?;
        Ok(filename.to_string())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn format_score(summary: &Summary) -> String {
    if summary.is_empty() {
        "-".to_string()
    } else {
        format!("{:.2} ± {:.2}", summary.mean, summary.std)
    }
}

fn bar_chart<'a>(values: impl Iterator<Item = (&'a str, f64)>) -> Vec<String> {
    let values: Vec<(&str, f64)> = values.collect();
    let max = values.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let label_width = values.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0);

    values
        .iter()
        .map(|(label, value)| {
            let len = if max > 0.0 {
                ((value / max) * CHART_WIDTH as f64).round() as usize
            } else {
                0
            };
            format!(
                "{:<width$} | {} {:.2}",
                label,
                "#".repeat(len),
                value,
                width = label_width
            )
        })
        .collect()
}
