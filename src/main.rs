use clap::Parser;
use ensemble_debates::config::{LogFormat, RunMode};
use ensemble_debates::domain::ports::ConfigProvider;
use ensemble_debates::utils::error::{DebateError, ErrorSeverity};
use ensemble_debates::utils::{logger, validation::Validate};
use ensemble_debates::{CliConfig, ExperimentEngine, OllamaClient};

fn exit_code(e: &DebateError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,      // 警告，但成功
        ErrorSeverity::Medium => 2,   // 可重試
        ErrorSeverity::High => 1,     // 處理錯誤
        ErrorSeverity::Critical => 3, // 結果檔或系統錯誤
    }
}

fn fail(stage: &str, e: &DebateError) -> ! {
    tracing::error!(
        "❌ {} failed: {} (Category: {:?}, Severity: {:?})",
        stage,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    std::process::exit(exit_code(e).max(1));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = CliConfig::parse();

    // TOML 會影響日誌格式，所以先讀
    if let Err(e) = config.load_toml() {
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());
        std::process::exit(exit_code(&e).max(1));
    }

    // 初始化日誌
    match config.log_format() {
        LogFormat::Compact => logger::init_cli_logger(config.verbose),
        LogFormat::Json => logger::init_json_logger(config.verbose),
    }

    tracing::info!("Starting ensemble-debates CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let monitor_enabled = config.monitor;
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let client = match OllamaClient::with_options(config.ollama_url(), config.generation_options()) {
        Ok(client) => client,
        Err(e) => fail("Client setup", &e),
    };

    let mode = config.mode();
    if mode != RunMode::Experiment {
        tracing::info!("Mode: {:?}", mode);
    } else {
        tracing::info!(
            "Mode: {} ({} scenarios, {} rounds)",
            config.scale().as_str(),
            config.num_scenarios(),
            config.rounds()
        );
    }

    // 只做分析時不需要推論服務
    if !matches!(mode, RunMode::Analyze(_)) && !client.health_check().await {
        let e = DebateError::inference(
            "ollama",
            format!("server not reachable at {}", client.base_url()),
        );
        fail("Health check", &e);
    }

    let engine = ExperimentEngine::new_with_monitoring(client, config.engine_settings(), monitor_enabled);

    let outcome = match &mode {
        RunMode::Experiment => engine.run().await,
        RunMode::Resume(path) => engine.resume(path).await,
        RunMode::EvaluateOnly(path) => engine.evaluate_only(path).await,
        RunMode::Analyze(path) => engine.analyze_only(path).await,
    };

    match outcome {
        Ok(report) => {
            if let Some(summary) = &report.orchestration {
                tracing::info!(
                    "✅ {} debates completed, {} skipped, {} failed turns",
                    summary.completed,
                    summary.skipped,
                    summary.failed_turns
                );
                println!(
                    "✅ {} debates completed, {} already done",
                    summary.completed, summary.skipped
                );
            }
            println!("📁 Results: {}", report.results_path.display());
            if let Some(path) = &report.evaluation_path {
                println!("🧮 Evaluation: {}", path.display());
            }
            println!("📝 Report: {}", report.report_path.display());
            println!("📦 Bundle: {}", report.bundle_path.display());
        }
        Err(e) => {
            let exit_code = exit_code(&e);
            tracing::error!(
                "❌ Experiment failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
