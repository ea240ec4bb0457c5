//! CLI subcommand handlers.

use crate::{Commands, ConfigAction};
use futures::StreamExt;
use safewatch_core::gateway::{GatewayConfig, GatewayState, run_gateway};
use safewatch_core::{
    Alert, AlertStore, ClassTable, DetectionPipeline, PipelineStats, ReplayDetector,
    RiskClassifier, SafewatchConfig, load_validated_config,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    if let Commands::Config { action } = command {
        return handle_config(action, workspace, config_file).await;
    }

    let config = resolve_config(workspace, config_file)?;
    match command {
        Commands::Run { log, serve, fps } => handle_run(&config, workspace, &log, serve, fps).await,
        Commands::Serve => handle_serve(&config, workspace).await,
        Commands::History { limit } => handle_history(&config, workspace, limit).await,
        Commands::Alerts => handle_alerts(&config, workspace).await,
        Commands::Classes => {
            for line in format_classes(&config.classes) {
                println!("{line}");
            }
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}

/// Load the layered configuration and refuse to continue if it is invalid.
fn resolve_config(workspace: &Path, config_file: Option<&Path>) -> anyhow::Result<SafewatchConfig> {
    Ok(load_validated_config(Some(workspace), config_file)?)
}

async fn open_store(config: &SafewatchConfig, workspace: &Path) -> anyhow::Result<Arc<AlertStore>> {
    let store_config = config.store.rooted_at(workspace);
    let store = tokio::task::spawn_blocking(move || AlertStore::open(&store_config)).await??;
    Ok(Arc::new(store))
}

fn spawn_gateway(
    gateway: &GatewayConfig,
    store: Arc<AlertStore>,
    history_limit: usize,
) -> tokio::task::JoinHandle<()> {
    let gateway = gateway.clone();
    let shared = GatewayState::shared(store, history_limit);
    tokio::spawn(async move {
        if let Err(e) = run_gateway(&gateway, shared).await {
            tracing::error!(addr = %gateway.addr(), error = %e, "Gateway stopped");
        }
    })
}

async fn handle_run(
    config: &SafewatchConfig,
    workspace: &Path,
    log: &Path,
    serve: bool,
    fps: Option<f64>,
) -> anyhow::Result<()> {
    let period = fps.map(frame_period).transpose()?;
    let replay = ReplayDetector::from_file(log)?;
    let frames = replay.frames();
    let store = open_store(config, workspace).await?;
    let classifier = RiskClassifier::new(&config.classes)?;

    let gateway = serve.then(|| {
        spawn_gateway(
            &config.gateway,
            Arc::clone(&store),
            config.store.history_limit,
        )
    });

    tracing::info!(
        log = %log.display(),
        frames = replay.last_frame(),
        "Replaying detection log"
    );

    let mut pipeline = DetectionPipeline::new(
        replay,
        classifier,
        config.tracker.clone(),
        config.pipeline.clone(),
        Arc::clone(&store),
    );

    let stats = match period {
        Some(period) => {
            let paced = frames.then(move |frame| async move {
                tokio::time::sleep(period).await;
                frame
            });
            pipeline.run(paced).await
        }
        None => pipeline.run(frames).await,
    };

    println!("{}", format_summary(&stats));
    for alert in store.all_volatile() {
        println!("  {alert}");
    }

    if let Some(handle) = gateway {
        println!(
            "Serving alerts on http://{} (Ctrl-C to stop)",
            config.gateway.addr()
        );
        tokio::signal::ctrl_c().await?;
        handle.abort();
    }
    Ok(())
}

async fn handle_serve(config: &SafewatchConfig, workspace: &Path) -> anyhow::Result<()> {
    let store = open_store(config, workspace).await?;
    let shared = GatewayState::shared(store, config.store.history_limit);
    println!("Serving alerts on http://{}", config.gateway.addr());

    tokio::select! {
        result = run_gateway(&config.gateway, shared) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }
    Ok(())
}

async fn handle_history(
    config: &SafewatchConfig,
    workspace: &Path,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let store = open_store(config, workspace).await?;
    let limit = limit.unwrap_or(config.store.history_limit);
    let history = safewatch_core::store::spawn_recent_history(&store, limit).await?;
    print_alerts(&history, "No alerts recorded yet.");
    Ok(())
}

async fn handle_alerts(config: &SafewatchConfig, workspace: &Path) -> anyhow::Result<()> {
    let store = open_store(config, workspace).await?;
    print_alerts(&store.all_volatile(), "Alert timeline is empty.");
    Ok(())
}

async fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".safewatch");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&SafewatchConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = resolve_config(workspace, config_file)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

fn print_alerts(alerts: &[Alert], empty: &str) {
    if alerts.is_empty() {
        println!("{empty}");
        return;
    }
    for alert in alerts {
        println!("{alert}");
    }
}

fn frame_period(fps: f64) -> anyhow::Result<Duration> {
    if !fps.is_finite() || fps <= 0.0 {
        anyhow::bail!("--fps must be a positive number, got {fps}");
    }
    Ok(Duration::from_secs_f64(1.0 / fps))
}

fn format_summary(stats: &PipelineStats) -> String {
    format!(
        "Processed {} of {} frames ({} skipped), {} detections ({} below confidence), \
         {} risky. Alerts: {} raised, {} suppressed, {} unrecorded. Detector failures: {}.",
        stats.frames_processed,
        stats.frames_seen,
        stats.frames_skipped,
        stats.detections,
        stats.low_confidence,
        stats.risky_detections,
        stats.alerts_raised,
        stats.alerts_suppressed,
        stats.store_failures,
        stats.detector_failures,
    )
}

fn format_classes(table: &ClassTable) -> Vec<String> {
    let mut entries: Vec<_> = table.entries.iter().collect();
    entries.sort_by_key(|e| e.id);
    entries
        .into_iter()
        .map(|e| {
            format!(
                "{:>3}  {:<12} {:<8} {}",
                e.id,
                e.label,
                e.category.to_string(),
                e.category.color().hex()
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use safewatch_core::{ClassEntry, RiskCategory};
    use tempfile::TempDir;

    #[test]
    fn test_frame_period() {
        assert_eq!(frame_period(10.0).unwrap(), Duration::from_millis(100));
        assert!(frame_period(0.0).is_err());
        assert!(frame_period(-3.0).is_err());
        assert!(frame_period(f64::NAN).is_err());
    }

    #[test]
    fn test_format_classes_sorted_by_id() {
        let table = ClassTable {
            entries: vec![
                ClassEntry::new(7, "no_helmet", RiskCategory::Danger),
                ClassEntry::new(3, "helmet", RiskCategory::Safe),
            ],
        };
        let lines = format_classes(&table);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("  3  helmet"));
        assert!(lines[0].contains("SAFE"));
        assert!(lines[1].contains("no_helmet"));
        assert!(lines[1].contains("DANGER"));
        assert!(lines[1].ends_with(&RiskCategory::Danger.color().hex()));
    }

    #[test]
    fn test_format_summary_mentions_counts() {
        let stats = PipelineStats {
            frames_seen: 6,
            frames_processed: 3,
            frames_skipped: 3,
            alerts_raised: 2,
            alerts_suppressed: 1,
            ..PipelineStats::default()
        };
        let summary = format_summary(&stats);
        assert!(summary.starts_with("Processed 3 of 6 frames (3 skipped)"));
        assert!(summary.contains("2 raised, 1 suppressed"));
    }

    #[test]
    fn test_resolve_config_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = resolve_config(dir.path(), Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn test_resolve_config_rejects_invalid() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bad.toml");
        std::fs::write(&file, "[tracker]\nalert_threshold = 0\n").unwrap();
        let err = resolve_config(dir.path(), Some(&file)).unwrap_err();
        assert!(err.to_string().contains("Invalid configuration"));
    }

    #[tokio::test]
    async fn test_config_init_writes_loadable_file() {
        let dir = TempDir::new().unwrap();
        handle_config(ConfigAction::Init, dir.path(), None)
            .await
            .unwrap();
        let path = dir.path().join(".safewatch").join("config.toml");
        assert!(path.exists());

        let config = resolve_config(dir.path(), None).unwrap();
        assert_eq!(config.tracker, SafewatchConfig::default().tracker);
    }

    #[tokio::test]
    async fn test_run_records_alerts_in_workspace() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("frames.jsonl");
        let line = r#"{"frame": FRAME, "detections": [{"class_id": 8, "confidence": 0.9, "box": [0, 0, 4, 4]}]}"#;
        let content: Vec<String> = (1..=6)
            .map(|i| line.replace("FRAME", &i.to_string()))
            .collect();
        std::fs::write(&log, content.join("\n")).unwrap();

        let config = SafewatchConfig::default();
        handle_run(&config, dir.path(), &log, false, None)
            .await
            .unwrap();

        assert!(dir.path().join("alerts_history.db").exists());
        let store = open_store(&config, dir.path()).await.unwrap();
        let history = store.recent_history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "no_vest");
        assert_eq!(store.last_message().as_deref(), Some("no_vest"));
    }
}
