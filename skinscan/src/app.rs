use crate::analysis::{AnalysisError, AnalysisService};
use crate::cli::{Command, HistoryCommand};
use crate::config::Config;
use crate::flows::{HistoryFlow, SaveState, ScanFlow, ScanStage};
use crate::history::{HistoryStore, RestCollection};

use dialoguer::Confirm;
use scan_api::ScanDocument;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio_stream::StreamExt;

pub async fn start_app(config: Config, command: Command) -> anyhow::Result<()> {
    let analysis = AnalysisService::new(&config.analysis)?;

    match command {
        Command::Analyze { image, save } => {
            let history = HistoryStore::new(RestCollection::new(&config.history)?);
            run_analyze(analysis, history, image, save).await
        }
        Command::History { command } => {
            let history = HistoryStore::new(RestCollection::new(&config.history)?);
            match command {
                HistoryCommand::List => run_history_list(history).await,
                HistoryCommand::Watch => run_history_watch(history).await,
                HistoryCommand::Delete { id, yes } => run_history_delete(history, id, yes).await,
            }
        }
        Command::Classes => run_classes(analysis).await,
        Command::Health => run_health(analysis).await,
    }
}

async fn run_analyze(
    analysis: AnalysisService,
    history: HistoryStore<RestCollection>,
    image: PathBuf,
    save: bool,
) -> anyhow::Result<()> {
    let mut flow = ScanFlow::new(analysis, history);
    flow.select_image(image);

    let stage = flow.analyze().await.clone();
    match stage {
        ScanStage::Detected(payload) => {
            if let Some(report) = &payload.detection {
                println!("Condition detected: {}", report.disease);
                if let Some(confidence) = report.confidence {
                    println!("Confidence: {:.1}%", confidence * 100.0);
                }
                if report.is_low_confidence {
                    println!("The service marked this result as low confidence.");
                }
                if let Some(predictions) = &report.all_predictions {
                    let mut ranked: Vec<_> = predictions.iter().collect();
                    ranked.sort_by(|a, b| b.1.total_cmp(a.1));
                    println!("Differential:");
                    for (disease, probability) in ranked.into_iter().take(3) {
                        println!("  {disease}: {:.1}%", probability * 100.0);
                    }
                }
            }

            if save {
                match flow.save().await {
                    SaveState::Saved { id } => println!("Saved to history as {id}."),
                    SaveState::SaveError(err) => eprintln!("Could not save the scan: {err}"),
                    _ => {}
                }
            }
            Ok(())
        }
        ScanStage::NoDetection(payload) => {
            if let Some(message) = &payload.message {
                println!("{message}");
            }
            if let Some(suggestion) = &payload.suggestion {
                println!("{suggestion}");
            }
            if save {
                println!("Nothing was detected, so there is nothing to save.");
            }
            Ok(())
        }
        ScanStage::Failed(err) => {
            match &err {
                AnalysisError::Rejected {
                    message,
                    reasons,
                    suggestions,
                } => {
                    println!("The image was rejected: {message}");
                    for reason in reasons {
                        println!("  reason: {reason}");
                    }
                    for suggestion in suggestions {
                        println!("  try: {suggestion}");
                    }
                }
                AnalysisError::Network(_) => {
                    println!("Could not reach the analysis service.");
                    println!("Check the connection and run the same command again.");
                }
                AnalysisError::MalformedResponse(_) | AnalysisError::Other(_) => {
                    println!("Analysis failed unexpectedly. Try again in a moment.");
                }
            }
            Err(err.into())
        }
        stage => {
            tracing::debug!(?stage, "analysis did not run");
            Ok(())
        }
    }
}

async fn run_history_list(history: HistoryStore<RestCollection>) -> anyhow::Result<()> {
    let mut flow = HistoryFlow::new(history);
    let _subscription = flow.mount().await?;

    if flow.records().is_empty() {
        println!("No saved scans.");
        return Ok(());
    }
    if flow.from_cache() {
        println!("(cached view)");
    }
    print_records(flow.records());
    Ok(())
}

async fn run_history_watch(history: HistoryStore<RestCollection>) -> anyhow::Result<()> {
    let mut flow = HistoryFlow::new(history);
    let subscription = flow.mount().await?;

    println!("{} saved scans. Watching for changes.", flow.records().len());
    print_records(flow.records());

    let stream = subscription.into_stream();
    tokio::pin!(stream);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            snapshot = stream.next() => match snapshot {
                Some(snapshot) => {
                    flow.apply_snapshot(snapshot);
                    println!("History changed, {} scans:", flow.records().len());
                    print_records(flow.records());
                }
                None => break,
            },
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, stopping watch.");
                break;
            }
        }
    }

    Ok(())
}

async fn run_history_delete(
    history: HistoryStore<RestCollection>,
    id: String,
    yes: bool,
) -> anyhow::Result<()> {
    let mut flow = HistoryFlow::new(history);
    let mut subscription = flow.mount().await?;

    if !flow.request_delete(&id) {
        println!("No saved scan with id {id}.");
        return Ok(());
    }

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete scan {id}? This cannot be undone"))
            .default(false)
            .interact()?;
        if !confirmed {
            flow.cancel_delete();
            println!("Delete cancelled.");
            return Ok(());
        }
    }

    flow.confirm_delete().await?;
    println!("Delete issued.");

    // The visible list only changes on snapshot; wait briefly for the one
    // that confirms the record is gone.
    let confirmation = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match subscription.next_snapshot().await {
                Some(snapshot) if !snapshot.iter().any(|record| record.id == id) => {
                    break Some(snapshot)
                }
                Some(_) => continue,
                None => break None,
            }
        }
    })
    .await;

    match confirmation {
        Ok(Some(snapshot)) => {
            flow.apply_snapshot(snapshot);
            println!("{} scans remain.", flow.records().len());
        }
        _ => println!("The list will update on the next snapshot."),
    }

    Ok(())
}

async fn run_classes(analysis: AnalysisService) -> anyhow::Result<()> {
    let classes = analysis.classes().await?;

    println!("The service screens for {} conditions:", classes.classes.len());
    for class in &classes.classes {
        println!("  {class}");
    }
    if let Some(threshold) = classes.confidence_threshold {
        println!("Detection threshold: {threshold}");
    }
    Ok(())
}

async fn run_health(analysis: AnalysisService) -> anyhow::Result<()> {
    let health = analysis.health().await?;

    println!("Status: {}", health.status);
    if let Some(device) = &health.device {
        println!("Device: {device}");
    }
    if let Some(model_loaded) = health.model_loaded {
        println!("Model loaded: {model_loaded}");
    }
    if let Some(message) = &health.message {
        println!("{message}");
    }
    Ok(())
}

fn print_records(records: &[ScanDocument]) {
    for record in records {
        println!(
            "{}  {}  {}  {}",
            record.id,
            record.timestamp.format("%Y-%m-%d %H:%M"),
            record.disease,
            record.image_uri
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
