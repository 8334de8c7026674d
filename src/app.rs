use crate::{
    alert::TelegramAlerter,
    config::Config,
    labels::{load_class_labels, ClassLabel},
    ort_service::OrtModelService,
    server::{AppState, HttpServer},
    telemetry::Metrics,
};
use anyhow::Context;
use std::sync::Arc;
use tokio::{signal, sync::broadcast};

/// Loads the label table and the ONNX detector. The labels are part of the
/// model artifact set, so either failure leaves the service degraded.
fn init_detector(config: &Config) -> anyhow::Result<(OrtModelService, Vec<ClassLabel>)> {
    let labels_path = config.labels.get_labels_path();
    let labels = load_class_labels(&labels_path)
        .with_context(|| format!("failed to load labels from {}", labels_path.display()))?;

    let model = OrtModelService::new(&config.model, labels.clone())
        .with_context(|| format!("failed to load model from {}", config.model.get_model_path().display()))?;

    Ok((model, labels))
}

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    // A load failure degrades to the unavailable state instead of aborting;
    // the operator fixes the artifact and restarts.
    let (model, labels) = match init_detector(&config) {
        Ok((model, labels)) => (Some(model), labels),
        Err(e) => {
            tracing::error!("Failed to initialize detector, serving degraded: {:?}", e);
            (None, Vec::new())
        }
    };

    let alerter = TelegramAlerter::new(&config.alert);

    let app_state = AppState {
        model,
        alerter,
        labels: Arc::new(labels),
        normal_class: Arc::new(config.alert.normal_class.to_lowercase()),
        metrics: Arc::new(Metrics::new()),
    };

    let server = HttpServer::new(app_state, &config.server).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
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
