use crate::{config::AlertConfig, detection::Detection, image_utils};
use async_trait::async_trait;
use image::RgbImage;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use thiserror::Error;

const CAPTION_HEADER: &str = "\u{26a0} *Detección de error en impresión 3D* \u{26a0}\n\n";

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("bot API returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Outbound alerting seam; callers only learn whether delivery happened.
#[async_trait]
pub trait AlertService: Send + Sync + Clone + 'static {
    async fn send_alert(&self, image: &RgbImage, detections: &[Detection]) -> bool;
}

/// Sends annotated snapshots to a Telegram chat through the bot API.
#[derive(Clone)]
pub struct TelegramAlerter {
    client: reqwest::Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
    normal_class: String,
}

impl TelegramAlerter {
    pub fn new(alert_config: &AlertConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(alert_config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_url: alert_config.api_url.trim_end_matches('/').to_string(),
            bot_token: alert_config.bot_token.clone(),
            chat_id: alert_config.chat_id.clone(),
            normal_class: alert_config.normal_class.to_lowercase(),
        }
    }

    fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }

    fn anomalies<'a>(&self, detections: &'a [Detection]) -> Vec<&'a Detection> {
        detections
            .iter()
            .filter(|detection| !detection.is_normal_class(&self.normal_class))
            .collect()
    }

    fn build_caption(anomalies: &[&Detection]) -> String {
        let mut caption = String::from(CAPTION_HEADER);
        for detection in anomalies {
            caption.push_str(&format!("\u{1f539} *{}*\n", detection.name));
            caption.push_str(&format!("Confianza: {:.2}\n", detection.confidence));
            caption.push_str(&format!(
                "Posición: x1={:.0}, y1={:.0}, x2={:.0}, y2={:.0}\n\n",
                detection.xmin, detection.ymin, detection.xmax, detection.ymax
            ));
        }
        caption
    }

    async fn send_photo(&self, caption: String, photo: Vec<u8>) -> Result<(), AlertError> {
        let url = format!("{}/bot{}/sendPhoto", self.api_url, self.bot_token);
        let photo_part = Part::bytes(photo)
            .file_name("detection.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption)
            .text("parse_mode", "Markdown")
            .part("photo", photo_part);

        let response = self.client.post(&url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlertError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl AlertService for TelegramAlerter {
    async fn send_alert(&self, image: &RgbImage, detections: &[Detection]) -> bool {
        let anomalies = self.anomalies(detections);
        if anomalies.is_empty() {
            tracing::info!("No alert sent: only the normal class was detected");
            return false;
        }

        if !self.is_configured() {
            tracing::warn!("Alert skipped: bot token or chat id not configured");
            return false;
        }

        let photo = match image_utils::encode_jpeg(image) {
            Ok(photo) => photo,
            Err(e) => {
                tracing::error!("Failed to encode alert image: {}", e);
                return false;
            }
        };

        let caption = Self::build_caption(&anomalies);
        match self.send_photo(caption, photo).await {
            Ok(()) => {
                tracing::info!("Alert delivered for {} anomalies", anomalies.len());
                true
            }
            Err(e) => {
                tracing::error!("Failed to deliver alert: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Router};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio::net::TcpListener;

    fn alert_config(api_url: &str, bot_token: &str) -> AlertConfig {
        AlertConfig {
            api_url: api_url.to_string(),
            bot_token: bot_token.to_string(),
            chat_id: "-100123".to_string(),
            timeout_secs: 5,
            normal_class: "imprimiendo".to_string(),
        }
    }

    fn detection(name: &str) -> Detection {
        Detection {
            xmin: 10.4,
            ymin: 20.6,
            xmax: 110.2,
            ymax: 220.8,
            confidence: 0.8765,
            class_id: 1,
            name: name.to_string(),
        }
    }

    fn snapshot() -> RgbImage {
        RgbImage::from_pixel(8, 8, image::Rgb([40, 40, 40]))
    }

    async fn spawn_bot_api(status: StatusCode) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let recorded = hits.clone();
        let app = Router::new().route(
            "/bottest-token/sendPhoto",
            post(move || {
                let recorded = recorded.clone();
                async move {
                    recorded.fetch_add(1, Ordering::SeqCst);
                    (status, "{}")
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", address), hits)
    }

    #[test]
    fn caption_lists_name_confidence_and_rounded_corners() {
        let found = detection("spaghetti");

        let caption = TelegramAlerter::build_caption(&[&found]);

        assert!(caption.starts_with(CAPTION_HEADER));
        assert!(caption.contains("*spaghetti*"));
        assert!(caption.contains("Confianza: 0.88"));
        assert!(caption.contains("Posición: x1=10, y1=21, x2=110, y2=221"));
    }

    #[test]
    fn anomalies_ignore_the_normal_class_case_insensitively() {
        let alerter = TelegramAlerter::new(&alert_config("http://localhost", "test-token"));
        let detections = vec![
            detection("IMPRIMIENDO"),
            detection("imprimiendo"),
            detection("spaghetti"),
        ];

        let anomalies = alerter.anomalies(&detections);

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].name, "spaghetti");
    }

    #[tokio::test]
    async fn normal_only_detections_skip_the_network() {
        let (api_url, hits) = spawn_bot_api(StatusCode::OK).await;
        let alerter = TelegramAlerter::new(&alert_config(&api_url, "test-token"));

        let sent = alerter
            .send_alert(&snapshot(), &[detection("imprimiendo")])
            .await;

        assert!(!sent);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_credentials_skip_the_network() {
        let (api_url, hits) = spawn_bot_api(StatusCode::OK).await;
        let alerter = TelegramAlerter::new(&alert_config(&api_url, ""));

        let sent = alerter
            .send_alert(&snapshot(), &[detection("spaghetti")])
            .await;

        assert!(!sent);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn anomaly_sends_exactly_one_photo() {
        let (api_url, hits) = spawn_bot_api(StatusCode::OK).await;
        let alerter = TelegramAlerter::new(&alert_config(&api_url, "test-token"));

        let sent = alerter
            .send_alert(&snapshot(), &[detection("imprimiendo"), detection("spaghetti")])
            .await;

        assert!(sent);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bot_api_error_reports_failed_delivery() {
        let (api_url, hits) = spawn_bot_api(StatusCode::FORBIDDEN).await;
        let alerter = TelegramAlerter::new(&alert_config(&api_url, "test-token"));

        let sent = alerter
            .send_alert(&snapshot(), &[detection("spaghetti")])
            .await;

        assert!(!sent);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_bot_api_reports_failed_delivery() {
        let alerter = TelegramAlerter::new(&alert_config("http://127.0.0.1:1", "test-token"));

        let sent = alerter
            .send_alert(&snapshot(), &[detection("spaghetti")])
            .await;

        assert!(!sent);
    }
}
