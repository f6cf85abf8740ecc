//! Integration tests for the webhook endpoint: structured responses, secret
//! verification, and the guarantee that processing failures never surface as
//! HTTP 500 to the platform.

use async_trait::async_trait;
use mealsnap::channels::{BotApi, TelegramError};
use mealsnap::gateway::{router, AppState};
use mealsnap::image::PreparedImage;
use mealsnap::processor::UpdateProcessor;
use mealsnap::retry::RetryPolicy;
use mealsnap::workflow::{AnalysisRecord, AnalysisWorkflow, NutritionAnalysis, StoredImage};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct SilentBot;

#[async_trait]
impl BotApi for SilentBot {
    async fn send_message(&self, _chat_id: i64, _text: &str) -> Result<(), TelegramError> {
        Ok(())
    }

    async fn fetch_file(&self, _file_id: &str) -> Result<(Vec<u8>, String), TelegramError> {
        let mut img = image::RgbImage::new(4, 4);
        img.put_pixel(0, 0, image::Rgb([90, 60, 30]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Jpeg)
            .expect("encode jpeg");
        Ok((buf.into_inner(), "photo.jpg".to_string()))
    }
}

struct FailingWorkflow;

#[async_trait]
impl AnalysisWorkflow for FailingWorkflow {
    async fn analyze(
        &self,
        _prepared: &PreparedImage,
        _display_name: &str,
    ) -> anyhow::Result<NutritionAnalysis> {
        Err(anyhow::anyhow!("vision model unavailable"))
    }

    async fn upload(
        &self,
        _bytes: &[u8],
        _filename: &str,
        _content_type: &str,
    ) -> anyhow::Result<StoredImage> {
        unreachable!("upload must not run when analysis fails")
    }

    async fn persist(
        &self,
        _image_path: &str,
        _nutrition: &NutritionAnalysis,
    ) -> anyhow::Result<AnalysisRecord> {
        unreachable!("persist must not run when analysis fails")
    }
}

async fn serve(state: AppState) -> String {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{}", addr)
}

fn state_with_processor(workflow: Arc<dyn AnalysisWorkflow>, secret: Option<&str>) -> AppState {
    let retry = RetryPolicy {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        backoff_multiplier: 1.0,
    };
    AppState {
        processor: Some(Arc::new(UpdateProcessor::new(
            Arc::new(SilentBot),
            workflow,
            retry,
            10 * 1024 * 1024,
        ))),
        webhook_secret: secret.map(str::to_string),
    }
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let base = serve(AppState {
        processor: None,
        webhook_secret: None,
    })
    .await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .expect("get health")
        .json()
        .await
        .expect("json");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "mealsnap");
}

#[tokio::test]
async fn update_without_message_is_acknowledged_unhandled() {
    let base = serve(state_with_processor(Arc::new(FailingWorkflow), None)).await;
    let res = reqwest::Client::new()
        .post(format!("{}/telegram/webhook", base))
        .json(&json!({ "update_id": 1 }))
        .send()
        .await
        .expect("post");
    assert_eq!(res.status().as_u16(), 200);
    let body: Value = res.json().await.expect("json");
    assert_eq!(body["ok"], true);
    assert_eq!(body["handled"], false);
}

#[tokio::test]
async fn processing_failure_still_answers_http_200() {
    let base = serve(state_with_processor(Arc::new(FailingWorkflow), None)).await;
    let update = json!({
        "update_id": 9,
        "message": {
            "chat": { "id": 42 },
            "photo": [{ "file_id": "f1", "width": 640, "height": 480 }]
        }
    });
    let res = reqwest::Client::new()
        .post(format!("{}/telegram/webhook", base))
        .json(&update)
        .send()
        .await
        .expect("post");
    // Never a raw 500 to the platform; the failure lives in the body.
    assert_eq!(res.status().as_u16(), 200);
    let body: Value = res.json().await.expect("json");
    assert_eq!(body["handled"], true);
    assert_eq!(body["status"], 500);
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn webhook_secret_is_enforced() {
    let base = serve(state_with_processor(Arc::new(FailingWorkflow), Some("s3cret"))).await;
    let client = reqwest::Client::new();
    let url = format!("{}/telegram/webhook", base);

    let res = client
        .post(&url)
        .json(&json!({ "update_id": 1 }))
        .send()
        .await
        .expect("post");
    assert_eq!(res.status().as_u16(), 403);

    let res = client
        .post(&url)
        .header("X-Telegram-Bot-Api-Secret-Token", "s3cret")
        .json(&json!({ "update_id": 1 }))
        .send()
        .await
        .expect("post");
    assert_eq!(res.status().as_u16(), 200);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let base = serve(state_with_processor(Arc::new(FailingWorkflow), None)).await;
    let res = reqwest::Client::new()
        .post(format!("{}/telegram/webhook", base))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .expect("post");
    assert_eq!(res.status().as_u16(), 400);
}

#[tokio::test]
async fn missing_processor_acknowledges_without_processing() {
    let base = serve(AppState {
        processor: None,
        webhook_secret: None,
    })
    .await;
    let update = json!({
        "update_id": 3,
        "message": { "chat": { "id": 42 }, "text": "hi" }
    });
    let res = reqwest::Client::new()
        .post(format!("{}/telegram/webhook", base))
        .json(&update)
        .send()
        .await
        .expect("post");
    assert_eq!(res.status().as_u16(), 200);
    let body: Value = res.json().await.expect("json");
    assert_eq!(body["handled"], false);
}
