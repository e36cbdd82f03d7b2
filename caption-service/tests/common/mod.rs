#![allow(dead_code)]

use caption_service::config::CaptionConfig;
use caption_service::startup::Application;
use reqwest::multipart::{Form, Part};
use service_core::genai::MockTextProvider;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

pub const TEST_CAPTION: &str = "A cat sitting on a windowsill.";

/// A few bytes that start like a PNG; the model is mocked so they never
/// need to decode.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub provider: MockTextProvider,
    pub upload_dir: PathBuf,
    client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(MockTextProvider::with_reply(TEST_CAPTION), |_| {}).await
    }

    pub async fn spawn_with(
        provider: MockTextProvider,
        customize: impl FnOnce(&mut CaptionConfig),
    ) -> Self {
        std::env::set_var("GEMINI_API_KEY", "test-api-key");

        let mut config = CaptionConfig::load().expect("Failed to load configuration");
        config.common.port = 0; // Random port for testing
        config.upload.dir = PathBuf::from(format!("target/test-uploads-{}", Uuid::new_v4()));
        customize(&mut config);

        let upload_dir = config.upload.dir.clone();

        let app = Application::build_with_provider(config, Arc::new(provider.clone()))
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            provider,
            upload_dir,
            client,
        }
    }

    pub fn image_part(bytes: &[u8], file_name: &str, mime_type: &str) -> Part {
        Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .expect("Invalid MIME type")
    }

    pub async fn post_caption(&self, form: Form) -> reqwest::Response {
        self.client
            .post(format!("{}/generate-caption", self.address))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// POST to `path` with a plain, non-multipart body (or none at all).
    pub async fn post_raw(&self, path: &str, body: Option<&'static str>) -> reqwest::Response {
        let mut request = self.client.post(format!("{}{}", self.address, path));
        if let Some(body) = body {
            request = request.header("content-type", "text/plain").body(body);
        }
        request.send().await.expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Files currently sitting in the upload directory.
    pub fn transient_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.upload_dir)
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }

    pub async fn cleanup(&self) {
        let _ = tokio::fs::remove_dir_all(&self.upload_dir).await;
    }
}
