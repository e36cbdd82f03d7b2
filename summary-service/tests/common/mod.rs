#![allow(dead_code)]

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use reqwest::multipart::{Form, Part};
use service_core::genai::MockTextProvider;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use summary_service::config::SummaryConfig;
use summary_service::services::{ExtractError, LopdfExtractor, TextExtractor};
use summary_service::startup::Application;
use uuid::Uuid;

pub const TEST_SUMMARY: &str = "Overview: a short test document.";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub provider: MockTextProvider,
    pub extractor: CountingExtractor,
    pub upload_dir: PathBuf,
    client: reqwest::Client,
}

impl TestApp {
    /// Spawns the app with the real PDF extractor.
    pub async fn spawn() -> Self {
        Self::spawn_with(
            MockTextProvider::with_reply(TEST_SUMMARY),
            CountingExtractor::wrapping(LopdfExtractor::new()),
        )
        .await
    }

    pub async fn spawn_with(provider: MockTextProvider, extractor: CountingExtractor) -> Self {
        std::env::set_var("GEMINI_API_KEY", "test-api-key");

        let mut config = SummaryConfig::load().expect("Failed to load configuration");
        config.common.port = 0; // Random port for testing
        config.upload.dir = PathBuf::from(format!("target/test-uploads-{}", Uuid::new_v4()));

        let upload_dir = config.upload.dir.clone();

        let app = Application::build_with(
            config,
            Arc::new(provider.clone()),
            Arc::new(extractor.clone()),
        )
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
            extractor,
            upload_dir,
            client,
        }
    }

    pub fn file_part(bytes: Vec<u8>, file_name: &str, mime_type: &str) -> Part {
        Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .expect("Invalid MIME type")
    }

    pub fn pdf_form(bytes: Vec<u8>) -> Form {
        Form::new().part("pdf", Self::file_part(bytes, "report.pdf", "application/pdf"))
    }

    pub async fn post_summary(&self, form: Form) -> reqwest::Response {
        self.client
            .post(format!("{}/generate-summary", self.address))
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

/// Extractor that counts calls and either delegates or returns fixed text.
#[derive(Clone)]
pub struct CountingExtractor {
    inner: Arc<dyn TextExtractor>,
    calls: Arc<AtomicUsize>,
}

struct FixedText(String);

#[async_trait]
impl TextExtractor for FixedText {
    async fn extract(&self, _pdf: Vec<u8>) -> Result<String, ExtractError> {
        Ok(self.0.clone())
    }
}

impl CountingExtractor {
    pub fn wrapping(inner: impl TextExtractor + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn returning(text: impl Into<String>) -> Self {
        Self::wrapping(FixedText(text.into()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for CountingExtractor {
    async fn extract(&self, pdf: Vec<u8>) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.extract(pdf).await
    }
}

/// A one-page PDF with each entry of `lines` on its own line.
pub fn pdf_with_lines(lines: &[&str]) -> Vec<u8> {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
        Operation::new("TL", vec![14.into()]),
        Operation::new("Td", vec![72.into(), 760.into()]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("Failed to encode content"),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to write PDF");
    bytes
}
