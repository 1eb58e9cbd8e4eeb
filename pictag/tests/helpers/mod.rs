//! Test helper utilities
//!
//! Shared fixtures for pipeline and batch tests: a scripted inference
//! client, tiny on-disk images, and a file-backed temporary catalog.

use anyhow::Result;
use pictag::services::image_normalizer::NormalizedImage;
use pictag::services::ollama::{
    ChatMessage, ChatRequest, ChatResponse, InferenceClient, InferenceError,
};
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

/// Inference client replaying a queue of scripted outcomes
///
/// Each `chat` call pops the next scripted entry; an exhausted queue
/// panics so an unexpected extra call fails the test loudly. Call counts
/// and recorded requests are observable for retry and prompt assertions.
#[derive(Default)]
pub struct ScriptedClient {
    chat_script: Mutex<VecDeque<Result<String, InferenceError>>>,
    embedding_script: Mutex<VecDeque<Result<Vec<f32>, InferenceError>>>,
    chat_calls: AtomicUsize,
    embedding_calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chat(&self, content: impl Into<String>) {
        self.chat_script
            .lock()
            .unwrap()
            .push_back(Ok(content.into()));
    }

    pub fn push_chat_error(&self, error: InferenceError) {
        self.chat_script.lock().unwrap().push_back(Err(error));
    }

    pub fn push_embedding(&self, embedding: Vec<f32>) {
        self.embedding_script
            .lock()
            .unwrap()
            .push_back(Ok(embedding));
    }

    pub fn push_embedding_error(&self, error: InferenceError) {
        self.embedding_script.lock().unwrap().push_back(Err(error));
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn embedding_calls(&self) -> usize {
        self.embedding_calls.load(Ordering::SeqCst)
    }

    /// All chat requests seen so far, in call order
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl InferenceClient for ScriptedClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, InferenceError> {
        let calls = self.chat_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request);
        let next = self
            .chat_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("chat script exhausted after {} call(s)", calls));
        next.map(|content| ChatResponse {
            message: ChatMessage {
                role: "assistant".to_string(),
                content,
                images: None,
            },
            prompt_eval_count: Some(12),
            eval_count: Some(34),
        })
    }

    async fn embeddings(&self, _model: &str, _prompt: &str) -> Result<Vec<f32>, InferenceError> {
        let calls = self.embedding_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.embedding_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("embedding script exhausted after {} call(s)", calls))
    }
}

/// Well-formed extraction response content for the scripted client
pub fn fields_json(tags: &[&str], description: &str, title: &str, is_text: bool) -> String {
    serde_json::json!({
        "tags": tags,
        "fullDescription": description,
        "shortTitle": title,
        "isText": is_text,
    })
    .to_string()
}

/// Normalized image stand-in for pipeline tests that never decode a file
pub fn normalized_fixture() -> NormalizedImage {
    NormalizedImage {
        jpeg_bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
        width: 4,
        height: 4,
    }
}

/// Write a small valid PNG under `dir`
pub fn write_test_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let buffer = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let path = dir.join(name);
    buffer.save(&path).expect("failed to write test image");
    path
}

/// Write a file with a .png extension that no decoder accepts
pub fn write_corrupt_image(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"this is not image data").expect("failed to write corrupt file");
    path
}

/// Create a file-backed temporary catalog database
///
/// Returns (TempDir, SqlitePool); keep the TempDir alive for the whole test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test-image-tags.db");
    let pool = pictag_common::db::init_database(&db_path).await?;
    Ok((temp_dir, pool))
}
