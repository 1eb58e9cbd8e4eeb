//! Multi-stage extraction pipeline
//!
//! Each stage is one prompt against the inference client, driven through a
//! small state machine: `Pending -> AwaitingModel -> Validating` and from
//! there to `Succeeded`, `Retrying` (immediate, same payload), or
//! `ExhaustedRetries` once the attempt budget is spent. Transport errors
//! and validation failures draw from the same budget.
//!
//! The primary stage fills tags, description, title, and the textual
//! content flag in one schema-constrained call (`SinglePass`) or via a
//! free-text description followed by a text-only extraction (`TwoPass`).
//! Optional sub-stages refine the title, reclassify `is_text` by embedding
//! similarity, and transcribe text-bearing images.

use crate::config::{ExtractionSettings, ExtractionStrategy, InferenceConfig, IsTextStrategy};
use crate::error::PipelineError;
use crate::services::image_normalizer::NormalizedImage;
use crate::services::ollama::{ChatMessage, ChatRequest, InferenceClient};
use crate::services::similarity::cosine_similarity;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_TITLE_LENGTH: usize = 100;

const EXTRACTION_PROMPT: &str = r#"Analyze this image carefully and describe what you actually see. Look at the subjects, objects, animals, people, text, colors, composition, and setting. Be specific and accurate.

Return a JSON object with these REQUIRED fields:

1. "tags" (array of strings): Specific descriptive tags based on what's actually in the image. Examples: ["chicken", "animal", "door"], ["person", "outdoor", "park"], ["text", "document"]. Be accurate - only tag what you actually see.

2. "fullDescription" (string): A detailed, accurate description of what you see in the image. Describe the main subjects, their actions or positions, the setting, colors, and any notable details. Be specific and factual based on the image content.

3. "shortTitle" (string): A concise title (max 100 characters) that captures the main subject or scene. Examples: "Chicken looking at door", "Person walking in park", "Document screenshot".

4. "isText" (boolean): true ONLY if the image is primarily text content (like a document, screenshot of text, or text-heavy image). false for photos, illustrations, graphics, or images where text is not the main focus.

IMPORTANT:
- Describe what you ACTUALLY see in the image, not generic or abstract descriptions
- Be specific and accurate - if you see a chicken, say "chicken", not "abstract graphic"
- DO NOT include "thumbnailName" or any other fields

Example response format:
{
  "tags": ["chicken", "animal", "door"],
  "fullDescription": "A close-up photograph of a brown chicken standing near a wooden door, looking directly at the door with its head turned toward it.",
  "shortTitle": "Chicken looking at door",
  "isText": false
}"#;

const DESCRIBE_PROMPT: &str = "Describe this image in detail. Cover the main subjects, their actions or positions, the setting, colors, any visible text, and notable details. Be specific and factual about what you actually see.";

const FROM_DESCRIPTION_PROMPT: &str = r#"Based on the following detailed description of an image, extract structured information.

IMPORTANT: Return valid JSON only. Use straight double quotes ("), never curly/smart quotes.

Generate:
- tags: A list of 5-15 relevant tags (keywords for subjects, objects, settings, colors, themes)
- fullDescription: A concise description summarizing the key elements (1-3 sentences)
- shortTitle: A very short title (max 100 characters)
- isText: Whether the image contains substantial visible text (true/false)

Image description:
"#;

const TITLE_PROMPT: &str =
    "Generate a short title for an image (max 100 characters) based on this description of it: ";

const OCR_PROMPT: &str = "Transcribe all text visible in this image. Return only the transcribed text, preserving reading order. If no text is legible, return an empty response.";

const TEXT_CONTENT_REFERENCE: &str =
    "a document, screenshot, or page of written text such as code, an article, or a sign";
const PHOTO_CONTENT_REFERENCE: &str =
    "a photograph or illustration of people, animals, objects, or scenery";

/// Structured fields produced by the primary stage
#[derive(Debug, Clone)]
pub struct ImageFields {
    pub tags: Vec<String>,
    pub description: String,
    pub short_title: String,
    pub is_text: bool,
}

/// Final pipeline product for one image, pre tag-normalization
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub tags: Vec<String>,
    pub description: String,
    pub short_title: String,
    pub is_text: bool,
    pub text_contents: Option<String>,
}

/// Model response for the primary extraction schema
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelFields {
    tags: Option<Vec<String>>,
    full_description: Option<String>,
    short_title: Option<String>,
    is_text: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelTitle {
    short_title: Option<String>,
}

/// Per-call stage progression
enum StageState<T> {
    Pending,
    AwaitingModel { attempt: u32 },
    Validating { attempt: u32, content: String },
    Retrying { attempt: u32 },
    Succeeded(T),
    ExhaustedRetries { attempts: u32, last_failure: String },
}

/// Image analysis pipeline over an inference client
pub struct ExtractionPipeline {
    client: Arc<dyn InferenceClient>,
    inference: InferenceConfig,
    settings: ExtractionSettings,
}

impl ExtractionPipeline {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        inference: InferenceConfig,
        settings: ExtractionSettings,
    ) -> Self {
        Self {
            client,
            inference,
            settings,
        }
    }

    /// Analyze one normalized image into catalog fields
    pub async fn extract(
        &self,
        path: &Path,
        image: &NormalizedImage,
    ) -> Result<ExtractionOutcome, PipelineError> {
        let fields = match self.settings.strategy {
            ExtractionStrategy::SinglePass => self.single_pass(path, image).await?,
            ExtractionStrategy::TwoPass => self.two_pass(path, image).await?,
        };

        let short_title = if self.settings.refine_title {
            self.refine_title(path, &fields.description).await?
        } else {
            fields.short_title
        };

        let is_text = match self.settings.is_text_strategy {
            IsTextStrategy::ModelField => fields.is_text,
            IsTextStrategy::EmbeddingHeuristic => {
                self.classify_by_similarity(path, &fields.description).await?
            }
        };

        // Textual content always carries a "text" tag, whatever the model listed
        let mut tags = fields.tags;
        if is_text && !tags.iter().any(|t| t.eq_ignore_ascii_case("text")) {
            tags.push("text".to_string());
        }

        let text_contents = if is_text && self.settings.ocr_enabled {
            match self.transcribe(path, image).await {
                Ok(transcript) => {
                    let trimmed = transcript.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    }
                }
                Err(e) => {
                    warn!("Transcription failed for {}: {}", path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        Ok(ExtractionOutcome {
            tags,
            description: fields.description,
            short_title: truncate_title(&short_title),
            is_text,
            text_contents,
        })
    }

    async fn single_pass(
        &self,
        path: &Path,
        image: &NormalizedImage,
    ) -> Result<ImageFields, PipelineError> {
        let request = ChatRequest::new(
            &self.inference.model,
            vec![ChatMessage::user_with_image(
                EXTRACTION_PROMPT,
                &image.jpeg_bytes,
            )],
        )
        .with_format(image_fields_schema());

        self.run_stage(path, "extraction", &request, parse_image_fields)
            .await
    }

    async fn two_pass(
        &self,
        path: &Path,
        image: &NormalizedImage,
    ) -> Result<ImageFields, PipelineError> {
        let describe_request = ChatRequest::new(
            &self.inference.model,
            vec![ChatMessage::user_with_image(
                DESCRIBE_PROMPT,
                &image.jpeg_bytes,
            )],
        );
        let description = self
            .run_stage(path, "description", &describe_request, parse_free_text)
            .await?;

        let extract_request = ChatRequest::new(
            &self.inference.model,
            vec![ChatMessage::user(format!(
                "{}{}",
                FROM_DESCRIPTION_PROMPT, description
            ))],
        )
        .with_format(image_fields_schema());
        let fields = self
            .run_stage(path, "structuring", &extract_request, parse_image_fields)
            .await?;

        // The free-form first-pass description is the one worth keeping
        Ok(ImageFields {
            description,
            ..fields
        })
    }

    async fn refine_title(&self, path: &Path, description: &str) -> Result<String, PipelineError> {
        let request = ChatRequest::new(
            &self.inference.model,
            vec![ChatMessage::user(format!("{}{}", TITLE_PROMPT, description))],
        )
        .with_format(title_schema());

        self.run_stage(path, "title", &request, parse_title).await
    }

    async fn transcribe(
        &self,
        path: &Path,
        image: &NormalizedImage,
    ) -> Result<String, PipelineError> {
        let request = ChatRequest::new(
            self.inference.ocr_model(),
            vec![ChatMessage::user_with_image(OCR_PROMPT, &image.jpeg_bytes)],
        );

        // Any response is a valid transcript, including an empty one
        self.run_stage(path, "transcription", &request, |content| {
            Ok(content.to_string())
        })
        .await
    }

    async fn classify_by_similarity(
        &self,
        path: &Path,
        description: &str,
    ) -> Result<bool, PipelineError> {
        let description_vec = self.embed_with_retries(path, description).await?;
        let text_ref = self.embed_with_retries(path, TEXT_CONTENT_REFERENCE).await?;
        let photo_ref = self
            .embed_with_retries(path, PHOTO_CONTENT_REFERENCE)
            .await?;

        let text_score = cosine_similarity(&description_vec, &text_ref);
        let photo_score = cosine_similarity(&description_vec, &photo_ref);
        debug!(
            text_score,
            photo_score,
            "Similarity classification for {}",
            path.display()
        );

        Ok(text_score > photo_score)
    }

    /// Drive one stage to a terminal state
    async fn run_stage<T, F>(
        &self,
        path: &Path,
        stage: &str,
        request: &ChatRequest,
        parse: F,
    ) -> Result<T, PipelineError>
    where
        F: Fn(&str) -> Result<T, Vec<String>>,
    {
        let max_attempts = self.settings.max_attempts;
        let mut state = StageState::Pending;
        let mut last_failure = String::new();

        loop {
            state = match state {
                StageState::Pending => StageState::AwaitingModel { attempt: 1 },

                StageState::AwaitingModel { attempt } => {
                    if attempt > 1 {
                        info!(
                            "Retrying {} stage for {} ({}/{})",
                            stage,
                            path.display(),
                            attempt,
                            max_attempts
                        );
                    }
                    match self.client.chat(request.clone()).await {
                        Ok(response) => StageState::Validating {
                            attempt,
                            content: response.message.content,
                        },
                        Err(e) => {
                            warn!(
                                "Inference call failed in {} stage for {}: {}",
                                stage,
                                path.display(),
                                e
                            );
                            last_failure = e.to_string();
                            StageState::Retrying { attempt }
                        }
                    }
                }

                StageState::Validating { attempt, content } => match parse(&content) {
                    Ok(value) => StageState::Succeeded(value),
                    Err(issues) => {
                        warn!(
                            "Invalid model response in {} stage for {}: {}",
                            stage,
                            path.display(),
                            issues.join(", ")
                        );
                        debug!("Raw response: {}", content);
                        last_failure = PipelineError::Validation { issues }.to_string();
                        StageState::Retrying { attempt }
                    }
                },

                StageState::Retrying { attempt } => {
                    if attempt < max_attempts {
                        StageState::AwaitingModel {
                            attempt: attempt + 1,
                        }
                    } else {
                        StageState::ExhaustedRetries {
                            attempts: attempt,
                            last_failure: std::mem::take(&mut last_failure),
                        }
                    }
                }

                StageState::Succeeded(value) => return Ok(value),

                StageState::ExhaustedRetries {
                    attempts,
                    last_failure,
                } => {
                    return Err(PipelineError::Extraction {
                        path: path.to_path_buf(),
                        attempts,
                        last_failure,
                    })
                }
            };
        }
    }

    async fn embed_with_retries(
        &self,
        path: &Path,
        prompt: &str,
    ) -> Result<Vec<f32>, PipelineError> {
        let max_attempts = self.settings.max_attempts;
        let mut last_failure = String::new();

        for attempt in 1..=max_attempts {
            match self
                .client
                .embeddings(&self.inference.embedding_model, prompt)
                .await
            {
                Ok(vector) => return Ok(vector),
                Err(e) => {
                    warn!(
                        "Embedding call failed for {} ({}/{}): {}",
                        path.display(),
                        attempt,
                        max_attempts,
                        e
                    );
                    last_failure = e.to_string();
                }
            }
        }

        Err(PipelineError::Extraction {
            path: path.to_path_buf(),
            attempts: max_attempts,
            last_failure,
        })
    }
}

/// JSON schema for the primary extraction fields
fn image_fields_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "tags": {"type": "array", "items": {"type": "string"}},
            "fullDescription": {"type": "string"},
            "shortTitle": {"type": "string"},
            "isText": {"type": "boolean"}
        },
        "required": ["tags", "fullDescription", "shortTitle", "isText"]
    })
}

fn title_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "shortTitle": {"type": "string"}
        },
        "required": ["shortTitle"]
    })
}

fn parse_image_fields(content: &str) -> Result<ImageFields, Vec<String>> {
    let parsed: ModelFields = serde_json::from_str(content)
        .map_err(|e| vec![format!("unparsable JSON ({})", e)])?;

    let mut issues = Vec::new();
    if parsed.tags.is_none() {
        issues.push("tags: MISSING".to_string());
    }
    if parsed
        .full_description
        .as_deref()
        .map(str::trim)
        .unwrap_or("")
        .is_empty()
    {
        issues.push("fullDescription: MISSING".to_string());
    }
    if parsed
        .short_title
        .as_deref()
        .map(str::trim)
        .unwrap_or("")
        .is_empty()
    {
        issues.push("shortTitle: MISSING".to_string());
    }
    if parsed.is_text.is_none() {
        issues.push("isText: MISSING".to_string());
    }
    if !issues.is_empty() {
        return Err(issues);
    }

    Ok(ImageFields {
        tags: parsed.tags.unwrap_or_default(),
        description: parsed.full_description.unwrap_or_default(),
        short_title: parsed.short_title.unwrap_or_default(),
        is_text: parsed.is_text.unwrap_or_default(),
    })
}

fn parse_free_text(content: &str) -> Result<String, Vec<String>> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(vec!["description: MISSING".to_string()]);
    }
    Ok(trimmed.to_string())
}

fn parse_title(content: &str) -> Result<String, Vec<String>> {
    let parsed: ModelTitle = serde_json::from_str(content)
        .map_err(|e| vec![format!("unparsable JSON ({})", e)])?;
    match parsed.short_title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => Ok(title.to_string()),
        _ => Err(vec!["shortTitle: MISSING".to_string()]),
    }
}

fn truncate_title(title: &str) -> String {
    title.trim().chars().take(MAX_TITLE_LENGTH).collect()
}
