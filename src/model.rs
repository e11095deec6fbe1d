use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::analysis::AnalysisResult;
use crate::utils::GatewayConfig;

const SYSTEM_PROMPT: &str = r#"You are an expert wildlife biologist specializing in animal camouflage and adaptive coloration.
Analyze images to detect camouflaged animals, identify species, and quantify camouflage effectiveness.

Provide detailed analysis including:
- Whether camouflage is present (true/false)
- Species identification if detected
- Camouflage percentage (0-100)
- AI confidence level (0-100)
- Detailed description of findings
- List of specific camouflage adaptations observed
- Bounding box coordinates of the camouflaged animal (approximate percentage positions from 0-100)
- List of specific camouflaged regions with their coordinates

Respond ONLY with valid JSON in this exact format:
{
  "detected": boolean,
  "species": "string or null",
  "camouflagePercentage": number,
  "confidence": number,
  "description": "string",
  "adaptations": ["string", "string"],
  "boundingBox": {
    "x": number (0-100, left position as percentage),
    "y": number (0-100, top position as percentage),
    "width": number (0-100, width as percentage),
    "height": number (0-100, height as percentage)
  },
  "camouflageRegions": [
    {
      "description": "string (e.g., 'head and neck region')",
      "intensity": number (0-100, how well camouflaged),
      "x": number (0-100),
      "y": number (0-100),
      "width": number (0-100),
      "height": number (0-100)
    }
  ]
}"#;

const USER_PROMPT: &str = "Analyze this image for camouflaged animals. Detect any animals using camouflage, identify the species if possible, and provide a detailed analysis of their camouflage techniques.";

const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 2000;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("No image provided")]
    NoImage,
    #[error("AI_GATEWAY_API_KEY not configured")]
    MissingApiKey,
    #[error("AI analysis failed: {0}")]
    Upstream(u16),
    #[error("No content in AI response")]
    EmptyContent,
    #[error("AI gateway request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum ChatMessage<'a> {
    System { content: &'a str },
    User { content: Vec<ContentPart<'a>> },
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Hosted multimodal model reached through an OpenAI-compatible gateway.
pub struct Model {
    http: reqwest::Client,
    config: GatewayConfig,
}

impl Model {
    pub fn new(config: GatewayConfig) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Model { http, config })
    }

    fn build_request<'a>(&'a self, image: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage::System {
                    content: SYSTEM_PROMPT,
                },
                ChatMessage::User {
                    content: vec![
                        ContentPart::Text { text: USER_PROMPT },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl { url: image },
                        },
                    ],
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        }
    }

    /// Asks the model to analyze `image` (a data URI or URL).
    ///
    /// Content that is not valid analysis JSON yields the fallback result.
    pub async fn predict(&self, image: &str) -> Result<AnalysisResult, ModelError> {
        if image.trim().is_empty() {
            return Err(ModelError::NoImage);
        }
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ModelError::MissingApiKey)?;

        info!("Calling AI gateway for camouflage analysis...");
        debug!("Image payload is {} bytes", image.len());

        let response = self
            .http
            .post(&self.config.url)
            .bearer_auth(api_key)
            .json(&self.build_request(image))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("AI gateway error: {}", body);
            return Err(ModelError::Upstream(status.as_u16()));
        }

        let reply: ChatResponse = response.json().await?;
        info!("AI response received");

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ModelError::EmptyContent)?;

        let analysis = AnalysisResult::parse_or_fallback(&content);
        info!(
            "Analysis complete: detected={} camouflage={}% confidence={}%",
            analysis.detected, analysis.camouflage_percentage, analysis.confidence
        );
        Ok(analysis)
    }
}
