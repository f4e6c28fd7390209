use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use studio_contracts::models::AspectRatio;

use crate::config::StudioConfig;
use crate::service::{ImageService, InputImage, RemixOutput, ServiceError, NO_TEXT_RESPONSE};

const GENERATE_OUTPUT_MIME: &str = "image/jpeg";

/// Google Generative Language API: Imagen `:predict` for generation and
/// Gemini `:generateContent` for image-plus-text remixes.
pub struct GeminiImageService {
    api_base: String,
    api_key: String,
    generate_model: String,
    remix_model: String,
    http: HttpClient,
}

impl GeminiImageService {
    pub fn new(config: &StudioConfig) -> anyhow::Result<Self> {
        let Some(api_key) = config.api_key.clone() else {
            anyhow::bail!("GEMINI_API_KEY or GOOGLE_API_KEY or API_KEY not set");
        };
        let http = HttpClient::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| anyhow::anyhow!("failed to build HTTP client: {err}"))?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            generate_model: config.generate_model.clone(),
            remix_model: config.remix_model.clone(),
            http,
        })
    }

    fn endpoint_for_model(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:{}", self.api_base, model_path, method)
    }

    fn post(&self, endpoint: &str, payload: &Value) -> Result<Value, ServiceError> {
        tracing::debug!(endpoint, "dispatching image service request");
        let response = self
            .http
            .post(endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(payload)
            .send()
            .map_err(|err| ServiceError::Service(format!("Gemini request failed: {err}")))?;
        response_json_or_error(response)
    }
}

impl ImageService for GeminiImageService {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, prompt: &str, aspect_ratio: AspectRatio) -> Result<String, ServiceError> {
        let endpoint = self.endpoint_for_model(&self.generate_model, "predict");
        let response = self.post(&endpoint, &generate_payload(prompt, aspect_ratio))?;
        parse_generate_response(&response)
    }

    fn remix(&self, prompt: &str, image: &InputImage) -> Result<RemixOutput, ServiceError> {
        let endpoint = self.endpoint_for_model(&self.remix_model, "generateContent");
        let response = self.post(&endpoint, &remix_payload(prompt, image))?;
        parse_remix_response(&response)
    }
}

pub fn generate_payload(prompt: &str, aspect_ratio: AspectRatio) -> Value {
    json!({
        "instances": [{ "prompt": prompt }],
        "parameters": {
            "sampleCount": 1,
            "aspectRatio": aspect_ratio.as_str(),
            "outputMimeType": GENERATE_OUTPUT_MIME,
        },
    })
}

pub fn remix_payload(prompt: &str, image: &InputImage) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                {
                    "inlineData": {
                        "mimeType": image.mime_type(),
                        "data": BASE64.encode(image.bytes()),
                    }
                },
                { "text": prompt },
            ],
        }],
        "generationConfig": {
            "responseModalities": ["IMAGE", "TEXT"],
        },
    })
}

/// Extracts the first generated image of an Imagen `:predict` response.
pub fn parse_generate_response(payload: &Value) -> Result<String, ServiceError> {
    let predictions = payload
        .get("predictions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for prediction in &predictions {
        let data = prediction
            .get("bytesBase64Encoded")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let mime_type = prediction
            .get("mimeType")
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(GENERATE_OUTPUT_MIME);
        return Ok(format!("data:{mime_type};base64,{data}"));
    }

    let filtered = predictions
        .iter()
        .find_map(|prediction| prediction.get("raiFilteredReason").and_then(Value::as_str));
    Err(ServiceError::EmptyResult(match filtered {
        Some(reason) => format!("No image was generated. The prompt may have been blocked: {reason}"),
        None => "No image was generated. The prompt may have been blocked.".to_string(),
    }))
}

/// Extracts the image and text parts of a Gemini `:generateContent` response.
pub fn parse_remix_response(payload: &Value) -> Result<RemixOutput, ServiceError> {
    let parts = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array);
    let Some(parts) = parts else {
        let block_reason = payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
            .filter(|reason| !reason.trim().is_empty());
        if let Some(reason) = block_reason {
            return Err(ServiceError::BlockedRequest {
                reason: reason.to_string(),
            });
        }
        return Err(ServiceError::Service(
            "Invalid response from the API. The model did not return any content.".to_string(),
        ));
    };

    let mut image_data_url: Option<String> = None;
    let mut text: Option<String> = None;
    for part in parts {
        if let Some(value) = part.get("text").and_then(Value::as_str) {
            if !value.is_empty() {
                text = Some(value.to_string());
            }
            continue;
        }
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png");
        image_data_url = Some(format!("data:{mime_type};base64,{data}"));
    }

    let Some(image_data_url) = image_data_url else {
        return Err(ServiceError::EmptyResult(
            "No image was remixed. The prompt may have been blocked or the model did not return an image."
                .to_string(),
        ));
    };
    Ok(RemixOutput {
        image_data_url,
        text: text.unwrap_or_else(|| NO_TEXT_RESPONSE.to_string()),
    })
}

fn response_json_or_error(response: HttpResponse) -> Result<Value, ServiceError> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|err| ServiceError::Service(format!("Gemini response body read failed: {err}")))?;
    if !status.is_success() {
        return Err(ServiceError::Service(format!(
            "Gemini request failed ({}): {}",
            status.as_u16(),
            truncate_text(&body, 512)
        )));
    }
    serde_json::from_str(&body)
        .map_err(|err| ServiceError::Service(format!("Gemini returned invalid JSON payload: {err}")))
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use studio_contracts::codec;
    use studio_contracts::models::AspectRatio;

    use crate::config::StudioConfig;
    use crate::service::{InputImage, ServiceError, NO_TEXT_RESPONSE};

    use super::{
        generate_payload, parse_generate_response, parse_remix_response, remix_payload,
        truncate_text, GeminiImageService,
    };

    fn config(api_key: Option<&str>) -> StudioConfig {
        StudioConfig::from_lookup(|key| match key {
            "GEMINI_API_KEY" => api_key.map(str::to_string),
            "GEMINI_API_BASE" => Some("https://example.test/v1beta/".to_string()),
            _ => None,
        })
    }

    #[test]
    fn requires_api_key() {
        assert!(GeminiImageService::new(&config(None)).is_err());
    }

    #[test]
    fn endpoints_use_model_paths() -> anyhow::Result<()> {
        let service = GeminiImageService::new(&config(Some("secret")))?;
        assert_eq!(
            service.endpoint_for_model("imagen-4.0-generate-001", "predict"),
            "https://example.test/v1beta/models/imagen-4.0-generate-001:predict"
        );
        assert_eq!(
            service.endpoint_for_model("models/gemini-2.5-flash-image", "generateContent"),
            "https://example.test/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        Ok(())
    }

    #[test]
    fn generate_payload_requests_single_jpeg() {
        let payload = generate_payload("a boat", AspectRatio::Landscape);
        assert_eq!(payload["instances"][0]["prompt"], json!("a boat"));
        assert_eq!(payload["parameters"]["sampleCount"], json!(1));
        assert_eq!(payload["parameters"]["aspectRatio"], json!("16:9"));
        assert_eq!(payload["parameters"]["outputMimeType"], json!("image/jpeg"));
    }

    #[test]
    fn remix_payload_sends_image_then_prompt() -> anyhow::Result<()> {
        let image = InputImage::new("a.png", "image/png", b"hi".to_vec())?;
        let payload = remix_payload("make it blue", &image);
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/png"));
        assert_eq!(parts[0]["inlineData"]["data"], json!("aGk="));
        assert_eq!(parts[1]["text"], json!("make it blue"));
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
        Ok(())
    }

    #[test]
    fn generate_response_yields_data_url() -> anyhow::Result<()> {
        let url = parse_generate_response(&json!({
            "predictions": [{ "bytesBase64Encoded": "aGk=", "mimeType": "image/jpeg" }]
        }))?;
        assert_eq!(url, "data:image/jpeg;base64,aGk=");
        assert_eq!(codec::decode(&url)?.bytes, b"hi");
        Ok(())
    }

    #[test]
    fn generate_without_predictions_is_empty_result() {
        assert!(matches!(
            parse_generate_response(&json!({})),
            Err(ServiceError::EmptyResult(_))
        ));
        let filtered = parse_generate_response(&json!({
            "predictions": [{ "raiFilteredReason": "filtered for safety" }]
        }));
        assert!(matches!(filtered, Err(ServiceError::EmptyResult(ref msg)) if msg.contains("filtered for safety")));
    }

    #[test]
    fn remix_response_with_image_and_text() -> anyhow::Result<()> {
        let output = parse_remix_response(&json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Here you go" },
                        { "inlineData": { "mimeType": "image/png", "data": "aGk=" } }
                    ]
                }
            }]
        }))?;
        assert_eq!(output.image_data_url, "data:image/png;base64,aGk=");
        assert_eq!(output.text, "Here you go");
        Ok(())
    }

    #[test]
    fn remix_response_text_defaults_to_placeholder() -> anyhow::Result<()> {
        let output = parse_remix_response(&json!({
            "candidates": [{
                "content": { "parts": [{ "inline_data": { "mime_type": "image/webp", "data": "aGk=" } }] }
            }]
        }))?;
        assert_eq!(output.image_data_url, "data:image/webp;base64,aGk=");
        assert_eq!(output.text, NO_TEXT_RESPONSE);
        Ok(())
    }

    #[test]
    fn remix_response_without_image_is_empty_result() {
        let result = parse_remix_response(&json!({
            "candidates": [{ "content": { "parts": [{ "text": "I can't do that." }] } }]
        }));
        assert!(matches!(result, Err(ServiceError::EmptyResult(_))));
    }

    #[test]
    fn remix_block_reason_is_blocked_request() {
        let result = parse_remix_response(&json!({
            "promptFeedback": { "blockReason": "PROHIBITED_CONTENT" }
        }));
        assert_eq!(
            result,
            Err(ServiceError::BlockedRequest {
                reason: "PROHIBITED_CONTENT".to_string()
            })
        );
    }

    #[test]
    fn remix_without_content_is_service_error() {
        let result = parse_remix_response(&json!({ "candidates": [{ "finishReason": "OTHER" }] }));
        assert!(matches!(result, Err(ServiceError::Service(_))));
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate_text("abc", 5), "abc");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
