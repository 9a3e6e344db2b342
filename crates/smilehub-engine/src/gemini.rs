use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use smilehub_contracts::analysis::{AnalysisRequest, TextAnalysis, DEFAULT_DISCLAIMER};
use smilehub_contracts::media::ImageToken;

use crate::config::AnalyzerConfig;
use crate::{AnalysisCapability, CapabilityError, VisualizationCapability};

pub const ANALYSIS_PROMPT: &str = r#"You are a helpful and friendly AI dental assistant. Your goal is to analyze a dental photo and provide a preliminary assessment.

Analyze the provided photo of teeth. Based on what you see, identify potential issues such as cavities, gingivitis, enamel erosion, crowding, or staining.

- For the 'analysis' field, provide a concise summary of your findings.
- For the 'suggestion' field, suggest a likely treatment for the issues you found.
- For the 'recommendedSpecialistCategory' field, recommend a type of specialist who would handle such a treatment.
- The 'disclaimer' field has a default value, so you don't need to generate it unless you want to customize it.

Do not diagnose diseases or give definitive medical advice. Frame your response in a helpful, accessible, and reassuring tone.

Here are some examples of good responses:
- Analysis: "I've noticed some inflammation along the gumline, which could be a sign of early gum disease (gingivitis)." Suggestion: "A professional cleaning and improved hygiene routine would be a great next step." Recommended specialist: "General Dentist".
- Analysis: "There appears to be a small dark spot on one of the back molars. This might be a cavity or just a surface stain." Suggestion: "A dental check-up with an X-ray can determine if a filling is needed." Recommended specialist: "General Dentist".
- Analysis: "The teeth seem to show some slight overlapping, which is known as crowding." Suggestion: "An orthodontic consultation could explore options like braces or clear aligners." Recommended specialist: "Orthodontist".

Photo:"#;

const ERROR_BODY_MAX_CHARS: usize = 512;

pub fn visualization_prompt(suggestion: &str) -> String {
    format!(
        "Based on the suggested dental treatment \"{suggestion}\", generate a realistic \"after\" image showing the result on these teeth."
    )
}

/// Gemini `generateContent` transport for both the analysis and the
/// visualization call. One attempt per call.
#[derive(Clone)]
pub struct GeminiProvider {
    api_base: String,
    api_key: Option<String>,
    text_model: String,
    image_model: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            text_model: config.text_model.model.name.clone(),
            image_model: config.image_model.model.name.clone(),
            timeout: Duration::from_secs_f64(config.request_timeout_s),
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn api_key(&self) -> Result<&str, CapabilityError> {
        self.api_key.as_deref().ok_or_else(|| {
            CapabilityError::missing_credential("GEMINI_API_KEY or GOOGLE_API_KEY not set")
        })
    }

    fn post(&self, model: &str, payload: &Value) -> Result<Value, CapabilityError> {
        let api_key = self.api_key()?;
        let endpoint = self.endpoint_for_model(model);
        tracing::debug!(endpoint = endpoint.as_str(), "gemini request");
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .json(payload)
            .send()
            .map_err(|err| {
                CapabilityError::transport(format!("Gemini request failed ({endpoint}): {err}"))
            })?;
        response_json_or_error(response)
    }

    pub(crate) fn safety_settings() -> Vec<Value> {
        // Dental photos and treatment talk trip the dangerous-content filter.
        [
            ("HARM_CATEGORY_DANGEROUS_CONTENT", "BLOCK_NONE"),
            ("HARM_CATEGORY_HARASSMENT", "BLOCK_MEDIUM_AND_ABOVE"),
            ("HARM_CATEGORY_HATE_SPEECH", "BLOCK_MEDIUM_AND_ABOVE"),
            ("HARM_CATEGORY_SEXUALLY_EXPLICIT", "BLOCK_LOW_AND_ABOVE"),
        ]
        .into_iter()
        .map(|(category, threshold)| {
            json!({
                "category": category,
                "threshold": threshold,
            })
        })
        .collect()
    }

    pub(crate) fn response_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "analysis": {
                    "type": "STRING",
                    "description": "The AI analysis of the dental photo, identifying specific potential issues like cavities, gingivitis, or staining.",
                },
                "suggestion": {
                    "type": "STRING",
                    "description": "Suggested treatments based on the analysis (e.g., \"Professional Cleaning\", \"Dental Filling\").",
                },
                "recommendedSpecialistCategory": {
                    "type": "STRING",
                    "description": "A recommended type of specialist for the suggested treatments (e.g., \"General Dentist\", \"Orthodontist\").",
                },
                "disclaimer": {
                    "type": "STRING",
                    "description": format!(
                        "A friendly, reassuring disclaimer about the limits of AI analysis. Defaults to: {DEFAULT_DISCLAIMER}"
                    ),
                },
            },
            "required": ["analysis", "suggestion", "recommendedSpecialistCategory"],
            "propertyOrdering": ["analysis", "suggestion", "recommendedSpecialistCategory", "disclaimer"],
        })
    }

    pub(crate) fn analysis_payload(photo: &ImageToken) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": ANALYSIS_PROMPT },
                    inline_image_part(photo),
                ],
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": Self::response_schema(),
            },
            "safetySettings": Self::safety_settings(),
        })
    }

    pub(crate) fn visualization_payload(photo: &ImageToken, suggestion: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    inline_image_part(photo),
                    { "text": visualization_prompt(suggestion) },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
            },
        })
    }

    pub(crate) fn parse_analysis(response: &Value) -> Result<TextAnalysis, CapabilityError> {
        check_prompt_feedback(response)?;
        let text = candidate_parts(response)
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<&str>>()
            .join("");
        let text = strip_code_fence(&text);
        if text.is_empty() {
            return Err(CapabilityError::empty_output(
                "Gemini returned no analysis text",
            ));
        }
        let value: Value = serde_json::from_str(text).map_err(|err| {
            CapabilityError::malformed(format!("Gemini analysis is not valid JSON: {err}"))
        })?;
        TextAnalysis::from_model_value(&value).map_err(CapabilityError::malformed)
    }

    /// First inline image part as a token. Text-only answers are an error.
    pub(crate) fn parse_after_image(response: &Value) -> Result<String, CapabilityError> {
        check_prompt_feedback(response)?;
        let parts = candidate_parts(response);
        for part in &parts {
            let inline = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object);
            let Some(inline) = inline else {
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
            let token =
                ImageToken::from_base64(mime_type, data).map_err(CapabilityError::malformed)?;
            token.decode_bytes().map_err(CapabilityError::malformed)?;
            return Ok(token.to_data_uri());
        }

        let text = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<&str>>()
            .join(" ");
        Err(CapabilityError::no_image_payload(if text.trim().is_empty() {
            "Gemini returned no 'after' image".to_string()
        } else {
            format!(
                "Gemini returned text without an 'after' image: {}",
                truncate_text(text.trim(), 160)
            )
        }))
    }
}

impl AnalysisCapability for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn analyze(&self, request: &AnalysisRequest) -> Result<TextAnalysis, CapabilityError> {
        self.api_key()?;
        let photo = ImageToken::parse(&request.photo_data).map_err(CapabilityError::malformed)?;
        let response = self.post(&self.text_model, &Self::analysis_payload(&photo))?;
        Self::parse_analysis(&response)
    }
}

impl VisualizationCapability for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn visualize(&self, photo_data: &str, suggestion: &str) -> Result<String, CapabilityError> {
        self.api_key()?;
        let photo = ImageToken::parse(photo_data).map_err(CapabilityError::malformed)?;
        let response = self.post(
            &self.image_model,
            &Self::visualization_payload(&photo, suggestion),
        )?;
        Self::parse_after_image(&response)
    }
}

fn inline_image_part(photo: &ImageToken) -> Value {
    json!({
        "inlineData": {
            "mimeType": photo.mime_type(),
            "data": photo.payload(),
        }
    })
}

fn candidate_parts(response: &Value) -> Vec<Value> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn check_prompt_feedback(response: &Value) -> Result<(), CapabilityError> {
    let reason = response
        .get("promptFeedback")
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str);
    match reason {
        Some(reason) => Err(CapabilityError::rejected(format!(
            "Gemini blocked the prompt ({reason})"
        ))),
        None => Ok(()),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn response_json_or_error(response: HttpResponse) -> Result<Value, CapabilityError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| {
        CapabilityError::transport(format!("Gemini response body read failed: {err}"))
    })?;
    if !status.is_success() {
        return Err(CapabilityError::rejected(format!(
            "Gemini request failed ({code}): {}",
            truncate_text(&body, ERROR_BODY_MAX_CHARS)
        )));
    }
    serde_json::from_str(&body).map_err(|err| {
        CapabilityError::malformed(format!("Gemini returned invalid JSON payload: {err}"))
    })
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use smilehub_contracts::analysis::DEFAULT_DISCLAIMER;

    use super::*;
    use crate::CapabilityErrorKind;

    const PHOTO: &str = "data:image/jpeg;base64,/9j/4AAQSkZJRg==";

    fn config(pairs: &[(&str, &str)]) -> AnalyzerConfig {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        AnalyzerConfig::from_lookup(|key| {
            pairs
                .iter()
                .find(|(candidate, _)| candidate == key)
                .map(|(_, value)| value.clone())
        })
        .expect("config")
    }

    fn text_response(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }] },
            }],
        })
    }

    #[test]
    fn missing_key_fails_without_network() {
        let provider = GeminiProvider::new(&config(&[]));
        let request = AnalysisRequest {
            photo_data: PHOTO.to_string(),
        };
        let err = provider.analyze(&request).unwrap_err();
        assert_eq!(err.kind(), CapabilityErrorKind::MissingCredential);
        let err = provider.visualize(PHOTO, "Whitening").unwrap_err();
        assert_eq!(err.kind(), CapabilityErrorKind::MissingCredential);
    }

    #[test]
    fn invalid_photo_token_is_malformed() {
        let provider = GeminiProvider::new(&config(&[("GEMINI_API_KEY", "test-key")]));
        let request = AnalysisRequest {
            photo_data: "not-a-data-uri".to_string(),
        };
        let err = provider.analyze(&request).unwrap_err();
        assert_eq!(err.kind(), CapabilityErrorKind::Malformed);
    }

    #[test]
    fn unreachable_endpoint_is_a_transport_failure() {
        let provider = GeminiProvider::new(&config(&[
            ("GEMINI_API_KEY", "test-key"),
            ("GEMINI_API_BASE", "http://127.0.0.1:9"),
        ]));
        let err = provider.visualize(PHOTO, "Whitening").unwrap_err();
        assert_eq!(err.kind(), CapabilityErrorKind::Transport);
    }

    #[test]
    fn endpoint_uses_selected_models() {
        let provider = GeminiProvider::new(&config(&[
            ("GEMINI_API_BASE", "http://localhost:1234/v1beta/"),
            ("SMILEHUB_TEXT_MODEL", "gemini-2.5-pro"),
        ]));
        assert_eq!(
            provider.endpoint_for_model(&provider.text_model),
            "http://localhost:1234/v1beta/models/gemini-2.5-pro:generateContent"
        );
        assert_eq!(
            provider.endpoint_for_model("models/gemini-2.5-flash-image-preview"),
            "http://localhost:1234/v1beta/models/gemini-2.5-flash-image-preview:generateContent"
        );
    }

    #[test]
    fn analysis_payload_embeds_photo_schema_and_safety() {
        let photo = ImageToken::parse(PHOTO).unwrap();
        let payload = GeminiProvider::analysis_payload(&photo);

        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], json!(ANALYSIS_PROMPT));
        assert_eq!(parts[1]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(parts[1]["inlineData"]["data"], json!("/9j/4AAQSkZJRg=="));

        let config = &payload["generationConfig"];
        assert_eq!(config["responseMimeType"], json!("application/json"));
        let properties = config["responseSchema"]["properties"]
            .as_object()
            .expect("schema properties");
        assert_eq!(properties.len(), 4);
        assert!(!config["responseSchema"]["required"]
            .as_array()
            .expect("required")
            .contains(&json!("disclaimer")));

        let safety = payload["safetySettings"].as_array().expect("safety");
        assert!(safety.contains(&json!({
            "category": "HARM_CATEGORY_DANGEROUS_CONTENT",
            "threshold": "BLOCK_NONE",
        })));
        assert!(safety.contains(&json!({
            "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "threshold": "BLOCK_LOW_AND_ABOVE",
        })));
    }

    #[test]
    fn visualization_payload_requests_text_and_image() {
        let photo = ImageToken::parse(PHOTO).unwrap();
        let payload = GeminiProvider::visualization_payload(&photo, "Professional Teeth Whitening");
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["data"], json!("/9j/4AAQSkZJRg=="));
        assert!(parts[1]["text"]
            .as_str()
            .unwrap_or_default()
            .contains("\"Professional Teeth Whitening\""));
    }

    #[test]
    fn parse_analysis_reads_json_text_and_defaults_disclaimer() {
        let response = text_response(
            "```json\n{\"analysis\": \"Mild staining.\", \"suggestion\": \"Whitening\", \"recommendedSpecialistCategory\": \"General Dentist\"}\n```",
        );
        let parsed = GeminiProvider::parse_analysis(&response).unwrap();
        assert_eq!(parsed.analysis, "Mild staining.");
        assert_eq!(parsed.disclaimer, DEFAULT_DISCLAIMER);
    }

    #[test]
    fn parse_analysis_classifies_failures() {
        let empty = GeminiProvider::parse_analysis(&json!({ "candidates": [] })).unwrap_err();
        assert_eq!(empty.kind(), CapabilityErrorKind::EmptyOutput);

        let prose = GeminiProvider::parse_analysis(&text_response("Looks fine!")).unwrap_err();
        assert_eq!(prose.kind(), CapabilityErrorKind::Malformed);

        let partial =
            GeminiProvider::parse_analysis(&text_response("{\"analysis\": \"ok\"}")).unwrap_err();
        assert_eq!(partial.kind(), CapabilityErrorKind::Malformed);

        let blocked = GeminiProvider::parse_analysis(&json!({
            "promptFeedback": { "blockReason": "SAFETY" },
        }))
        .unwrap_err();
        assert_eq!(blocked.kind(), CapabilityErrorKind::Rejected);
    }

    #[test]
    fn parse_after_image_takes_first_inline_image() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here is the result." },
                    { "inlineData": { "mimeType": "image/png", "data": "iVBORw0KGgo=" } },
                ] },
            }],
        });
        let token = GeminiProvider::parse_after_image(&response).unwrap();
        assert_eq!(token, "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn parse_after_image_rejects_text_only_response() {
        let err = GeminiProvider::parse_after_image(&text_response("I cannot edit this image."))
            .unwrap_err();
        assert_eq!(err.kind(), CapabilityErrorKind::NoImagePayload);
        assert!(err.message().contains("I cannot edit this image."));

        let bad = GeminiProvider::parse_after_image(&json!({
            "candidates": [{
                "content": { "parts": [{ "inline_data": { "mime_type": "image/png", "data": "%%%" } }] },
            }],
        }))
        .unwrap_err();
        assert_eq!(bad.kind(), CapabilityErrorKind::Malformed);
    }

    #[test]
    fn code_fence_stripping_leaves_plain_json_alone() {
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
