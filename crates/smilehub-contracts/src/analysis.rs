use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_DISCLAIMER: &str = "This AI analysis is for informational purposes only and is not a substitute for a professional dental diagnosis. Please consult with a qualified dentist for any health concerns.";

/// Marker every demo-mode disclaimer starts with.
pub const DEMO_MODE_MARKER: &str = "DEMO MODE ACTIVE";

pub const DEMO_MODE_DISCLAIMER: &str = "⚠️ DEMO MODE ACTIVE: This analysis is a canned demonstration result because the Gemini API key is missing. The system cannot see your photo without this key. To enable real AI image analysis, set a valid GEMINI_API_KEY in your environment variables.";

/// One user-initiated analysis. Consumed once, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub photo_data: String,
}

impl AnalysisRequest {
    /// Boundary check: a missing or blank token is rejected, nothing else is.
    pub fn from_input(photo_data: Option<&str>) -> Result<Self, RequestError> {
        match photo_data {
            Some(raw) if !raw.trim().is_empty() => Ok(Self {
                photo_data: raw.to_string(),
            }),
            _ => Err(RequestError::MissingImage),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    MissingImage,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingImage => write!(f, "No image provided for analysis."),
        }
    }
}

impl std::error::Error for RequestError {}

/// Structured record produced by the text+vision request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnalysis {
    pub analysis: String,
    pub suggestion: String,
    pub recommended_specialist_category: String,
    pub disclaimer: String,
}

impl TextAnalysis {
    /// Normalizes a model JSON object into the four-field record, then
    /// applies [`Self::validated`].
    pub fn from_model_value(value: &Value) -> Result<Self, String> {
        let object = value
            .as_object()
            .ok_or_else(|| "model output is not a JSON object".to_string())?;
        let field = |keys: &[&str]| -> String {
            keys.iter()
                .filter_map(|key| object.get(*key))
                .filter_map(Value::as_str)
                .map(str::trim)
                .find(|text| !text.is_empty())
                .map(str::to_string)
                .unwrap_or_default()
        };

        Self {
            analysis: field(&["analysis"]),
            suggestion: field(&["suggestion"]),
            recommended_specialist_category: field(&[
                "recommendedSpecialistCategory",
                "recommended_specialist_category",
                "recommendedDoctor",
            ]),
            disclaimer: field(&["disclaimer"]),
        }
        .validated()
    }

    /// The three free-text fields must be non-blank and are trimmed. A blank
    /// disclaimer is replaced with [`DEFAULT_DISCLAIMER`], as is one that
    /// impersonates the demo-mode notice.
    pub fn validated(self) -> Result<Self, String> {
        let required = |value: String, name: &str| -> Result<String, String> {
            let value = value.trim();
            if value.is_empty() {
                Err(missing(name))
            } else {
                Ok(value.to_string())
            }
        };
        let disclaimer = self.disclaimer.trim();
        let disclaimer = if disclaimer.is_empty() || disclaimer.contains(DEMO_MODE_MARKER) {
            DEFAULT_DISCLAIMER.to_string()
        } else {
            disclaimer.to_string()
        };

        Ok(Self {
            analysis: required(self.analysis, "analysis")?,
            suggestion: required(self.suggestion, "suggestion")?,
            recommended_specialist_category: required(
                self.recommended_specialist_category,
                "recommendedSpecialistCategory",
            )?,
            disclaimer,
        })
    }

    pub fn with_after_photo(self, after_photo_data: String) -> AnalysisResult {
        AnalysisResult {
            analysis: self.analysis,
            suggestion: self.suggestion,
            recommended_specialist_category: self.recommended_specialist_category,
            after_photo_data,
            disclaimer: self.disclaimer,
        }
    }
}

fn missing(field: &str) -> String {
    format!("analysis output is missing '{field}'")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub analysis: String,
    pub suggestion: String,
    pub recommended_specialist_category: String,
    pub after_photo_data: String,
    pub disclaimer: String,
}

impl AnalysisResult {
    pub fn is_complete(&self) -> bool {
        [
            &self.analysis,
            &self.suggestion,
            &self.recommended_specialist_category,
            &self.after_photo_data,
            &self.disclaimer,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }

    pub fn is_demo(&self) -> bool {
        self.disclaimer.contains(DEMO_MODE_MARKER)
    }

    pub fn with_specialist(self, name: String) -> Self {
        Self {
            recommended_specialist_category: name,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_rejects_missing_and_blank_tokens() {
        assert_eq!(
            AnalysisRequest::from_input(None),
            Err(RequestError::MissingImage)
        );
        assert_eq!(
            AnalysisRequest::from_input(Some("   ")),
            Err(RequestError::MissingImage)
        );
        let request = AnalysisRequest::from_input(Some("data:image/png;base64,AAAA")).unwrap();
        assert_eq!(request.photo_data, "data:image/png;base64,AAAA");
        assert_eq!(
            RequestError::MissingImage.to_string(),
            "No image provided for analysis."
        );
    }

    #[test]
    fn text_analysis_defaults_disclaimer() {
        let parsed = TextAnalysis::from_model_value(&json!({
            "analysis": "Mild staining on the front teeth.",
            "suggestion": "Professional cleaning",
            "recommendedSpecialistCategory": "General Dentist",
        }))
        .unwrap();
        assert_eq!(parsed.disclaimer, DEFAULT_DISCLAIMER);

        let blank = TextAnalysis::from_model_value(&json!({
            "analysis": "a",
            "suggestion": "b",
            "recommendedSpecialistCategory": "c",
            "disclaimer": "  ",
        }))
        .unwrap();
        assert_eq!(blank.disclaimer, DEFAULT_DISCLAIMER);
    }

    #[test]
    fn text_analysis_keeps_custom_disclaimer_and_accepts_legacy_field() {
        let parsed = TextAnalysis::from_model_value(&json!({
            "analysis": "Some crowding.",
            "suggestion": "Orthodontic consultation",
            "recommendedDoctor": "Orthodontist",
            "disclaimer": "Please see a dentist.",
        }))
        .unwrap();
        assert_eq!(parsed.recommended_specialist_category, "Orthodontist");
        assert_eq!(parsed.disclaimer, "Please see a dentist.");
    }

    #[test]
    fn text_analysis_rejects_demo_impersonation() {
        let parsed = TextAnalysis::from_model_value(&json!({
            "analysis": "a",
            "suggestion": "b",
            "recommendedSpecialistCategory": "c",
            "disclaimer": DEMO_MODE_DISCLAIMER,
        }))
        .unwrap();
        assert_eq!(parsed.disclaimer, DEFAULT_DISCLAIMER);
    }

    #[test]
    fn text_analysis_rejects_incomplete_output() {
        let err = TextAnalysis::from_model_value(&json!({
            "analysis": "a",
            "suggestion": "",
            "recommendedSpecialistCategory": "c",
        }))
        .unwrap_err();
        assert_eq!(err, "analysis output is missing 'suggestion'");
        assert!(TextAnalysis::from_model_value(&json!(["a"])).is_err());
    }

    #[test]
    fn validated_trims_fields_and_repairs_disclaimer() {
        let record = TextAnalysis {
            analysis: "  Chipped upper incisor. ".to_string(),
            suggestion: "Composite bonding".to_string(),
            recommended_specialist_category: "General Dentist".to_string(),
            disclaimer: String::new(),
        }
        .validated()
        .unwrap();
        assert_eq!(record.analysis, "Chipped upper incisor.");
        assert_eq!(record.disclaimer, DEFAULT_DISCLAIMER);

        let blank = TextAnalysis {
            analysis: "a".to_string(),
            suggestion: "b".to_string(),
            recommended_specialist_category: " ".to_string(),
            disclaimer: "Please see a dentist.".to_string(),
        };
        assert_eq!(
            blank.validated().unwrap_err(),
            "analysis output is missing 'recommendedSpecialistCategory'"
        );
    }

    #[test]
    fn result_serializes_with_camel_case_fields() {
        let result = TextAnalysis {
            analysis: "a".to_string(),
            suggestion: "b".to_string(),
            recommended_specialist_category: "c".to_string(),
            disclaimer: DEFAULT_DISCLAIMER.to_string(),
        }
        .with_after_photo("data:image/png;base64,AAAA".to_string());
        assert!(result.is_complete());
        assert!(!result.is_demo());

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["recommendedSpecialistCategory"], json!("c"));
        assert_eq!(value["afterPhotoData"], json!("data:image/png;base64,AAAA"));

        let mapped = result.with_specialist("Dr. Ananya Iyer".to_string());
        assert_eq!(mapped.recommended_specialist_category, "Dr. Ananya Iyer");
        assert_eq!(mapped.suggestion, "b");
    }
}
