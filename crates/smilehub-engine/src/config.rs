use std::env;
use std::path::PathBuf;

use smilehub_contracts::models::{
    ModelSelection, ModelSelector, CAPABILITY_IMAGE_EDIT, CAPABILITY_VISION,
};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_TIMEOUT_S: f64 = 90.0;
const MIN_TIMEOUT_S: f64 = 15.0;
const MAX_TIMEOUT_S: f64 = 300.0;

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub text_model: ModelSelection,
    pub image_model: ModelSelection,
    pub request_timeout_s: f64,
    pub roster_path: Option<PathBuf>,
}

impl AnalyzerConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(non_empty_env)
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let selector = ModelSelector::new(None);
        let text_model =
            selector.select(get("SMILEHUB_TEXT_MODEL").as_deref(), CAPABILITY_VISION)?;
        let image_model =
            selector.select(get("SMILEHUB_IMAGE_MODEL").as_deref(), CAPABILITY_IMAGE_EDIT)?;

        Ok(Self {
            api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")),
            api_base: get("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            text_model,
            image_model,
            request_timeout_s: parse_timeout(get("SMILEHUB_REQUEST_TIMEOUT").as_deref()),
            roster_path: get("SMILEHUB_ROSTER_PATH").map(PathBuf::from),
        })
    }

    pub fn override_models(
        &mut self,
        text_model: Option<&str>,
        image_model: Option<&str>,
    ) -> Result<(), String> {
        let selector = ModelSelector::new(None);
        if let Some(requested) = text_model {
            self.text_model = selector.select(Some(requested), CAPABILITY_VISION)?;
        }
        if let Some(requested) = image_model {
            self.image_model = selector.select(Some(requested), CAPABILITY_IMAGE_EDIT)?;
        }
        Ok(())
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Model fallbacks worth telling the operator about.
    pub fn warnings(&self) -> Vec<String> {
        [&self.text_model, &self.image_model]
            .iter()
            .filter_map(|selection| selection.fallback_reason.clone())
            .map(|reason| format!("{reason} Using default."))
            .collect()
    }
}

fn parse_timeout(raw: Option<&str>) -> f64 {
    raw.and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(DEFAULT_TIMEOUT_S)
        .clamp(MIN_TIMEOUT_S, MAX_TIMEOUT_S)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
