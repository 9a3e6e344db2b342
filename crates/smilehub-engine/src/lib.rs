use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use smilehub_contracts::analysis::{AnalysisRequest, AnalysisResult, RequestError, TextAnalysis};
use smilehub_contracts::catalog::ClinicCatalog;
use smilehub_contracts::events::{EventPayload, EventWriter};
use smilehub_contracts::media::{fingerprint, ImageToken};
use smilehub_contracts::specialists::{classify, SpecialtyGroup};

pub mod config;
pub mod fallback;
pub mod gemini;

pub use config::AnalyzerConfig;
pub use gemini::GeminiProvider;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CapabilityErrorKind {
    /// No credential configured. The steady-state demo condition.
    MissingCredential,
    Transport,
    /// Non-success HTTP status or a safety block.
    Rejected,
    Malformed,
    EmptyOutput,
    /// Visualization answered without an image part.
    NoImagePayload,
    /// The capability panicked.
    Unexpected,
}

impl CapabilityErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::Transport => "transport",
            Self::Rejected => "rejected",
            Self::Malformed => "malformed",
            Self::EmptyOutput => "empty_output",
            Self::NoImagePayload => "no_image_payload",
            Self::Unexpected => "unexpected",
        }
    }

    pub fn is_expected(self) -> bool {
        self == Self::MissingCredential
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityError {
    kind: CapabilityErrorKind,
    message: String,
}

impl CapabilityError {
    pub fn new(kind: CapabilityErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn missing_credential(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::MissingCredential, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::Transport, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::Rejected, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::Malformed, message)
    }

    pub fn empty_output(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::EmptyOutput, message)
    }

    pub fn no_image_payload(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::NoImagePayload, message)
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(CapabilityErrorKind::Unexpected, message)
    }

    pub fn kind(&self) -> CapabilityErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CapabilityError {}

/// Schema-constrained text+vision analysis of a photo.
pub trait AnalysisCapability: Send + Sync {
    fn name(&self) -> &str;
    fn analyze(&self, request: &AnalysisRequest) -> Result<TextAnalysis, CapabilityError>;
}

/// Renders an "after" image for `suggestion`, returning an image token.
pub trait VisualizationCapability: Send + Sync {
    fn name(&self) -> &str;
    fn visualize(&self, photo_data: &str, suggestion: &str) -> Result<String, CapabilityError>;
}

/// Stand-in for both capabilities when live calls are switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineProvider;

impl AnalysisCapability for OfflineProvider {
    fn name(&self) -> &str {
        "offline"
    }

    fn analyze(&self, _request: &AnalysisRequest) -> Result<TextAnalysis, CapabilityError> {
        Err(CapabilityError::missing_credential(
            "live analysis disabled (offline mode)",
        ))
    }
}

impl VisualizationCapability for OfflineProvider {
    fn name(&self) -> &str {
        "offline"
    }

    fn visualize(&self, _photo_data: &str, _suggestion: &str) -> Result<String, CapabilityError> {
        Err(CapabilityError::missing_credential(
            "live visualization disabled (offline mode)",
        ))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlowState {
    Start,
    TextRequested,
    TextOk,
    TextFailed,
    ImageRequested,
    ImageOk,
    ImageFailed,
    DoneLive,
    DoneFallback,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlowStage {
    Text,
    Image,
}

impl FlowStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AnalysisMode {
    Live,
    Fallback,
}

impl AnalysisMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackNote {
    pub stage: FlowStage,
    pub error: CapabilityError,
    pub scenario_index: usize,
}

/// Core output before specialist mapping.
#[derive(Debug, Clone)]
pub struct FlowOutcome {
    pub result: AnalysisResult,
    pub trace: Vec<FlowState>,
    pub fallback: Option<FallbackNote>,
}

impl FlowOutcome {
    pub fn mode(&self) -> AnalysisMode {
        if self.fallback.is_some() {
            AnalysisMode::Fallback
        } else {
            AnalysisMode::Live
        }
    }
}

/// Boundary output: the flow result with the specialist mapped to a
/// roster name.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub session_id: String,
    pub result: AnalysisResult,
    pub specialist_group: SpecialtyGroup,
    pub mode: AnalysisMode,
    pub fallback: Option<FallbackNote>,
}

impl AnalysisReport {
    pub fn to_json(&self) -> Value {
        let fallback = self
            .fallback
            .as_ref()
            .map(|note| {
                json!({
                    "stage": note.stage.as_str(),
                    "kind": note.error.kind().as_str(),
                    "reason": note.error.message(),
                    "scenarioIndex": note.scenario_index,
                })
            })
            .unwrap_or(Value::Null);
        json!({
            "sessionId": self.session_id,
            "mode": self.mode.as_str(),
            "specialistGroup": self.specialist_group,
            "result": self.result,
            "fallback": fallback,
        })
    }
}

pub struct DentalAnalyzer {
    catalog: Arc<ClinicCatalog>,
    text: Box<dyn AnalysisCapability>,
    visual: Box<dyn VisualizationCapability>,
    events: EventWriter,
}

impl DentalAnalyzer {
    pub fn new(
        catalog: Arc<ClinicCatalog>,
        text: Box<dyn AnalysisCapability>,
        visual: Box<dyn VisualizationCapability>,
    ) -> Self {
        Self {
            catalog,
            text,
            visual,
            events: EventWriter::disabled(),
        }
    }

    /// Gemini for both calls, configured from `config`.
    pub fn from_config(config: &AnalyzerConfig, catalog: Arc<ClinicCatalog>) -> Self {
        let provider = GeminiProvider::new(config);
        Self::new(catalog, Box::new(provider.clone()), Box::new(provider))
    }

    pub fn offline(catalog: Arc<ClinicCatalog>) -> Self {
        Self::new(
            catalog,
            Box::new(OfflineProvider),
            Box::new(OfflineProvider),
        )
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = events;
        self
    }

    pub fn catalog(&self) -> &ClinicCatalog {
        &self.catalog
    }

    /// Validates the input, runs the flow, then maps the specialist
    /// category to a roster name. Only a missing image is an error.
    pub fn analyze(&self, photo_data: Option<&str>) -> Result<AnalysisReport, RequestError> {
        let request = AnalysisRequest::from_input(photo_data)?;
        let outcome = self.run_flow(&request);
        let mode = outcome.mode();
        let specialist_group = classify(&outcome.result.recommended_specialist_category);
        let specialist = self.catalog.roster().name_for(specialist_group);
        tracing::info!(
            mode = mode.as_str(),
            specialist = specialist.as_str(),
            "dental analysis finished"
        );
        self.emit(
            "analysis_completed",
            map_object(json!({
                "mode": mode.as_str(),
                "specialist_group": specialist_group,
                "specialist": specialist,
            })),
        );
        Ok(AnalysisReport {
            session_id: self.events.session_id().to_string(),
            result: outcome.result.with_specialist(specialist),
            specialist_group,
            mode,
            fallback: outcome.fallback,
        })
    }

    /// The two-call state machine. Never fails: any capability error,
    /// including a panic, ends in the fallback branch.
    pub fn run_flow(&self, request: &AnalysisRequest) -> FlowOutcome {
        let mut trace = vec![FlowState::Start];
        self.emit(
            "analysis_started",
            map_object(json!({
                "photo": fingerprint(&request.photo_data),
                "photo_len": request.photo_data.len(),
                "text_capability": self.text.name(),
                "image_capability": self.visual.name(),
            })),
        );

        trace.push(FlowState::TextRequested);
        let text = guarded(|| self.text.analyze(request))
            .and_then(|text| text.validated().map_err(CapabilityError::empty_output));
        let text = match text {
            Ok(text) => text,
            Err(err) => {
                trace.push(FlowState::TextFailed);
                return self.finish_fallback(request, FlowStage::Text, err, trace);
            }
        };
        trace.push(FlowState::TextOk);

        trace.push(FlowState::ImageRequested);
        let visualized = guarded(|| self.visual.visualize(&request.photo_data, &text.suggestion))
            .and_then(|token| {
                if token.trim().is_empty() {
                    return Err(CapabilityError::no_image_payload(
                        "visualization returned an empty image token",
                    ));
                }
                ImageToken::parse(&token)
                    .map(|parsed| parsed.to_data_uri())
                    .map_err(CapabilityError::malformed)
            });
        let after_photo_data = match visualized {
            Ok(token) => token,
            Err(err) => {
                trace.push(FlowState::ImageFailed);
                return self.finish_fallback(request, FlowStage::Image, err, trace);
            }
        };
        trace.push(FlowState::ImageOk);
        trace.push(FlowState::DoneLive);

        FlowOutcome {
            result: text.with_after_photo(after_photo_data),
            trace,
            fallback: None,
        }
    }

    fn finish_fallback(
        &self,
        request: &AnalysisRequest,
        stage: FlowStage,
        error: CapabilityError,
        mut trace: Vec<FlowState>,
    ) -> FlowOutcome {
        let (scenario_index, result) =
            fallback::fallback_result(&self.catalog, &request.photo_data);
        tracing::warn!(
            stage = stage.as_str(),
            kind = error.kind().as_str(),
            scenario = scenario_index,
            "AI analysis failed ({error}); falling back to demo mode"
        );
        self.emit(
            "analysis_fallback",
            map_object(json!({
                "stage": stage.as_str(),
                "kind": error.kind().as_str(),
                "expected": error.kind().is_expected(),
                "reason": error.message(),
                "scenario_index": scenario_index,
            })),
        );
        trace.push(FlowState::DoneFallback);
        FlowOutcome {
            result,
            trace,
            fallback: Some(FallbackNote {
                stage,
                error,
                scenario_index,
            }),
        }
    }

    fn emit(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.events.emit(event_type, payload) {
            tracing::warn!("failed to record {event_type} event: {err:#}");
        }
    }
}

fn guarded<T>(call: impl FnOnce() -> Result<T, CapabilityError>) -> Result<T, CapabilityError> {
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|panic| {
        Err(CapabilityError::unexpected(format!(
            "capability panicked: {}",
            panic_message(panic.as_ref())
        )))
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
