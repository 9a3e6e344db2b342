use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::media::render_swatch;
use crate::specialists::SpecialistRoster;

/// Canned result served when the live pipeline is unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackScenario {
    pub analysis: String,
    pub suggestion: String,
    pub recommended_specialist_category: String,
    pub after_photo_data: String,
}

struct ScenarioText {
    analysis: &'static str,
    suggestion: &'static str,
    specialist: &'static str,
}

/// Number of built-in fallback scenarios. The table is never empty.
pub const SCENARIO_COUNT: usize = 3;

const BUILTIN_SCENARIOS: [ScenarioText; SCENARIO_COUNT] = [
    ScenarioText {
        analysis: "AI Analysis (Demo Mode): The analysis suggests mild discoloration and surface staining on the enamel. No major structural issues are detected, but the shade could be significantly improved.",
        suggestion: "Professional Teeth Whitening",
        specialist: "General Dentist",
    },
    ScenarioText {
        analysis: "AI Analysis (Demo Mode): The image indicates some misalignment and crowding of the teeth. The bite alignment could be optimized for both aesthetics and long-term oral health.",
        suggestion: "Orthodontic Treatment (Braces/Aligners)",
        specialist: "Orthodontist",
    },
    ScenarioText {
        analysis: "AI Analysis (Demo Mode): The scan detects a gap consistent with a missing tooth. The surrounding gum tissue appears healthy enough to support a restorative solution.",
        suggestion: "Dental Implant or Bridge",
        specialist: "Implant Specialist",
    },
];

/// Read-only tables shared by every analysis: fallback scenarios and the
/// specialist roster. Built once at startup.
#[derive(Debug, Clone)]
pub struct ClinicCatalog {
    scenarios: [FallbackScenario; SCENARIO_COUNT],
    roster: SpecialistRoster,
}

impl ClinicCatalog {
    pub fn builtin() -> Result<Self> {
        Self::with_roster(SpecialistRoster::builtin())
    }

    pub fn with_roster(roster: SpecialistRoster) -> Result<Self> {
        let [whitening, orthodontics, implant] = &BUILTIN_SCENARIOS;
        let scenarios = [
            render_scenario(whitening)?,
            render_scenario(orthodontics)?,
            render_scenario(implant)?,
        ];
        Ok(Self { scenarios, roster })
    }

    /// Built-in scenarios plus the roster at `path`, or the built-in roster
    /// when the override is absent or unusable.
    pub fn with_roster_override(path: Option<&Path>) -> Result<Self> {
        let roster = match path {
            Some(path) => SpecialistRoster::load(path).unwrap_or_else(|err| {
                tracing::warn!("roster override ignored: {err:#}");
                SpecialistRoster::builtin()
            }),
            None => SpecialistRoster::builtin(),
        };
        Self::with_roster(roster)
    }

    pub fn scenarios(&self) -> &[FallbackScenario; SCENARIO_COUNT] {
        &self.scenarios
    }

    pub fn roster(&self) -> &SpecialistRoster {
        &self.roster
    }
}

fn render_scenario(text: &ScenarioText) -> Result<FallbackScenario> {
    Ok(FallbackScenario {
        analysis: text.analysis.to_string(),
        suggestion: text.suggestion.to_string(),
        recommended_specialist_category: text.specialist.to_string(),
        after_photo_data: render_swatch(text.suggestion)?.to_data_uri(),
    })
}
