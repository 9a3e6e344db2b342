//! Deterministic demo-mode results.
//!
//! No image inspection happens here: the scenario is picked from the token
//! length alone, so the same photo always gets the same canned answer.

use smilehub_contracts::analysis::{AnalysisResult, DEMO_MODE_DISCLAIMER};
use smilehub_contracts::catalog::{ClinicCatalog, FallbackScenario, SCENARIO_COUNT};

pub fn scenario_index(photo_data: &str) -> usize {
    photo_data.len() % SCENARIO_COUNT
}

pub fn select_scenario<'a>(
    scenarios: &'a [FallbackScenario; SCENARIO_COUNT],
    photo_data: &str,
) -> (usize, &'a FallbackScenario) {
    let index = scenario_index(photo_data);
    (index, &scenarios[index])
}

/// Picks a scenario and stamps the demo-mode disclaimer on it.
pub fn fallback_result(catalog: &ClinicCatalog, photo_data: &str) -> (usize, AnalysisResult) {
    let (index, scenario) = select_scenario(catalog.scenarios(), photo_data);
    let result = AnalysisResult {
        analysis: scenario.analysis.clone(),
        suggestion: scenario.suggestion.clone(),
        recommended_specialist_category: scenario.recommended_specialist_category.clone(),
        after_photo_data: scenario.after_photo_data.clone(),
        disclaimer: DEMO_MODE_DISCLAIMER.to_string(),
    };
    (index, result)
}
