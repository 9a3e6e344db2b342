use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ROSTER_JSON: &str = include_str!("../resources/default_roster.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialtyGroup {
    Endodontics,
    Pediatric,
    Orthodontics,
    General,
}

impl SpecialtyGroup {
    /// Substring looked for in a roster entry's specialty.
    pub fn roster_keyword(self) -> &'static str {
        match self {
            Self::Endodontics => "endodontics",
            Self::Pediatric => "pediatric",
            Self::Orthodontics => "orthodontics",
            Self::General => "general",
        }
    }

    /// Used when the roster has nobody for this group.
    pub fn fallback_name(self) -> &'static str {
        match self {
            Self::Endodontics => "Dr. Samuel Jones",
            Self::Pediatric => "Dr. Aliyah Chen",
            Self::Orthodontics => "Dr. Marcus Thorne",
            Self::General => "Dr. Evelyn Reed",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SpecialtyRule {
    pub group: SpecialtyGroup,
    pub keywords: &'static [&'static str],
}

/// Checked first to last; the first rule with a matching keyword wins.
/// Anything unmatched is [`SpecialtyGroup::General`].
pub const SPECIALTY_RULES: &[SpecialtyRule] = &[
    SpecialtyRule {
        group: SpecialtyGroup::Endodontics,
        keywords: &["implant", "root canal", "endodontist", "missing"],
    },
    SpecialtyRule {
        group: SpecialtyGroup::Pediatric,
        keywords: &["pediatric", "child", "kid"],
    },
    SpecialtyRule {
        group: SpecialtyGroup::Orthodontics,
        keywords: &["ortho", "braces", "aligner"],
    },
];

pub fn classify(category: &str) -> SpecialtyGroup {
    let lowered = category.to_lowercase();
    SPECIALTY_RULES
        .iter()
        .find(|rule| {
            rule.keywords
                .iter()
                .any(|keyword| lowered.contains(keyword))
        })
        .map(|rule| rule.group)
        .unwrap_or(SpecialtyGroup::General)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    pub specialty: String,
}

#[derive(Debug, Clone, Default)]
pub struct SpecialistRoster {
    entries: Vec<RosterEntry>,
}

impl SpecialistRoster {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }

    pub fn builtin() -> Self {
        Self::from_json(DEFAULT_ROSTER_JSON).unwrap_or_default()
    }

    pub fn from_json(raw: &str) -> Result<Self, String> {
        let entries: Vec<RosterEntry> = serde_json::from_str(raw)
            .map_err(|err| format!("roster is not a valid JSON list: {err}"))?;
        if let Some(entry) = entries
            .iter()
            .find(|entry| entry.name.trim().is_empty())
        {
            return Err(format!(
                "roster entry for '{}' has an empty name",
                entry.specialty
            ));
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Self::from_json(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("invalid roster {}", path.display()))
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn find(&self, group: SpecialtyGroup) -> Option<&RosterEntry> {
        let keyword = group.roster_keyword();
        self.entries
            .iter()
            .find(|entry| entry.specialty.to_lowercase().contains(keyword))
    }

    pub fn name_for(&self, group: SpecialtyGroup) -> String {
        self.find(group)
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| group.fallback_name().to_string())
    }

    /// Maps free-text model output such as "Orthodontist" to a roster name.
    /// Never fails.
    pub fn resolve(&self, category: &str) -> String {
        self.name_for(classify(category))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_roster_covers_every_group() {
        let roster = SpecialistRoster::builtin();
        assert_eq!(roster.entries().len(), 4);
        assert_eq!(
            roster.name_for(SpecialtyGroup::Endodontics),
            "Dr. Vikram Singh"
        );
        assert_eq!(
            roster.name_for(SpecialtyGroup::Pediatric),
            "Dr. Meera Patel"
        );
        assert_eq!(
            roster.name_for(SpecialtyGroup::Orthodontics),
            "Dr. Rajesh Khanna"
        );
        assert_eq!(roster.name_for(SpecialtyGroup::General), "Dr. Ananya Iyer");
    }

    #[test]
    fn endodontics_outranks_orthodontics() {
        let roster = SpecialistRoster::builtin();
        assert_eq!(
            classify("Implant or Orthodontic Referral"),
            SpecialtyGroup::Endodontics
        );
        assert_eq!(
            roster.resolve("Implant or Orthodontic Referral"),
            "Dr. Vikram Singh"
        );
    }

    #[test]
    fn unmatched_category_maps_to_general() {
        let roster = SpecialistRoster::builtin();
        assert_eq!(classify("Routine Cleaning"), SpecialtyGroup::General);
        assert_eq!(roster.resolve("Routine Cleaning"), "Dr. Ananya Iyer");
        assert_eq!(roster.resolve(""), "Dr. Ananya Iyer");
    }

    #[test]
    fn matching_is_case_insensitive_and_ordered() {
        assert_eq!(
            classify("ROOT CANAL specialist"),
            SpecialtyGroup::Endodontics
        );
        assert_eq!(classify("Missing tooth"), SpecialtyGroup::Endodontics);
        assert_eq!(classify("Pediatric Dentist"), SpecialtyGroup::Pediatric);
        assert_eq!(classify("Child braces"), SpecialtyGroup::Pediatric);
        assert_eq!(classify("Orthodontist"), SpecialtyGroup::Orthodontics);
        assert_eq!(classify("Clear Aligners"), SpecialtyGroup::Orthodontics);
        assert_eq!(classify("General Dentist"), SpecialtyGroup::General);
    }

    #[test]
    fn missing_roster_entries_use_fallback_names() {
        let roster = SpecialistRoster::new(vec![RosterEntry {
            name: "Dr. Only General".to_string(),
            specialty: "General Dentistry".to_string(),
        }]);
        assert_eq!(roster.resolve("Implant Specialist"), "Dr. Samuel Jones");
        assert_eq!(roster.resolve("Kid-friendly care"), "Dr. Aliyah Chen");
        assert_eq!(roster.resolve("Braces"), "Dr. Marcus Thorne");
        assert_eq!(roster.resolve("Whitening"), "Dr. Only General");

        let empty = SpecialistRoster::default();
        assert_eq!(empty.resolve("Whitening"), "Dr. Evelyn Reed");
    }

    #[test]
    fn roster_json_is_validated() {
        assert!(SpecialistRoster::from_json("{}").is_err());
        let err = SpecialistRoster::from_json(r#"[{"name": " ", "specialty": "Orthodontics"}]"#)
            .unwrap_err();
        assert_eq!(err, "roster entry for 'Orthodontics' has an empty name");
    }

    #[test]
    fn roster_loads_from_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("roster.json");
        std::fs::write(
            &path,
            r#"[{"name": "Dr. Kim", "specialty": "Pediatric Dentistry"}]"#,
        )?;
        let roster = SpecialistRoster::load(&path)?;
        assert_eq!(roster.resolve("child check-up"), "Dr. Kim");
        assert!(SpecialistRoster::load(&temp.path().join("absent.json")).is_err());
        Ok(())
    }
}
