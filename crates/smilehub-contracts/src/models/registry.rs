use indexmap::IndexMap;

/// Structured text+vision completion over a photo.
pub const CAPABILITY_VISION: &str = "vision";
/// Image generation conditioned on a prior image.
pub const CAPABILITY_IMAGE_EDIT: &str = "image_edit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, capabilities: &[&str]| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: "gemini".to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
            },
        );
    };

    // First entry per capability is the default.
    insert("gemini-2.5-flash", &[CAPABILITY_VISION]);
    insert("gemini-2.5-flash-image-preview", &[CAPABILITY_IMAGE_EDIT]);
    insert("gemini-2.5-pro", &[CAPABILITY_VISION]);
    insert("gemini-2.0-flash", &[CAPABILITY_VISION]);
    insert("gemini-2.5-flash-image", &[CAPABILITY_IMAGE_EDIT]);
    insert("gemini-3-pro-image-preview", &[CAPABILITY_IMAGE_EDIT]);

    map
}
