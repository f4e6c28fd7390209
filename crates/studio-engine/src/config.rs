use std::env;
use std::path::PathBuf;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GENERATE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_REMIX_MODEL: &str = "gemini-2.5-flash-image";

const DATA_DIR_NAME: &str = ".image-studio";

/// Runtime settings, resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub generate_model: String,
    pub remix_model: String,
    pub data_dir: PathBuf,
}

impl StudioConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| non_empty_env(key))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("GOOGLE_API_KEY"))
            .or_else(|| lookup("API_KEY"));
        let api_base = lookup("GEMINI_API_BASE")
            .map(|value| value.trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let data_dir = lookup("STUDIO_DATA_DIR")
            .map(PathBuf::from)
            .or_else(|| lookup("HOME").map(|home| PathBuf::from(home).join(DATA_DIR_NAME)))
            .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME));
        Self {
            api_key,
            api_base,
            generate_model: lookup("STUDIO_GENERATE_MODEL")
                .unwrap_or_else(|| DEFAULT_GENERATE_MODEL.to_string()),
            remix_model: lookup("STUDIO_REMIX_MODEL")
                .unwrap_or_else(|| DEFAULT_REMIX_MODEL.to_string()),
            data_dir,
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
