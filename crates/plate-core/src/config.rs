use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
    pub trigger_char: char,
    pub allow_spaces: bool,
    pub image_extensions: Vec<String>,
    pub table_rows: usize,
    pub table_cols: usize,
    pub table_header_row: bool,
    pub seed_text: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_undo: 200,
            max_normalize_iterations: 100,
            trigger_char: '/',
            allow_spaces: true,
            image_extensions: DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            table_rows: 3,
            table_cols: 3,
            table_header_row: true,
            seed_text: "Hello World! Try typing / to see the menu.".to_string(),
        }
    }
}

impl EditorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()
    }

    pub(crate) fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.max_undo == 0 {
            self.max_undo = defaults.max_undo;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = defaults.max_normalize_iterations;
        }
        if self.image_extensions.is_empty() {
            self.image_extensions = defaults.image_extensions;
        }
        self
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.trigger_char.is_whitespace() {
            return Err(ConfigError::Invalid(
                "trigger_char must not be whitespace".into(),
            ));
        }
        if self.table_rows == 0 || self.table_cols == 0 {
            return Err(ConfigError::Invalid(
                "table_rows and table_cols must be at least 1".into(),
            ));
        }
        let mut config = self.with_defaults();
        for ext in &mut config.image_extensions {
            *ext = ext.trim_start_matches('.').to_ascii_lowercase();
        }
        Ok(config)
    }

    pub fn allows_image_extension(&self, extension: &str) -> bool {
        self.image_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }
}
