use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Which model call a configuration applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Narrator,
    Judge,
    Ending,
}

impl ModelRole {
    pub fn name(self) -> &'static str {
        match self {
            ModelRole::Narrator => "narrator",
            ModelRole::Judge => "judge",
            ModelRole::Ending => "ending",
        }
    }
}

/// Per-role override; blank fields fall back to the common settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleOverride {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Fully resolved endpoint configuration for one role.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Game backend serving the `/api/game/*` streams.
    pub backend_url: String,
    /// Bearer token sent to the backend; blank for none.
    pub auth_token: String,

    /// A non-blank key switches to calling the model endpoint directly.
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,

    pub request_timeout_secs: u64,

    pub narrator: RoleOverride,
    pub judge: RoleOverride,
    pub ending: RoleOverride,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.into(),
            auth_token: String::new(),
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            temperature: 0.7,
            request_timeout_secs: 60,
            narrator: RoleOverride::default(),
            judge: RoleOverride::default(),
            ending: RoleOverride::default(),
        }
    }
}

impl Settings {
    pub fn is_custom_mode(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn model_config(&self, role: ModelRole) -> ModelConfig {
        let role_override = match role {
            ModelRole::Narrator => &self.narrator,
            ModelRole::Judge => &self.judge,
            ModelRole::Ending => &self.ending,
        };
        let pick = |specific: &str, common: &str| {
            if specific.trim().is_empty() {
                common.trim().to_string()
            } else {
                specific.trim().to_string()
            }
        };

        ModelConfig {
            api_key: pick(&role_override.api_key, &self.api_key),
            base_url: pick(&role_override.base_url, &self.base_url),
            model: pick(&role_override.model, &self.model),
            temperature: self.temperature,
        }
    }

    /// Apply `SURVIVAL_*` overrides from a variable lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields: [(&str, &mut String); 5] = [
            ("SURVIVAL_API_KEY", &mut self.api_key),
            ("SURVIVAL_BASE_URL", &mut self.base_url),
            ("SURVIVAL_MODEL", &mut self.model),
            ("SURVIVAL_BACKEND_URL", &mut self.backend_url),
            ("SURVIVAL_TOKEN", &mut self.auth_token),
        ];
        for (var, slot) in fields {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                *slot = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn role_config_falls_back_to_common() {
        let mut settings = Settings {
            api_key: "sk-common".into(),
            ..Settings::default()
        };
        settings.judge.model = "judge-model".into();

        let judge = settings.model_config(ModelRole::Judge);
        assert_eq!(judge.api_key, "sk-common");
        assert_eq!(judge.model, "judge-model");
        assert_eq!(judge.base_url, DEFAULT_BASE_URL);

        let narrator = settings.model_config(ModelRole::Narrator);
        assert_eq!(narrator.model, DEFAULT_MODEL);
    }

    #[test]
    fn custom_mode_needs_a_non_blank_key() {
        let mut settings = Settings::default();
        assert!(!settings.is_custom_mode());
        settings.api_key = "   ".into();
        assert!(!settings.is_custom_mode());
        settings.api_key = "sk-1".into();
        assert!(settings.is_custom_mode());
    }

    #[test]
    fn env_overrides_replace_non_blank_values() {
        let env: HashMap<&str, &str> =
            HashMap::from([("SURVIVAL_MODEL", "local-model"), ("SURVIVAL_API_KEY", "")]);
        let mut settings = Settings::default();
        settings.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(settings.model, "local-model");
        assert_eq!(settings.api_key, "");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"model":"m","judge":{"model":"j"}}"#).unwrap();
        assert_eq!(settings.model, "m");
        assert_eq!(settings.judge.model, "j");
        assert_eq!(settings.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(settings.request_timeout_secs, 60);
    }
}
