//! Probe configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Reference to a secret value.
///
/// `env:NAME` is resolved from the environment when used; anything else is
/// taken literally.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretRef(String);

impl SecretRef {
    pub fn env(var: &str) -> Self {
        Self(format!("env:{}", var))
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn resolve(&self) -> Result<String> {
        match self.0.strip_prefix("env:") {
            Some(var) => std::env::var(var).map_err(|_| Error::MissingSecret(var.to_string())),
            None => Ok(self.0.clone()),
        }
    }
}

impl std::fmt::Display for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print literal values
        match self.0.strip_prefix("env:") {
            Some(var) => write!(f, "${}", var),
            None => write!(f, "<literal>"),
        }
    }
}

impl std::fmt::Debug for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretRef({})", self)
    }
}

/// Complete probe configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Target web application
    pub target: TargetConfig,

    /// Browser session
    pub browser: BrowserConfig,

    /// Polling bounds
    pub timing: TimingConfig,

    /// Artifact locations
    pub output: OutputConfig,

    /// Backend database and functions
    pub backend: BackendConfig,
}

/// Target web application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base URL of the web application
    pub base_url: String,

    /// Persona used when a scenario does not name one
    pub default_persona: String,

    /// Side-door login personas: name -> token
    pub personas: BTreeMap<String, SecretRef>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        let mut personas = BTreeMap::new();
        personas.insert("ai-agent".to_string(), SecretRef::literal("ai-agent-token"));
        personas.insert("demo".to_string(), SecretRef::literal("demo"));
        personas.insert("anonymous".to_string(), SecretRef::literal("anonymous"));
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            default_persona: "ai-agent".to_string(),
            personas,
        }
    }
}

impl TargetConfig {
    /// Build the side-door login URL for a persona
    pub fn side_door_url(&self, persona: &str) -> Result<String> {
        let token = self
            .personas
            .get(persona)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown persona: {}", persona)))?
            .resolve()?;
        let base = format!("{}/", self.base_url.trim_end_matches('/'));
        let url = reqwest::Url::parse_with_params(&base, &[("test-login", token.as_str()), ("test-mode", "true")])
            .map_err(|e| Error::InvalidConfig(format!("base_url {}: {}", self.base_url, e)))?;
        Ok(url.into())
    }

    /// Join a route onto the base URL
    pub fn route_url(&self, route: &str) -> String {
        if route.starts_with("http://") || route.starts_with("https://") {
            return route.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            route.trim_start_matches('/')
        )
    }
}

/// Browser engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Chrome,
    Firefox,
}

impl BrowserEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserEngine::Chrome => "chrome",
            BrowserEngine::Firefox => "firefox",
        }
    }
}

impl std::str::FromStr for BrowserEngine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "chrome" | "chromium" => Ok(BrowserEngine::Chrome),
            "firefox" => Ok(BrowserEngine::Firefox),
            other => Err(Error::InvalidConfig(format!("unsupported browser: {}", other))),
        }
    }
}

/// Browser session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub engine: BrowserEngine,

    /// WebDriver endpoint (chromedriver / geckodriver)
    pub webdriver_url: String,

    pub headless: bool,

    pub window_width: u32,

    pub window_height: u32,

    /// Extra browser command-line arguments
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngine::Chrome,
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            window_width: 1920,
            window_height: 1080,
            extra_args: Vec::new(),
        }
    }
}

/// Polling bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Per-strategy locate timeout
    pub locate_timeout_ms: u64,

    /// Interval between polls
    pub poll_interval_ms: u64,

    /// Bound for page readiness and authentication checks
    pub ready_timeout_ms: u64,

    /// Bound for observing backend changes after a remote call
    pub settle_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            locate_timeout_ms: 5_000,
            poll_interval_ms: 250,
            ready_timeout_ms: 15_000,
            settle_timeout_ms: 10_000,
        }
    }
}

impl TimingConfig {
    pub fn locate_timeout(&self) -> Duration {
        Duration::from_millis(self.locate_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }
}

/// Artifact locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub reports_dir: PathBuf,
    pub screenshot_dir: PathBuf,
    pub scenarios_dir: PathBuf,

    /// File name prefix for report files
    pub report_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("test-results"),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            scenarios_dir: PathBuf::from("scenarios"),
            report_prefix: "BOB_QA_REPORT".to_string(),
        }
    }
}

/// Backend database and remote function configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Firebase project id
    pub project_id: String,

    /// Cloud functions region
    pub region: String,

    /// Owner whose records are analysed
    pub owner_uid: SecretRef,

    /// OAuth bearer token for Firestore REST reads
    pub firestore_token: SecretRef,

    /// Firebase ID token for callable functions
    pub id_token: SecretRef,

    pub replan_function: String,

    /// Calendar window analysed, in days
    pub window_days: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            region: "europe-west2".to_string(),
            owner_uid: SecretRef::env("BOBQA_OWNER_UID"),
            firestore_token: SecretRef::env("BOBQA_FIRESTORE_TOKEN"),
            id_token: SecretRef::env("BOBQA_ID_TOKEN"),
            replan_function: "replanCalendarNow".to_string(),
            window_days: 7,
        }
    }
}

impl BackendConfig {
    /// Base URL for callable functions
    pub fn functions_url(&self) -> Result<String> {
        if self.project_id.is_empty() {
            return Err(Error::InvalidConfig("backend.project_id is not set".to_string()));
        }
        Ok(format!("https://{}-{}.cloudfunctions.net", self.region, self.project_id))
    }
}

impl QaConfig {
    /// Load configuration from file, falling back to defaults when missing
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `BOBQA_*` environment overrides
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("BOBQA_BASE_URL") {
            self.target.base_url = url;
        }
        if let Some(url) = lookup("BOBQA_WEBDRIVER_URL") {
            self.browser.webdriver_url = url;
        }
        if let Some(project) = lookup("BOBQA_PROJECT_ID") {
            self.backend.project_id = project;
        }
        if lookup("BOBQA_OWNER_UID").is_some() {
            self.backend.owner_uid = SecretRef::env("BOBQA_OWNER_UID");
        }
        self
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<()> {
        if self.target.base_url.is_empty() {
            return Err(Error::InvalidConfig("target.base_url is empty".to_string()));
        }
        if self.timing.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("timing.poll_interval_ms must be > 0".to_string()));
        }
        if !self.target.personas.contains_key(&self.target.default_persona) {
            return Err(Error::InvalidConfig(format!(
                "default persona '{}' is not configured",
                self.target.default_persona
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: QaConfig = toml::from_str(
            r#"
[target]
base_url = "https://bob.example.app"

[browser]
engine = "firefox"
headless = false
"#,
        )
        .unwrap();

        assert_eq!(config.target.base_url, "https://bob.example.app");
        assert_eq!(config.browser.engine, BrowserEngine::Firefox);
        assert!(!config.browser.headless);
        assert_eq!(config.browser.window_width, 1920);
        assert_eq!(config.timing.locate_timeout_ms, 5_000);
        assert_eq!(config.backend.replan_function, "replanCalendarNow");
        config.validate().unwrap();
    }

    #[test]
    fn test_side_door_and_route_urls() {
        let target = TargetConfig {
            base_url: "https://bob.example.app/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            target.side_door_url("demo").unwrap(),
            "https://bob.example.app/?test-login=demo&test-mode=true"
        );
        assert_eq!(target.route_url("/goals"), "https://bob.example.app/goals");
        assert_eq!(target.route_url("stories"), "https://bob.example.app/stories");
        assert!(target.side_door_url("nobody").is_err());
    }

    #[test]
    fn test_side_door_token_is_percent_encoded() {
        let mut target = TargetConfig::default();
        target
            .personas
            .insert("odd".to_string(), SecretRef::literal("a b&test-mode=false"));
        assert_eq!(
            target.side_door_url("odd").unwrap(),
            "http://127.0.0.1:3000/?test-login=a+b%26test-mode%3Dfalse&test-mode=true"
        );

        target.base_url = "not a url".to_string();
        assert!(matches!(target.side_door_url("demo"), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_secret_debug_masks_literals() {
        let config = BackendConfig {
            firestore_token: SecretRef::literal("ya29.very-secret"),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("SecretRef(<literal>)"));
        assert_eq!(format!("{:?}", SecretRef::env("BOBQA_ID_TOKEN")), "SecretRef($BOBQA_ID_TOKEN)");
    }

    #[test]
    fn test_env_secret_resolution() {
        std::env::set_var("BOBQA_TEST_SECRET_7F3A", "s3cret");
        assert_eq!(SecretRef::env("BOBQA_TEST_SECRET_7F3A").resolve().unwrap(), "s3cret");
        assert!(matches!(
            SecretRef::env("BOBQA_TEST_SECRET_UNSET_91C2").resolve(),
            Err(Error::MissingSecret(_))
        ));
        assert_eq!(SecretRef::literal("plain").to_string(), "<literal>");
    }

    #[test]
    fn test_overrides() {
        let config = QaConfig::default().with_overrides_from(|key| match key {
            "BOBQA_BASE_URL" => Some("https://staging.example.app".to_string()),
            "BOBQA_PROJECT_ID" => Some("bob-staging".to_string()),
            _ => None,
        });
        assert_eq!(config.target.base_url, "https://staging.example.app");
        assert_eq!(
            config.backend.functions_url().unwrap(),
            "https://europe-west2-bob-staging.cloudfunctions.net"
        );
    }

    #[test]
    fn test_load_missing_file_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bobqa.toml");
        assert_eq!(QaConfig::load(&path).unwrap(), QaConfig::default());

        let mut config = QaConfig::default();
        config.backend.project_id = "bob-test".to_string();
        config.save(&path).unwrap();
        assert_eq!(QaConfig::load(&path).unwrap().backend.project_id, "bob-test");
    }
}
