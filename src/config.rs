//! Configuration for the Sati sensor agent.
//!
//! The configuration is loaded once at startup and handed to each component
//! when it is constructed. Components keep their own copy of the values they
//! need; changing settings means building new components.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the sensor agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which signal sources are enabled
    pub sources: SourceConfig,

    /// Input activity and stress scoring
    pub detection: DetectionConfig,

    /// Intervention cooldown and monitoring cadence
    pub intervention: InterventionConfig,

    /// Intent-reality checking
    pub intent: IntentConfig,

    /// Breathing signal settings
    pub breathing: BreathingConfig,

    /// Posture signal settings
    pub posture: PostureConfig,

    /// Screen context settings
    pub screen: ScreenConfig,

    /// Local AI backend
    pub ai: AiConfig,

    /// Path for exporting session reports
    pub export_path: PathBuf,

    /// Path for storing state and transparency logs
    pub data_path: PathBuf,

    /// Whether monitoring is currently paused
    pub paused: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sati-sensor-agent");

        Self {
            sources: SourceConfig::default(),
            detection: DetectionConfig::default(),
            intervention: InterventionConfig::default(),
            intent: IntentConfig::default(),
            breathing: BreathingConfig::default(),
            posture: PostureConfig::default(),
            screen: ScreenConfig::default(),
            ai: AiConfig::default(),
            export_path: data_dir.join("exports"),
            data_path: data_dir,
            paused: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, falling back to defaults
    /// when the file does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sati-sensor-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject values no component could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("detection.window_duration", self.detection.window_duration),
            ("detection.baseline_duration", self.detection.baseline_duration),
            ("intervention.cooldown", self.intervention.cooldown),
            ("intervention.tick_interval", self.intervention.tick_interval),
            ("intent.check_interval", self.intent.check_interval),
            ("breathing.refresh_interval", self.breathing.refresh_interval),
            ("posture.refresh_interval", self.posture.refresh_interval),
            ("breathing.timeout", self.breathing.timeout),
            ("posture.timeout", self.posture.timeout),
            ("screen.timeout", self.screen.timeout),
            ("ai.timeout", self.ai.timeout),
        ];
        for (name, value) in positive {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }

        if self.detection.stress_threshold == 0 {
            return Err(ConfigError::Invalid(
                "detection.stress_threshold must be positive".to_string(),
            ));
        }
        if self.intent.mismatch_threshold_minutes == 0 {
            return Err(ConfigError::Invalid(
                "intent.mismatch_threshold_minutes must be positive".to_string(),
            ));
        }
        if self.breathing.min_rate >= self.breathing.max_rate {
            return Err(ConfigError::Invalid(
                "breathing.min_rate must be below breathing.max_rate".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration for which signal sources to use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub keyboard: bool,
    pub mouse: bool,
    pub breathing: bool,
    pub posture: bool,
    pub screen: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            keyboard: true,
            mouse: true,
            breathing: false,
            posture: false,
            screen: false,
        }
    }
}

impl SourceConfig {
    /// Parse source configuration from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        let sources: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();
        let has = |name: &str| sources.iter().any(|s| s == name || s == "all");

        Self {
            keyboard: has("keyboard"),
            mouse: has("mouse"),
            breathing: has("breathing"),
            posture: has("posture"),
            screen: has("screen"),
        }
    }

    /// Whether the input activity sensor has anything to listen to.
    pub fn input_enabled(&self) -> bool {
        self.keyboard || self.mouse
    }

    /// Check if at least one source is enabled.
    pub fn any_enabled(&self) -> bool {
        self.input_enabled() || self.breathing || self.posture || self.screen
    }
}

/// Input activity and stress scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Sliding window for keystroke/click/movement rates
    #[serde(with = "duration_serde")]
    pub window_duration: Duration,

    /// Calibration period after start; the typing baseline is learned and
    /// input stress reports are held back, interventions are not
    #[serde(with = "duration_serde")]
    pub baseline_duration: Duration,

    /// Keystrokes per window that map to a full input stress score
    pub stress_threshold: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_duration: Duration::from_secs(10),
            baseline_duration: Duration::from_secs(300),
            stress_threshold: 50,
        }
    }
}

/// Intervention cooldown and monitoring cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterventionConfig {
    /// Minimum time between two interventions
    #[serde(with = "duration_serde")]
    pub cooldown: Duration,

    /// How often the monitoring loop fuses signals
    #[serde(with = "duration_serde")]
    pub tick_interval: Duration,
}

impl Default for InterventionConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(120),
            tick_interval: Duration::from_secs(2),
        }
    }
}

/// Intent-reality checking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    /// Minimum time between two content-match judgments
    #[serde(with = "duration_serde")]
    pub check_interval: Duration,

    /// Sustained mismatch (in minutes) before the user is nudged
    pub mismatch_threshold_minutes: u64,

    /// Goal declared at startup, if any
    pub default_intent: Option<String>,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            mismatch_threshold_minutes: 2,
            default_intent: None,
        }
    }
}

impl IntentConfig {
    pub fn mismatch_threshold(&self) -> Duration {
        Duration::from_secs(self.mismatch_threshold_minutes * 60)
    }
}

/// Breathing signal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreathingConfig {
    /// Breaths per minute below which breathing is a concern
    pub min_rate: u32,
    /// Breaths per minute above which breathing indicates stress
    pub max_rate: u32,
    /// Minimum time between two samples
    #[serde(with = "duration_serde")]
    pub refresh_interval: Duration,
    /// External command printing `<breaths per minute> [confidence]`
    pub command: Option<String>,
    /// Longest a single provider run may take before it is killed
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for BreathingConfig {
    fn default() -> Self {
        Self {
            min_rate: 8,
            max_rate: 20,
            refresh_interval: Duration::from_secs(10),
            command: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Posture signal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostureConfig {
    /// Forward neck angle (degrees) treated as poor posture
    pub neck_angle_threshold: u32,
    /// Minimum time between two samples
    #[serde(with = "duration_serde")]
    pub refresh_interval: Duration,
    /// External command printing the forward neck angle in degrees
    pub command: Option<String>,
    /// Longest a single provider run may take before it is killed
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for PostureConfig {
    fn default() -> Self {
        Self {
            neck_angle_threshold: 15,
            refresh_interval: Duration::from_secs(10),
            command: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Screen context settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// External command writing a JPEG screenshot to stdout
    pub capture_command: Option<String>,
    /// Longest a capture may take before it is killed
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            capture_command: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Local AI backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Ollama base URL
    pub host: String,
    /// Vision model name
    pub vision_model: String,
    /// Request timeout (vision requests get twice this)
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:11434".to_string(),
            vision_model: "llava".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
