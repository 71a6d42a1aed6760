use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detector::{DEFAULT_GLOBAL_AREA_THRESHOLD, DEFAULT_REGION_AREA_THRESHOLD};

/// Settings configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    // MIDI settings
    pub midi_port: String,
    pub virtual_port_name: String,
    pub velocity: u8,
    pub note_off_delay_secs: f64,

    // Trigger settings
    pub cooldown_secs: f64,
    pub simultaneous_play: bool,

    // Detection settings
    pub region_area_threshold: u32,
    pub global_area_threshold: u32,

    // Storage settings
    pub sounds_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // MIDI defaults
            midi_port: "IAC".to_string(),
            virtual_port_name: "Motif".to_string(),
            velocity: 100,
            note_off_delay_secs: 2.0,

            // Trigger defaults
            cooldown_secs: 2.0,
            simultaneous_play: true,

            // Detection defaults
            region_area_threshold: DEFAULT_REGION_AREA_THRESHOLD,
            global_area_threshold: DEFAULT_GLOBAL_AREA_THRESHOLD,

            // Storage defaults
            sounds_dir: PathBuf::from("sounds"),
        }
    }
}

impl Settings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_secs)
    }

    pub fn note_off_delay(&self) -> Duration {
        Duration::from_secs_f64(self.note_off_delay_secs)
    }
}

/// Configuration manager for Motif settings
/// Settings are persisted as config.json in the working directory by
/// default; schema, available options, and stored values are kept apart
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

/// Available configuration options with validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSchema {
    pub midi: MidiConfigSchema,
    pub trigger: TriggerConfigSchema,
    pub detection: DetectionConfigSchema,
    pub storage: StorageConfigSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiConfigSchema {
    pub midi_port: ConfigOption<String>,
    pub virtual_port_name: ConfigOption<String>,
    pub velocity: ConfigOption<u8>,
    pub note_off_delay_secs: ConfigOption<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfigSchema {
    pub cooldown_secs: ConfigOption<f64>,
    pub simultaneous_play: ConfigOption<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfigSchema {
    pub region_area_threshold: ConfigOption<u32>,
    pub global_area_threshold: ConfigOption<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfigSchema {
    pub sounds_dir: ConfigOption<String>,
}

/// Configuration option with validation and available choices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigOption<T> {
    pub default: T,
    pub valid_range: Option<(T, T)>,
    pub valid_choices: Option<Vec<T>>,
    pub description: String,
    pub requires_restart: bool,
}

/// Persisted configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub settings: Settings,
    pub created_at: String,
    pub modified_at: String,
}

impl ConfigManager {
    /// Create a new configuration manager
    /// If no path is provided, defaults to 'config.json' in the current working directory
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let config_path = config_path.unwrap_or_else(|| PathBuf::from("config.json"));

        Self {
            config_path,
            settings: Settings::default(),
        }
    }

    /// Load settings from configuration file
    /// Creates the file with defaults if it doesn't exist
    pub fn load(&mut self) -> Result<Settings, ConfigError> {
        if !self.config_path.exists() {
            self.save()?;
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config_file: ConfigFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Validate version compatibility
        if config_file.version != env!("CARGO_PKG_VERSION") {
            log::warn!(
                "Config file version {} doesn't match application version {}. Using defaults for new settings.",
                config_file.version,
                env!("CARGO_PKG_VERSION")
            );
        }

        self.settings = config_file.settings;
        Ok(self.settings.clone())
    }

    /// Save current settings to configuration file
    pub fn save(&self) -> Result<(), ConfigError> {
        // Ensure config directory exists (if config is in a subdirectory)
        if let Some(parent) = self.config_path.parent() {
            if parent != Path::new("") && parent != Path::new(".") {
                fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
            }
        }

        let config_file = ConfigFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            settings: self.settings.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
            modified_at: chrono::Utc::now().to_rfc3339(),
        };

        let content = serde_json::to_string_pretty(&config_file)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(&self.config_path, content)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Update settings and save to file
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), ConfigError> {
        self.settings = settings;
        self.save()
    }

    /// Get current settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Get configuration schema with available options
    pub fn schema() -> ConfigSchema {
        ConfigSchema {
            midi: MidiConfigSchema {
                midi_port: ConfigOption {
                    default: "IAC".to_string(),
                    valid_range: None,
                    valid_choices: None, // Populated from system enumeration
                    description: "Substring matched against MIDI output port names".to_string(),
                    requires_restart: true,
                },
                virtual_port_name: ConfigOption {
                    default: "Motif".to_string(),
                    valid_range: None,
                    valid_choices: None,
                    description: "Name of the virtual MIDI port created when no port matches"
                        .to_string(),
                    requires_restart: true,
                },
                velocity: ConfigOption {
                    default: 100,
                    valid_range: Some((1, 127)),
                    valid_choices: None,
                    description: "Velocity for triggered note-on messages".to_string(),
                    requires_restart: false,
                },
                note_off_delay_secs: ConfigOption {
                    default: 2.0,
                    valid_range: Some((0.1, 60.0)),
                    valid_choices: None,
                    description: "Seconds between a trigger's note-on and its note-off"
                        .to_string(),
                    requires_restart: false,
                },
            },
            trigger: TriggerConfigSchema {
                cooldown_secs: ConfigOption {
                    default: 2.0,
                    valid_range: Some((0.0, 600.0)),
                    valid_choices: None,
                    description: "Minimum seconds between triggers of the same region"
                        .to_string(),
                    requires_restart: false,
                },
                simultaneous_play: ConfigOption {
                    default: true,
                    valid_range: None,
                    valid_choices: None,
                    description: "Allow multiple regions to play at once (vs single-play)"
                        .to_string(),
                    requires_restart: false,
                },
            },
            detection: DetectionConfigSchema {
                region_area_threshold: ConfigOption {
                    default: DEFAULT_REGION_AREA_THRESHOLD,
                    valid_range: Some((1, 1_000_000)),
                    valid_choices: None,
                    description: "Mask pixels inside a region box required to count as motion"
                        .to_string(),
                    requires_restart: false,
                },
                global_area_threshold: ConfigOption {
                    default: DEFAULT_GLOBAL_AREA_THRESHOLD,
                    valid_range: Some((1, 10_000_000)),
                    valid_choices: None,
                    description: "Mask pixels over the whole frame required when no regions exist"
                        .to_string(),
                    requires_restart: false,
                },
            },
            storage: StorageConfigSchema {
                sounds_dir: ConfigOption {
                    default: "sounds".to_string(),
                    valid_range: None,
                    valid_choices: None,
                    description: "Directory for uploaded sound files".to_string(),
                    requires_restart: true,
                },
            },
        }
    }

    /// Validate settings against schema
    pub fn validate_settings(settings: &Settings) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let schema = Self::schema();

        if let Some((min, max)) = schema.midi.velocity.valid_range {
            if settings.velocity < min || settings.velocity > max {
                errors.push(format!("velocity must be between {} and {}", min, max));
            }
        }

        if let Some((min, max)) = schema.midi.note_off_delay_secs.valid_range {
            if settings.note_off_delay_secs < min || settings.note_off_delay_secs > max {
                errors.push(format!(
                    "note_off_delay_secs must be between {} and {}",
                    min, max
                ));
            }
        }

        if let Some((min, max)) = schema.trigger.cooldown_secs.valid_range {
            if settings.cooldown_secs < min || settings.cooldown_secs > max {
                errors.push(format!(
                    "cooldown_secs must be between {} and {}",
                    min, max
                ));
            }
        }

        if let Some((min, max)) = schema.detection.region_area_threshold.valid_range {
            if settings.region_area_threshold < min || settings.region_area_threshold > max {
                errors.push(format!(
                    "region_area_threshold must be between {} and {}",
                    min, max
                ));
            }
        }

        if let Some((min, max)) = schema.detection.global_area_threshold.valid_range {
            if settings.global_area_threshold < min || settings.global_area_threshold > max {
                errors.push(format!(
                    "global_area_threshold must be between {} and {}",
                    min, max
                ));
            }
        }

        if settings.sounds_dir.as_os_str().is_empty() {
            errors.push("sounds_dir must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Reset settings to defaults
    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.settings = Settings::default();
        self.save()
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    ReadError(String),
    WriteError(String),
    ParseError(String),
    SerializeError(String),
    ValidationError(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(msg) => write!(f, "Failed to read config file: {}", msg),
            ConfigError::WriteError(msg) => write!(f, "Failed to write config file: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config file: {}", msg),
            ConfigError::SerializeError(msg) => write!(f, "Failed to serialize config: {}", msg),
            ConfigError::ValidationError(errors) => {
                write!(f, "Config validation errors: {}", errors.join(", "))
            }
        }
    }
}

impl std::error::Error for ConfigError {}
