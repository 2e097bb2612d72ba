use crate::ranges::{Range, RangeList};
use crate::state::{Settings, VariableId, Vec3};
use crate::units::Interval;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("project interval must be a positive integer")]
    ZeroInterval,
    #[error("gene '{name}' ends before it starts ({start} > {end})")]
    InvertedGene { name: String, start: u64, end: u64 },
    #[error("unsupported config version '{0}'")]
    UnsupportedVersion(String),
}

// ===== CONFIG TYPES =====

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    #[serde(default)]
    pub app: AppSection,
    pub project: ProjectSection,
    #[serde(default)]
    pub controller: ControllerSection,
    #[serde(default)]
    pub settings: SettingsSection,
    #[serde(default)]
    pub genes: Vec<GeneEntry>,
}

/// Config file metadata. Only the current format version is accepted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppSection {
    pub version: String,
}

impl AppSection {
    pub const CURRENT_VERSION: &'static str = "1.0.0";

    fn check_version(&self) -> Result<(), ConfigError> {
        if self.version == Self::CURRENT_VERSION {
            Ok(())
        } else {
            Err(ConfigError::UnsupportedVersion(self.version.clone()))
        }
    }
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProjectSection {
    /// Locations per segment.
    pub interval: u64,
    #[serde(default)]
    pub segment_count: Option<u64>,
    #[serde(default)]
    pub unmapped_segments: RangeList,
}

impl ProjectSection {
    pub fn interval(&self) -> Result<Interval, ConfigError> {
        Interval::new(self.interval).ok_or(ConfigError::ZeroInterval)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ControllerSection {
    /// Quiet period before the debounced notification fires.
    pub debounce_ms: u64,
}

impl ControllerSection {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

/// Initial controller settings, in TOML's snake_case spelling.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SettingsSection {
    pub variable: Option<VariableId>,
    pub colormap: String,
    pub show_unmapped_segments: bool,
    pub background_color: String,
    pub camera_position: Vec3,
    pub center_position: Option<Vec3>,
    pub contact_threshold: f64,
}

impl Default for SettingsSection {
    fn default() -> Self {
        Settings::default().into()
    }
}

impl From<Settings> for SettingsSection {
    fn from(settings: Settings) -> Self {
        Self {
            variable: settings.variable,
            colormap: settings.colormap,
            show_unmapped_segments: settings.show_unmapped_segments,
            background_color: settings.background_color,
            camera_position: settings.camera_position,
            center_position: settings.center_position,
            contact_threshold: settings.contact_threshold,
        }
    }
}

impl From<SettingsSection> for Settings {
    fn from(section: SettingsSection) -> Self {
        Self {
            variable: section.variable,
            colormap: section.colormap,
            show_unmapped_segments: section.show_unmapped_segments,
            background_color: section.background_color,
            camera_position: section.camera_position,
            center_position: section.center_position,
            contact_threshold: section.contact_threshold,
        }
    }
}

/// One row of the gene annotation table, inclusive location bounds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GeneEntry {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

impl GeneEntry {
    pub fn span(&self) -> Option<Range> {
        Range::new(self.start, self.end).ok()
    }
}

impl ViewerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.app.check_version()?;
        self.project.interval()?;
        if let Some(gene) = self.genes.iter().find(|gene| gene.start > gene.end) {
            return Err(ConfigError::InvertedGene {
                name: gene.name.clone(),
                start: gene.start,
                end: gene.end,
            });
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<ViewerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Loaded viewer config from {}", path.display());
    ViewerConfig::from_toml_str(&content)
}
