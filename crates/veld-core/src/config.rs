//! Persisted configuration: key bindings and operation tuning.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator};

use crate::error::ConfigError;

/// Default upper bound on duplicate-name probes.
pub const DEFAULT_MAX_DUPLICATE_ATTEMPTS: usize = 10_000;

/// Default capacity of the worker message channel.
pub const DEFAULT_CHANNEL_SIZE: usize = 100;

/// Logical actions that can be bound to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Quit,
    AddPanel,
    OpenPanelAtSelection,
    ClosePanel,
    TogglePreview,
    CloseSearchPanel,
    NavUp,
    NavDown,
    NavParent,
    SelectItem,
    ToggleSelection,
    OpenWithPrompt,
    Find,
    Rename,
    CreateDirectory,
    DeleteSelected,
    MoveSelected,
    CopySelected,
    ArchiveSelected,
    ExtractArchive,
    CommandMode,
}

impl Action {
    /// Key bound to this action when the configuration does not say otherwise.
    pub fn default_key(self) -> &'static str {
        match self {
            Self::Quit => "q",
            Self::AddPanel => "o",
            Self::OpenPanelAtSelection => "O",
            Self::ClosePanel => "w",
            Self::TogglePreview => "p",
            Self::CloseSearchPanel => "backspace",
            Self::NavUp => "up",
            Self::NavDown => "down",
            Self::NavParent => "left",
            Self::SelectItem => "enter",
            Self::ToggleSelection => "space",
            Self::OpenWithPrompt => "e",
            Self::Find => "f",
            Self::Rename => "n",
            Self::CreateDirectory => "d",
            Self::DeleteSelected => "r",
            Self::MoveSelected => "m",
            Self::CopySelected => "c",
            Self::ArchiveSelected => "a",
            Self::ExtractArchive => "x",
            Self::CommandMode => ":",
        }
    }

    /// Short description shown next to the binding.
    pub fn description(self) -> &'static str {
        match self {
            Self::Quit => "Quit",
            Self::AddPanel => "Open Panel",
            Self::OpenPanelAtSelection => "Open Panel at Selection",
            Self::ClosePanel => "Close Panel",
            Self::TogglePreview => "Toggle Preview",
            Self::CloseSearchPanel => "Close Search",
            Self::NavUp => "Navigate Up",
            Self::NavDown => "Navigate Down",
            Self::NavParent => "Go to Parent",
            Self::SelectItem => "Open / Enter Dir",
            Self::ToggleSelection => "Select",
            Self::OpenWithPrompt => "Open with...",
            Self::Find => "Find",
            Self::Rename => "Rename",
            Self::CreateDirectory => "New Dir",
            Self::DeleteSelected => "Delete",
            Self::MoveSelected => "Move",
            Self::CopySelected => "Copy",
            Self::ArchiveSelected => "Archive",
            Self::ExtractArchive => "Extract",
            Self::CommandMode => "Command Mode",
        }
    }
}

/// Mapping from logical action to key name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindings {
    keys: IndexMap<Action, String>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            keys: Action::iter()
                .map(|action| (action, action.default_key().to_string()))
                .collect(),
        }
    }
}

impl KeyBindings {
    /// Build bindings from a `[keybindings]` table, keeping defaults for
    /// anything missing, unknown or not a non-empty string.
    pub fn from_table(table: &toml::Table) -> Self {
        let mut bindings = Self::default();
        for (name, value) in table {
            let Ok(action) = name.parse::<Action>() else {
                tracing::warn!(entry = %name, "Ignoring unknown key binding");
                continue;
            };
            match value.as_str() {
                Some(key) if !key.trim().is_empty() => {
                    bindings.keys.insert(action, key.trim().to_string());
                }
                _ => {
                    tracing::warn!(entry = %name, "Ignoring unparsable key binding");
                }
            }
        }
        bindings
    }

    /// Key bound to an action.
    pub fn key(&self, action: Action) -> &str {
        self.keys
            .get(&action)
            .map(String::as_str)
            .unwrap_or_else(|| action.default_key())
    }

    /// Find the action bound to a key, if any.
    pub fn action_for(&self, key: &str) -> Option<Action> {
        self.keys
            .iter()
            .find(|(_, bound)| bound.as_str() == key)
            .map(|(action, _)| *action)
    }

    /// Iterate over all bindings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Action, &str)> {
        self.keys.iter().map(|(action, key)| (*action, key.as_str()))
    }
}

/// Tuning for the operation engine.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct OpsConfig {
    /// Upper bound on `name (n).ext` probes before giving up.
    #[builder(default = "DEFAULT_MAX_DUPLICATE_ATTEMPTS")]
    pub max_duplicate_attempts: usize,

    /// Send deferred deletions to the system trash instead of unlinking.
    #[builder(default = "false")]
    pub use_trash: bool,

    /// Capacity of the worker message channel.
    #[builder(default = "DEFAULT_CHANNEL_SIZE")]
    pub channel_size: usize,
}

impl OpsConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_duplicate_attempts == Some(0) {
            return Err("max_duplicate_attempts must be at least 1".to_string());
        }
        if self.channel_size == Some(0) {
            return Err("channel_size must be at least 1".to_string());
        }
        Ok(())
    }
}

impl OpsConfig {
    /// Create a new config builder.
    pub fn builder() -> OpsConfigBuilder {
        OpsConfigBuilder::default()
    }
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            max_duplicate_attempts: DEFAULT_MAX_DUPLICATE_ATTEMPTS,
            use_trash: false,
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}

/// Everything read from the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub keybindings: KeyBindings,
    pub operations: OpsConfig,
}

impl Settings {
    /// Location of the configuration file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("veld").join("config.toml"))
    }

    /// Load settings from the default location, falling back to defaults.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::warn!("No configuration directory, using default settings");
                Self::default()
            }
        }
    }

    /// Load settings from `path`.
    ///
    /// A missing file is created with the defaults. Unreadable or malformed
    /// content never fails startup: affected entries keep their defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.is_file() {
            if let Err(e) = Self::write_default(path) {
                tracing::warn!(error = %e, "Could not write default configuration");
            }
            return Self::default();
        }

        match Self::read(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "Using default settings");
                Self::default()
            }
        }
    }

    /// Read and parse the file, reporting whole-file failures.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::parse(&content).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse configuration text.
    pub fn parse(content: &str) -> Result<Self, String> {
        let table: toml::Table = toml::from_str(content).map_err(|e| e.to_string())?;

        let keybindings = match table.get("keybindings") {
            Some(toml::Value::Table(keys)) => KeyBindings::from_table(keys),
            Some(_) => {
                tracing::warn!("[keybindings] is not a table, using defaults");
                KeyBindings::default()
            }
            None => KeyBindings::default(),
        };

        let operations = match table.get("operations") {
            Some(value) => match value.clone().try_into::<OpsConfig>() {
                Ok(ops) if ops.max_duplicate_attempts > 0 && ops.channel_size > 0 => ops,
                Ok(_) => {
                    tracing::warn!("[operations] has zero limits, using defaults");
                    OpsConfig::default()
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed [operations]");
                    OpsConfig::default()
                }
            },
            None => OpsConfig::default(),
        };

        Ok(Self {
            keybindings,
            operations,
        })
    }

    /// Write the default configuration, with descriptions, to `path`.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
        }
        std::fs::write(path, Self::default_file_contents()).map_err(|e| ConfigError::io(path, e))
    }

    /// Text of a freshly generated configuration file.
    pub fn default_file_contents() -> String {
        let mut out = String::from("# Veld File Manager Keybindings\n[keybindings]\n");
        for action in Action::iter() {
            let _ = writeln!(
                out,
                "{} = \"{}\" # {}",
                action.as_ref(),
                action.default_key(),
                action.description()
            );
        }

        let ops = OpsConfig::default();
        let _ = writeln!(out, "\n[operations]");
        let _ = writeln!(out, "max_duplicate_attempts = {}", ops.max_duplicate_attempts);
        let _ = writeln!(out, "use_trash = {}", ops.use_trash);
        let _ = writeln!(out, "channel_size = {}", ops.channel_size);
        out
    }
}
