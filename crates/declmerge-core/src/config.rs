use merge_engine::{Keep, MergeOptions, PrinterConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub merge: MergeSettings,
    #[serde(default)]
    pub normalize: NormalizeSettings,
    #[serde(default)]
    pub printer: PrinterSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSettings {
    #[serde(default = "default_left_label")]
    pub left_label: String,
    #[serde(default = "default_right_label")]
    pub right_label: String,
    #[serde(default)]
    pub keep: KeepSetting,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            left_label: default_left_label(),
            right_label: default_right_label(),
            keep: KeepSetting::default(),
        }
    }
}

/// Serialized form of [`Keep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepSetting {
    #[default]
    None,
    Left,
    Right,
}

impl From<KeepSetting> for Keep {
    fn from(keep: KeepSetting) -> Self {
        match keep {
            KeepSetting::None => Keep::None,
            KeepSetting::Left => Keep::Left,
            KeepSetting::Right => Keep::Right,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterSettings {
    #[serde(default = "default_indent_width")]
    pub indent_width: usize,
    #[serde(default)]
    pub print_locs: bool,
    #[serde(default)]
    pub typed_sigil: Option<String>,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            indent_width: default_indent_width(),
            print_locs: false,
            typed_sigil: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Directory for the log file. Logs only go to stderr when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_left_label() -> String {
    "left".into()
}
fn default_right_label() -> String {
    "right".into()
}
fn default_true() -> bool {
    true
}
fn default_indent_width() -> usize {
    2
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions::new(&self.merge.left_label, &self.merge.right_label)
            .keep(self.merge.keep.into())
    }

    pub fn printer_config(&self) -> PrinterConfig {
        PrinterConfig {
            indent_width: self.printer.indent_width,
            print_locs: self.printer.print_locs,
            typed_sigil: self.printer.typed_sigil.clone(),
        }
    }
}
