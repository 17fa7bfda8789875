use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::metadata::MetadataTree;
use crate::scanner::DEFAULT_KEYWORDS;

/// Top-level configuration for the exif-forge library.
///
/// Controls the provenance keyword table, where metadata presets live, and
/// output behavior (output directory, backups, conversion quality). Every
/// section is optional in the file; missing fields take their defaults.
///
/// # Loading
///
/// ```rust,no_run
/// use exif_forge::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.provenance.keywords.push("my-inhouse-model".into());
/// config.output.convert_quality = 90;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How AI-generation markers are detected and stripped.
    pub provenance: ProvenanceConfig,
    /// Directory holding `<name>.json` metadata presets.
    pub presets_dir: PathBuf,
    /// Output behavior.
    pub output: OutputConfig,
}

/// Provenance detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvenanceConfig {
    /// Case-insensitive substrings that mark a file as AI-generated.
    pub keywords: Vec<String>,
    /// PNG text keys removed when stripping provenance.
    pub png_strip_keys: Vec<String>,
}

/// Output and behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write processed files here instead of over the originals.
    pub output_dir: Option<PathBuf>,
    /// If `true`, create a `.bak` backup before rewriting an image in place.
    pub backup_originals: bool,
    /// JPEG quality (1-100) used when converting to JPEG.
    pub convert_quality: u8,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            png_strip_keys: [
                "parameters",
                "prompt",
                "workflow",
                "sd-metadata",
                "Comment",
                "Description",
                "Software",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            backup_originals: true,
            convert_quality: 95,
        }
    }
}

impl Config {
    /// Resolve the config file path: `config.json` next to the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Load the metadata preset `<presets_dir>/<name>.json`.
    pub fn load_preset(&self, name: &str) -> Result<MetadataTree> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("Invalid preset name: {name:?}");
        }
        let path = self.presets_dir.join(format!("{name}.json"));
        if !path.is_file() {
            let known = self.list_presets().unwrap_or_default();
            bail!(
                "Unknown preset {name:?} (available: {})",
                if known.is_empty() { "none".to_string() } else { known.join(", ") }
            );
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read preset {}", path.display()))?;
        let tree: MetadataTree = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse preset {}", path.display()))?;
        log::debug!("Loaded preset {name} from {}", path.display());
        Ok(tree)
    }

    /// Names of the presets in `presets_dir`, sorted.
    pub fn list_presets(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.presets_dir).with_context(|| {
            format!("Failed to read presets directory {}", self.presets_dir.display())
        })?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| p.file_stem()?.to_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provenance: ProvenanceConfig::default(),
            presets_dir: PathBuf::from("presets"),
            output: OutputConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Group;
    use std::fs;
    use tempfile::TempDir;

    // ── load / save ──────────────────────────────────────────────────

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.json"))).unwrap();
        assert_eq!(config.output.convert_quality, 95);
        assert!(config.output.backup_originals);
        assert!(config.provenance.keywords.iter().any(|k| k == "midjourney"));
        assert_eq!(config.presets_dir, PathBuf::from("presets"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"output": {"convert_quality": 80}}"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.output.convert_quality, 80);
        assert!(config.output.backup_originals);
        assert!(config.provenance.png_strip_keys.contains(&"parameters".to_string()));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.provenance.keywords = vec!["house-model".into()];
        config.output.output_dir = Some(dir.path().join("out"));
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.provenance.keywords, vec!["house-model".to_string()]);
        assert_eq!(loaded.output.output_dir, Some(dir.path().join("out")));
    }

    #[test]
    fn malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    // ── presets ──────────────────────────────────────────────────────

    fn with_presets() -> (TempDir, Config) {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("cam.json"),
            r#"{"0th": {"Make": "SONY"}, "Exif": {"FNumber": [28, 10]}}"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let config = Config {
            presets_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        (dir, config)
    }

    #[test]
    fn load_known_preset() {
        let (_dir, config) = with_presets();
        let tree = config.load_preset("cam").unwrap();
        assert_eq!(tree.get_text(Group::Zeroth, "Make"), Some("SONY"));
        assert!(tree.get(Group::Exif, "FNumber").is_some());
        assert_eq!(config.list_presets().unwrap(), vec!["cam".to_string()]);
    }

    #[test]
    fn unknown_or_unsafe_preset_is_error() {
        let (_dir, config) = with_presets();
        let err = config.load_preset("nikon").unwrap_err();
        assert!(err.to_string().contains("cam"));
        assert!(config.load_preset("../cam").is_err());
        assert!(config.load_preset("").is_err());
    }

    #[test]
    fn shipped_presets_parse() {
        let config = Config {
            presets_dir: Path::new(env!("CARGO_MANIFEST_DIR")).join("presets"),
            ..Config::default()
        };
        for name in ["sony_a7m4", "iphone_15_pro"] {
            let tree = config.load_preset(name).unwrap();
            assert!(tree.get(Group::Zeroth, "Make").is_some(), "{name}");
        }
    }
}
