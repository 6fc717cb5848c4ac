//! Player configuration (`parley.toml`).
//!
//! ```toml
//! program = "village.ron"
//! start = "Start"
//!
//! [variables]
//! gold = 10
//! name = "Ada"
//!
//! [actors]
//! Ada = "ada.png"
//!
//! [scenes.square]
//! background = "square.png"
//! actors = { Ada = "ada_cloak.png" }
//! ```
//!
//! Relative `program` paths resolve against the config file's directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::runner::RunnerConfig;
use crate::value::Value;

pub const DEFAULT_CONFIG_FILE: &str = "parley.toml";

fn default_start() -> String {
    "Start".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Compiled program (RON).
    pub program: PathBuf,
    #[serde(default = "default_start")]
    pub start: String,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    /// Actor name -> image reference.
    #[serde(default)]
    pub actors: BTreeMap<String, String>,
    #[serde(default)]
    pub scenes: BTreeMap<String, SceneConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    #[serde(default)]
    pub background: Option<String>,
    /// Per-scene overrides of the global actor table.
    #[serde(default)]
    pub actors: BTreeMap<String, String>,
}

impl PlayerConfig {
    /// Read and parse a config file; `program` is made relative to its directory.
    ///
    /// # Errors
    /// IO and TOML failures, with the path in the context.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config from '{}'", path.display()))?;
        let mut config: PlayerConfig =
            toml::from_str(&text).with_context(|| format!("parsing config TOML from '{}'", path.display()))?;
        if config.program.is_relative()
            && let Some(dir) = path.parent()
        {
            config.program = dir.join(&config.program);
        }
        info!(
            "config loaded from '{}': program '{}', start '{}', {} variable(s), {} scene(s)",
            path.display(),
            config.program.display(),
            config.start,
            config.variables.len(),
            config.scenes.len()
        );
        Ok(config)
    }

    pub fn scene(&self, name: &str) -> Option<&SceneConfig> {
        self.scenes.get(name)
    }

    /// Image for `actor`, preferring the scene's own table.
    pub fn actor_image(&self, scene: Option<&str>, actor: &str) -> Option<&str> {
        scene
            .and_then(|s| self.scenes.get(s))
            .and_then(|s| s.actors.get(actor))
            .or_else(|| self.actors.get(actor))
            .map(String::as_str)
    }

    /// Runner settings implied by this config.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::new(&self.start).variables(self.variables.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
program = "village.ron"
start = "Gate"

[variables]
gold = 10
name = "Ada"
brave = true

[actors]
Ada = "ada.png"
Smith = "smith.png"

[scenes.square]
background = "square.png"
actors = { Ada = "ada_cloak.png" }

[scenes.forge]
"#;

    fn write_config(dir: &TempDir, text: &str) -> PathBuf {
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_every_table() {
        let dir = TempDir::new().unwrap();
        let config = PlayerConfig::load(&write_config(&dir, SAMPLE)).unwrap();
        assert_eq!(config.program, dir.path().join("village.ron"));
        assert_eq!(config.start, "Gate");
        assert_eq!(config.variables["gold"], Value::Number(10.0));
        assert_eq!(config.variables["name"], Value::from("Ada"));
        assert_eq!(config.variables["brave"], Value::Bool(true));
        assert_eq!(config.scene("square").unwrap().background.as_deref(), Some("square.png"));
        assert_eq!(config.scene("forge"), Some(&SceneConfig::default()));
    }

    #[test]
    fn scene_actors_override_global_ones() {
        let dir = TempDir::new().unwrap();
        let config = PlayerConfig::load(&write_config(&dir, SAMPLE)).unwrap();
        assert_eq!(config.actor_image(Some("square"), "Ada"), Some("ada_cloak.png"));
        assert_eq!(config.actor_image(Some("square"), "Smith"), Some("smith.png"));
        assert_eq!(config.actor_image(None, "Ada"), Some("ada.png"));
        assert_eq!(config.actor_image(Some("forge"), "Nobody"), None);
    }

    #[test]
    fn start_defaults_and_absolute_paths_stay() {
        let dir = TempDir::new().unwrap();
        let config = PlayerConfig::load(&write_config(&dir, "program = \"/srv/story.ron\"\n")).unwrap();
        assert_eq!(config.start, "Start");
        assert_eq!(config.program, PathBuf::from("/srv/story.ron"));
        assert!(config.variables.is_empty());
    }

    #[test]
    fn bad_toml_reports_the_path() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "program = ");
        let err = PlayerConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains(DEFAULT_CONFIG_FILE));
    }
}
