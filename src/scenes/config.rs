use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument};

use super::scene::{Scene, SceneTable};
use crate::error::ConfigError;

const CONFIG_FILE_STEM: &str = "scenes";

/// Serialization formats accepted for the scene document.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Probed in this order when no path is given.
    const ALL: [Self; 2] = [Self::Json, Self::Toml];

    fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }

    /// Picks the format from the file extension. Files without one are JSON.
    fn for_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|extension| extension.to_str()) {
            None => Ok(Self::Json),
            Some(extension) if extension.eq_ignore_ascii_case("json") => Ok(Self::Json),
            Some(extension) if extension.eq_ignore_ascii_case("toml") => Ok(Self::Toml),
            Some(_) => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    fn file_name(self) -> String {
        format!("{CONFIG_FILE_STEM}.{}", self.extension())
    }
}

/// Scene configuration document.
///
/// `default` holds the commands of the null scene. `scenes` keeps the order of
/// its keys, which is the order swipes cycle through.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize)]
pub struct SceneConfig {
    #[serde(default)]
    default: HashMap<String, String>,
    scenes: OrderedScenes,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
struct OrderedScenes(Vec<(String, HashMap<String, String>)>);

impl<'de> Deserialize<'de> for OrderedScenes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedScenesVisitor;

        impl<'de> Visitor<'de> for OrderedScenesVisitor {
            type Value = OrderedScenes;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of scene names to command maps")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut scenes = Vec::with_capacity(map.size_hint().unwrap_or_default());
                while let Some(entry) = map.next_entry::<String, HashMap<String, String>>()? {
                    scenes.push(entry);
                }
                Ok(OrderedScenes(scenes))
            }
        }

        deserializer.deserialize_map(OrderedScenesVisitor)
    }
}

impl SceneConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the file at `path`. `.toml` files are read
    /// as TOML, everything else must be JSON.
    #[instrument(level = "debug")]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = ConfigFormat::for_path(path)?;
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = match format {
            ConfigFormat::Json => Self::from_json_str(&raw)?,
            ConfigFormat::Toml => Self::from_toml_str(&raw)?,
        };
        debug!(scene_count = config.scenes.0.len(), "scene configuration loaded");
        Ok(config)
    }

    /// Returns configured scene names in cycle order.
    pub fn scene_names(&self) -> impl Iterator<Item = &str> {
        self.scenes.0.iter().map(|(name, _)| name.as_str())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scenes.0.is_empty() {
            return Err(ConfigError::NoScenes);
        }

        let mut seen = HashSet::with_capacity(self.scenes.0.len());
        for (name, _) in &self.scenes.0 {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptySceneName);
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateScene { name: name.clone() });
            }
        }
        Ok(())
    }

    /// Builds the scene table the controller walks.
    #[must_use]
    pub fn into_table(self) -> SceneTable {
        let null_scene = Scene::null(self.default);
        let scenes = self
            .scenes
            .0
            .into_iter()
            .map(|(name, commands)| Scene::new(name, commands))
            .collect();
        SceneTable::new(null_scene, scenes)
    }
}

/// Picks the configuration file: `explicit`, then `./scenes.json` or
/// `./scenes.toml`, then the same names in the per-user config directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Some(local) = first_existing(Path::new(".")) {
        return Ok(local);
    }

    let project_dirs =
        ProjectDirs::from("", "", env!("CARGO_PKG_NAME")).ok_or(ConfigError::NoConfigDirectory)?;
    let config_dir = project_dirs.config_dir();
    Ok(first_existing(config_dir)
        .unwrap_or_else(|| config_dir.join(ConfigFormat::Json.file_name())))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    ConfigFormat::ALL
        .into_iter()
        .map(|format| dir.join(format.file_name()))
        .find(|candidate| candidate.exists())
}
