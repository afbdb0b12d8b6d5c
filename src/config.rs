use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::trend::BaselinePolicy;

/// Optional TOML config. Every field falls back to a default when absent.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub data_dir: Option<String>,
    pub output_dir: Option<String>,
    pub sample_dir: Option<String>,
    pub baseline_policy: Option<BaselinePolicy>,
    /// Show id to display title.
    pub shows: Option<BTreeMap<String, String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub sample_dir: PathBuf,
    pub baseline_policy: BaselinePolicy,
    pub shows: BTreeMap<String, String>,
}

impl AppConfig {
    pub fn resolve(file_config: Option<FileConfig>) -> Self {
        let file = file_config.unwrap_or_default();

        AppConfig {
            data_dir: file.data_dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            output_dir: file
                .output_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            sample_dir: file
                .sample_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/sample")),
            baseline_policy: file.baseline_policy.unwrap_or_default(),
            shows: file.shows.unwrap_or_else(default_shows),
        }
    }

    pub fn input_dir(&self, sample: bool) -> &Path {
        if sample {
            &self.sample_dir
        } else {
            &self.data_dir
        }
    }

    /// Where output tables live: the command-line override, else `output_dir`.
    pub fn output_dir_or(&self, out_dir: Option<PathBuf>) -> PathBuf {
        out_dir.unwrap_or_else(|| self.output_dir.clone())
    }

    pub fn show_ids(&self) -> Vec<String> {
        self.shows.keys().cloned().collect()
    }

    pub fn title<'a>(&'a self, show_id: &'a str) -> &'a str {
        self.shows.get(show_id).map(String::as_str).unwrap_or(show_id)
    }
}

fn default_shows() -> BTreeMap<String, String> {
    [
        ("tt0096697", "The Simpsons"),
        ("tt0206512", "SpongeBob SquarePants"),
        ("tt0182576", "Family Guy"),
        ("tt1520211", "The Walking Dead"),
    ]
    .into_iter()
    .map(|(id, title)| (id.to_string(), title.to_string()))
    .collect()
}
