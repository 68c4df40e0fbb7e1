//! Sandboxed mod metadata extraction configuration.

use serde::{Deserialize, Serialize};

use super::default_true;

/// How package volumes are mounted into the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MountMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

/// A named volume (or host path) mounted into the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub source: String,
    pub target: String,
}

impl VolumeConfig {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Extraction pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Image providing the interpreter and serialization module.
    #[serde(default = "default_sandbox_image")]
    pub sandbox_image: String,

    /// Pull the sandbox image (and prune) before each refresh batch.
    #[serde(default = "default_true")]
    pub pull_sandbox_image: bool,

    #[serde(default = "default_volumes")]
    pub volumes: Vec<VolumeConfig>,

    #[serde(default)]
    pub mount_mode: MountMode,

    /// Candidate descriptor paths in priority order; `{id}` is the package id.
    #[serde(default = "default_descriptor_layouts")]
    pub descriptor_layouts: Vec<String>,

    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Module loaded by the probe snippet to serialize the schema value.
    #[serde(default = "default_serializer_module")]
    pub serializer_module: String,

    /// In-script variable holding the configuration schema.
    #[serde(default = "default_schema_variable")]
    pub schema_variable: String,

    /// Scratch directory inside the sandbox for probe scripts.
    #[serde(default = "default_script_dir")]
    pub script_dir: String,

    /// Upper bound for any single sandbox operation.
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,

    /// Cache database file; relative paths live under `data_dir`.
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            sandbox_image: default_sandbox_image(),
            pull_sandbox_image: true,
            volumes: default_volumes(),
            mount_mode: MountMode::default(),
            descriptor_layouts: default_descriptor_layouts(),
            interpreter: default_interpreter(),
            serializer_module: default_serializer_module(),
            schema_variable: default_schema_variable(),
            script_dir: default_script_dir(),
            timeout_secs: default_sandbox_timeout(),
            cache_file: default_cache_file(),
        }
    }
}

fn default_sandbox_image() -> String {
    "tidewatch/mod-sandbox".to_string()
}

fn default_volumes() -> Vec<VolumeConfig> {
    vec![
        VolumeConfig::new("dst-mods", "/dst/mods"),
        VolumeConfig::new("dst-ugc_mods", "/dst/ugc_mods"),
    ]
}

fn default_descriptor_layouts() -> Vec<String> {
    vec![
        "/dst/ugc_mods/content/322330/{id}/modinfo.lua".to_string(),
        "/dst/mods/workshop-{id}/modinfo.lua".to_string(),
    ]
}

fn default_interpreter() -> String {
    "lua".to_string()
}

fn default_serializer_module() -> String {
    "rapidjson".to_string()
}

fn default_schema_variable() -> String {
    "configuration_options".to_string()
}

fn default_script_dir() -> String {
    "/tmp".to_string()
}

fn default_sandbox_timeout() -> u64 {
    60
}

fn default_cache_file() -> String {
    "mods.sqlite".to_string()
}
