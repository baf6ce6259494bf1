// src/config.rs
//! Configuration file parsing
//!
//! Supports TOML configuration files with the following sections:
//! - [storage] - S3 endpoint, region, credentials and upload ACL
//! - [signing] - Whether to sign and with which key
//! - [deb] - Release file metadata
//!
//! Top-level keys cover the run itself (`force`, `temp_dir`, `workers`,
//! `primary_files`). Command line flags override anything set here.

use crate::error::{Error, Result};
use crate::repository::debian::{ReleaseInfo, DEFAULT_RELEASE_FIELD};
use crate::repository::repodata::{PrimaryFileRule, DEFAULT_PRIMARY_PATTERNS};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_TEMP_DIR: &str = ".mkrepo";
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// TOML configuration file structure
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoConfig {
    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub signing: SigningSection,

    #[serde(default)]
    pub deb: DebSection,

    /// Skip malformed packages instead of aborting
    #[serde(default)]
    pub force: bool,

    /// Directory for staging local writes
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Decoder threads (0 = one per CPU)
    #[serde(default)]
    pub workers: usize,

    /// Regexes selecting the files listed in primary.xml
    #[serde(default = "default_primary_files")]
    pub primary_files: Vec<String>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            storage: StorageSection::default(),
            signing: SigningSection::default(),
            deb: DebSection::default(),
            force: false,
            temp_dir: default_temp_dir(),
            workers: 0,
            primary_files: default_primary_files(),
        }
    }
}

/// S3 storage section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    /// Custom endpoint for S3-compatible services
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Make uploaded objects world readable
    #[serde(default)]
    pub public_read: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
            public_read: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningSection {
    #[serde(default)]
    pub enabled: bool,

    /// gpg key id or user id (default key when unset)
    #[serde(default)]
    pub key: Option<String>,
}

/// Release metadata for DEB repositories
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebSection {
    #[serde(default = "default_release_field")]
    pub origin: String,

    #[serde(default = "default_release_field")]
    pub label: String,

    #[serde(default = "default_release_field")]
    pub description: String,
}

impl Default for DebSection {
    fn default() -> Self {
        Self {
            origin: default_release_field(),
            label: default_release_field(),
            description: default_release_field(),
        }
    }
}

impl DebSection {
    pub fn release_info(&self) -> ReleaseInfo {
        ReleaseInfo {
            origin: self.origin.clone(),
            label: self.label.clone(),
            description: self.description.clone(),
        }
    }
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from(DEFAULT_TEMP_DIR)
}

fn default_region() -> String {
    DEFAULT_S3_REGION.to_string()
}

fn default_release_field() -> String {
    DEFAULT_RELEASE_FIELD.to_string()
}

fn default_primary_files() -> Vec<String> {
    DEFAULT_PRIMARY_PATTERNS.iter().map(|p| p.to_string()).collect()
}

impl RepoConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: RepoConfig =
            toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.access_key_id.is_some() != self.storage.secret_access_key.is_some() {
            return Err(Error::ConfigError(
                "S3 access key id and secret access key must be set together".to_string(),
            ));
        }
        self.primary_file_rule()?;
        Ok(())
    }

    /// Compiled primary file predicate
    pub fn primary_file_rule(&self) -> Result<PrimaryFileRule> {
        PrimaryFileRule::new(&self.primary_files)
    }

    /// Worker count with 0 resolved to the CPU count
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            0 => crate::repository::sync::default_workers(),
            n => n,
        }
    }
}
