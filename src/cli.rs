// src/cli.rs
//! CLI definitions for mkrepo
//!
//! Flags mirror the configuration file; anything given here overrides it.

use clap::Parser;
use mkrepo::config::RepoConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mkrepo")]
#[command(author, version)]
#[command(about = "Create or update RPM and DEB repository metadata", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory used to store temporary artifacts (default: .mkrepo)
    #[arg(long, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Access key for connecting to S3
    #[arg(long)]
    pub s3_access_key_id: Option<String>,

    /// Secret key for connecting to S3
    #[arg(long)]
    pub s3_secret_access_key: Option<String>,

    /// Endpoint for S3-compatible services (default: AWS)
    #[arg(long, value_name = "URL")]
    pub s3_endpoint: Option<String>,

    /// S3 region name
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Make files uploaded to S3 readable by anonymous users
    #[arg(long)]
    pub s3_public_read: bool,

    /// Sign repository metadata with gpg
    #[arg(long)]
    pub sign: bool,

    /// gpg key used for signing (default key when unset)
    #[arg(long, env = "GPG_SIGN_KEY", value_name = "KEY")]
    pub sign_key: Option<String>,

    /// Skip malformed packages and list them in malformed_list.txt
    /// instead of stopping at the first one
    #[arg(long)]
    pub force: bool,

    /// Number of threads decoding packages (default: one per CPU)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Origin field of DEB Release files
    #[arg(long, env = "MKREPO_DEB_ORIGIN")]
    pub deb_origin: Option<String>,

    /// Label field of DEB Release files
    #[arg(long, env = "MKREPO_DEB_LABEL")]
    pub deb_label: Option<String>,

    /// Description field of DEB Release files
    #[arg(long, env = "MKREPO_DEB_DESCRIPTION")]
    pub deb_description: Option<String>,

    /// Repositories to scan, either s3://bucket/prefix or a local path
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<String>,
}

impl Cli {
    /// Overlay command line values onto a loaded configuration
    pub fn apply(&self, config: &mut RepoConfig) {
        if let Some(dir) = &self.temp_dir {
            config.temp_dir = dir.clone();
        }
        if let Some(key) = &self.s3_access_key_id {
            config.storage.access_key_id = Some(key.clone());
        }
        if let Some(secret) = &self.s3_secret_access_key {
            config.storage.secret_access_key = Some(secret.clone());
        }
        if let Some(endpoint) = &self.s3_endpoint {
            config.storage.endpoint = Some(endpoint.clone());
        }
        if let Some(region) = &self.s3_region {
            config.storage.region = region.clone();
        }
        config.storage.public_read |= self.s3_public_read;

        config.signing.enabled |= self.sign;
        if let Some(key) = &self.sign_key {
            config.signing.key = Some(key.clone());
        }

        config.force |= self.force;
        if let Some(workers) = self.workers {
            config.workers = workers;
        }

        if let Some(origin) = &self.deb_origin {
            config.deb.origin = origin.clone();
        }
        if let Some(label) = &self.deb_label {
            config.deb.label = label.clone();
        }
        if let Some(description) = &self.deb_description {
            config.deb.description = description.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_paths_required() {
        assert!(Cli::try_parse_from(["mkrepo"]).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "mkrepo",
            "--force",
            "--sign",
            "--workers",
            "2",
            "--temp-dir",
            "/tmp/stage",
            "--s3-region",
            "eu-central-1",
            "--s3-public-read",
            "--deb-origin",
            "Example",
            "s3://bucket/repo",
            "/srv/repo",
        ])
        .unwrap();
        assert_eq!(cli.paths, vec!["s3://bucket/repo", "/srv/repo"]);

        let mut config = RepoConfig::default();
        cli.apply(&mut config);
        assert!(config.force);
        assert!(config.signing.enabled);
        assert_eq!(config.workers, 2);
        assert_eq!(config.temp_dir, PathBuf::from("/tmp/stage"));
        assert_eq!(config.storage.region, "eu-central-1");
        assert!(config.storage.public_read);
        assert_eq!(config.deb.origin, "Example");
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let cli = Cli::try_parse_from(["mkrepo", "repo"]).unwrap();
        let mut config = RepoConfig::parse("force = true\nworkers = 7\n").unwrap();
        cli.apply(&mut config);
        assert!(config.force);
        assert_eq!(config.workers, 7);
    }
}
