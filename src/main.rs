// src/main.rs

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use mkrepo::config::RepoConfig;
use mkrepo::repository::{detect_format, update_repository, BuildOptions, UpdateOptions};
use mkrepo::signing::{GpgSigner, Signer};
use mkrepo::storage::{parse_s3_url, LocalStorage, Storage};
use tracing::{info, warn};

/// Unix seconds written into generated documents
///
/// `SOURCE_DATE_EPOCH` pins it for reproducible output.
fn generation_timestamp() -> Result<i64> {
    match std::env::var("SOURCE_DATE_EPOCH") {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid SOURCE_DATE_EPOCH: {}", value)),
        Err(_) => Ok(chrono::Utc::now().timestamp()),
    }
}

#[cfg(feature = "s3")]
fn open_s3(bucket: String, prefix: String, config: &RepoConfig) -> Result<Box<dyn Storage>> {
    use mkrepo::storage::{S3Options, S3Storage};

    let options = S3Options {
        bucket,
        prefix,
        endpoint: config.storage.endpoint.clone(),
        region: config.storage.region.clone(),
        access_key_id: config.storage.access_key_id.clone(),
        secret_access_key: config.storage.secret_access_key.clone(),
        public_read: config.storage.public_read,
    };
    Ok(Box::new(S3Storage::new(&options)?))
}

#[cfg(not(feature = "s3"))]
fn open_s3(bucket: String, _prefix: String, _config: &RepoConfig) -> Result<Box<dyn Storage>> {
    Err(anyhow::anyhow!(
        "Cannot open s3://{}: mkrepo was built without the `s3` feature",
        bucket
    ))
}

fn open_storage(path: &str, config: &RepoConfig) -> Result<Box<dyn Storage>> {
    if let Some((bucket, prefix)) = parse_s3_url(path) {
        return open_s3(bucket, prefix, config);
    }
    if path.starts_with("s3://") {
        return Err(anyhow::anyhow!("Invalid S3 location: {}", path));
    }

    std::fs::create_dir_all(&config.temp_dir).with_context(|| {
        format!("Failed to create temp directory {}", config.temp_dir.display())
    })?;
    Ok(Box::new(
        LocalStorage::new(path).with_staging_dir(&config.temp_dir),
    ))
}

fn update_path(
    path: &str,
    config: &RepoConfig,
    signer: Option<&dyn Signer>,
    options: &UpdateOptions,
) -> Result<()> {
    let storage = open_storage(path, config)?;

    let Some(format) = detect_format(storage.as_ref())? else {
        warn!("Unknown repository: {}", path);
        return Ok(());
    };

    info!("Updating {} repository: {}", format, path);
    let report = update_repository(storage.as_ref(), format, signer, options)
        .with_context(|| format!("Failed to update {}", path))?;

    if !report.malformed.is_empty() {
        warn!(
            "{} malformed packages skipped in {}",
            report.malformed.len(),
            path
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RepoConfig::load(path)?,
        None => RepoConfig::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    let signer = config
        .signing
        .enabled
        .then(|| GpgSigner::new(config.signing.key.clone()));

    let options = UpdateOptions {
        force: config.force,
        workers: config.effective_workers(),
        build: BuildOptions {
            generated_at: generation_timestamp()?,
            sign: signer.is_some(),
            primary_files: config.primary_file_rule()?,
            release: config.deb.release_info(),
        },
    };

    for path in &cli.paths {
        update_path(
            path,
            &config,
            signer.as_ref().map(|s| s as &dyn Signer),
            &options,
        )?;
    }

    Ok(())
}
