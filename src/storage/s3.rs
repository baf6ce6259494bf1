// src/storage/s3.rs

//! S3-compatible object storage
//!
//! The engine is synchronous, so each call is driven to completion on a
//! private tokio runtime.

use super::{validate_location, FileInfo, Storage};
use crate::error::{Error, Result};
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use tokio::runtime::Runtime;
use tracing::debug;

/// Connection settings for an S3 bucket
#[derive(Debug, Clone, Default)]
pub struct S3Options {
    pub bucket: String,
    /// Key prefix the repository lives under
    pub prefix: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Upload objects with the `public-read` canned ACL
    pub public_read: bool,
}

pub struct S3Storage {
    bucket: Box<Bucket>,
    prefix: String,
    runtime: Runtime,
    name: String,
}

fn unavailable(e: S3Error) -> Error {
    Error::StorageUnavailable(e.to_string())
}

impl S3Storage {
    pub fn new(options: &S3Options) -> Result<Self> {
        let region = match &options.endpoint {
            Some(endpoint) => Region::Custom {
                region: options.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => options
                .region
                .parse()
                .map_err(|e| Error::ConfigError(format!("Invalid S3 region '{}': {}", options.region, e)))?,
        };

        let credentials = match (&options.access_key_id, &options.secret_access_key) {
            (Some(key), Some(secret)) => Credentials::new(Some(key), Some(secret), None, None, None),
            _ => Credentials::default(),
        }
        .map_err(|e| Error::ConfigError(format!("Invalid S3 credentials: {}", e)))?;

        let mut bucket = Bucket::new(&options.bucket, region, credentials)
            .map_err(|e| Error::ConfigError(format!("Invalid S3 bucket '{}': {}", options.bucket, e)))?
            .with_path_style();
        if options.public_read {
            bucket.add_header("x-amz-acl", "public-read");
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::InitError(format!("Failed to start S3 runtime: {}", e)))?;

        let prefix = options.prefix.trim_matches('/').to_string();
        Ok(Self {
            name: format!("s3://{}/{}", options.bucket, prefix),
            bucket,
            prefix,
            runtime,
        })
    }

    fn key(&self, location: &str) -> String {
        if self.prefix.is_empty() {
            location.to_string()
        } else {
            format!("{}/{}", self.prefix, location)
        }
    }

    fn location<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            return key;
        }
        key.strip_prefix(self.prefix.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(key)
    }
}

impl Storage for S3Storage {
    fn name(&self) -> &str {
        &self.name
    }

    fn list(&self, prefix: &str) -> Result<Vec<FileInfo>> {
        let key_prefix = self.key(prefix.trim_start_matches('/'));
        let pages = self
            .runtime
            .block_on(self.bucket.list(key_prefix, None))
            .map_err(unavailable)?;

        let mut files: Vec<FileInfo> = pages
            .into_iter()
            .flat_map(|page| page.contents)
            .filter(|object| !object.key.ends_with('/'))
            .map(|object| FileInfo {
                location: self.location(&object.key).to_string(),
                modified_at: chrono::DateTime::parse_from_rfc3339(&object.last_modified)
                    .map(|t| t.timestamp())
                    .unwrap_or(0),
                size: object.size,
            })
            .collect();
        files.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(files)
    }

    fn read(&self, location: &str) -> Result<Vec<u8>> {
        let key = self.key(validate_location(location)?);
        let response = match self.runtime.block_on(self.bucket.get_object(&key)) {
            Ok(response) => response,
            Err(S3Error::HttpFailWithBody(404, _)) => return Err(Error::NotFoundError(key)),
            Err(e) => return Err(unavailable(e)),
        };
        match response.status_code() {
            200..=299 => Ok(response.bytes().to_vec()),
            404 => Err(Error::NotFoundError(key)),
            code => Err(Error::StorageUnavailable(format!("GET {} returned {}", key, code))),
        }
    }

    fn write(&self, location: &str, data: &[u8]) -> Result<()> {
        let key = self.key(validate_location(location)?);
        let response = self
            .runtime
            .block_on(self.bucket.put_object(&key, data))
            .map_err(unavailable)?;
        match response.status_code() {
            200..=299 => {
                debug!("Uploaded {} ({} bytes)", key, data.len());
                Ok(())
            }
            code => Err(Error::StorageUnavailable(format!("PUT {} returned {}", key, code))),
        }
    }

    fn delete(&self, location: &str) -> Result<()> {
        let key = self.key(validate_location(location)?);
        match self.runtime.block_on(self.bucket.delete_object(&key)) {
            Ok(response) if response.status_code() < 300 || response.status_code() == 404 => Ok(()),
            Ok(response) => Err(Error::StorageUnavailable(format!(
                "DELETE {} returned {}",
                key,
                response.status_code()
            ))),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(()),
            Err(e) => Err(unavailable(e)),
        }
    }
}
