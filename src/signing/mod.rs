// src/signing/mod.rs

//! Detached and inline signatures for top-level index documents
//!
//! `repomd.xml` gets a detached armored signature (`repomd.xml.asc`). A DEB
//! `Release` gets both a detached signature (`Release.gpg`) and a clearsigned
//! copy (`InRelease`).

use crate::error::{Error, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

/// Produces signatures over document bytes
pub trait Signer: Send + Sync {
    /// Armored detached signature
    fn sign_detached(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Clearsigned copy of the document, if the signer supports it
    fn sign_inline(&self, _data: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Signer backed by the `gpg` command line tool
#[derive(Debug, Clone)]
pub struct GpgSigner {
    program: String,
    key: Option<String>,
}

impl GpgSigner {
    /// Sign with the default secret key, or with `key` when given
    pub fn new(key: Option<String>) -> Self {
        Self {
            program: "gpg".to_string(),
            key: key.filter(|k| !k.is_empty()),
        }
    }

    /// Use a different gpg binary (e.g. `gpg2`)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn args(&self, mode: &str) -> Vec<String> {
        let mut args = vec![
            "--batch".to_string(),
            "--yes".to_string(),
            "--armor".to_string(),
            "--digest-algo".to_string(),
            "SHA256".to_string(),
        ];
        if let Some(key) = &self.key {
            args.push("--local-user".to_string());
            args.push(key.clone());
        }
        args.push(mode.to_string());
        args
    }

    fn run(&self, mode: &str, data: &[u8]) -> Result<Vec<u8>> {
        let args = self.args(mode);
        debug!("Running {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::SigningFailure(format!("Failed to run {}: {}", self.program, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::SigningFailure("gpg stdin unavailable".to_string()))?;

        // feed stdin from a second thread so a large clearsign cannot fill
        // the stdout pipe while we are still writing
        let (output, written) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.write_all(data));
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (output, written)
        });
        let output =
            output.map_err(|e| Error::SigningFailure(format!("{} failed: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(Error::SigningFailure(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        written.map_err(|e| Error::SigningFailure(format!("Failed to feed {}: {}", self.program, e)))?;
        if output.stdout.is_empty() {
            return Err(Error::SigningFailure(format!("{} produced no signature", self.program)));
        }

        Ok(output.stdout)
    }
}

impl Signer for GpgSigner {
    fn sign_detached(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.run("--detach-sign", data)
    }

    fn sign_inline(&self, data: &[u8]) -> Result<Option<Vec<u8>>> {
        self.run("--clearsign", data).map(Some)
    }
}
