// src/repository/sync.rs

//! Repository update pass
//!
//! One call to [`update_repository`] reads the published index, decides what
//! changed on storage, decodes new and touched packages on a worker pool,
//! builds the complete document set (signatures included) and only then
//! publishes it. A failure before publishing leaves storage untouched.

use crate::error::{Error, Result};
use crate::packages::deb::dist_from_location;
use crate::packages::{decoder_for, PackageRecord, PackageSource, RepoFormat};
use crate::repository::debian::{self, DISTS_PREFIX};
use crate::repository::documents::{BuildOptions, Document, IndexDocuments};
use crate::repository::reconcile::{plan, ReconcilePlan};
use crate::repository::repodata::{self, REPODATA_PREFIX};
use crate::repository::snapshot::RepositorySnapshot;
use crate::signing::Signer;
use crate::storage::{FileInfo, Storage};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Malformed list of an RPM repository
pub const RPM_MALFORMED_LIST: &str = "malformed_list.txt";

/// Settings for one update pass
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Skip malformed packages instead of aborting
    pub force: bool,
    /// Decoder threads
    pub workers: usize,
    pub build: BuildOptions,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            force: false,
            workers: default_workers(),
            build: BuildOptions::default(),
        }
    }
}

/// Number of decoder threads when none is configured
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Outcome of a successful pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub parsed: usize,
    pub retained: usize,
    pub purged: usize,
    /// Packages in the published index
    pub indexed: usize,
    /// Packages left out because they could not be decoded
    pub malformed: Vec<String>,
    /// Packages left out because a later file has the same identity
    pub duplicates: Vec<String>,
    /// Locations written, in publish order
    pub written: Vec<String>,
    /// Locations deleted, in publish order
    pub deleted: Vec<String>,
}

/// Malformed list writes and deletions for one pass
#[derive(Debug, Default)]
struct MalformedLists {
    write: Vec<Document>,
    delete: Vec<String>,
}

fn package_prefix(format: RepoFormat) -> &'static str {
    match format {
        RepoFormat::Rpm => "",
        RepoFormat::Deb => "pool/",
    }
}

fn index_prefix(format: RepoFormat) -> &'static str {
    match format {
        RepoFormat::Rpm => REPODATA_PREFIX,
        RepoFormat::Deb => DISTS_PREFIX,
    }
}

/// Read the snapshot of the published index
pub fn read_snapshot(storage: &dyn Storage, format: RepoFormat) -> Result<RepositorySnapshot> {
    match format {
        RepoFormat::Rpm => repodata::read_snapshot(storage),
        RepoFormat::Deb => debian::read_snapshot(storage),
    }
}

/// Build the index documents of a format
pub fn build_documents(
    format: RepoFormat,
    records: &[PackageRecord],
    previous: &[String],
    options: &BuildOptions,
) -> Result<IndexDocuments> {
    match format {
        RepoFormat::Rpm => repodata::build(records, previous, options),
        RepoFormat::Deb => debian::build(records, previous, options),
    }
}

/// Identity scope: the whole repository for RPM, one distribution for DEB
fn partition_of(record: &PackageRecord) -> &str {
    record.deb_details().map(|d| d.dist.as_str()).unwrap_or("")
}

/// Keep one record per identity and partition; the later location wins
///
/// Returns the kept records in location order and the locations dropped.
pub fn dedup_identities(mut records: Vec<PackageRecord>) -> (Vec<PackageRecord>, Vec<String>) {
    records.sort_by(|a, b| a.location.cmp(&b.location));

    let mut kept: Vec<Option<PackageRecord>> = Vec::with_capacity(records.len());
    let mut seen: HashMap<(String, String), usize> = HashMap::new();
    let mut duplicates = Vec::new();

    for record in records {
        let key = (partition_of(&record).to_string(), record.identity.to_string());
        if let Some(&index) = seen.get(&key) {
            if let Some(earlier) = kept[index].take() {
                warn!(
                    "{} has the same identity {} as {}, keeping the latter",
                    earlier.location, key.1, record.location
                );
                duplicates.push(earlier.location);
            }
        }
        seen.insert(key, kept.len());
        kept.push(Some(record));
    }

    (kept.into_iter().flatten().collect(), duplicates)
}

fn decode_all(
    storage: &dyn Storage,
    format: RepoFormat,
    plan: &ReconcilePlan,
    workers: usize,
) -> Result<Vec<(String, Result<PackageRecord>)>> {
    let decoder = decoder_for(format);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| Error::InitError(format!("Failed to start decoder pool: {}", e)))?;

    let results: Vec<(String, Result<PackageRecord>)> = pool.install(|| {
        plan.to_parse
            .par_iter()
            .map(|task| {
                let location = task.file.location.clone();
                let result = storage.read(&location).and_then(|data| {
                    decoder.decode(&PackageSource {
                        location: &location,
                        modified_at: task.file.modified_at,
                        data: &data,
                    })
                });
                (location, result)
            })
            .collect()
    });
    Ok(results)
}

fn malformed_list(locations: &[&String]) -> Vec<u8> {
    let mut text = String::new();
    for location in locations {
        text.push_str(location);
        text.push('\n');
    }
    text.into_bytes()
}

fn malformed_lists(
    storage: &dyn Storage,
    format: RepoFormat,
    rejected: &BTreeSet<String>,
    index_listing: &[FileInfo],
) -> Result<MalformedLists> {
    let mut lists = MalformedLists::default();

    match format {
        RepoFormat::Rpm => {
            if rejected.is_empty() {
                if storage.exists(RPM_MALFORMED_LIST)? {
                    lists.delete.push(RPM_MALFORMED_LIST.to_string());
                }
            } else {
                let locations: Vec<&String> = rejected.iter().collect();
                lists.write.push(Document::data(RPM_MALFORMED_LIST, malformed_list(&locations)));
            }
        }
        RepoFormat::Deb => {
            let mut by_dist: BTreeMap<&str, Vec<&String>> = BTreeMap::new();
            for location in rejected {
                by_dist.entry(dist_from_location(location)).or_default().push(location);
            }
            for (dist, locations) in &by_dist {
                lists.write.push(Document::data(
                    debian::malformed_list_location(dist),
                    malformed_list(locations),
                ));
            }

            let written: BTreeSet<&str> = lists.write.iter().map(|d| d.location.as_str()).collect();
            lists.delete = index_listing
                .iter()
                .map(|f| f.location.as_str())
                .filter(|l| l.ends_with("/malformed_list.txt") && l.matches('/').count() == 2)
                .filter(|l| !written.contains(l))
                .map(str::to_string)
                .collect();
        }
    }

    Ok(lists)
}

/// Compute signatures for every top-level document
///
/// Returns the signature documents and the inline signature locations the
/// signer could not produce.
fn sign_documents(signer: &dyn Signer, documents: &IndexDocuments) -> Result<(Vec<Document>, Vec<String>)> {
    let mut signatures = Vec::new();
    let mut unsupported = Vec::new();

    for document in documents.top_level() {
        if let Some(location) = &document.detached_signature {
            let signature = signer.sign_detached(&document.data)?;
            signatures.push(Document::data(location.clone(), signature));
        }
        if let Some(location) = &document.inline_signature {
            match signer.sign_inline(&document.data)? {
                Some(signed) => signatures.push(Document::data(location.clone(), signed)),
                None => unsupported.push(location.clone()),
            }
        }
        debug!("Signed {}", document.location);
    }

    Ok((signatures, unsupported))
}

/// Bring the index of one repository up to date with its packages
pub fn update_repository(
    storage: &dyn Storage,
    format: RepoFormat,
    signer: Option<&dyn Signer>,
    options: &UpdateOptions,
) -> Result<UpdateReport> {
    let mut snapshot = read_snapshot(storage, format)?;
    let decoder = decoder_for(format);
    let listing: Vec<FileInfo> = storage
        .list(package_prefix(format))?
        .into_iter()
        .filter(|f| decoder.accepts(&f.location))
        .collect();
    let index_listing = storage.list(index_prefix(format))?;

    let plan = plan(&snapshot, &listing);
    for task in &plan.to_parse {
        info!("{}: '{}'", task.reason, task.file.location);
    }
    for location in &plan.to_purge {
        info!("Purging: '{}'", location);
    }
    debug!(
        "{} to parse, {} retained, {} purged",
        plan.to_parse.len(),
        plan.to_retain.len(),
        plan.to_purge.len()
    );

    let mut records: Vec<PackageRecord> = plan
        .to_retain
        .iter()
        .filter_map(|location| snapshot.remove(location))
        .collect();

    let mut malformed = Vec::new();
    for (location, result) in decode_all(storage, format, &plan, options.workers)? {
        match result {
            Ok(record) => records.push(record),
            Err(e) if e.is_recoverable() && options.force => {
                warn!("Skipping malformed package: {}", e);
                malformed.push(location);
            }
            Err(e) => return Err(e),
        }
    }

    let (records, duplicates) = dedup_identities(records);
    let rejected: BTreeSet<String> = malformed.iter().chain(&duplicates).cloned().collect();

    let build = BuildOptions {
        sign: signer.is_some(),
        ..options.build.clone()
    };
    let previous: Vec<String> = index_listing.iter().map(|f| f.location.clone()).collect();
    let documents = build_documents(format, &records, &previous, &build)?;

    let (signatures, unsigned_inline) = match signer {
        Some(signer) => sign_documents(signer, &documents)?,
        None => (Vec::new(), Vec::new()),
    };
    let lists = malformed_lists(storage, format, &rejected, &index_listing)?;

    let mut stale = documents.stale.clone();
    stale.extend(unsigned_inline.into_iter().filter(|l| previous.contains(l)));

    // publish: data, top-level, signatures, malformed lists, stale files
    let mut report = UpdateReport {
        parsed: plan.to_parse.len() - malformed.len(),
        retained: plan.to_retain.len(),
        purged: plan.to_purge.len(),
        indexed: records.len(),
        malformed,
        duplicates,
        ..Default::default()
    };

    for document in documents.documents.iter().chain(&signatures).chain(&lists.write) {
        storage.write(&document.location, &document.data)?;
        report.written.push(document.location.clone());
    }
    for location in lists.delete.iter().chain(&stale) {
        storage.delete(location)?;
        info!("Deleted stale {}", location);
        report.deleted.push(location.clone());
    }

    info!(
        "Updated {} repository {}: {} packages indexed ({} parsed, {} retained, {} purged, {} malformed)",
        format,
        storage.name(),
        report.indexed,
        report.parsed,
        report.retained,
        report.purged,
        report.malformed.len()
    );

    Ok(report)
}
