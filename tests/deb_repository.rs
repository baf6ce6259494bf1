// tests/deb_repository.rs

//! End-to-end runs over DEB repositories

mod common;

use common::{contents, deb, deb_with_control, dsc, FakeSigner};
use mkrepo::compression::{decompress, CompressionFormat};
use mkrepo::repository::debian::{self, ReleaseInfo};
use mkrepo::repository::{detect_format, update_repository, BuildOptions, UpdateOptions};
use mkrepo::signing::Signer;
use mkrepo::storage::{LocalStorage, MemoryStorage, Operation, Storage};
use mkrepo::{Error, RepoFormat};

const BIONIC_AMD64: &str = "dists/bionic/main/binary-amd64/Packages";

fn options(force: bool) -> UpdateOptions {
    UpdateOptions {
        force,
        workers: 2,
        build: BuildOptions {
            generated_at: 1_700_000_000,
            ..Default::default()
        },
    }
}

fn run(storage: &dyn Storage, force: bool) -> mkrepo::Result<mkrepo::UpdateReport> {
    update_repository(storage, RepoFormat::Deb, None, &options(force))
}

fn text(storage: &MemoryStorage, location: &str) -> String {
    String::from_utf8(storage.get(location).unwrap()).unwrap()
}

fn populated() -> MemoryStorage {
    let storage = MemoryStorage::new();
    storage.put("pool/bionic/main/h/hello_2.10-1_amd64.deb", &deb("hello", "2.10-1", "amd64"), 100);
    storage.put("pool/bionic/main/w/world_1.0-1_amd64.deb", &deb("world", "1.0-1", "amd64"), 100);
    storage.put("pool/xenial/main/h/hello_2.9-1_i386.deb", &deb("hello", "2.9-1", "i386"), 100);
    storage
}

#[test]
fn test_initial_index_layout() {
    let storage = populated();
    assert_eq!(detect_format(&storage).unwrap(), Some(RepoFormat::Deb));

    let report = run(&storage, false).unwrap();
    assert_eq!(report.indexed, 3);

    for location in [
        BIONIC_AMD64,
        "dists/bionic/main/binary-amd64/Packages.gz",
        "dists/bionic/Release",
        "dists/xenial/main/binary-i386/Packages",
        "dists/xenial/Release",
    ] {
        assert!(storage.get(location).is_some(), "missing {}", location);
    }
    assert!(storage.get("dists/bionic/Release.gpg").is_none());
    assert!(storage.get("dists/bionic/InRelease").is_none());

    let plain = storage.get(BIONIC_AMD64).unwrap();
    let gzip = storage.get("dists/bionic/main/binary-amd64/Packages.gz").unwrap();
    assert_eq!(decompress(&gzip, CompressionFormat::Gzip).unwrap(), plain);
    let bzip2 = storage.get("dists/bionic/main/binary-amd64/Packages.bz2").unwrap();
    assert_eq!(decompress(&bzip2, CompressionFormat::Bzip2).unwrap(), plain);
}

#[test]
fn test_packages_stanza_fields() {
    let storage = populated();
    run(&storage, false).unwrap();

    let packages = text(&storage, BIONIC_AMD64);
    let hello = packages
        .split("\n\n")
        .find(|stanza| stanza.starts_with("Package: hello"))
        .unwrap();
    assert!(hello.contains("Depends: libc6 (>= 2.14)\n"));
    assert!(hello.contains("Maintainer: Example <dev@example.org>\n"));
    assert!(hello.contains("Filename: pool/bionic/main/h/hello_2.10-1_amd64.deb\n"));
    assert!(hello.contains("FileTime: 100"));
    assert!(hello.contains("\nSHA256: "));
    assert!(hello.contains("\nMD5sum: "));
    assert!(hello.ends_with(" Longer description of hello."));

    let deb = storage.get("pool/bionic/main/h/hello_2.10-1_amd64.deb").unwrap();
    let sha1 = mkrepo::hash::hash_bytes(mkrepo::hash::HashAlgorithm::Sha1, &deb);
    assert!(hello.contains(&format!("\nSHA1: {}\n", sha1)));
}

#[test]
fn test_out_of_order_control_is_written_in_index_order() {
    let storage = MemoryStorage::new();
    let control = "Description: shuffled package\n \
Body text.\n\
Homepage: https://example.org\n\
Priority: optional\n\
Depends: libc6\n\
Installed-Size: 12\n\
Maintainer: Example <dev@example.org>\n\
Architecture: all\n\
Section: utils\n\
Version: 1.0-1\n\
Package: shuffled\n";
    storage.put("pool/bionic/main/s/shuffled_1.0-1_all.deb", &deb_with_control(control), 10);
    run(&storage, false).unwrap();

    let packages = text(&storage, "dists/bionic/main/binary-all/Packages");
    let keys: Vec<&str> = packages
        .lines()
        .filter(|l| !l.starts_with(' '))
        .filter_map(|l| l.split_once(':').map(|(k, _)| k))
        .collect();
    assert_eq!(
        keys,
        vec![
            "Package",
            "Version",
            "Architecture",
            "Maintainer",
            "Installed-Size",
            "Depends",
            "Section",
            "Priority",
            "Homepage",
            "Filename",
            "Size",
            "MD5sum",
            "SHA1",
            "SHA256",
            "FileTime",
            "Description",
        ]
    );
    assert!(packages.ends_with("Description: shuffled package\n Body text.\n"));

    // the order survives a read back of the published index
    let before = contents(&storage);
    let report = run(&storage, false).unwrap();
    assert_eq!(report.retained, 1);
    assert_eq!(contents(&storage), before);
}

#[test]
fn test_source_packages_index() {
    let storage = populated();
    storage.put("pool/bionic/main/h/hello_2.10-1.dsc", &dsc("hello", "2.10-1"), 100);
    let report = run(&storage, false).unwrap();
    assert_eq!(report.indexed, 4);

    let sources = text(&storage, "dists/bionic/main/source/Sources");
    assert!(sources.starts_with("Package: hello\nBinary: hello\nVersion: 2.10-1\n"));
    assert!(sources.contains("Directory: pool/bionic/main/h\n"));
    assert!(sources.contains("Filename: pool/bionic/main/h/hello_2.10-1.dsc\n"));
    assert!(!sources.contains("\nSource:"));

    let dsc_len = dsc("hello", "2.10-1").len();
    let sha256 = mkrepo::hash::sha256(&dsc("hello", "2.10-1"));
    assert!(sources.contains(&format!(" {} {} hello_2.10-1.dsc\n", sha256, dsc_len)));

    for suffix in ["gz", "bz2"] {
        assert!(storage.get(&format!("dists/bionic/main/source/Sources.{}", suffix)).is_some());
    }
    assert!(storage.get("dists/xenial/main/source/Sources").is_none());

    let release = text(&storage, "dists/bionic/Release");
    assert!(release.contains("Architectures: amd64\n"));
    assert!(release.contains("\nSHA1:\n "));
    assert!(release.contains(&format!(
        " {} {} main/source/Sources\n",
        mkrepo::hash::sha256(sources.as_bytes()),
        sources.len()
    )));

    let report = run(&storage, false).unwrap();
    assert_eq!(report.parsed, 0);
    assert_eq!(report.retained, 4);

    storage.delete("pool/bionic/main/h/hello_2.10-1.dsc").unwrap();
    let report = run(&storage, false).unwrap();
    assert_eq!(report.purged, 1);
    assert!(storage.get("dists/bionic/main/source/Sources").is_none());
    assert!(storage.get("dists/bionic/main/source/Sources.bz2").is_none());
}

#[test]
fn test_release_contents() {
    let storage = populated();
    let mut options = options(false);
    options.build.release = ReleaseInfo {
        origin: "Example".to_string(),
        label: "example".to_string(),
        description: "Example packages".to_string(),
    };
    update_repository(&storage, RepoFormat::Deb, None, &options).unwrap();

    let release = text(&storage, "dists/bionic/Release");
    assert!(release.starts_with("Origin: Example\nLabel: example\nCodename: bionic\n"));
    assert!(release.contains("Date: Tue, 14 Nov 2023 22:13:20 UTC\n"));
    assert!(release.contains("Architectures: amd64\n"));
    assert!(release.contains("Components: main\n"));

    let plain = storage.get(BIONIC_AMD64).unwrap();
    let sha256 = mkrepo::hash::sha256(&plain);
    assert!(release.contains(&format!(" {} {} main/binary-amd64/Packages\n", sha256, plain.len())));
}

#[test]
fn test_unchanged_input_is_idempotent() {
    let storage = populated();
    run(&storage, false).unwrap();
    let first = contents(&storage);

    let report = run(&storage, false).unwrap();
    assert_eq!(report.parsed, 0);
    assert_eq!(report.retained, 3);
    assert!(report.deleted.is_empty());
    assert_eq!(contents(&storage), first);
}

#[test]
fn test_touched_package_is_reparsed() {
    let storage = populated();
    run(&storage, false).unwrap();

    storage.set_modified("pool/bionic/main/w/world_1.0-1_amd64.deb", 200);
    let report = run(&storage, false).unwrap();
    assert_eq!(report.parsed, 1);
    assert_eq!(report.retained, 2);
    assert!(text(&storage, BIONIC_AMD64).contains("FileTime: 200"));
}

#[test]
fn test_emptied_dist_is_removed() {
    let storage = populated();
    run(&storage, false).unwrap();

    storage.delete("pool/xenial/main/h/hello_2.9-1_i386.deb").unwrap();
    let report = run(&storage, false).unwrap();
    assert_eq!(report.purged, 1);
    assert!(report.deleted.contains(&"dists/xenial/Release".to_string()));
    assert!(storage.get("dists/xenial/main/binary-i386/Packages").is_none());
    assert!(storage.get(BIONIC_AMD64).is_some());
}

#[test]
fn test_corrupt_package_with_force() {
    let storage = populated();
    storage.put("pool/xenial/main/b/broken_1.0_all.deb", b"!<arch>\ngarbage", 100);

    let err = run(&storage, false).unwrap_err();
    assert!(matches!(err, Error::MalformedPackage { .. }));
    assert!(storage.get("dists/xenial/Release").is_none());

    let report = run(&storage, true).unwrap();
    assert_eq!(report.indexed, 3);
    assert_eq!(
        text(&storage, &debian::malformed_list_location("xenial")),
        "pool/xenial/main/b/broken_1.0_all.deb\n"
    );
    assert!(storage.get(&debian::malformed_list_location("bionic")).is_none());

    storage.delete("pool/xenial/main/b/broken_1.0_all.deb").unwrap();
    run(&storage, true).unwrap();
    assert!(storage.get(&debian::malformed_list_location("xenial")).is_none());
}

#[test]
fn test_missing_control_fields_are_malformed() {
    let storage = MemoryStorage::new();
    storage.put("pool/main/x.deb", &deb_with_control("Package: x\nArchitecture: all\n"), 1);

    let err = run(&storage, false).unwrap_err();
    assert!(matches!(err, Error::MalformedPackage { .. }));
}

#[test]
fn test_signed_release_with_inline_signature() {
    let storage = populated();
    let signer = FakeSigner::with_inline();
    update_repository(&storage, RepoFormat::Deb, Some(&signer as &dyn Signer), &options(false))
        .unwrap();

    // detached and inline for each of the two dists
    assert_eq!(signer.calls(), 4);
    let release = storage.get("dists/bionic/Release").unwrap();
    assert_eq!(
        storage.get("dists/bionic/Release.gpg").unwrap(),
        format!("SIGNATURE {}\n", release.len()).into_bytes()
    );
    assert!(text(&storage, "dists/bionic/InRelease").starts_with("-----BEGIN FAKE SIGNED MESSAGE-----\n"));

    let order: Vec<String> = storage
        .operations()
        .into_iter()
        .filter_map(|op| match op {
            Operation::Write(location) => Some(location),
            Operation::Delete(_) => None,
        })
        .collect();
    let last_release = order.iter().rposition(|l| l.ends_with("/Release")).unwrap();
    let first_signature = order
        .iter()
        .position(|l| l.ends_with("/Release.gpg") || l.ends_with("/InRelease"))
        .unwrap();
    let last_packages = order.iter().rposition(|l| l.contains("/binary-")).unwrap();
    assert!(last_packages < last_release);
    assert!(last_release < first_signature);
}

#[test]
fn test_signer_without_inline_drops_old_inrelease() {
    let storage = populated();
    let inline = FakeSigner::with_inline();
    update_repository(&storage, RepoFormat::Deb, Some(&inline as &dyn Signer), &options(false))
        .unwrap();
    assert!(storage.get("dists/bionic/InRelease").is_some());

    let detached_only = FakeSigner::default();
    let report = update_repository(
        &storage,
        RepoFormat::Deb,
        Some(&detached_only as &dyn Signer),
        &options(false),
    )
    .unwrap();
    assert!(report.deleted.contains(&"dists/bionic/InRelease".to_string()));
    assert!(storage.get("dists/bionic/InRelease").is_none());
    assert!(storage.get("dists/bionic/Release.gpg").is_some());
}

#[test]
fn test_snapshot_reads_back_published_index() {
    let storage = populated();
    run(&storage, false).unwrap();

    let snapshot = debian::read_snapshot(&storage).unwrap();
    assert_eq!(snapshot.len(), 3);
    let hello = snapshot.get("pool/bionic/main/h/hello_2.10-1_amd64.deb").unwrap();
    assert_eq!(hello.identity.name, "hello");
    assert_eq!(hello.modified_at, 100);
    assert_eq!(hello.deb_details().unwrap().dist, "bionic");
}

#[test]
fn test_unparsable_index_is_inconsistent() {
    let storage = populated();
    storage.put(BIONIC_AMD64, b"Package: hello\nVersion: 1\n", 1);

    let err = run(&storage, false).unwrap_err();
    assert!(matches!(err, Error::InconsistentSnapshot(_)));
}

#[test]
fn test_local_storage_repository() {
    let dir = tempfile::tempdir().unwrap();
    let pool = dir.path().join("pool/bionic/main/h");
    std::fs::create_dir_all(&pool).unwrap();
    std::fs::write(pool.join("hello_2.10-1_amd64.deb"), deb("hello", "2.10-1", "amd64")).unwrap();

    let storage = LocalStorage::new(dir.path());
    assert_eq!(detect_format(&storage).unwrap(), Some(RepoFormat::Deb));

    run(&storage, false).unwrap();
    assert!(dir.path().join(BIONIC_AMD64).is_file());
    assert!(dir.path().join("dists/bionic/Release").is_file());

    let report = run(&storage, false).unwrap();
    assert_eq!(report.retained, 1);
}
