// src/dependencies/mod.rs

//! Dependency normalization for index documents
//!
//! Index documents carry the declarative relationships of each package after
//! a cleanup pass:
//! - requirements satisfied by the package itself are dropped
//! - file requirements satisfied by any package of the repository are dropped
//! - `rpmlib(...)` features are dropped
//! - repeated requirements on one capability collapse to the strictest one
//!
//! # Example
//!
//! ```
//! use mkrepo::dependencies::{collapse_requires, ProvidedFiles};
//! use mkrepo::packages::Dependency;
//! use mkrepo::version::{Comparator, RpmVersion};
//!
//! let requires = vec![
//!     Dependency::versioned("libc.so.6", Comparator::Ge, RpmVersion::parse("2.5").unwrap()),
//!     Dependency::versioned("libc.so.6", Comparator::Ge, RpmVersion::parse("2.17").unwrap()),
//! ];
//! let collapsed = collapse_requires(requires);
//! assert_eq!(collapsed.len(), 1);
//! assert_eq!(collapsed[0].to_string(), "libc.so.6 >= 2.17");
//! ```

use crate::packages::{Dependency, PackageRecord};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Every file path shipped by any record of one run
#[derive(Debug, Clone, Default)]
pub struct ProvidedFiles {
    paths: HashSet<String>,
}

impl ProvidedFiles {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a PackageRecord>) -> Self {
        let paths = records
            .into_iter()
            .flat_map(|record| record.files.iter().map(|f| f.path.clone()))
            .collect();
        Self { paths }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Final relationship lists of one record, each sorted by capability name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedDependencies {
    pub provides: Vec<Dependency>,
    pub requires: Vec<Dependency>,
    pub conflicts: Vec<Dependency>,
    pub obsoletes: Vec<Dependency>,
}

/// Normalize the relationships of `record` against the run's file index
pub fn normalize(record: &PackageRecord, provided: &ProvidedFiles) -> NormalizedDependencies {
    let own_provides: HashSet<&str> = record.provides.iter().map(|d| d.name.as_str()).collect();
    let own_files: HashSet<&str> = record.files.iter().map(|f| f.path.as_str()).collect();

    let requires = record
        .requires
        .iter()
        .filter(|dep| !dep.name.starts_with("rpmlib("))
        .filter(|dep| !own_provides.contains(dep.name.as_str()))
        .filter(|dep| {
            !(dep.is_path()
                && (own_files.contains(dep.name.as_str()) || provided.contains(&dep.name)))
        })
        .cloned()
        .collect();

    NormalizedDependencies {
        provides: dedup_sorted(&record.provides),
        requires: collapse_requires(requires),
        conflicts: dedup_sorted(&record.conflicts),
        obsoletes: dedup_sorted(&record.obsoletes),
    }
}

/// Whether `candidate` should replace `current` for the same capability
fn outranks(candidate: &Dependency, current: &Dependency) -> bool {
    match (candidate.is_versioned(), current.is_versioned()) {
        (true, false) => true,
        (false, _) => false,
        (true, true) => {
            let order = match (&candidate.version, &current.version) {
                (Some(a), Some(b)) => a.compare(b),
                _ => Ordering::Equal,
            };
            match order {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => {
                    let rank = |d: &Dependency| d.comparator.map(|c| c.restrictiveness()).unwrap_or(0);
                    rank(candidate) > rank(current)
                }
            }
        }
    }
}

/// Keep one requirement per capability name, highest version first
///
/// Unversioned entries lose to versioned ones; at equal versions the more
/// restrictive operator wins. The `pre` marker survives if any entry had it.
pub fn collapse_requires(requires: Vec<Dependency>) -> Vec<Dependency> {
    let mut collapsed: Vec<Dependency> = Vec::with_capacity(requires.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for dep in requires {
        match index.get(&dep.name) {
            Some(&i) => {
                let pre = collapsed[i].pre || dep.pre;
                if outranks(&dep, &collapsed[i]) {
                    collapsed[i] = dep;
                }
                collapsed[i].pre = pre;
            }
            None => {
                index.insert(dep.name.clone(), collapsed.len());
                collapsed.push(dep);
            }
        }
    }

    collapsed.sort_by(|a, b| a.name.cmp(&b.name));
    collapsed
}

/// Remove exact duplicates, then sort by name keeping declaration order
fn dedup_sorted(deps: &[Dependency]) -> Vec<Dependency> {
    let mut unique: Vec<Dependency> = Vec::with_capacity(deps.len());
    for dep in deps {
        if !unique.contains(dep) {
            unique.push(dep.clone());
        }
    }
    unique.sort_by(|a, b| a.name.cmp(&b.name));
    unique
}
