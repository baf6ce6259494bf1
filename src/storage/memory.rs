// src/storage/memory.rs

//! In-process storage
//!
//! Keeps objects in a map and records every mutation, which makes it the
//! backend of choice for dry runs and for asserting publish order in tests.

use super::{validate_location, FileInfo, Storage};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// A mutation applied to a `MemoryStorage`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Write(String),
    Delete(String),
}

#[derive(Debug, Clone)]
struct Object {
    data: Vec<u8>,
    modified_at: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<String, Object>>,
    operations: Mutex<Vec<Operation>>,
    /// Timestamp stamped on objects written through `Storage::write`
    clock: AtomicI64,
    unavailable: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object without recording an operation
    pub fn put(&self, location: &str, data: &[u8], modified_at: i64) {
        if let Ok(mut objects) = self.objects() {
            objects.insert(
                location.trim_start_matches('/').to_string(),
                Object {
                    data: data.to_vec(),
                    modified_at,
                },
            );
        }
    }

    /// Change the modification time of an existing object
    pub fn set_modified(&self, location: &str, modified_at: i64) -> bool {
        match self.objects() {
            Ok(mut objects) => match objects.get_mut(location) {
                Some(object) => {
                    object.modified_at = modified_at;
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Set the modification time given to subsequent writes
    pub fn set_clock(&self, now: i64) {
        self.clock.store(now, Ordering::SeqCst);
    }

    /// Make every call fail with `StorageUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn get(&self, location: &str) -> Option<Vec<u8>> {
        self.objects().ok()?.get(location).map(|o| o.data.clone())
    }

    pub fn locations(&self) -> Vec<String> {
        self.objects()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Mutations applied so far, oldest first
    pub fn operations(&self) -> Vec<Operation> {
        self.operations.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    pub fn clear_operations(&self) {
        if let Ok(mut ops) = self.operations.lock() {
            ops.clear();
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::StorageUnavailable("memory storage offline".to_string()));
        }
        Ok(())
    }

    fn objects(&self) -> Result<MutexGuard<'_, BTreeMap<String, Object>>> {
        self.objects
            .lock()
            .map_err(|_| Error::StorageUnavailable("memory storage lock poisoned".to_string()))
    }

    fn record(&self, op: Operation) -> Result<()> {
        self.operations
            .lock()
            .map_err(|_| Error::StorageUnavailable("memory storage lock poisoned".to_string()))?
            .push(op);
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn list(&self, prefix: &str) -> Result<Vec<FileInfo>> {
        self.check_available()?;
        let prefix = prefix.trim_start_matches('/');
        Ok(self
            .objects()?
            .iter()
            .filter(|(location, _)| location.starts_with(prefix))
            .map(|(location, object)| FileInfo {
                location: location.clone(),
                modified_at: object.modified_at,
                size: object.data.len() as u64,
            })
            .collect())
    }

    fn read(&self, location: &str) -> Result<Vec<u8>> {
        self.check_available()?;
        let location = validate_location(location)?;
        self.objects()?
            .get(location)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFoundError(location.to_string()))
    }

    fn write(&self, location: &str, data: &[u8]) -> Result<()> {
        self.check_available()?;
        let location = validate_location(location)?;
        self.objects()?.insert(
            location.to_string(),
            Object {
                data: data.to_vec(),
                modified_at: self.clock.load(Ordering::SeqCst),
            },
        );
        self.record(Operation::Write(location.to_string()))
    }

    fn delete(&self, location: &str) -> Result<()> {
        self.check_available()?;
        let location = validate_location(location)?;
        self.objects()?.remove(location);
        self.record(Operation::Delete(location.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_is_not_recorded() {
        let storage = MemoryStorage::new();
        storage.put("Packages/a.rpm", b"rpm", 100);
        assert!(storage.operations().is_empty());

        let listing = storage.list("Packages/").unwrap();
        assert_eq!(
            listing,
            vec![FileInfo {
                location: "Packages/a.rpm".to_string(),
                modified_at: 100,
                size: 3,
            }]
        );
    }

    #[test]
    fn test_mutations_are_recorded_in_order() {
        let storage = MemoryStorage::new();
        storage.set_clock(7);
        storage.write("b", b"2").unwrap();
        storage.write("a", b"1").unwrap();
        storage.delete("b").unwrap();

        assert_eq!(
            storage.operations(),
            vec![
                Operation::Write("b".to_string()),
                Operation::Write("a".to_string()),
                Operation::Delete("b".to_string()),
            ]
        );
        assert_eq!(storage.locations(), vec!["a".to_string()]);
        assert_eq!(storage.list("").unwrap()[0].modified_at, 7);
    }

    #[test]
    fn test_set_modified() {
        let storage = MemoryStorage::new();
        storage.put("x", b"", 1);
        assert!(storage.set_modified("x", 2));
        assert!(!storage.set_modified("y", 2));
        assert_eq!(storage.list("x").unwrap()[0].modified_at, 2);
    }

    #[test]
    fn test_unavailable() {
        let storage = MemoryStorage::new();
        storage.set_unavailable(true);
        assert!(matches!(storage.list(""), Err(Error::StorageUnavailable(_))));
        assert!(matches!(storage.write("a", b""), Err(Error::StorageUnavailable(_))));
    }

    #[test]
    fn test_read_missing() {
        let storage = MemoryStorage::new();
        assert!(matches!(storage.read("missing"), Err(Error::NotFoundError(_))));
    }
}
