//! Id-keyed record store and the staging queue for unlinked records.

use super::errors::{Error, Result};
use super::record::{VersionId, VersionRecord};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// Associative container owning every live record.
///
/// Point operations are O(1) expected. Forest pointers into a record must
/// be unlinked by the caller before the record is removed.
#[derive(Debug, Default)]
pub(super) struct VersionStore {
    records: FxHashMap<VersionId, VersionRecord>,
}

impl VersionStore {
    pub fn get(&self, id: VersionId) -> Option<&VersionRecord> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: VersionId) -> Option<&mut VersionRecord> {
        self.records.get_mut(&id)
    }

    pub fn contains(&self, id: VersionId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn insert(&mut self, record: VersionRecord) -> Result<()> {
        if self.records.contains_key(&record.id) {
            return Err(Error::InvalidArgument("version id already present"));
        }
        self.records.insert(record.id, record);
        Ok(())
    }

    pub fn remove(&mut self, id: VersionId) -> Result<VersionRecord> {
        self.records.remove(&id).ok_or(Error::NotFound(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates in unspecified order. Callers hold the global lock for the
    /// duration.
    pub fn iter(&self) -> impl Iterator<Item = &VersionRecord> {
        self.records.values()
    }
}

/// Staging list of records whose parent linkage is still pending.
///
/// Push is front-insertion. The processor re-pushes a record to the front
/// before chasing its unlinked parent, which bounds total linkage work to
/// O(n). An entry whose record has become linked by the time it is popped
/// is skipped by the processor.
#[derive(Debug, Default)]
pub(super) struct InitQueue {
    pending: VecDeque<VersionId>,
}

impl InitQueue {
    pub fn push_front(&mut self, id: VersionId) {
        self.pending.push_front(id);
    }

    pub fn pop_front(&mut self) -> Option<VersionId> {
        self.pending.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
