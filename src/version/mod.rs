//! The version-tree manager.
//!
//! A [VersionManager] owns a forest of versions rooted at id 0 and
//! guards it with a single ordering lock. Mutating operations stage
//! records on an init queue and end by running the processor, which
//! threads the records into the forest and reassigns DFS enter/exit
//! numbers. Ancestry tests and version comparison are O(1) against those
//! numbers.
//!
//! The metadata store and the presentation layer are external
//! collaborators, reached through the traits in [crate::metadata] and
//! [crate::report].

use crate::config::VersionManagerConfig;
use crate::metadata::{MetadataSink, MetadataSource, RecordOnDisk};
use crate::report::{NoopPresentation, Presentation, VersionMsg};
use crossbeam_channel::Sender;
use itertools::Itertools;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::cmp::Ordering;

pub mod errors;
mod processor;
mod record;
mod store;

pub use self::errors::{Error, Result};
pub use self::record::{DfsOrder, GroupId, ParentLink, VersionId, VersionInfo, VersionKind};

use self::processor::ProcessOutcome;
use self::record::VersionRecord;
use self::store::{InitQueue, VersionStore};

/// State guarded by the global ordering lock.
#[derive(Debug, Default)]
struct Inner {
    store: VersionStore,
    queue: InitQueue,
    /// Highest id handed out so far; `None` until the forest exists.
    max_allocated: Option<u32>,
}

impl Inner {
    /// Reserve the next id. Ids increase strictly, so creation order is
    /// observable through id order.
    fn allocate_id(&mut self) -> Result<VersionId> {
        let max = self
            .max_allocated
            .expect("id allocation before the forest was initialised");
        let next = max
            .checked_add(1)
            .filter(|&n| VersionId(n) != VersionId::INVALID)
            .ok_or(Error::OutOfMemory)?;
        self.max_allocated = Some(next);
        Ok(VersionId(next))
    }
}

/// The version-tree manager. Constructed once at startup; shared across
/// threads behind `Arc`.
pub struct VersionManager {
    inner: Mutex<Inner>,
    presentation: Box<dyn Presentation + Send + Sync>,
    report: Option<Sender<VersionMsg>>,
    config: VersionManagerConfig,
}

impl VersionManager {
    pub fn new(config: VersionManagerConfig) -> Self {
        VersionManager {
            inner: Mutex::new(Inner::default()),
            presentation: Box::new(NoopPresentation),
            report: None,
            config,
        }
    }

    /// Route presentation-layer registration through `presentation`.
    pub fn with_presentation(
        mut self,
        presentation: Box<dyn Presentation + Send + Sync>,
    ) -> Self {
        self.presentation = presentation;
        self
    }

    /// Attach a reporting channel for version events.
    pub fn with_report(mut self, tx: Sender<VersionMsg>) -> Self {
        self.set_report(tx);
        self
    }

    /// Set a reporting channel for version events.
    pub fn set_report(&mut self, tx: Sender<VersionMsg>) {
        self.report = Some(tx);
    }

    /// Create the root version of a fresh forest.
    ///
    /// May be called once per manager; fails with
    /// [Error::InvalidArgument] when the store already holds versions.
    pub fn zero_init(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.store.is_empty() {
            return Err(Error::InvalidArgument(
                "version store is already populated",
            ));
        }
        inner.store.insert(VersionRecord::root(GroupId::NONE, 0))?;
        inner.max_allocated = Some(0);
        inner.renumber();
        drop(inner);
        if let Err(err) = self.presentation.register(VersionId::ROOT) {
            warn!("presentation rejected the root version: {}", err);
        }
        info!("version forest initialised");
        Ok(())
    }

    /// Rebuild the forest from a metadata stream.
    ///
    /// The stream carries records in arbitrary order; id 0 becomes the
    /// root and everything else is staged for the processor. Fails on
    /// persistence errors, on a stream exceeding the live-version cap,
    /// and on a stream that contains no root.
    pub fn bootstrap_load(&self, source: &mut dyn MetadataSource) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.store.is_empty() {
            return Err(Error::InvalidArgument(
                "version store is already populated",
            ));
        }
        let mut max_seen: Option<u32> = None;
        while let Some(entry) = source.next_record()? {
            if inner.store.len() > self.config.max_versions {
                // Root plus `max_versions` descendants at most.
                return Err(Error::OutOfMemory);
            }
            let id = VersionId(entry.id);
            if id == VersionId::INVALID {
                warn!("skipping a record carrying the invalid id sentinel");
                continue;
            }
            if inner.store.contains(id) {
                warn!("skipping duplicate record for {}", id);
                continue;
            }
            if id.is_root() {
                inner
                    .store
                    .insert(VersionRecord::root(GroupId(entry.group), entry.size))?;
            } else {
                inner.store.insert(VersionRecord::new(
                    id,
                    VersionId(entry.parent),
                    VersionKind::Clone,
                    GroupId(entry.group),
                    entry.size,
                ))?;
                inner.queue.push_front(id);
            }
            max_seen = Some(max_seen.map_or(entry.id, |m| m.max(entry.id)));
        }
        source.close()?;
        if !inner.store.contains(VersionId::ROOT) {
            return Err(Error::InvalidArgument(
                "metadata stream contains no root version",
            ));
        }
        inner.max_allocated = max_seen;
        let loaded = inner.store.len();
        let outcome = inner.process();
        debug_assert!(inner.queue.is_empty());
        drop(inner);
        if let Err(err) = self.presentation.register(VersionId::ROOT) {
            warn!("presentation rejected the root version: {}", err);
        }
        self.register_staged(&outcome);
        info!("loaded {} versions from the metadata store", loaded);
        Ok(())
    }

    /// Create a new version under `parent`.
    ///
    /// Passing [GroupId::NONE] inherits the parent's group; a nonzero
    /// parent size overrides `size`. Fails with [Error::RuleViolation]
    /// when the snapshot/clone rules forbid the combination, leaving the
    /// forest and the id counter untouched.
    pub fn create(
        &self,
        kind: VersionKind,
        parent: VersionId,
        group: GroupId,
        size: u64,
    ) -> Result<VersionId> {
        let mut inner = self.inner.lock();
        if !inner.store.contains(parent) {
            return Err(Error::NotFound(parent));
        }
        let live = inner.store.len().saturating_sub(1);
        if live >= self.config.max_versions {
            warn!(
                "limit of {} live versions reached, refusing a new version under {}",
                self.config.max_versions, parent
            );
            return Err(Error::OverLimit {
                limit: self.config.max_versions,
            });
        }
        let previous_allocation = inner.max_allocated;
        let id = inner.allocate_id()?;
        inner
            .store
            .insert(VersionRecord::new(id, parent, kind, group, size))?;
        inner.queue.push_front(id);
        let outcome = inner.process();
        debug_assert!(inner.queue.is_empty());
        let linked = inner.store.get(id).map_or(false, |r| r.is_linked());
        if !linked {
            // The processor already discarded the record; hand the id back
            // too, rejections must not burn allocations.
            inner.max_allocated = previous_allocation;
            return Err(Error::RuleViolation(id));
        }
        drop(inner);
        self.register_staged(&outcome);
        self.send(VersionMsg::Created(id));
        debug!("created {} under {}", id, parent);
        Ok(id)
    }

    /// Bind `id` to a writer. At most one writer per version.
    pub fn attach(&self, id: VersionId) -> Result<()> {
        let mut inner = self.inner.lock();
        let record = inner.store.get_mut(id).ok_or(Error::NotFound(id))?;
        if record.attached {
            return Err(Error::Busy(id));
        }
        record.attached = true;
        debug!("attached {}", id);
        Ok(())
    }

    /// Release the writer bound to `id`.
    ///
    /// Panics when `id` is unknown or not attached; detaching what was
    /// never attached is a caller bug the manager cannot recover from.
    pub fn detach(&self, id: VersionId) {
        let mut inner = self.inner.lock();
        let record = inner
            .store
            .get_mut(id)
            .unwrap_or_else(|| panic!("detach of unknown version {}", id));
        assert!(record.attached, "detach of non-attached version {}", id);
        record.attached = false;
        debug!("detached {}", id);
    }

    /// Read-only projection of the current record state.
    pub fn info(&self, id: VersionId) -> Result<VersionInfo> {
        let inner = self.inner.lock();
        inner
            .store
            .get(id)
            .map(VersionInfo::of)
            .ok_or(Error::NotFound(id))
    }

    /// The domain group `id` belongs to.
    pub fn group_of(&self, id: VersionId) -> Result<GroupId> {
        let inner = self.inner.lock();
        inner
            .store
            .get(id)
            .map(|r| r.group)
            .ok_or(Error::NotFound(id))
    }

    /// Child ids of `id`, ordered by descending id.
    pub fn children(&self, id: VersionId) -> Result<Vec<VersionId>> {
        let inner = self.inner.lock();
        let record = inner.store.get(id).ok_or(Error::NotFound(id))?;
        let mut out = Vec::new();
        let mut child = record.first_child;
        while let Some(c) = child {
            out.push(c);
            child = inner.store.get(c).expect("broken child list").next_sibling;
        }
        Ok(out)
    }

    /// Remove `id` and every version below it, peeling leaves inward.
    ///
    /// Destroy events and presentation deregistration follow removal, in
    /// removal order. The root cannot be deleted. Panics when a version
    /// under the subtree is still attached.
    pub fn delete_subtree(&self, id: VersionId) -> Result<()> {
        let mut inner = self.inner.lock();
        if id.is_root() {
            return Err(Error::InvalidArgument("the forest root cannot be deleted"));
        }
        if !inner.store.contains(id) {
            return Err(Error::NotFound(id));
        }
        for member in inner.subtree_ids(id) {
            let record = inner.store.get(member).expect("subtree walk left the store");
            assert!(
                !record.attached,
                "deleting a subtree with attached version {}",
                member
            );
        }
        let mut destroyed = Vec::new();
        loop {
            let leaf = inner.first_leaf_below(id);
            inner.unlink_child(leaf);
            inner
                .store
                .remove(leaf)
                .expect("leaf vanished during deletion");
            destroyed.push(leaf);
            if leaf == id {
                break;
            }
        }
        inner.renumber();
        drop(inner);
        for &gone in &destroyed {
            if let Err(err) = self.presentation.deregister(gone) {
                panic!("presentation lost track of {}: {}", gone, err);
            }
            self.send(VersionMsg::Destroyed(gone));
        }
        debug!("deleted the subtree of {} ({} versions)", id, destroyed.len());
        Ok(())
    }

    /// Whether `ancestor` lies on the path from the root to `descendant`.
    ///
    /// Every version is an ancestor of itself. Returns `false` for
    /// unknown ids, so callers may probe deleted versions freely.
    pub fn is_ancestor(&self, ancestor: VersionId, descendant: VersionId) -> bool {
        let inner = self.inner.lock();
        let a = inner.store.get(ancestor).and_then(|r| r.order);
        let d = inner.store.get(descendant).and_then(|r| r.order);
        match (a, d) {
            (Some(a), Some(d)) => a.enter <= d.enter && d.enter <= a.exit,
            _ => false,
        }
    }

    /// Total order over live versions, compatible with pre-order
    /// traversal of the forest.
    pub fn compare(&self, a: VersionId, b: VersionId) -> Result<Ordering> {
        let inner = self.inner.lock();
        let enter = |id: VersionId| -> Result<u32> {
            inner
                .store
                .get(id)
                .ok_or(Error::NotFound(id))?
                .order
                .map(|o| o.enter)
                .ok_or(Error::InvalidArgument("version is not linked yet"))
        };
        Ok(enter(a)?.cmp(&enter(b)?))
    }

    /// The id the next creation would be handed.
    pub fn next_id(&self) -> VersionId {
        let inner = self.inner.lock();
        inner
            .max_allocated
            .map_or(VersionId::ROOT, |m| VersionId(m + 1))
    }

    /// Number of live versions, the root included.
    pub fn len(&self) -> usize {
        self.inner.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().store.is_empty()
    }

    /// Serialize every live record into `sink`, exactly once each.
    ///
    /// The lock is dropped across each `append` so lookups can proceed
    /// while the metadata store blocks on I/O; writeback itself performs
    /// no mutation, so readers observe a consistent forest throughout.
    pub fn writeback(&self, sink: &mut dyn MetadataSink) -> Result<()> {
        let ids: Vec<VersionId> = {
            let inner = self.inner.lock();
            inner.store.iter().map(|r| r.id).sorted().collect()
        };
        let mut written = 0usize;
        for id in ids {
            let entry = {
                let inner = self.inner.lock();
                inner.store.get(id).map(record_on_disk)
            };
            // A version deleted while the lock was dropped is no longer
            // live and is skipped.
            if let Some(entry) = entry {
                sink.append(&entry)?;
                written += 1;
            }
        }
        sink.close()?;
        debug!("wrote back {} version records", written);
        Ok(())
    }

    fn register_staged(&self, outcome: &ProcessOutcome) {
        for &id in &outcome.staged {
            if let Err(err) = self.presentation.register(id) {
                warn!("presentation rejected {}: {}", id, err);
            }
        }
    }

    fn send(&self, msg: VersionMsg) {
        if let Some(ref tx) = self.report {
            // A vanished consumer must not wedge the manager.
            let _ = tx.send(msg);
        }
    }
}

/// Persisted projection of a record. The root stores parent 0.
fn record_on_disk(record: &VersionRecord) -> RecordOnDisk {
    RecordOnDisk {
        id: record.id.as_u32(),
        parent: record.parent.id().unwrap_or(VersionId::ROOT).as_u32(),
        size: record.size,
        group: record.group.as_u32(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> VersionManager {
        let m = VersionManager::new(VersionManagerConfig::default());
        m.zero_init().unwrap();
        m
    }

    #[test]
    fn zero_init_is_once_only() {
        let m = manager();
        assert!(matches!(m.zero_init(), Err(Error::InvalidArgument(_))));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn ids_are_handed_out_in_order() {
        let m = manager();
        assert_eq!(m.next_id(), VersionId(1));
        let a = m
            .create(VersionKind::Clone, VersionId::ROOT, GroupId::NONE, 0)
            .unwrap();
        let b = m
            .create(VersionKind::Clone, VersionId::ROOT, GroupId::NONE, 0)
            .unwrap();
        assert_eq!(a, VersionId(1));
        assert_eq!(b, VersionId(2));
        assert_eq!(m.next_id(), VersionId(3));
    }

    #[test]
    fn create_under_unknown_parent_fails() {
        let m = manager();
        assert!(matches!(
            m.create(VersionKind::Clone, VersionId(9), GroupId::NONE, 0),
            Err(Error::NotFound(VersionId(9)))
        ));
    }

    #[test]
    fn rejection_returns_the_id_to_the_allocator() {
        let m = manager();
        let leaf = m
            .create(VersionKind::Clone, VersionId::ROOT, GroupId::NONE, 0)
            .unwrap();
        m.attach(leaf).unwrap();
        let before = m.next_id();
        assert!(matches!(
            m.create(VersionKind::Clone, leaf, GroupId::NONE, 0),
            Err(Error::RuleViolation(_))
        ));
        assert_eq!(m.next_id(), before);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn attach_twice_is_busy() {
        let m = manager();
        let v = m
            .create(VersionKind::Clone, VersionId::ROOT, GroupId::NONE, 0)
            .unwrap();
        m.attach(v).unwrap();
        assert!(matches!(m.attach(v), Err(Error::Busy(_))));
        m.detach(v);
        m.attach(v).unwrap();
    }

    #[test]
    #[should_panic(expected = "detach of non-attached version")]
    fn detach_of_non_attached_panics() {
        let m = manager();
        let v = m
            .create(VersionKind::Clone, VersionId::ROOT, GroupId::NONE, 0)
            .unwrap();
        m.detach(v);
    }

    #[test]
    fn root_cannot_be_deleted() {
        let m = manager();
        assert!(matches!(
            m.delete_subtree(VersionId::ROOT),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    #[should_panic(expected = "attached version")]
    fn deleting_a_subtree_with_an_attached_version_panics() {
        let m = manager();
        let a = m
            .create(VersionKind::Clone, VersionId::ROOT, GroupId::NONE, 0)
            .unwrap();
        let b = m.create(VersionKind::Clone, a, GroupId::NONE, 0).unwrap();
        m.attach(b).unwrap();
        let _ = m.delete_subtree(a);
    }

    #[test]
    fn every_version_is_its_own_ancestor() {
        let m = manager();
        let v = m
            .create(VersionKind::Clone, VersionId::ROOT, GroupId::NONE, 0)
            .unwrap();
        assert!(m.is_ancestor(v, v));
        assert!(m.is_ancestor(VersionId::ROOT, VersionId::ROOT));
    }

    #[test]
    fn compare_on_unknown_id_fails() {
        let m = manager();
        assert!(matches!(
            m.compare(VersionId::ROOT, VersionId(5)),
            Err(Error::NotFound(VersionId(5)))
        ));
    }
}
