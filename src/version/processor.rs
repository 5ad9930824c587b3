//! The processor threads staged records into the forest and renumbers it.
//!
//! Runs under the global ordering lock. Phase A drains the init queue in
//! parent-before-child order while enforcing the snapshot/clone creation
//! rules; phase B reassigns DFS enter/exit numbers over the whole forest.
//! Presentation-layer registration of freshly linked records happens after
//! the lock is dropped, from the staging list returned here.

use super::record::{DfsOrder, ParentLink, VersionId};
use super::Inner;
use log::warn;

/// What a processor run leaves behind for the caller to finish once the
/// global lock is dropped.
#[derive(Debug, Default)]
pub(super) struct ProcessOutcome {
    /// Freshly linked records awaiting presentation registration.
    pub staged: Vec<VersionId>,
    /// Records that violated the creation rules, already removed from the
    /// store.
    pub rejected: Vec<VersionId>,
}

impl Inner {
    /// Phase A and B: drain the init queue, then renumber.
    ///
    /// Panics if a queued record references a parent that is not in the
    /// store; the input is corrupt and the forest cannot be trusted.
    pub(super) fn process(&mut self) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();
        'queue: while let Some(head) = self.queue.pop_front() {
            let mut cur = head;
            loop {
                let record = match self.store.get(cur) {
                    Some(record) => record,
                    // Stale entry of a record dropped by an earlier rejection.
                    None => continue 'queue,
                };
                if record.is_linked() {
                    // Already threaded while chasing an earlier parent chain.
                    continue 'queue;
                }
                let parent_id = match record.parent {
                    ParentLink::Unlinked(parent) => parent,
                    ParentLink::Linked(_) | ParentLink::Root => {
                        unreachable!("unlinked record with a resolved parent slot")
                    }
                };
                let snapshot = record.snapshot;
                let parent = self.store.get(parent_id).unwrap_or_else(|| {
                    panic!(
                        "corrupt version store: {} references missing parent {}",
                        cur, parent_id
                    )
                });
                // Snapshots require the parent to be a leaf.
                if snapshot && parent.first_child.is_some() {
                    warn!("rejecting snapshot {} of non-leaf parent {}", cur, parent_id);
                    self.discard(cur, &mut outcome);
                    continue 'queue;
                }
                // Cloning the current writable leaf is forbidden.
                if !snapshot && parent.attached && parent.first_child.is_none() {
                    warn!("rejecting clone {} of attached leaf {}", cur, parent_id);
                    self.discard(cur, &mut outcome);
                    continue 'queue;
                }
                if !parent.is_linked() {
                    // The parent has to settle first; requeue and walk up.
                    // Parent ids strictly decrease and the root is always
                    // linked, so the chain bottoms out.
                    self.queue.push_front(cur);
                    cur = parent_id;
                    continue;
                }
                let inherited_group = parent.group;
                let inherited_size = parent.size;
                let record = self
                    .store
                    .get_mut(cur)
                    .expect("record vanished during linkage");
                record.parent = ParentLink::Linked(parent_id);
                if record.group.is_none() {
                    record.group = inherited_group;
                }
                if inherited_size != 0 {
                    record.size = inherited_size;
                }
                self.splice_child(parent_id, cur);
                outcome.staged.push(cur);
                continue 'queue;
            }
        }
        self.renumber();
        outcome
    }

    /// Drop a record that failed the creation rules. It was never linked
    /// or announced, so nothing has to be rolled back.
    fn discard(&mut self, id: VersionId, outcome: &mut ProcessOutcome) {
        self.store
            .remove(id)
            .expect("rejected record missing from the store");
        outcome.rejected.push(id);
    }

    /// Splice `child` into `parent`'s child list, keeping descending-id
    /// order. Fresh creations carry the largest id so far and take the
    /// head slot; the scan path serves records loaded out of order.
    fn splice_child(&mut self, parent_id: VersionId, child: VersionId) {
        let head = self
            .store
            .get(parent_id)
            .expect("linking under a missing parent")
            .first_child;
        match head {
            Some(head) if child < head => {
                let mut prev = head;
                loop {
                    let next = self
                        .store
                        .get(prev)
                        .expect("broken child list")
                        .next_sibling;
                    match next {
                        Some(next) if next > child => prev = next,
                        _ => break,
                    }
                }
                let tail = self
                    .store
                    .get(prev)
                    .expect("broken child list")
                    .next_sibling;
                self.store
                    .get_mut(child)
                    .expect("splicing a missing child")
                    .next_sibling = tail;
                self.store
                    .get_mut(prev)
                    .expect("broken child list")
                    .next_sibling = Some(child);
            }
            _ => {
                self.store
                    .get_mut(child)
                    .expect("splicing a missing child")
                    .next_sibling = head;
                self.store
                    .get_mut(parent_id)
                    .expect("linking under a missing parent")
                    .first_child = Some(child);
            }
        }
    }

    /// Phase B: reassign DFS enter/exit numbers from the root.
    ///
    /// Iterative direction-flag walk; the forest may be deeper than the
    /// call stack allows. A leaf keeps `exit == enter`.
    pub(super) fn renumber(&mut self) {
        if !self.store.contains(VersionId::ROOT) {
            return;
        }
        let mut counter: u32 = 0;
        let mut cur = VersionId::ROOT;
        let mut ascending = false;
        loop {
            let record = self
                .store
                .get_mut(cur)
                .expect("renumbering walked off the forest");
            if ascending {
                record
                    .order
                    .as_mut()
                    .expect("exit assigned before enter")
                    .exit = counter;
                if let Some(sibling) = record.next_sibling {
                    cur = sibling;
                    ascending = false;
                } else if let Some(parent) = record.parent.id() {
                    cur = parent;
                } else {
                    break;
                }
            } else {
                counter += 1;
                record.order = Some(DfsOrder {
                    enter: counter,
                    exit: counter,
                });
                if let Some(child) = record.first_child {
                    cur = child;
                } else if let Some(sibling) = record.next_sibling {
                    cur = sibling;
                } else if let Some(parent) = record.parent.id() {
                    cur = parent;
                    ascending = true;
                } else {
                    break;
                }
            }
        }
    }

    /// Unlink `id` from its parent's child list. The record itself is left
    /// in the store.
    pub(super) fn unlink_child(&mut self, id: VersionId) {
        let (parent_id, next) = {
            let record = self.store.get(id).expect("unlinking an unknown version");
            let parent = match record.parent {
                ParentLink::Linked(parent) => parent,
                ParentLink::Unlinked(_) | ParentLink::Root => {
                    panic!("unlinking {} which is not threaded under a parent", id)
                }
            };
            (parent, record.next_sibling)
        };
        let parent = self
            .store
            .get_mut(parent_id)
            .expect("corrupt parent link");
        if parent.first_child == Some(id) {
            parent.first_child = next;
            return;
        }
        let mut prev = parent
            .first_child
            .unwrap_or_else(|| panic!("{} missing from {}'s child list", id, parent_id));
        loop {
            let sibling = self
                .store
                .get(prev)
                .expect("broken child list")
                .next_sibling;
            match sibling {
                Some(sibling) if sibling == id => break,
                Some(sibling) => prev = sibling,
                None => panic!("{} missing from {}'s child list", id, parent_id),
            }
        }
        self.store
            .get_mut(prev)
            .expect("broken child list")
            .next_sibling = next;
    }

    /// First leaf reached from `id` along first-child links.
    pub(super) fn first_leaf_below(&self, id: VersionId) -> VersionId {
        let mut cur = id;
        while let Some(child) = self
            .store
            .get(cur)
            .expect("leaf descent walked off the forest")
            .first_child
        {
            cur = child;
        }
        cur
    }

    /// Every id in the subtree rooted at `id`, in unspecified order.
    pub(super) fn subtree_ids(&self, id: VersionId) -> Vec<VersionId> {
        let mut members = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            members.push(cur);
            let mut child = self
                .store
                .get(cur)
                .expect("subtree walk left the store")
                .first_child;
            while let Some(c) = child {
                stack.push(c);
                child = self.store.get(c).expect("broken child list").next_sibling;
            }
        }
        members
    }
}
