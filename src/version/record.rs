//! Record types of the version forest.
//!
//! Every version is one [VersionRecord] owned by the store. Links between
//! records (`parent`, `first_child`, `next_sibling`) are expressed as ids
//! into the store rather than pointers, so the cyclic parent/child graph
//! never turns into an ownership cycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a version in the forest. Ids are handed out in strictly
/// increasing order; `0` names the root.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct VersionId(pub u32);

impl VersionId {
    /// The root of the forest.
    pub const ROOT: Self = VersionId(0);
    /// Sentinel outside the allocation range.
    pub const INVALID: Self = VersionId(u32::MAX);

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Opaque domain-group identifier, inherited down the tree.
///
/// [GroupId::NONE] passed at creation means "inherit the parent's group".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GroupId(pub u32);

impl GroupId {
    /// Unset group; requests inheritance from the parent.
    pub const NONE: Self = GroupId(u32::MAX);

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// The two creation flavours of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionKind {
    /// Read-only child of a leaf parent.
    Snapshot,
    /// Writable child of a non-attached or non-leaf parent.
    Clone,
}

/// Parent slot of a record.
///
/// The raw parent id and the resolved link live in separate variants, so
/// "which parent" and "is it threaded yet" can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLink {
    /// Parent known by id only; the record still awaits the processor.
    Unlinked(VersionId),
    /// Threaded into the forest under this parent.
    Linked(VersionId),
    /// The root carries no parent.
    Root,
}

impl ParentLink {
    pub fn is_linked(&self) -> bool {
        matches!(self, ParentLink::Linked(_) | ParentLink::Root)
    }

    /// The parent id regardless of linkage state; `None` for the root.
    pub fn id(&self) -> Option<VersionId> {
        match *self {
            ParentLink::Unlinked(p) | ParentLink::Linked(p) => Some(p),
            ParentLink::Root => None,
        }
    }
}

/// DFS enter/exit pair assigned by the processor. A version `a` is an
/// ancestor of `b` iff `a.enter <= b.enter && b.exit <= a.exit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfsOrder {
    pub enter: u32,
    pub exit: u32,
}

/// One live version.
#[derive(Debug, Clone)]
pub struct VersionRecord {
    pub id: VersionId,
    pub parent: ParentLink,
    /// Head of the child list, ordered by descending id.
    pub first_child: Option<VersionId>,
    pub next_sibling: Option<VersionId>,
    /// Absent until the processor has numbered the forest.
    pub order: Option<DfsOrder>,
    pub group: GroupId,
    /// Reserved size; a nonzero parent size overrides it at link time.
    pub size: u64,
    pub attached: bool,
    pub snapshot: bool,
}

impl VersionRecord {
    /// A fresh, unlinked record as produced by creation or bootstrap.
    pub(crate) fn new(
        id: VersionId,
        parent: VersionId,
        kind: VersionKind,
        group: GroupId,
        size: u64,
    ) -> Self {
        VersionRecord {
            id,
            parent: ParentLink::Unlinked(parent),
            first_child: None,
            next_sibling: None,
            order: None,
            group,
            size,
            attached: false,
            snapshot: matches!(kind, VersionKind::Snapshot),
        }
    }

    /// The root record, linked from the start.
    pub(crate) fn root(group: GroupId, size: u64) -> Self {
        VersionRecord {
            id: VersionId::ROOT,
            parent: ParentLink::Root,
            first_child: None,
            next_sibling: None,
            order: None,
            group,
            size,
            attached: false,
            snapshot: false,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.parent.is_linked()
    }

    pub fn is_leaf(&self) -> bool {
        self.first_child.is_none()
    }
}

/// Read-only projection of a record handed to external callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub group: GroupId,
    /// Parent id; the root reports `0`.
    pub parent: VersionId,
    pub size: u64,
    pub leaf: bool,
}

impl VersionInfo {
    pub(crate) fn of(record: &VersionRecord) -> Self {
        VersionInfo {
            group: record.group,
            parent: record.parent.id().unwrap_or(VersionId::ROOT),
            size: record.size,
            leaf: record.is_leaf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_link_variants() {
        let unlinked = ParentLink::Unlinked(VersionId(4));
        assert!(!unlinked.is_linked());
        assert_eq!(unlinked.id(), Some(VersionId(4)));

        let linked = ParentLink::Linked(VersionId(4));
        assert!(linked.is_linked());
        assert_eq!(linked.id(), Some(VersionId(4)));

        assert!(ParentLink::Root.is_linked());
        assert_eq!(ParentLink::Root.id(), None);
    }

    #[test]
    fn sentinels_outside_allocation_range() {
        assert!(VersionId::INVALID > VersionId(900));
        assert!(GroupId::NONE.is_none());
        assert!(!GroupId(0).is_none());
    }

    #[test]
    fn root_projection_reports_zero_parent() {
        let root = VersionRecord::root(GroupId(3), 0);
        let info = VersionInfo::of(&root);
        assert_eq!(info.parent, VersionId::ROOT);
        assert_eq!(info.group, GroupId(3));
        assert!(info.leaf);
    }
}
