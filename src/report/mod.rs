//! Notification glue: version events and the presentation-layer seam.
//!
//! Events travel over an optional crossbeam channel attached with
//! [VersionManager::with_report](crate::version::VersionManager::with_report);
//! any number of messages may be buffered, so an unbounded channel is
//! advised. The presentation layer (per-version directory lifecycle) is
//! reached through the [Presentation] trait.

use crate::version::VersionId;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// Event emitted after the corresponding state change is visible to
/// lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionMsg {
    /// A version was created and linked into the forest.
    Created(VersionId),
    /// A version was removed from the forest.
    Destroyed(VersionId),
}

/// Failures of the presentation layer.
#[derive(Debug, Error)]
pub enum PresentationError {
    #[error("presentation entry for {0} already exists")]
    AlreadyRegistered(VersionId),
    #[error("presentation entry for {0} is missing")]
    Missing(VersionId),
    #[error("presentation i/o failure")]
    Io(#[from] std::io::Error),
}

/// Per-version entry lifecycle of the presentation layer.
///
/// `register` failures are logged by the manager and do not roll back
/// linkage; the version then exists without a presentation entry.
/// `deregister` failures are fatal, the presentation layer and the
/// version store must agree.
pub trait Presentation {
    fn register(&self, id: VersionId) -> Result<(), PresentationError>;
    fn deregister(&self, id: VersionId) -> Result<(), PresentationError>;
}

impl<T: Presentation + ?Sized> Presentation for Arc<T> {
    fn register(&self, id: VersionId) -> Result<(), PresentationError> {
        (**self).register(id)
    }

    fn deregister(&self, id: VersionId) -> Result<(), PresentationError> {
        (**self).deregister(id)
    }
}

/// Presentation layer that accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPresentation;

impl Presentation for NoopPresentation {
    fn register(&self, _id: VersionId) -> Result<(), PresentationError> {
        Ok(())
    }

    fn deregister(&self, _id: VersionId) -> Result<(), PresentationError> {
        Ok(())
    }
}

/// Book-keeping presentation layer; verifies register/deregister
/// pairing.
#[derive(Debug, Default)]
pub struct TrackingPresentation {
    registered: Mutex<BTreeSet<VersionId>>,
}

impl TrackingPresentation {
    pub fn is_registered(&self, id: VersionId) -> bool {
        self.registered.lock().contains(&id)
    }

    pub fn registered(&self) -> Vec<VersionId> {
        self.registered.lock().iter().copied().collect()
    }
}

impl Presentation for TrackingPresentation {
    fn register(&self, id: VersionId) -> Result<(), PresentationError> {
        if !self.registered.lock().insert(id) {
            return Err(PresentationError::AlreadyRegistered(id));
        }
        Ok(())
    }

    fn deregister(&self, id: VersionId) -> Result<(), PresentationError> {
        if !self.registered.lock().remove(&id) {
            return Err(PresentationError::Missing(id));
        }
        Ok(())
    }
}
