//! The view of an object storage container the sweep depends on.
//!
//! Transport, retries and the wire-level listing protocol stay inside the
//! storage client; the sweep only ever lists one page or deletes one object.

use async_trait::async_trait;
use object_store::{ObjectMeta, path::Path};
use snafu::Snafu;
use std::fmt::Debug;
use sweep_time::Time;

pub mod mem;
pub mod store;

pub use mem::MemContainer;
pub use store::ObjectStoreContainer;

/// One stored object as reported by a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    pub location: Path,
    pub last_modified: Time,
}

impl ObjectDescriptor {
    pub fn new(location: impl Into<Path>, last_modified: Time) -> Self {
        Self {
            location: location.into(),
            last_modified,
        }
    }
}

impl From<ObjectMeta> for ObjectDescriptor {
    fn from(meta: ObjectMeta) -> Self {
        Self {
            location: meta.location,
            last_modified: Time::from_date_time(meta.last_modified),
        }
    }
}

/// Opaque cursor returned with a page while more pages remain.
///
/// Holds the location of the last object of the page; the next page starts
/// strictly after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken(Path);

impl ContinuationToken {
    pub(crate) fn after(location: Path) -> Self {
        Self(location)
    }

    pub(crate) fn offset(&self) -> &Path {
        &self.0
    }
}

/// A page of a container listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Objects in listing order.
    pub objects: Vec<ObjectDescriptor>,
    /// `None` on the final page.
    pub next: Option<ContinuationToken>,
}

impl ListingPage {
    /// Build a page of at most `page_size` objects; a full page carries a
    /// token pointing past its last object.
    pub(crate) fn from_objects(objects: Vec<ObjectDescriptor>, page_size: usize) -> Self {
        let next = match objects.last() {
            Some(last) if objects.len() >= page_size => {
                Some(ContinuationToken::after(last.location.clone()))
            }
            _ => None,
        };
        Self { objects, next }
    }
}

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("The container could not be listed: {source}"))]
    List { source: object_store::Error },

    #[snafu(display("{location} could not be deleted: {source}"))]
    Delete {
        source: object_store::Error,
        location: Path,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Paged listing and single-object deletion against one container.
#[async_trait]
pub trait ContainerClient: Debug + Send + Sync + 'static {
    /// Fetch the page following `token`, or the first page when `token` is `None`.
    async fn list_page(&self, token: Option<ContinuationToken>) -> Result<ListingPage>;

    /// Delete one object. Irreversible.
    async fn delete_object(&self, location: &Path) -> Result<()>;
}
