use super::{
    ContainerClient, ContinuationToken, DeleteSnafu, ListingPage, ObjectDescriptor, Result,
};
use async_trait::async_trait;
use object_store::path::Path;
use parking_lot::Mutex;
use snafu::IntoError;
use std::{
    collections::{BTreeMap, BTreeSet},
    num::NonZeroUsize,
    ops::Bound,
    sync::atomic::{AtomicUsize, Ordering},
};
use sweep_time::Time;

/// In-memory [`ContainerClient`] with explicit last-modified times.
///
/// Lists in lexicographic order, `page_size` objects at a time, and counts
/// listing calls. Deletes of chosen objects can be made to fail.
#[derive(Debug)]
pub struct MemContainer {
    page_size: NonZeroUsize,
    state: Mutex<State>,
    list_calls: AtomicUsize,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<Path, Time>,
    failing_deletes: BTreeSet<Path>,
    deletions: Vec<Path>,
}

impl MemContainer {
    pub fn new(page_size: NonZeroUsize) -> Self {
        Self {
            page_size,
            state: Default::default(),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Store `name`, replacing any object already stored there.
    pub fn insert(&self, name: &str, last_modified: Time) {
        self.state
            .lock()
            .objects
            .insert(Path::from(name), last_modified);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.lock().objects.contains_key(&Path::from(name))
    }

    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of [`ContainerClient::list_page`] calls served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Make every delete of `name` fail until the container is dropped.
    pub fn fail_deletes_of(&self, name: &str) {
        self.state.lock().failing_deletes.insert(Path::from(name));
    }

    /// Locations deleted so far, in deletion order.
    pub fn deletions(&self) -> Vec<Path> {
        self.state.lock().deletions.clone()
    }
}

#[async_trait]
impl ContainerClient for MemContainer {
    async fn list_page(&self, token: Option<ContinuationToken>) -> Result<ListingPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let start = match &token {
            Some(token) => Bound::Excluded(token.offset().clone()),
            None => Bound::Unbounded,
        };

        let state = self.state.lock();
        let objects = state
            .objects
            .range((start, Bound::Unbounded))
            .take(self.page_size.get())
            .map(|(location, last_modified)| ObjectDescriptor {
                location: location.clone(),
                last_modified: *last_modified,
            })
            .collect();

        Ok(ListingPage::from_objects(objects, self.page_size.get()))
    }

    async fn delete_object(&self, location: &Path) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing_deletes.contains(location) {
            let source = object_store::Error::Generic {
                store: "MemContainer",
                source: "delete refused".into(),
            };
            return Err(DeleteSnafu {
                location: location.clone(),
            }
            .into_error(source));
        }

        if state.objects.remove(location).is_some() {
            state.deletions.push(location.clone());
        }
        Ok(())
    }
}
