use super::{
    ContainerClient, ContinuationToken, DeleteSnafu, ListSnafu, ListingPage, ObjectDescriptor,
    Result,
};
use async_trait::async_trait;
use futures::StreamExt;
use object_store::{DynObjectStore, ObjectMeta, path::Path};
use snafu::ResultExt;
use std::{num::NonZeroUsize, sync::Arc};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::debug;

/// Largest page the Azure blob service returns for one listing request.
pub const DEFAULT_PAGE_SIZE: NonZeroUsize = match NonZeroUsize::new(5000) {
    Some(size) => size,
    None => unreachable!(),
};

/// [`ContainerClient`] backed by an [`object_store`] client scoped to one
/// container.
///
/// A sweep walks a single `list` call of the store: a background task drives
/// the listing and pages are cut from what it yields, so the store's own
/// marker paging is never restarted. A token that does not continue the live
/// listing starts a new one strictly after the token's location, which needs
/// the store to list in lexicographic order.
#[derive(Debug)]
pub struct ObjectStoreContainer {
    store: Arc<DynObjectStore>,
    page_size: NonZeroUsize,
    listing: Mutex<Option<Listing>>,
}

/// An in-progress `list` call.
#[derive(Debug)]
struct Listing {
    /// Location of the last object handed out.
    after: Option<Path>,
    items: mpsc::Receiver<object_store::Result<ObjectMeta>>,
    lister: JoinHandle<()>,
}

impl Listing {
    fn start(store: Arc<DynObjectStore>, offset: Option<Path>, capacity: usize) -> Self {
        let (tx, items) = mpsc::channel(capacity);
        let lister = tokio::spawn(async move {
            let mut stream = match &offset {
                Some(offset) => store.list_with_offset(None, offset),
                None => store.list(None),
            };
            while let Some(item) = stream.next().await {
                if tx.send(item).await.is_err() {
                    // the container dropped this listing
                    break;
                }
            }
        });

        Self {
            after: None,
            items,
            lister,
        }
    }

    fn continues(&self, token: &ContinuationToken) -> bool {
        self.after.as_ref() == Some(token.offset())
    }
}

impl Drop for Listing {
    fn drop(&mut self) {
        self.lister.abort();
    }
}

impl ObjectStoreContainer {
    pub fn new(store: Arc<DynObjectStore>) -> Self {
        Self {
            store,
            page_size: DEFAULT_PAGE_SIZE,
            listing: Mutex::new(None),
        }
    }

    pub fn with_page_size(self, page_size: NonZeroUsize) -> Self {
        Self { page_size, ..self }
    }
}

#[async_trait]
impl ContainerClient for ObjectStoreContainer {
    async fn list_page(&self, token: Option<ContinuationToken>) -> Result<ListingPage> {
        let page_size = self.page_size.get();
        let mut current = self.listing.lock().await;

        let (mut listing, resumed) = match (current.take(), &token) {
            (Some(listing), Some(token)) if listing.continues(token) => (listing, true),
            _ => {
                let offset = token.as_ref().map(|token| token.offset().clone());
                let listing = Listing::start(Arc::clone(&self.store), offset, page_size);
                (listing, false)
            }
        };

        let mut objects = Vec::with_capacity(page_size);
        while objects.len() < page_size {
            match listing.items.recv().await {
                Some(Ok(meta)) => objects.push(ObjectDescriptor::from(meta)),
                Some(Err(source)) => return Err(source).context(ListSnafu),
                None => break,
            }
        }

        let page = ListingPage::from_objects(objects, page_size);
        if let (Some(last), Some(_)) = (page.objects.last(), &page.next) {
            listing.after = Some(last.location.clone());
            *current = Some(listing);
        }

        debug!(
            resumed,
            offset = token.as_ref().map(|t| t.offset().to_string()),
            objects = page.objects.len(),
            more = page.next.is_some(),
            "Listed container page"
        );
        Ok(page)
    }

    async fn delete_object(&self, location: &Path) -> Result<()> {
        self.store
            .delete(location)
            .await
            .context(DeleteSnafu { location: location.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Sweeper, container::Error};
    use futures::{TryStreamExt, stream::BoxStream};
    use object_store::{
        GetOptions, GetResult, ListResult, MultipartUpload, ObjectStore, PutMultipartOpts,
        PutOptions, PutPayload, PutResult, memory::InMemory,
    };
    use pretty_assertions::assert_eq;
    use std::{
        fmt,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use sweep_time::{MockProvider, SystemProvider, TimeProvider};
    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    async fn store_with(names: &[&str]) -> Arc<DynObjectStore> {
        let store = Arc::new(InMemory::new());
        for name in names {
            store
                .put(&Path::from(*name), PutPayload::from_static(b"{}"))
                .await
                .unwrap();
        }
        store
    }

    fn names(page: &ListingPage) -> Vec<String> {
        page.objects.iter().map(|o| o.location.to_string()).collect()
    }

    #[tokio::test]
    async fn lists_in_pages() {
        let store = store_with(&["e", "a", "d", "b/1", "c"]).await;
        let container =
            ObjectStoreContainer::new(store).with_page_size(NonZeroUsize::new(2).unwrap());

        let first = container.list_page(None).await.unwrap();
        assert_eq!(names(&first), ["a", "b/1"]);

        let second = container.list_page(first.next).await.unwrap();
        assert_eq!(names(&second), ["c", "d"]);

        let third = container.list_page(second.next).await.unwrap();
        assert_eq!(names(&third), ["e"]);
        assert!(third.next.is_none());
    }

    #[tokio::test]
    async fn exactly_full_last_page_is_followed_by_an_empty_page() {
        let store = store_with(&["a", "b"]).await;
        let container =
            ObjectStoreContainer::new(store).with_page_size(NonZeroUsize::new(2).unwrap());

        let first = container.list_page(None).await.unwrap();
        assert_eq!(names(&first), ["a", "b"]);
        assert!(first.next.is_some());

        let second = container.list_page(first.next).await.unwrap();
        assert_eq!(second, ListingPage::default());
    }

    #[tokio::test]
    async fn foreign_token_resumes_after_its_location() {
        let store = store_with(&["a", "b", "c", "d"]).await;
        let container =
            ObjectStoreContainer::new(store).with_page_size(NonZeroUsize::new(2).unwrap());

        let token = ContinuationToken::after(Path::from("b"));
        let page = container.list_page(Some(token)).await.unwrap();
        assert_eq!(names(&page), ["c", "d"]);
    }

    /// Counts every object the wrapped store yields from `list`.
    #[derive(Debug)]
    struct CountingStore {
        inner: InMemory,
        listed: AtomicUsize,
    }

    impl fmt::Display for CountingStore {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Counting({})", self.inner)
        }
    }

    #[async_trait]
    impl ObjectStore for CountingStore {
        async fn put_opts(
            &self,
            location: &Path,
            payload: PutPayload,
            opts: PutOptions,
        ) -> object_store::Result<PutResult> {
            self.inner.put_opts(location, payload, opts).await
        }

        async fn put_multipart_opts(
            &self,
            location: &Path,
            opts: PutMultipartOpts,
        ) -> object_store::Result<Box<dyn MultipartUpload>> {
            self.inner.put_multipart_opts(location, opts).await
        }

        async fn get_opts(
            &self,
            location: &Path,
            options: GetOptions,
        ) -> object_store::Result<GetResult> {
            self.inner.get_opts(location, options).await
        }

        async fn delete(&self, location: &Path) -> object_store::Result<()> {
            self.inner.delete(location).await
        }

        fn list(&self, prefix: Option<&Path>) -> BoxStream<'_, object_store::Result<ObjectMeta>> {
            let listed = &self.listed;
            self.inner
                .list(prefix)
                .inspect(move |_| {
                    listed.fetch_add(1, Ordering::SeqCst);
                })
                .boxed()
        }

        async fn list_with_delimiter(
            &self,
            prefix: Option<&Path>,
        ) -> object_store::Result<ListResult> {
            self.inner.list_with_delimiter(prefix).await
        }

        async fn copy(&self, from: &Path, to: &Path) -> object_store::Result<()> {
            self.inner.copy(from, to).await
        }

        async fn copy_if_not_exists(&self, from: &Path, to: &Path) -> object_store::Result<()> {
            self.inner.copy_if_not_exists(from, to).await
        }
    }

    #[tokio::test]
    async fn paging_lists_each_object_once() {
        let store = Arc::new(CountingStore {
            inner: InMemory::new(),
            listed: AtomicUsize::new(0),
        });
        for i in 0..100 {
            store
                .put(
                    &Path::from(format!("device-{i:03}.json")),
                    PutPayload::from_static(b"{}"),
                )
                .await
                .unwrap();
        }
        let container = ObjectStoreContainer::new(Arc::clone(&store) as _)
            .with_page_size(NonZeroUsize::new(10).unwrap());

        let mut pages = 0;
        let mut seen = Vec::new();
        let mut token = None;
        loop {
            let page = container.list_page(token).await.unwrap();
            pages += 1;
            seen.extend(names(&page));
            match page.next {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        // ten full pages, then the empty page that ends the listing
        assert_eq!(pages, 11);
        assert_eq!(seen.len(), 100);
        assert_eq!(seen.first().map(String::as_str), Some("device-000.json"));
        assert_eq!(seen.last().map(String::as_str), Some("device-099.json"));
        assert_eq!(store.listed.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn descriptors_carry_last_modified() {
        let before = SystemProvider::new().now();
        let store = store_with(&["a"]).await;
        let after = SystemProvider::new().now();

        let page = ObjectStoreContainer::new(store).list_page(None).await.unwrap();
        let last_modified = page.objects[0].last_modified;
        assert!(before <= last_modified && last_modified <= after);
    }

    #[tokio::test]
    async fn deletes_objects() {
        let store = store_with(&["a", "b"]).await;
        let container = ObjectStoreContainer::new(Arc::clone(&store));

        container.delete_object(&Path::from("a")).await.unwrap();

        let remaining: Vec<_> = store
            .list(None)
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(remaining, ["b"]);
    }

    #[tokio::test]
    async fn deleting_a_missing_object_is_not_an_error() {
        let container = ObjectStoreContainer::new(store_with(&["a"]).await);
        container.delete_object(&Path::from("missing")).await.unwrap();
    }

    #[test]
    fn delete_error_names_the_object() {
        let err = Error::Delete {
            source: object_store::Error::NotImplemented,
            location: Path::from("a/b.json"),
        };
        assert_eq!(
            err.to_string(),
            "a/b.json could not be deleted: Operation not yet implemented."
        );
    }

    #[tokio::test]
    async fn sweeps_an_object_store() {
        let store = store_with(&[
            "2023/01/device-1.json",
            "2023/01/device-2.json",
            "2024/07/device-1.json",
        ])
        .await;
        let container = Arc::new(
            ObjectStoreContainer::new(Arc::clone(&store))
                .with_page_size(NonZeroUsize::new(2).unwrap()),
        );

        // objects were just written, so nothing has expired yet
        let now = SystemProvider::new().now();
        let clock = Arc::new(MockProvider::new(now.checked_add(10 * DAY).unwrap()));
        let sweeper = Sweeper::new(Arc::clone(&container) as _, Arc::clone(&clock) as _);
        let summary = sweeper.run(&mut Vec::new()).await.unwrap();
        assert_eq!((summary.total, summary.deleted), (3, 0));

        // 100 days later, everything has
        clock.set(now.checked_add(100 * DAY).unwrap());
        let summary = sweeper.run(&mut Vec::new()).await.unwrap();
        assert_eq!((summary.total, summary.deleted), (3, 3));

        let remaining = store.list(None).count().await;
        assert_eq!(remaining, 0);
    }
}
