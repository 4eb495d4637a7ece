use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::client::{ArchiveLocator, ContentClient};
use crate::listing::{EntryLister, MemberNames};

/// Value of a store read; `None` means the key is absent.
pub type MaybeBytes = Option<Bytes>;

/// Read side of the store contract consumed by a generic chunked-array
/// reader.
///
/// Implementations must be safe for existence-style probing: a reader that
/// treats `None` as "try a different source" must never be crashed by a
/// transport fault, so everything short of cancellation maps to `Ok(None)`.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait AsyncReadableStore {
    /// Whole-member read.
    async fn get(&self, key: &str, cancel: Option<&CancellationToken>) -> Result<MaybeBytes>;

    /// Ranged read; the hot path for chunk payloads. May return fewer bytes
    /// than requested at end-of-member.
    async fn get_range(
        &self,
        key: &str,
        offset: u64,
        length: u64,
        cancel: Option<&CancellationToken>,
    ) -> Result<MaybeBytes>;

    /// Existence probe.
    async fn has(&self, key: &str, cancel: Option<&CancellationToken>) -> Result<bool>;
}

/// List side of the store contract; used for discovery (enumerating chunk
/// keys under a resolution level), not bulk browsing.
pub trait ListableStore {
    /// Lazy sequence of keys, optionally filtered by prefix. No I/O happens
    /// until the sequence is first polled.
    fn list(&self, prefix: Option<&str>) -> MemberNames;
}

/// Virtual file store over one remote zipped OME-Zarr archive.
///
/// Stateless beyond the locator binding: no cache and no entry list, so every
/// call is a fresh round trip. The backing archive is assumed immutable for
/// the life of a viewing session; operations may be issued concurrently
/// without coordination.
#[derive(Debug, Clone)]
pub struct OzxStore {
    client: ContentClient,
    lister: EntryLister,
    locator: ArchiveLocator,
}

impl OzxStore {
    pub fn new(client: ContentClient, locator: ArchiveLocator) -> Self {
        let lister = EntryLister::new(client.clone(), locator.clone());
        Self {
            client,
            lister,
            locator,
        }
    }

    pub fn locator(&self) -> &ArchiveLocator {
        &self.locator
    }

    /// Canonical content URL of the archive, for viewer collaborators.
    pub fn url(&self) -> String {
        self.client.archive_url(&self.locator)
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl AsyncReadableStore for OzxStore {
    async fn get(&self, key: &str, cancel: Option<&CancellationToken>) -> Result<MaybeBytes> {
        absent_on_failure(self.client.fetch_whole(&self.locator, key, cancel).await, key)
    }

    async fn get_range(
        &self,
        key: &str,
        offset: u64,
        length: u64,
        cancel: Option<&CancellationToken>,
    ) -> Result<MaybeBytes> {
        absent_on_failure(
            self.client
                .fetch_range(&self.locator, key, offset, length, cancel)
                .await,
            key,
        )
    }

    async fn has(&self, key: &str, cancel: Option<&CancellationToken>) -> Result<bool> {
        self.client.exists(&self.locator, key, cancel).await
    }
}

impl ListableStore for OzxStore {
    fn list(&self, prefix: Option<&str>) -> MemberNames {
        self.lister.names(prefix)
    }
}

/// Store swallow policy: transport failures read as absent keys; only
/// cancellation escapes.
fn absent_on_failure(res: Result<MaybeBytes>, key: &str) -> Result<MaybeBytes> {
    match res {
        Ok(value) => Ok(value),
        Err(err) if err.is_cancelled() => Err(err),
        Err(err) => {
            log::debug!("read of {key} failed, treating as absent: {err}");
            Ok(None)
        }
    }
}
