use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::client::{ArchiveLocator, ContentClient};
use crate::detect::{FormatVersion, V2_ARRAY_MARKER, V2_ATTRS_MARKER, V3_ROOT_MARKER};
use crate::metadata::{
    Multiscale, NodeKind, ZArrayMeta, ZarrJson, labels_from_attributes,
    multiscales_from_attributes,
};
use crate::store::MaybeBytes;
use crate::{Error, Result};

/// Labels sidecar location below a v3 node root.
pub const V3_LABELS_SIDECAR: &str = "labels/zarr.json";
/// Labels sidecar location below a v2 node root.
pub const V2_LABELS_SIDECAR: &str = "labels/.zattrs";

/// File access for the resolver, relative to one node root.
///
/// `Ok(None)` means the file is absent; `Err` means a transfer failure. The
/// resolver decides per call site whether a failure is fatal (required
/// marker) or swallowed (optional sidecar).
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait MetadataSource {
    async fn read(&self, path: &str, cancel: Option<&CancellationToken>) -> Result<MaybeBytes>;

    /// Address of the node root, handed to viewer collaborators.
    fn root_url(&self) -> Option<String> {
        None
    }
}

/// Marker reads backed by members of a remote archive.
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    client: ContentClient,
    locator: ArchiveLocator,
}

impl ArchiveSource {
    pub fn new(client: ContentClient, locator: ArchiveLocator) -> Self {
        Self { client, locator }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl MetadataSource for ArchiveSource {
    async fn read(&self, path: &str, cancel: Option<&CancellationToken>) -> Result<MaybeBytes> {
        self.client.fetch_whole(&self.locator, path, cancel).await
    }

    fn root_url(&self) -> Option<String> {
        Some(self.client.archive_url(&self.locator))
    }
}

/// Marker reads backed by plain files below a directory in a share.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    client: ContentClient,
    share: String,
    dir: String,
}

impl DirectorySource {
    pub fn new(client: ContentClient, share: impl Into<String>, dir: impl Into<String>) -> Self {
        let mut dir = dir.into();
        while dir.ends_with('/') {
            dir.pop();
        }
        Self {
            client,
            share: share.into(),
            dir,
        }
    }

    fn file_path(&self, path: &str) -> String {
        if self.dir.is_empty() {
            path.to_string()
        } else {
            format!("{}/{path}", self.dir)
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl MetadataSource for DirectorySource {
    async fn read(&self, path: &str, cancel: Option<&CancellationToken>) -> Result<MaybeBytes> {
        self.client
            .fetch_file(&self.share, &self.file_path(path), cancel)
            .await
    }

    fn root_url(&self) -> Option<String> {
        Some(self.client.file_url(&self.share, &self.dir))
    }
}

/// Outcome of a successful resolution; the "not a supported array/group"
/// outcome is `None` at the call site.
///
/// Re-derived from scratch whenever the browsed path or selected version
/// changes, never patched in place.
#[derive(Debug, Clone)]
pub enum Resolved {
    Array(ResolvedArray),
    Group(ResolvedGroup),
}

impl Resolved {
    pub fn version(&self) -> FormatVersion {
        match self {
            Resolved::Array(array) => array.version,
            Resolved::Group(group) => group.version,
        }
    }

    pub fn image_root(&self) -> Option<&str> {
        match self {
            Resolved::Array(array) => array.image_root.as_deref(),
            Resolved::Group(group) => group.image_root.as_deref(),
        }
    }
}

/// A node whose marker declares it a bare array.
#[derive(Debug, Clone)]
pub struct ResolvedArray {
    pub version: FormatVersion,
    /// One shape per resolution level. A bare array node has exactly one
    /// level: its own shape. Multi-resolution discovery is not attempted for
    /// this node kind.
    pub shape_per_level: Vec<Vec<u64>>,
    pub data_type: Option<String>,
    pub image_root: Option<String>,
}

/// A group node carrying multiscale image metadata.
#[derive(Debug, Clone)]
pub struct ResolvedGroup {
    pub version: FormatVersion,
    pub multiscales: Vec<Multiscale>,
    /// Label list from the optional sidecar, when present and parseable.
    pub labels: Option<Vec<String>>,
    pub image_root: Option<String>,
}

/// Decide how the node at the source root should be read, given the detected
/// layout versions. v3 takes precedence when both are present.
pub async fn resolve<S>(
    source: &S,
    versions: &[FormatVersion],
    cancel: Option<&CancellationToken>,
) -> Result<Option<Resolved>>
where
    S: MetadataSource + ?Sized,
{
    if versions.contains(&FormatVersion::V3) {
        resolve_v3(source, cancel).await
    } else if versions.contains(&FormatVersion::V2) {
        resolve_v2(source, cancel).await
    } else {
        Ok(None)
    }
}

async fn resolve_v3<S>(
    source: &S,
    cancel: Option<&CancellationToken>,
) -> Result<Option<Resolved>>
where
    S: MetadataSource + ?Sized,
{
    let Some(bytes) = source.read(V3_ROOT_MARKER, cancel).await? else {
        // Detection promised a marker; one that vanished since reads as "not
        // a supported node" rather than an error.
        return Ok(None);
    };
    let meta: ZarrJson =
        serde_json::from_slice(&bytes).map_err(|err| Error::malformed(V3_ROOT_MARKER, err))?;
    match meta.node_type {
        NodeKind::Array => {
            let shape = meta
                .shape
                .clone()
                .ok_or_else(|| Error::malformed(V3_ROOT_MARKER, "array node missing shape"))?;
            Ok(Some(Resolved::Array(ResolvedArray {
                version: FormatVersion::V3,
                shape_per_level: vec![shape],
                data_type: meta.data_type_name().map(str::to_string),
                image_root: source.root_url(),
            })))
        }
        NodeKind::Group => {
            let multiscales = multiscales_from_attributes(&meta.attributes)
                .map_err(|err| Error::malformed(V3_ROOT_MARKER, err))?;
            let Some(multiscales) = multiscales else {
                // A group without multiscale metadata is not a supported
                // image/volume.
                return Ok(None);
            };
            let labels = read_labels(source, V3_LABELS_SIDECAR, cancel).await?;
            Ok(Some(Resolved::Group(ResolvedGroup {
                version: FormatVersion::V3,
                multiscales,
                labels,
                image_root: source.root_url(),
            })))
        }
        NodeKind::Unknown => {
            log::warn!("unrecognized node kind in {V3_ROOT_MARKER}; treating as unsupported");
            Ok(None)
        }
    }
}

async fn resolve_v2<S>(
    source: &S,
    cancel: Option<&CancellationToken>,
) -> Result<Option<Resolved>>
where
    S: MetadataSource + ?Sized,
{
    // Legacy markers in fixed priority order: the array-shape marker wins.
    if let Some(bytes) = source.read(V2_ARRAY_MARKER, cancel).await? {
        let meta: ZArrayMeta =
            serde_json::from_slice(&bytes).map_err(|err| Error::malformed(V2_ARRAY_MARKER, err))?;
        return Ok(Some(Resolved::Array(ResolvedArray {
            version: FormatVersion::V2,
            shape_per_level: vec![meta.shape],
            data_type: meta.dtype,
            image_root: source.root_url(),
        })));
    }
    let Some(bytes) = source.read(V2_ATTRS_MARKER, cancel).await? else {
        return Ok(None);
    };
    let attrs: Map<String, Value> =
        serde_json::from_slice(&bytes).map_err(|err| Error::malformed(V2_ATTRS_MARKER, err))?;
    let multiscales = multiscales_from_attributes(&attrs)
        .map_err(|err| Error::malformed(V2_ATTRS_MARKER, err))?;
    let Some(multiscales) = multiscales else {
        return Ok(None);
    };
    let labels = read_labels(source, V2_LABELS_SIDECAR, cancel).await?;
    Ok(Some(Resolved::Group(ResolvedGroup {
        version: FormatVersion::V2,
        multiscales,
        labels,
        image_root: source.root_url(),
    })))
}

/// Best-effort read of the labels sidecar. Labels are strictly optional
/// enrichment, so any failure short of cancellation reads as "no labels".
async fn read_labels<S>(
    source: &S,
    sidecar: &str,
    cancel: Option<&CancellationToken>,
) -> Result<Option<Vec<String>>>
where
    S: MetadataSource + ?Sized,
{
    let Some(bytes) = read_optional(source, sidecar, cancel).await? else {
        return Ok(None);
    };
    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            log::trace!("ignoring unparseable labels sidecar {sidecar}: {err}");
            return Ok(None);
        }
    };
    // A v3 sidecar is a marker file whose attributes carry the list; a v2
    // sidecar is the attributes map itself.
    let attrs = value
        .get("attributes")
        .and_then(Value::as_object)
        .or_else(|| value.as_object());
    Ok(attrs.and_then(labels_from_attributes))
}

/// The swallow-to-sentinel policy for optional data, in one place: transfer
/// failures read as absent and are logged at trace level. Cancellation still
/// propagates.
async fn read_optional<S>(
    source: &S,
    path: &str,
    cancel: Option<&CancellationToken>,
) -> Result<MaybeBytes>
where
    S: MetadataSource + ?Sized,
{
    match source.read(path, cancel).await {
        Ok(value) => Ok(value),
        Err(err) if err.is_cancelled() => Err(err),
        Err(err) => {
            log::trace!("ignoring failed optional read of {path}: {err}");
            Ok(None)
        }
    }
}
