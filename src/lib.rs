//! Remote access to zipped OME-Zarr (OZX) archives for a file-browser
//! frontend: a byte-range client and paginated lister over the backend's
//! archive endpoints, a no-cache virtual file store consumable by a generic
//! chunked-array reader, and detection/resolution of the Zarr v2/v3 layouts
//! a directory or archive carries.

mod cancel;
pub mod client;
pub mod detect;
mod error;
pub mod listing;
pub mod metadata;
pub mod resolve;
pub mod store;

pub use tokio_util::sync::CancellationToken;

pub use error::{Error, Result};
pub use store::{AsyncReadableStore, ListableStore, MaybeBytes, OzxStore};
