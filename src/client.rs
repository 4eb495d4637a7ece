use reqwest::{Method, Response, StatusCode, header::RANGE};
use tokio_util::sync::CancellationToken;

use crate::cancel::or_cancelled;
use crate::store::MaybeBytes;
use crate::{Error, Result};

/// Identifies one archive (or directory root) within a file share.
///
/// Created once per browsing session for a given archive and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveLocator {
    /// File share root identifier, as registered with the backend.
    pub share: String,
    /// Path of the archive below the share root, forward-slash separated.
    pub path: String,
}

impl ArchiveLocator {
    pub fn new(share: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            share: share.into(),
            path: path.into(),
        }
    }
}

/// Client for the backend's archive-content and plain-file content endpoints.
///
/// Issues single requests with no retry policy; retries, if wanted, belong to
/// the caller. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ContentClient {
    http: reqwest::Client,
    base_url: String,
}

impl ContentClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url)
    }

    pub fn with_http(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn archive_endpoint(&self, share: &str, tail: &str) -> String {
        format!("{}/archives/{share}/{tail}", self.base_url)
    }

    fn content_request(
        &self,
        method: Method,
        locator: &ArchiveLocator,
        member: &str,
    ) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.archive_endpoint(&locator.share, "content"))
            .query(&[("subpath", locator.path.as_str()), ("member", member)])
    }

    fn file_request(&self, method: Method, share: &str, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}/files/{share}", self.base_url))
            .query(&[("subpath", path)])
    }

    /// Canonical URL of the archive's content endpoint, for handing to viewer
    /// collaborators that resolve members themselves.
    pub fn archive_url(&self, locator: &ArchiveLocator) -> String {
        format!(
            "{}?subpath={}",
            self.archive_endpoint(&locator.share, "content"),
            locator.path
        )
    }

    /// Canonical URL of a plain file below a share root.
    pub fn file_url(&self, share: &str, path: &str) -> String {
        format!("{}/files/{share}?subpath={path}", self.base_url)
    }

    /// Read `length` bytes of a member starting at `offset`.
    ///
    /// The body may be shorter than requested if the member ends inside the
    /// range; callers must not assume the exact length. A 206 response is
    /// treated the same as a 200.
    pub async fn fetch_range(
        &self,
        locator: &ArchiveLocator,
        member: &str,
        offset: u64,
        length: u64,
        cancel: Option<&CancellationToken>,
    ) -> Result<MaybeBytes> {
        if length == 0 {
            return Err(Error::general("ranged read requires a positive length"));
        }
        let end = offset + length - 1;
        let send = self
            .content_request(Method::GET, locator, member)
            .header(RANGE, format!("bytes={offset}-{end}"))
            .send();
        let resp = or_cancelled(send, cancel).await??;
        read_body(resp, cancel).await
    }

    /// Read an entire member. `Ok(None)` means the member does not exist.
    pub async fn fetch_whole(
        &self,
        locator: &ArchiveLocator,
        member: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<MaybeBytes> {
        let send = self.content_request(Method::GET, locator, member).send();
        let resp = or_cancelled(send, cancel).await??;
        read_body(resp, cancel).await
    }

    /// Metadata-only existence probe for a member.
    ///
    /// Advisory: every transport fault or non-success status reads as `false`
    /// rather than an error. Only cancellation escapes.
    pub async fn exists(
        &self,
        locator: &ArchiveLocator,
        member: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<bool> {
        let send = self.content_request(Method::HEAD, locator, member).send();
        probe(send, cancel).await
    }

    /// Read an entire non-archived file below a share root.
    ///
    /// Same semantics as [`fetch_whole`](Self::fetch_whole), against the
    /// plain-file content endpoint. Used for marker files in unzipped
    /// directories.
    pub async fn fetch_file(
        &self,
        share: &str,
        path: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<MaybeBytes> {
        let send = self.file_request(Method::GET, share, path).send();
        let resp = or_cancelled(send, cancel).await??;
        read_body(resp, cancel).await
    }

    /// Existence probe for a non-archived file.
    pub async fn file_exists(
        &self,
        share: &str,
        path: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<bool> {
        let send = self.file_request(Method::HEAD, share, path).send();
        probe(send, cancel).await
    }
}

async fn read_body(resp: Response, cancel: Option<&CancellationToken>) -> Result<MaybeBytes> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(Error::transfer(status));
    }
    let body = or_cancelled(resp.bytes(), cancel).await??;
    Ok(Some(body))
}

async fn probe<F>(send: F, cancel: Option<&CancellationToken>) -> Result<bool>
where
    F: Future<Output = reqwest::Result<Response>>,
{
    match or_cancelled(send, cancel).await? {
        Ok(resp) => Ok(resp.status().is_success()),
        Err(err) => {
            log::debug!("existence probe failed: {err}");
            Ok(false)
        }
    }
}
