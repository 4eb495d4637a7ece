use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cancel::or_cancelled;
use crate::client::{ArchiveLocator, ContentClient};
use crate::{Error, Result};

/// Page size used when the caller does not pick one.
pub const DEFAULT_PAGE_LIMIT: u64 = 100;

/// Hard ceiling on pages fetched in one pass over a name sequence, so a
/// misbehaving backend cannot spin the cursor forever.
const MAX_PAGES_PER_PASS: u64 = 10_000;

/// One member of an archive, as reported by the listing endpoint.
///
/// Entries are immutable facts about archive contents; they are produced by
/// the backend's central-directory parse and never derived client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    /// Member path, forward-slash separated.
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Raw ZIP compression method id (0 = stored, 8 = deflate).
    pub compression_method: u16,
    pub is_directory: bool,
}

/// A window over the entry sequence of one archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    pub entries: Vec<ArchiveEntry>,
    pub total_count: u64,
    pub offset: u64,
    pub limit: u64,
    pub has_more: bool,
}

/// Response of the archive metadata endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveInfo {
    /// Format version declared in the archive's own metadata, if any.
    pub version: Option<String>,
    /// True if the archive promises its metadata members lead the central
    /// directory, allowing early cutoff during discovery scans.
    pub first_member_is_manifest: bool,
    pub member_count: u64,
    /// True for ZIP64 archives.
    pub requires_large_file_mode: bool,
}

/// Requests fixed-size pages of entry metadata for one archive.
#[derive(Debug, Clone)]
pub struct EntryLister {
    client: ContentClient,
    locator: ArchiveLocator,
}

impl EntryLister {
    pub fn new(client: ContentClient, locator: ArchiveLocator) -> Self {
        Self { client, locator }
    }

    pub fn locator(&self) -> &ArchiveLocator {
        &self.locator
    }

    /// Fetch the archive metadata record.
    pub async fn info(&self, cancel: Option<&CancellationToken>) -> Result<ArchiveInfo> {
        let send = self
            .client
            .http()
            .get(self.client.archive_endpoint(&self.locator.share, "info"))
            .query(&[("subpath", self.locator.path.as_str())])
            .send();
        let resp = or_cancelled(send, cancel).await??;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::transfer(status));
        }
        let body = or_cancelled(resp.bytes(), cancel).await??;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetch a single page. Does not follow `has_more`.
    ///
    /// `prefix`, if given, filters member names server-side.
    pub async fn list_page(
        &self,
        offset: u64,
        limit: u64,
        prefix: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> Result<EntryPage> {
        if limit == 0 {
            return Err(Error::general("page limit must be positive"));
        }
        let mut query: Vec<(&str, String)> = vec![
            ("subpath", self.locator.path.clone()),
            ("withDetails", "true".to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(prefix) = prefix {
            query.push(("prefix", prefix.to_string()));
        }
        let send = self
            .client
            .http()
            .get(self.client.archive_endpoint(&self.locator.share, "entries"))
            .query(&query)
            .send();
        let resp = or_cancelled(send, cancel).await??;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::transfer(status));
        }
        let body = or_cancelled(resp.bytes(), cancel).await??;
        let page: EntryPage = serde_json::from_slice(&body)?;
        if page.offset + page.entries.len() as u64 > page.total_count {
            return Err(Error::general(
                "listing page overruns the declared entry count",
            ));
        }
        Ok(page)
    }

    /// Lazy sequence of all member names, in listing order.
    pub fn names(&self, prefix: Option<&str>) -> MemberNames {
        self.names_paged(prefix, DEFAULT_PAGE_LIMIT)
    }

    /// Same as [`names`](Self::names) with an explicit page size.
    pub fn names_paged(&self, prefix: Option<&str>, limit: u64) -> MemberNames {
        MemberNames {
            lister: self.clone(),
            prefix: prefix.map(str::to_string),
            limit,
            offset: 0,
            pages_fetched: 0,
            pending: VecDeque::new(),
            exhausted: false,
        }
    }
}

/// Lazily-growing sequence of member names.
///
/// Pages are fetched on demand and strictly in order; page N+1 is only
/// requested after page N resolves, so names come out in ascending offset
/// order with no overlap. A failed page aborts the sequence; names already
/// yielded stand, and short-circuiting consumers (existence-style checks)
/// should stop pulling as soon as they have what they need.
#[derive(Debug)]
pub struct MemberNames {
    lister: EntryLister,
    prefix: Option<String>,
    limit: u64,
    offset: u64,
    pages_fetched: u64,
    pending: VecDeque<String>,
    exhausted: bool,
}

impl MemberNames {
    /// Next name, fetching the next page when the buffer runs dry.
    pub async fn next(&mut self, cancel: Option<&CancellationToken>) -> Result<Option<String>> {
        loop {
            if let Some(name) = self.pending.pop_front() {
                return Ok(Some(name));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_next_page(cancel).await?;
        }
    }

    /// Rewind to offset 0, discarding buffered names.
    pub fn restart(&mut self) {
        self.offset = 0;
        self.pages_fetched = 0;
        self.pending.clear();
        self.exhausted = false;
    }

    /// Drain the rest of the sequence into a vector.
    pub async fn collect_remaining(
        mut self,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<String>> {
        let mut names = Vec::new();
        while let Some(name) = self.next(cancel).await? {
            names.push(name);
        }
        Ok(names)
    }

    async fn fetch_next_page(&mut self, cancel: Option<&CancellationToken>) -> Result<()> {
        if self.pages_fetched >= MAX_PAGES_PER_PASS {
            return Err(Error::general(
                "member listing exceeded the page safety ceiling",
            ));
        }
        let page = self
            .lister
            .list_page(self.offset, self.limit, self.prefix.as_deref(), cancel)
            .await?;
        self.pages_fetched += 1;
        if page.entries.is_empty() && page.has_more {
            return Err(Error::general(
                "listing did not advance: empty page with more entries pending",
            ));
        }
        log::debug!(
            "entry page at offset {}: {} entries, has_more={}",
            self.offset,
            page.entries.len(),
            page.has_more
        );
        self.offset += self.limit;
        self.exhausted = !page.has_more;
        self.pending
            .extend(page.entries.into_iter().map(|entry| entry.name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_page_parses_camel_case_wire_form() {
        let page: EntryPage = serde_json::from_str(
            r#"{
                "entries": [{
                    "name": "zarr.json",
                    "compressedSize": 84,
                    "uncompressedSize": 112,
                    "compressionMethod": 0,
                    "isDirectory": false
                }],
                "totalCount": 1,
                "offset": 0,
                "limit": 100,
                "hasMore": false
            }"#,
        )
        .unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].name, "zarr.json");
        assert_eq!(page.entries[0].compression_method, 0);
        assert!(!page.has_more);
    }

    #[test]
    fn archive_info_tolerates_null_version() {
        let info: ArchiveInfo = serde_json::from_str(
            r#"{
                "version": null,
                "firstMemberIsManifest": false,
                "memberCount": 42,
                "requiresLargeFileMode": true
            }"#,
        )
        .unwrap();
        assert!(info.version.is_none());
        assert!(info.requires_large_file_mode);
    }
}
