use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::listing::{ArchiveInfo, EntryLister};

/// Root marker file of the Zarr v3 layout.
pub const V3_ROOT_MARKER: &str = "zarr.json";
/// Legacy v2 array-shape marker.
pub const V2_ARRAY_MARKER: &str = ".zarray";
/// Legacy v2 attributes marker.
pub const V2_ATTRS_MARKER: &str = ".zattrs";

/// On-disk layout version of a chunked-array node.
///
/// A directory may expose zero, one, or both versions; dual-layout
/// directories exist for backward compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatVersion {
    V2,
    V3,
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatVersion::V2 => f.write_str("v2"),
            FormatVersion::V3 => f.write_str("v3"),
        }
    }
}

/// Versions present in a plain directory, judged from its immediate child
/// names. Pure; performs no I/O.
pub fn detect_in_directory<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<FormatVersion> {
    let mut v2 = false;
    let mut v3 = false;
    for name in names {
        match name {
            V3_ROOT_MARKER => v3 = true,
            V2_ARRAY_MARKER | V2_ATTRS_MARKER => v2 = true,
            _ => {}
        }
    }
    subset(v3, v2)
}

/// Versions present in an archive, judged from its full member-name list.
///
/// Archives in this family are defined to carry only the v3 layout; v2
/// markers inside an archive are not recognized and never produce `V2`.
pub fn detect_in_member_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<FormatVersion> {
    if names.into_iter().any(is_v3_root_member) {
        vec![FormatVersion::V3]
    } else {
        Vec::new()
    }
}

/// Versions present in a remote archive, pulling member names lazily.
///
/// Stops at the first v3 root marker; with a manifest-first archive, also
/// stops at the first non-metadata member, since any marker would already
/// have been seen by then.
pub async fn detect_in_archive(
    lister: &EntryLister,
    info: Option<&ArchiveInfo>,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<FormatVersion>> {
    let manifest_first = info.is_some_and(|info| info.first_member_is_manifest);
    let mut names = lister.names(None);
    while let Some(name) = names.next(cancel).await? {
        if is_v3_root_member(&name) {
            return Ok(vec![FormatVersion::V3]);
        }
        if manifest_first && !name.ends_with('/') && !is_metadata_member(&name) {
            log::debug!("manifest-first cutoff at {name}");
            break;
        }
    }
    Ok(Vec::new())
}

/// True for the archive root marker itself or the marker of any nested node.
pub fn is_v3_root_member(name: &str) -> bool {
    name.strip_suffix(V3_ROOT_MARKER)
        .is_some_and(|prefix| prefix.is_empty() || prefix.ends_with('/'))
}

/// True if the filename carries the zipped OME-Zarr extension.
pub fn is_ozx_filename(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".ozx")
}

fn is_metadata_member(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".json")
        || lower.ends_with(".zattrs")
        || lower.ends_with(".zarray")
        || lower.ends_with(".zgroup")
}

fn subset(v3: bool, v2: bool) -> Vec<FormatVersion> {
    let mut versions = Vec::new();
    if v3 {
        versions.push(FormatVersion::V3);
    }
    if v2 {
        versions.push(FormatVersion::V2);
    }
    versions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_with_only_v3_marker() {
        let versions = detect_in_directory(["zarr.json", "0", "labels"]);
        assert_eq!(versions, vec![FormatVersion::V3]);
    }

    #[test]
    fn directory_with_only_legacy_markers() {
        assert_eq!(
            detect_in_directory([".zarray", "0.0"]),
            vec![FormatVersion::V2]
        );
        assert_eq!(
            detect_in_directory([".zattrs", "s0"]),
            vec![FormatVersion::V2]
        );
    }

    #[test]
    fn dual_layout_directory_reports_both() {
        let versions = detect_in_directory(["zarr.json", ".zattrs", ".zarray"]);
        assert_eq!(versions, vec![FormatVersion::V3, FormatVersion::V2]);
    }

    #[test]
    fn unmarked_directory_reports_nothing() {
        assert!(detect_in_directory(["readme.txt", "data"]).is_empty());
    }

    #[test]
    fn nested_marker_names_do_not_count_in_directories() {
        // Immediate children only; a child named like a nested path is not a
        // marker.
        assert!(detect_in_directory(["0/zarr.json"]).is_empty());
    }

    #[test]
    fn archive_names_with_root_marker() {
        let versions = detect_in_member_names(["zarr.json", "0/zarr.json", "0/c/0/0"]);
        assert_eq!(versions, vec![FormatVersion::V3]);
    }

    #[test]
    fn archive_names_with_nested_marker_only() {
        let versions = detect_in_member_names(["plate/0/zarr.json", "plate/0/c/0"]);
        assert_eq!(versions, vec![FormatVersion::V3]);
    }

    #[test]
    fn v2_markers_in_archives_are_not_supported() {
        assert!(detect_in_member_names([".zarray", ".zattrs", "0.0"]).is_empty());
    }

    #[test]
    fn lookalike_member_names_do_not_match() {
        assert!(detect_in_member_names(["not-zarr.json", "zarr.json5"]).is_empty());
    }

    #[test]
    fn ozx_extension_is_case_insensitive() {
        assert!(is_ozx_filename("plate.ozx"));
        assert!(is_ozx_filename("PLATE.OZX"));
        assert!(!is_ozx_filename("plate.zarr"));
        assert!(!is_ozx_filename("ozx"));
    }
}
