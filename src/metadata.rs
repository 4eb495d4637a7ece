use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declared node kind of a v3 root marker.
///
/// Marker files from newer writers may declare kinds this crate does not
/// know; those deserialize to [`NodeKind::Unknown`] rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Array,
    Group,
    #[serde(other)]
    Unknown,
}

/// Contents of a v3 `zarr.json` marker file.
#[derive(Debug, Clone, Deserialize)]
pub struct ZarrJson {
    #[serde(default)]
    pub zarr_format: Option<u32>,
    pub node_type: NodeKind,
    /// Array nodes only.
    #[serde(default)]
    pub shape: Option<Vec<u64>>,
    /// Array nodes only; either a plain name or a configured extension
    /// object.
    #[serde(default)]
    pub data_type: Option<Value>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ZarrJson {
    /// Data type as a plain name, if one is declared.
    pub fn data_type_name(&self) -> Option<&str> {
        match &self.data_type {
            Some(Value::String(name)) => Some(name),
            Some(Value::Object(config)) => config.get("name").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Contents of a legacy v2 `.zarray` marker file.
#[derive(Debug, Clone, Deserialize)]
pub struct ZArrayMeta {
    #[serde(default)]
    pub zarr_format: Option<u32>,
    pub shape: Vec<u64>,
    #[serde(default)]
    pub chunks: Option<Vec<u64>>,
    #[serde(default)]
    pub dtype: Option<String>,
}

/// One multiscale image description: the resolution levels of a single
/// image/volume dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Multiscale {
    #[serde(default)]
    pub name: Option<String>,
    pub datasets: Vec<MultiscaleDataset>,
    #[serde(default)]
    pub axes: Vec<Axis>,
    #[serde(default)]
    pub version: Option<String>,
}

/// One resolution level of a multiscale image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiscaleDataset {
    /// Node path of this level, relative to the multiscale root.
    pub path: String,
    #[serde(default)]
    pub coordinate_transformations: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Multiscale descriptors attached to a group's attributes.
///
/// OME-Zarr 0.5 nests them under an `ome` key; earlier versions keep them at
/// the top level. Both placements are accepted, `ome` first. `Ok(None)` means
/// no descriptor is attached; a descriptor that is present but will not parse
/// is an error, since it lives inside a required marker.
pub fn multiscales_from_attributes(
    attrs: &Map<String, Value>,
) -> Result<Option<Vec<Multiscale>>, serde_json::Error> {
    match ome_scoped(attrs, "multiscales") {
        None => Ok(None),
        Some(raw) => serde_json::from_value(raw.clone()).map(Some),
    }
}

/// Label list attached to a labels sidecar's attributes, if parseable.
/// Sidecar data is optional enrichment, so malformed lists read as absent.
pub fn labels_from_attributes(attrs: &Map<String, Value>) -> Option<Vec<String>> {
    let raw = ome_scoped(attrs, "labels")?;
    serde_json::from_value(raw.clone()).ok()
}

fn ome_scoped<'a>(attrs: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    attrs
        .get("ome")
        .and_then(Value::as_object)
        .and_then(|ome| ome.get(key))
        .or_else(|| attrs.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_array_marker_parses() {
        let meta: ZarrJson = serde_json::from_str(
            r#"{
                "zarr_format": 3,
                "node_type": "array",
                "shape": [4, 512, 512],
                "data_type": "uint16",
                "chunk_grid": {"name": "regular", "configuration": {"chunk_shape": [1, 256, 256]}}
            }"#,
        )
        .unwrap();
        assert_eq!(meta.node_type, NodeKind::Array);
        assert_eq!(meta.shape.as_deref(), Some(&[4, 512, 512][..]));
        assert_eq!(meta.data_type_name(), Some("uint16"));
    }

    #[test]
    fn v3_group_marker_with_ome_multiscales() {
        let meta: ZarrJson = serde_json::from_str(
            r#"{
                "zarr_format": 3,
                "node_type": "group",
                "attributes": {
                    "ome": {
                        "version": "0.5",
                        "multiscales": [{
                            "datasets": [{"path": "0"}, {"path": "1"}],
                            "axes": [{"name": "y", "type": "space"}, {"name": "x", "type": "space"}]
                        }]
                    }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(meta.node_type, NodeKind::Group);
        let multiscales = multiscales_from_attributes(&meta.attributes)
            .unwrap()
            .unwrap();
        assert_eq!(multiscales.len(), 1);
        assert_eq!(multiscales[0].datasets[1].path, "1");
        assert_eq!(multiscales[0].axes[0].name, "y");
    }

    #[test]
    fn bare_multiscales_are_found_too() {
        let attrs: Map<String, Value> = serde_json::from_str(
            r#"{"multiscales": [{"version": "0.4", "datasets": [{"path": "s0"}]}]}"#,
        )
        .unwrap();
        let multiscales = multiscales_from_attributes(&attrs).unwrap().unwrap();
        assert_eq!(multiscales[0].version.as_deref(), Some("0.4"));
    }

    #[test]
    fn present_but_malformed_multiscales_is_an_error() {
        let attrs: Map<String, Value> =
            serde_json::from_str(r#"{"multiscales": "not a list"}"#).unwrap();
        assert!(multiscales_from_attributes(&attrs).is_err());
    }

    #[test]
    fn unrecognized_node_kind_is_tolerated() {
        let meta: ZarrJson =
            serde_json::from_str(r#"{"zarr_format": 3, "node_type": "sharded_thing"}"#).unwrap();
        assert_eq!(meta.node_type, NodeKind::Unknown);
    }

    #[test]
    fn zarray_marker_parses() {
        let meta: ZArrayMeta = serde_json::from_str(
            r#"{"zarr_format": 2, "shape": [100, 200], "chunks": [10, 20], "dtype": "<u2"}"#,
        )
        .unwrap();
        assert_eq!(meta.shape, vec![100, 200]);
        assert_eq!(meta.dtype.as_deref(), Some("<u2"));
    }

    #[test]
    fn labels_read_from_either_scope() {
        let nested: Map<String, Value> =
            serde_json::from_str(r#"{"ome": {"labels": ["cells", "nuclei"]}}"#).unwrap();
        assert_eq!(
            labels_from_attributes(&nested),
            Some(vec!["cells".to_string(), "nuclei".to_string()])
        );

        let bare: Map<String, Value> = serde_json::from_str(r#"{"labels": ["glia"]}"#).unwrap();
        assert_eq!(labels_from_attributes(&bare), Some(vec!["glia".to_string()]));

        let malformed: Map<String, Value> = serde_json::from_str(r#"{"labels": 3}"#).unwrap();
        assert_eq!(labels_from_attributes(&malformed), None);
    }
}
