//! Persisted per-cell metadata
//!
//! The `dfmetadata` block stored with each cell in the notebook file. Field
//! names follow the notebook format, not Rust conventions.

use crate::status::CellStatus;
use dfnb_ident::{CellId, Tag};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Consumed names grouped by the cell or tag that resolves them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputVars {
    /// short id → names read from that cell during the last execution
    #[serde(rename = "ref", default)]
    pub refs: BTreeMap<String, Vec<String>>,
    /// tag → names displayed with that tag
    #[serde(default)]
    pub tag_refs: BTreeMap<String, Vec<String>>,
}

/// Persisted metadata block of one cell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DfMetadata {
    /// Resolution of consumed names
    #[serde(default)]
    pub input_vars: InputVars,
    /// Exported names
    #[serde(default)]
    pub output_vars: Vec<String>,
    /// Source with every bound occurrence explicitly annotated
    #[serde(default)]
    pub persistent_code: String,
    /// Cell tag; `""` when untagged
    #[serde(default, with = "tag_or_empty")]
    pub tag: Option<Tag>,
}

/// One cell as saved in a notebook file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCell {
    /// Stable identifier
    pub id: CellId,
    /// Displayed source
    pub source: String,
    /// Status at save time
    #[serde(default)]
    pub status: CellStatus,
    /// Metadata; absent for cells that never executed
    #[serde(default, rename = "dfmetadata", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DfMetadata>,
}

/// Saved notebook: cells in display order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedNotebook {
    /// Cells
    pub cells: Vec<SavedCell>,
}

mod tag_or_empty {
    use super::{Deserialize, Deserializer, Serializer, Tag};

    pub(super) fn serialize<S: Serializer>(tag: &Option<Tag>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(tag.as_ref().map_or("", Tag::as_str))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Tag>, D::Error> {
        let text = String::deserialize(deserializer)?;
        Tag::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn metadata_uses_notebook_field_names() {
        let mut metadata = DfMetadata {
            output_vars: vec!["b".into()],
            persistent_code: "b=a$1f2e3d4c+9".into(),
            ..DfMetadata::default()
        };
        metadata
            .input_vars
            .refs
            .insert("1f2e3d4c".into(), vec!["a".into()]);

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "inputVars": { "ref": { "1f2e3d4c": ["a"] }, "tag_refs": {} },
                "outputVars": ["b"],
                "persistentCode": "b=a$1f2e3d4c+9",
                "tag": ""
            })
        );
    }

    #[test]
    fn tag_round_trips_through_empty_string() {
        let json = r#"{"inputVars":{"ref":{},"tag_refs":{}},"outputVars":[],"persistentCode":"","tag":"testTag"}"#;
        let metadata: DfMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.tag.as_ref().map(Tag::as_str), Some("testTag"));

        let untagged: DfMetadata = serde_json::from_str(r#"{"tag":""}"#).unwrap();
        assert_eq!(untagged.tag, None);
        assert!(serde_json::from_str::<DfMetadata>(r#"{"tag":"not a tag"}"#).is_err());
    }
}
