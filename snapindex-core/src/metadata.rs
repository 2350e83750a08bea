//! Rotation records: per-index metadata and the pipeline state cell
//!
//! [`IndexMetadata`] is the persistent record a rebuild publishes so online
//! readers learn about a rebuilt index. The wire encoding is JSON with the
//! historical field names (`indexLocalDate` for the date); records written
//! by earlier builds sometimes carry a malformed nested date object, which
//! must deserialize to `None` rather than fail, since readers degrade to
//! the live index when the date is unknown.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Metadata about a rebuilt index, published on rotation.
///
/// Invariants once published: `rebuilt_index_name` is write-once per build;
/// `routing_strategy` never changes (re-routing an immutable index is not
/// possible); `num_shards >= num_shards_per_org >= 1`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMetadata {
    /// Name of the index when it was first created; stable identifier shared
    /// with live writers.
    #[serde(default)]
    pub index_name_at_birth: String,

    /// Full unique name of the rebuilt index, including the build id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebuilt_index_name: Option<String>,

    /// Short alias for the rebuilt index, for URL-length-limited
    /// multi-index reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebuilt_index_alias: Option<String>,

    /// Calendar day the indexed data belongs to (UTC).
    #[serde(
        rename = "indexLocalDate",
        default,
        deserialize_with = "lenient_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub index_date: Option<NaiveDate>,

    /// Number of shards in the index.
    #[serde(default)]
    pub num_shards: u32,

    /// Number of shards one tenant's data spans within the index.
    #[serde(default)]
    pub num_shards_per_org: u32,

    /// Identifier of the routing strategy the index was built with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_strategy_class_name: Option<String>,
}

impl IndexMetadata {
    /// A shell record carrying only the birth name.
    ///
    /// Returned by registry lookups when no record exists (or cannot be
    /// read), so callers fall through to the live index.
    pub fn shell(index_name_at_birth: impl Into<String>) -> Self {
        Self {
            index_name_at_birth: index_name_at_birth.into(),
            ..Self::default()
        }
    }

    /// Validate the shard-count invariant.
    pub fn validate_shards(&self) -> Result<()> {
        if self.num_shards_per_org < 1 || self.num_shards < self.num_shards_per_org {
            return Err(Error::config(format!(
                "numShards ({}) must be >= numShardsPerOrg ({}) >= 1",
                self.num_shards, self.num_shards_per_org
            )));
        }
        Ok(())
    }
}

/// Accept `"YYYY-MM-DD"`; anything else (including the legacy nested date
/// object) becomes `None`.
fn lenient_date<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok(),
        _ => None,
    })
}

/// State of the offline rebuild pipeline, read by live writers to decide
/// whether to defer writes to indices currently being rebuilt.
///
/// Persisted as the ASCII name of the variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// A rebuild job is in flight.
    Running,
    /// No rebuild in flight (the default when unset).
    Complete,
}

impl PipelineState {
    /// Wire form of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Running => "RUNNING",
            PipelineState::Complete => "COMPLETE",
        }
    }

    /// Parse the wire form.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "RUNNING" => Ok(PipelineState::Running),
            "COMPLETE" => Ok(PipelineState::Complete),
            other => Err(Error::other(format!("unknown pipeline state: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexMetadata {
        IndexMetadata {
            index_name_at_birth: "test".to_string(),
            rebuilt_index_name: None,
            rebuilt_index_alias: Some("alias".to_string()),
            index_date: NaiveDate::from_ymd_opt(2015, 2, 9),
            num_shards: 2,
            num_shards_per_org: 3,
            routing_strategy_class_name: Some("v1".to_string()),
        }
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            json,
            r#"{"indexNameAtBirth":"test","rebuiltIndexAlias":"alias","indexLocalDate":"2015-02-09","numShards":2,"numShardsPerOrg":3,"routingStrategyClassName":"v1"}"#
        );
    }

    #[test]
    fn test_round_trip() {
        let meta = sample();
        let json = serde_json::to_string(&meta).unwrap();
        let back: IndexMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_legacy_nested_date_is_tolerated() {
        // Records written by a since-fixed serializer carry the date as a
        // nested object under a different key; it must come back None with
        // every other field intact.
        let legacy = r#"{
            "indexNameAtBirth": "c141031",
            "rebuiltIndexName": "c141031_build_399_20150206012509",
            "rebuiltIndexAlias": "c141031r",
            "indexLocalDate": {
                "iLocalMillis": 1414713600000,
                "iChronology": { "iBase": { "iMinDaysInFirstWeek": 4 } }
            },
            "numShards": 5,
            "numShardsPerOrg": 2,
            "routingStrategyClassName": "v1"
        }"#;
        let meta: IndexMetadata = serde_json::from_str(legacy).unwrap();
        assert_eq!(meta.index_name_at_birth, "c141031");
        assert_eq!(
            meta.rebuilt_index_name.as_deref(),
            Some("c141031_build_399_20150206012509")
        );
        assert_eq!(meta.rebuilt_index_alias.as_deref(), Some("c141031r"));
        assert_eq!(meta.index_date, None);
        assert_eq!(meta.num_shards, 5);
        assert_eq!(meta.num_shards_per_org, 2);
        assert_eq!(meta.routing_strategy_class_name.as_deref(), Some("v1"));
    }

    #[test]
    fn test_malformed_local_date_is_tolerated() {
        let json = r#"{"indexNameAtBirth":"a","indexLocalDate":{"millis":1},"numShards":1,"numShardsPerOrg":1}"#;
        let meta: IndexMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.index_date, None);
        assert_eq!(meta.index_name_at_birth, "a");
    }

    #[test]
    fn test_validate_shards() {
        assert!(sample().validate_shards().is_err()); // 2 < 3
        let mut ok = sample();
        ok.num_shards = 10;
        assert!(ok.validate_shards().is_ok());
        let mut zero = sample();
        zero.num_shards_per_org = 0;
        assert!(zero.validate_shards().is_err());
    }

    #[test]
    fn test_pipeline_state_wire_form() {
        assert_eq!(PipelineState::Running.as_str(), "RUNNING");
        assert_eq!(PipelineState::Complete.as_str(), "COMPLETE");
        assert_eq!(
            PipelineState::parse("RUNNING").unwrap(),
            PipelineState::Running
        );
        assert!(PipelineState::parse("running").is_err());
    }

    #[test]
    fn test_shell_record() {
        let shell = IndexMetadata::shell("c140101");
        assert_eq!(shell.index_name_at_birth, "c140101");
        assert_eq!(shell.rebuilt_index_alias, None);
        assert_eq!(shell.num_shards, 0);
    }
}
