//! Video record models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One video record in an upsert batch.
///
/// `snippet` and `status` are opaque to the queue core; they are handed to
/// the catalog store verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    /// Unique identifier, used as the upsert key
    pub id: String,

    /// Owning channel
    #[serde(default)]
    pub channel_id: String,

    /// Opaque snippet payload
    #[serde(default)]
    pub snippet: serde_json::Value,

    /// Opaque status payload
    #[serde(default)]
    pub status: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format_is_camel_case() {
        let record: VideoRecord = serde_json::from_value(json!({
            "id": "v1",
            "channelId": "c1",
            "snippet": {"title": "hello"},
            "status": {"privacyStatus": "public"},
        }))
        .expect("deserialize VideoRecord");

        assert_eq!(record.id, "v1");
        assert_eq!(record.channel_id, "c1");
        assert_eq!(record.snippet["title"], "hello");

        let value = serde_json::to_value(&record).expect("serialize VideoRecord");
        assert_eq!(value["channelId"], "c1");
    }

    #[test]
    fn test_opaque_fields_default_to_null() {
        let record: VideoRecord =
            serde_json::from_value(json!({"id": "v1"})).expect("deserialize VideoRecord");

        assert_eq!(record.channel_id, "");
        assert!(record.snippet.is_null());
        assert!(record.status.is_null());
    }
}
