use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Kind of row change carried by an envelope.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Change notification pushed by the realtime transport.
///
/// `record` holds the row after the change (insert/update), `old_record`
/// the row before it (update/delete). Delete payloads may only carry the
/// primary key in `old_record`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChangeEnvelope {
    pub topic: String,
    pub kind: ChangeKind,
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub old_record: Option<Value>,
    #[serde(default)]
    pub commit_timestamp: Option<i64>,
}

impl ChangeEnvelope {
    pub fn insert<T: Serialize>(topic: impl Into<String>, record: &T) -> Result<Self> {
        Ok(Self {
            topic: topic.into(),
            kind: ChangeKind::Insert,
            record: Some(serde_json::to_value(record)?),
            old_record: None,
            commit_timestamp: None,
        })
    }

    pub fn update<T: Serialize>(topic: impl Into<String>, record: &T) -> Result<Self> {
        Ok(Self {
            topic: topic.into(),
            kind: ChangeKind::Update,
            record: Some(serde_json::to_value(record)?),
            old_record: None,
            commit_timestamp: None,
        })
    }

    /// Delete notification carrying only the primary key of the removed row.
    pub fn delete(topic: impl Into<String>, id: &str) -> Self {
        Self {
            topic: topic.into(),
            kind: ChangeKind::Delete,
            record: None,
            old_record: Some(serde_json::json!({ "id": id })),
            commit_timestamp: None,
        }
    }

    pub fn with_commit_timestamp(mut self, ts: i64) -> Self {
        self.commit_timestamp = Some(ts);
        self
    }

    /// Decode the post-change row.
    pub fn decode_record<T: DeserializeOwned>(&self) -> Result<T> {
        let Some(record) = self.record.clone() else {
            anyhow::bail!("missing_record");
        };
        Ok(serde_json::from_value(record)?)
    }

    /// Primary key of the pre-change row, if present.
    pub fn old_id(&self) -> Option<&str> {
        self.old_record
            .as_ref()
            .and_then(|r| r.get("id"))
            .and_then(|v| v.as_str())
    }

    /// Parse a line-delimited JSON envelope.
    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Topic on which message changes for one resource are published.
pub fn messages_topic(resource_id: &str) -> String {
    format!("messages:{}", resource_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        id: String,
        body: String,
    }

    #[test]
    fn insert_decodes_record() {
        let row = Row {
            id: "m1".into(),
            body: "hi".into(),
        };
        let env = ChangeEnvelope::insert(messages_topic("hab-1"), &row).unwrap();
        assert_eq!(env.topic, "messages:hab-1");
        assert_eq!(env.decode_record::<Row>().unwrap(), row);
    }

    #[test]
    fn delete_carries_only_id() {
        let env = ChangeEnvelope::delete("messages:hab-1", "m9");
        assert_eq!(env.old_id(), Some("m9"));
        assert!(env.decode_record::<Row>().is_err());
    }

    #[test]
    fn parses_backend_payload() {
        let line = r#"{"topic":"messages:hab-1","kind":"UPDATE","record":{"id":"m1","body":"edited"},"commit_timestamp":42}"#;
        let env = ChangeEnvelope::from_json(line).unwrap();
        assert_eq!(env.kind, ChangeKind::Update);
        assert_eq!(env.commit_timestamp, Some(42));
        assert!(env.old_record.is_none());
        assert_eq!(env.decode_record::<Row>().unwrap().body, "edited");
    }
}
