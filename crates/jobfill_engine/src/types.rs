use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wire form of [`FieldLabel::Missing`].
pub const NO_LABEL: &str = "(no label)";

/// Label → answer mapping produced by the answer service.
pub type AnswerSet = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldTag {
    TextInput,
    Textarea,
    Select,
    File,
    /// A radio group, or checkboxes sharing a name.
    Choice,
}

/// Result of label resolution. `Missing` is distinct from an empty caption.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldLabel {
    Text(String),
    Missing,
}

impl FieldLabel {
    pub fn as_str(&self) -> &str {
        match self {
            FieldLabel::Text(text) => text,
            FieldLabel::Missing => NO_LABEL,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            FieldLabel::Text(text) => Some(text),
            FieldLabel::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldLabel::Missing)
    }
}

impl fmt::Display for FieldLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == NO_LABEL {
            Ok(FieldLabel::Missing)
        } else {
            Ok(FieldLabel::Text(raw))
        }
    }
}

/// One fillable control found on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub tag: FieldTag,
    pub dom_id: Option<String>,
    pub dom_name: Option<String>,
    pub placeholder: Option<String>,
    pub aria_label: Option<String>,
    pub inferred_label: FieldLabel,
    pub visible: bool,
    pub input_type: Option<String>,
}

impl FieldDescriptor {
    /// Deduplication identity.
    pub fn identity(&self) -> (Option<&str>, Option<&str>, &FieldLabel) {
        (
            self.dom_id.as_deref(),
            self.dom_name.as_deref(),
            &self.inferred_label,
        )
    }
}

/// Resume document handed to file inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeFilePayload {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    #[serde(
        serialize_with = "serialize_base64",
        deserialize_with = "deserialize_base64"
    )]
    pub content: Vec<u8>,
}

impl ResumeFilePayload {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size_bytes: content.len() as u64,
            content,
        }
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}

fn deserialize_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    BASE64
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}

/// Resume text plus its source filename, as parsed by the intake collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedResume {
    pub raw_text: String,
    pub filename: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_label_uses_sentinel_on_the_wire() {
        let json = serde_json::to_string(&FieldLabel::Missing).unwrap();
        assert_eq!(json, "\"(no label)\"");
        let back: FieldLabel = serde_json::from_str(&json).unwrap();
        assert!(back.is_missing());

        let empty: FieldLabel = serde_json::from_str("\"\"").unwrap();
        assert_eq!(empty, FieldLabel::Text(String::new()));
    }

    #[test]
    fn resume_payload_content_is_base64_encoded() {
        let payload = ResumeFilePayload::new("cv.pdf", "application/pdf", b"%PDF".to_vec());
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["content"], "JVBERg==");
        assert_eq!(json["size_bytes"], 4);
    }
}
