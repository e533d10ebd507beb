use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// A single chat message as returned by the remote service.
///
/// Immutable once cached, except for `likers`, which the remote mutates in
/// place as members like and unlike the message. `id` is a numeric string
/// issued monotonically per conversation, globally unique across the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub group_id: Option<String>,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Unix epoch seconds.
    pub created_at: i64,
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub likers: Vec<String>,
}

/// Attachment payloads, discriminated by the remote's `type` field.
///
/// Unrecognized discriminants decode to `Unknown` rather than failing the
/// whole message, so newer server-side attachment types pass through the
/// cache harmlessly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attachment {
    Image { url: String },
    LinkedImage { url: String },
    Emoji {
        placeholder: String,
        charmap: Vec<Vec<i64>>,
    },
    Location {
        name: String,
        lat: String,
        lng: String,
    },
    Split { token: String },
    #[serde(other)]
    Unknown,
}

/// Attachment discriminants usable as a query filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    LinkedImage,
    Emoji,
    Location,
    Split,
}

impl AttachmentKind {
    /// The wire discriminant stored in the `type` field.
    pub fn discriminant(self) -> &'static str {
        match self {
            AttachmentKind::Image => "image",
            AttachmentKind::LinkedImage => "linked_image",
            AttachmentKind::Emoji => "emoji",
            AttachmentKind::Location => "location",
            AttachmentKind::Split => "split",
        }
    }
}

impl Attachment {
    pub fn kind(&self) -> Option<AttachmentKind> {
        match self {
            Attachment::Image { .. } => Some(AttachmentKind::Image),
            Attachment::LinkedImage { .. } => Some(AttachmentKind::LinkedImage),
            Attachment::Emoji { .. } => Some(AttachmentKind::Emoji),
            Attachment::Location { .. } => Some(AttachmentKind::Location),
            Attachment::Split { .. } => Some(AttachmentKind::Split),
            Attachment::Unknown => None,
        }
    }
}

/// Message ids are numeric strings of varying digit counts; ordering
/// comparisons must be numeric, never lexical.
pub fn parse_message_id(id: &str) -> Result<u64, CacheError> {
    id.parse::<u64>()
        .map_err(|_| CacheError::InvalidInput(format!("Non-numeric message id: {}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_discriminant_roundtrip() {
        let json = r#"{"type":"image","url":"https://i.example/1.png"}"#;
        let att: Attachment = serde_json::from_str(json).unwrap();
        assert_eq!(
            att,
            Attachment::Image {
                url: "https://i.example/1.png".to_string()
            }
        );

        let json = r#"{"type":"location","name":"HQ","lat":"40.0","lng":"-75.0"}"#;
        let att: Attachment = serde_json::from_str(json).unwrap();
        assert_eq!(att.kind(), Some(AttachmentKind::Location));
    }

    #[test]
    fn test_unknown_attachment_type_is_tolerated() {
        let att: Attachment = serde_json::from_str(r#"{"type":"hologram"}"#).unwrap();
        assert_eq!(att, Attachment::Unknown);
        assert_eq!(att.kind(), None);
    }

    #[test]
    fn test_message_id_is_compared_numerically() {
        // "99" < "100" numerically even though it sorts after it lexically
        assert!(parse_message_id("99").unwrap() < parse_message_id("100").unwrap());
        assert!(parse_message_id("12a").is_err());
    }
}
