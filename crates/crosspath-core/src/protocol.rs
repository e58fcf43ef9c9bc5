//! Outbound push payloads.
//!
//! These are the events a connected client observes. The transport
//! envelope (WebSocket text frames) is handled by the server crate; the
//! payloads are small records of string fields.

use serde::Serialize;

/// A push delivered to one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum ServerPush {
    /// Plain acknowledgement or informational text.
    #[serde(rename = "message")]
    Message { text: String },

    /// Co-presence was detected; sent to the acting side.
    #[serde(rename = "crash")]
    Crash { text: String },

    /// Co-presence was detected; sent to the side that was found.
    #[serde(rename = "crashed")]
    Crashed { text: String },

    /// The reunion completed. Carries the peer's profile attributes.
    #[serde(rename = "reunion")]
    Reunion {
        text: String,
        profile: String,
        gender: String,
    },

    /// The reunion did not complete (mismatched answers, or nothing to
    /// finalize).
    #[serde(rename = "noreunion")]
    NoReunion { text: String },

    /// A confirm arrived with no live pairing behind it.
    #[serde(rename = "nocrash")]
    NoCrash { text: String },

    #[serde(rename = "error")]
    Error { text: String },
}

impl ServerPush {
    /// Wire-level event name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerPush::Message { .. } => "message",
            ServerPush::Crash { .. } => "crash",
            ServerPush::Crashed { .. } => "crashed",
            ServerPush::Reunion { .. } => "reunion",
            ServerPush::NoReunion { .. } => "noreunion",
            ServerPush::NoCrash { .. } => "nocrash",
            ServerPush::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushes_serialize_with_event_tag() {
        let json = serde_json::to_string(&ServerPush::Crash {
            text: "crash!!".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"crash","text":"crash!!"}"#);

        let json = serde_json::to_string(&ServerPush::Reunion {
            text: "reunion!!".into(),
            profile: "loves toast".into(),
            gender: "f".into(),
        })
        .unwrap();
        assert!(json.starts_with(r#"{"event":"reunion""#));
        assert!(json.contains(r#""profile":"loves toast""#));
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let push = ServerPush::NoReunion { text: "".into() };
        let json = serde_json::to_string(&push).unwrap();
        assert!(json.contains(&format!(r#""event":"{}""#, push.kind())));
    }
}
