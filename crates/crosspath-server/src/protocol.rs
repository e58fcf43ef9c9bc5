//! Inbound wire protocol. Every frame is a JSON object tagged with `type`;
//! pushes back to the client are the serialized [`crosspath_core::ServerPush`]
//! variants.

use serde::Deserialize;

/// An event a connected client can send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// The user is currently viewing `page`.
    #[serde(rename = "watch")]
    Watch { name: String, page: String },

    /// First opt-in after a crash notification.
    #[serde(rename = "confirm")]
    Confirm {
        name: String,
        answer: Option<String>,
    },

    /// Completing opt-in, optionally carrying the shared answer.
    #[serde(rename = "finalize")]
    Finalize {
        name: String,
        answer: Option<String>,
    },

    /// Create or update the user's profile.
    #[serde(rename = "register")]
    Register {
        name: String,
        gender: String,
        profile: String,
    },

    /// Check whether a profile exists.
    #[serde(rename = "get_user")]
    GetUser { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_watch_event() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"watch","name":"alice","page":"page:7"}"#).unwrap();
        assert!(matches!(
            event,
            ClientEvent::Watch { ref name, ref page } if name == "alice" && page == "page:7"
        ));
    }

    #[test]
    fn answer_is_optional() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"confirm","name":"alice"}"#).unwrap();
        assert!(matches!(
            event,
            ClientEvent::Confirm { answer: None, .. }
        ));

        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"finalize","name":"bob","answer":"x"}"#).unwrap();
        assert!(matches!(
            event,
            ClientEvent::Finalize { answer: Some(ref a), .. } if a == "x"
        ));
    }

    #[test]
    fn rejects_unknown_event_type() {
        let result = serde_json::from_str::<ClientEvent>(r#"{"type":"dance","name":"alice"}"#);
        assert!(result.is_err());
    }
}
