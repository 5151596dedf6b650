//! Session wire events.
//!
//! Everything that crosses the WebSocket is one of these two tagged
//! enums, as single JSON objects with a `type` field. Directive tags never
//! appear in any outbound event; the extractor strips them before text
//! reaches the transport.

use serde::{Deserialize, Serialize};

use crate::directive::Observation;
use crate::executors::IntentPayload;

/// Inbound: what a connected client can ask for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A typed command.
    Command { text: String },
    /// A finished speech transcript recognized on the client.
    Transcript { text: String },
}

/// Outbound: everything the engine tells a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Directive-free generated text, streamed as it arrives.
    Delta { text: String },
    /// Operational notice for the client's activity log.
    Log { message: String },
    /// Result of one dispatched directive.
    Observation {
        #[serde(flatten)]
        observation: Observation,
    },
    /// Echo of the utterance the server is acting on.
    Transcript { text: String },
    /// Final voice line of a turn; the client speaks this aloud.
    Speak { text: String },
    /// Action for the paired phone to carry out.
    TriggerIntent {
        #[serde(flatten)]
        payload: IntentPayload,
    },
    /// The turn reached a terminal state cleanly.
    Done,
    /// The turn or the event stream broke.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::DirectiveKind;

    #[test]
    fn client_events_parse_from_tagged_json() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"command","text":"open calculator"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Command {
                text: "open calculator".to_string()
            }
        );

        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"transcript","text":"lock my screen"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Transcript { .. }));
    }

    #[test]
    fn observation_event_flattens_its_fields() {
        let event = ServerEvent::Observation {
            observation: Observation::success(DirectiveKind::Terminal, "Output:\nhello"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "observation");
        assert_eq!(json["kind"], "terminal");
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Output:\nhello");
    }

    #[test]
    fn trigger_intent_event_carries_the_payload_inline() {
        let event = ServerEvent::TriggerIntent {
            payload: IntentPayload::Sms {
                phone_number: "+15551234567".to_string(),
                message: "on my way".to_string(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "trigger_intent");
        assert_eq!(json["intent"], "sms");
        assert_eq!(json["phone_number"], "+15551234567");
        assert_eq!(json["message"], "on my way");
    }

    #[test]
    fn done_serializes_as_a_bare_tag() {
        let json = serde_json::to_value(&ServerEvent::Done).unwrap();
        assert_eq!(json, serde_json::json!({"type": "done"}));
    }
}
