//! External wire model and push-frame envelope.
//!
//! The remote side speaks snake_case JSON; the push channel additionally
//! wraps that JSON in a base64 payload envelope carrying a `messageId` that
//! must be echoed back as an acknowledgement. Everything raw stays in this
//! module — the rest of the crate only ever sees [`ClockState`].

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::types::{ClockState, UNCONFIGURED_MESSAGE};

/// Raw clock state as delivered by the API and the push channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireClockState {
    pub trial_id: Option<i64>,
    pub timezone: Option<String>,
    pub message: Option<String>,
    pub message_only: Option<bool>,
    pub countdown: Option<bool>,
    pub base_time: Option<DateTime<Utc>>,
    pub next_time: Option<DateTime<Utc>>,
    pub trial_start_time: Option<DateTime<Utc>>,
    pub trial_end_time: Option<DateTime<Utc>>,
    pub minor: Option<Box<WireClockState>>,
    pub major: Option<Box<WireClockState>>,
    pub reported: Option<Box<WireClockState>>,
    /// Epoch milliseconds stamped by the producer at transition time.
    /// Used only to log end-to-end latency.
    pub calltime: Option<i64>,
}

impl From<WireClockState> for ClockState {
    fn from(wire: WireClockState) -> Self {
        ClockState {
            trial_id: wire.trial_id,
            message: wire
                .message
                .unwrap_or_else(|| UNCONFIGURED_MESSAGE.to_string()),
            message_only: wire.message_only.unwrap_or(false),
            countdown: wire.countdown.unwrap_or(false),
            base_time: wire.base_time,
            next_time: wire.next_time,
            trial_start_time: wire.trial_start_time,
            trial_end_time: wire.trial_end_time,
            timezone: wire.timezone,
            minor: wire.minor.map(|c| Box::new(ClockState::from(*c))),
            major: wire.major.map(|c| Box::new(ClockState::from(*c))),
            reported: wire.reported.map(|c| Box::new(ClockState::from(*c))),
        }
    }
}

/// Inbound push-channel frame: an opaque id plus a base64 JSON payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PushFrame {
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub payload: String,
}

/// Outbound acknowledgement, echoed for every decoded frame.
#[derive(Debug, Clone, Serialize)]
pub struct PushAck {
    #[serde(rename = "messageId")]
    pub message_id: String,
}

/// A fully decoded push frame.
#[derive(Debug, Clone)]
pub struct DecodedUpdate {
    pub message_id: String,
    pub state: ClockState,
    /// Producer-side transition timestamp, for latency logging only.
    pub calltime_ms: Option<i64>,
}

/// Decode one push-channel text frame into a state update.
///
/// Any failure here means the frame is dropped unacknowledged; the
/// connection itself stays up.
pub fn decode_frame(text: &str) -> Result<DecodedUpdate, DecodeError> {
    let frame: PushFrame = serde_json::from_str(text)?;
    let raw = BASE64.decode(frame.payload.as_bytes())?;
    let wire: WireClockState = serde_json::from_slice(&raw)?;
    let calltime_ms = wire.calltime;
    Ok(DecodedUpdate {
        message_id: frame.message_id,
        calltime_ms,
        state: wire.into(),
    })
}

/// Encode a state payload into a push frame, as the producer would.
/// Test and tooling helper; the daemon only ever decodes.
pub fn encode_frame(message_id: &str, state: &WireClockState) -> String {
    let payload = BASE64.encode(serde_json::to_vec(state).expect("wire state serializes"));
    serde_json::json!({ "messageId": message_id, "payload": payload }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("valid")
            .with_timezone(&Utc)
    }

    #[test]
    fn adapter_defaults_missing_fields() {
        let wire: WireClockState = serde_json::from_str("{}").expect("parse");
        let state: ClockState = wire.into();
        assert_eq!(state.message, UNCONFIGURED_MESSAGE);
        assert!(!state.message_only);
        assert!(!state.countdown);
        assert!(state.base_time.is_none());
    }

    #[test]
    fn adapter_maps_snake_case_fields() {
        let json = r#"{
            "trial_id": 7,
            "timezone": "America/Los_Angeles",
            "message": "Trial in progress",
            "message_only": false,
            "countdown": true,
            "base_time": "2021-03-03T15:00:00Z",
            "trial_end_time": "2021-03-03T16:00:00Z"
        }"#;
        let wire: WireClockState = serde_json::from_str(json).expect("parse");
        let state: ClockState = wire.into();
        assert_eq!(state.trial_id, Some(7));
        assert_eq!(state.timezone.as_deref(), Some("America/Los_Angeles"));
        assert!(state.countdown);
        assert_eq!(state.base_time, Some(ts("2021-03-03T15:00:00Z")));
        assert_eq!(state.trial_end_time, Some(ts("2021-03-03T16:00:00Z")));
    }

    #[test]
    fn adapter_recurses_into_children() {
        let json = r#"{
            "message": "root",
            "minor": { "message": "phase", "countdown": true },
            "reported": {}
        }"#;
        let wire: WireClockState = serde_json::from_str(json).expect("parse");
        let state: ClockState = wire.into();
        let minor = state.minor.expect("minor child");
        assert_eq!(minor.message, "phase");
        assert!(minor.countdown);
        // A present-but-empty child still gets the defaulted message.
        let reported = state.reported.expect("reported child");
        assert_eq!(reported.message, UNCONFIGURED_MESSAGE);
        assert!(state.major.is_none());
    }

    #[test]
    fn decode_round_trip() {
        let wire = WireClockState {
            message: Some("Time until start".into()),
            countdown: Some(true),
            base_time: Some(ts("2021-03-03T15:00:00Z")),
            calltime: Some(1_614_783_600_000),
            ..WireClockState::default()
        };
        let frame = encode_frame("msg-42", &wire);

        let decoded = decode_frame(&frame).expect("decodes");
        assert_eq!(decoded.message_id, "msg-42");
        assert_eq!(decoded.calltime_ms, Some(1_614_783_600_000));
        assert_eq!(decoded.state.message, "Time until start");
        assert!(decoded.state.countdown);
    }

    #[test]
    fn decode_rejects_bad_envelope_json() {
        assert!(matches!(
            decode_frame("not json at all"),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn decode_rejects_bad_base64() {
        let frame = r#"{"messageId": "m1", "payload": "!!! not base64 !!!"}"#;
        assert!(matches!(decode_frame(frame), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn decode_rejects_bad_payload_json() {
        let payload = BASE64.encode(b"{ truncated");
        let frame = format!(r#"{{"messageId": "m1", "payload": "{payload}"}}"#);
        assert!(matches!(decode_frame(&frame), Err(DecodeError::Json(_))));
    }

    #[test]
    fn ack_uses_message_id_key() {
        let ack = PushAck {
            message_id: "m-9".into(),
        };
        let json = serde_json::to_value(&ack).expect("serialize");
        assert_eq!(json["messageId"], "m-9");
    }
}
