//! JSON encoding of envelopes: one JSON object per text frame.
//!
//! Decoding is lenient where the wire has historically been sloppy
//! (`data` may be missing or `null`, `timestamp` may be missing, an
//! unfamiliar `type` becomes [`MessageKind::Unknown`]) and strict where it
//! matters: the text must be JSON and `type` must be present.
//!
//! [`MessageKind::Unknown`]: crate::MessageKind::Unknown

use crate::{Envelope, ProtocolError};

impl Envelope {
    /// Serializes the envelope to a single JSON object.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Parses one text frame into an envelope.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the text is not JSON, `type` is
    /// missing, or a field has the wrong JSON type.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::payload::Chat;
    use crate::{Envelope, MessageKind, PlayerId, ProtocolError, RoomCode};

    #[test]
    fn test_encode_has_four_wire_fields() {
        let env = Envelope::new(
            MessageKind::Chat,
            &Chat {
                room_code: RoomCode::parse("ABCD").unwrap(),
                text: "gg".into(),
                player_name: "Bob".into(),
            },
        )
        .unwrap()
        .with_sender(PlayerId::new("abcdefghijklmnop"))
        .with_timestamp(12.5);

        let json: serde_json::Value =
            serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "chat",
                "data": {"room_code": "ABCD", "text": "gg", "player_name": "Bob"},
                "sender_id": "abcdefghijklmnop",
                "timestamp": 12.5
            })
        );
    }

    #[test]
    fn test_encode_omits_sender_on_relay_messages() {
        let env = Envelope::empty(MessageKind::Pong);
        let json: serde_json::Value =
            serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert!(json.get("sender_id").is_none());
    }

    #[test]
    fn test_decode_then_encode_preserves_envelope() {
        let env = Envelope::new(MessageKind::TurnEnd, &json!({"room_code": "WXYZ"}))
            .unwrap()
            .with_sender(PlayerId::new("p1"));
        let decoded = Envelope::from_json(&env.to_json().unwrap()).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn test_decode_fills_defaults_for_sparse_message() {
        let env = Envelope::from_json(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(env.kind(), &MessageKind::Ping);
        assert!(env.data().is_empty());
        assert!(env.sender_id().is_none());
        assert!(env.timestamp() > 0.0);
    }

    #[test]
    fn test_decode_null_data_and_sender() {
        let env = Envelope::from_json(
            r#"{"type":"get_stats","data":null,"sender_id":null,"timestamp":3}"#,
        )
        .unwrap();
        assert!(env.data().is_empty());
        assert!(env.sender_id().is_none());
        assert_eq!(env.timestamp(), 3.0);
    }

    #[test]
    fn test_decode_unknown_type_is_not_an_error() {
        let env =
            Envelope::from_json(r#"{"type":"fly_to_moon","sender_id":"x"}"#)
                .unwrap();
        assert_eq!(env.kind(), &MessageKind::Unknown("fly_to_moon".into()));
    }

    #[test]
    fn test_decode_garbage_returns_error() {
        let result = Envelope::from_json("not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
        assert!(result.unwrap_err().is_malformed_json());
    }

    #[test]
    fn test_decode_truncated_json_is_malformed() {
        let err = Envelope::from_json(r#"{"type":"ping""#).unwrap_err();
        assert!(err.is_malformed_json());
    }

    #[test]
    fn test_decode_missing_type_returns_error() {
        let result = Envelope::from_json(r#"{"data": {}, "sender_id": "x"}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
        let err = result.unwrap_err();
        assert!(!err.is_malformed_json());
        assert!(err.to_string().contains("missing field `type`"));
    }

    #[test]
    fn test_decode_non_object_data_returns_error() {
        let result = Envelope::from_json(r#"{"type":"chat","data":[1,2]}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
