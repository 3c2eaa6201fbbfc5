//! Permissive parsing of inbound websocket notification frames (spec.md §4.3,
//! §4.4 stage 1). The platform multiplexes several notification shapes over
//! the same socket; we only need to tell a post notification apart from
//! everything else, tolerating unknown shapes rather than failing closed.

use serde_json::Value;

use crate::model::InboundEvent;

#[derive(Debug, Clone)]
pub enum WsFrame {
    /// A `/restapi/v1.0/glip/posts` notification carrying a post body.
    Post(InboundEvent),
    /// A `/restapi/v1.0/glip/groups` notification (membership/metadata churn).
    /// Consumed only to keep the Chat Cache fresh; no pipeline stage acts on it.
    GroupEvent(Value),
    /// Subscription lifecycle frame (renewal ack, expiry warning) — no `body.id`.
    SubscriptionControl(Value),
    /// Anything else. Logged and dropped.
    Unrecognized(Value),
}

/// Parse a raw websocket text frame into a `WsFrame`. Never errors: an
/// unparseable frame becomes `Unrecognized` with whatever JSON was salvaged,
/// or an empty object if even that failed.
pub fn parse_frame(raw: &str) -> WsFrame {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return WsFrame::Unrecognized(Value::Null),
    };

    let event_path = value.get("event").and_then(|e| e.as_str()).unwrap_or_default();

    if event_path.contains("/glip/posts") {
        if let Ok(parsed) = serde_json::from_value::<InboundEvent>(value.clone()) {
            return WsFrame::Post(parsed);
        }
        return WsFrame::Unrecognized(value);
    }

    if event_path.contains("/glip/groups") {
        return WsFrame::GroupEvent(value);
    }

    if value.get("subscriptionId").is_some() || value.get("uuid").is_some() {
        return WsFrame::SubscriptionControl(value);
    }

    WsFrame::Unrecognized(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_post_notification() {
        let raw = r#"{
            "event": "/restapi/v1.0/glip/posts",
            "body": {"id":"1","groupId":"g1","creatorId":"u1","text":"hi"}
        }"#;
        match parse_frame(raw) {
            WsFrame::Post(ev) => assert_eq!(ev.body.id, "1"),
            other => panic!("expected Post, got {other:?}"),
        }
    }

    #[test]
    fn recognizes_group_event() {
        let raw = r#"{"event": "/restapi/v1.0/glip/groups", "body": {"id":"g1"}}"#;
        assert!(matches!(parse_frame(raw), WsFrame::GroupEvent(_)));
    }

    #[test]
    fn recognizes_subscription_control_frame() {
        let raw = r#"{"uuid":"abc","subscriptionId":"sub-1"}"#;
        assert!(matches!(parse_frame(raw), WsFrame::SubscriptionControl(_)));
    }

    #[test]
    fn malformed_json_is_unrecognized_not_an_error() {
        assert!(matches!(parse_frame("not json"), WsFrame::Unrecognized(_)));
    }

    #[test]
    fn post_event_missing_required_fields_falls_back_to_unrecognized() {
        let raw = r#"{"event": "/restapi/v1.0/glip/posts", "body": {"id":"1"}}"#;
        assert!(matches!(parse_frame(raw), WsFrame::Unrecognized(_)));
    }
}
