use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One DAP protocol message, discriminated by its `type` field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Request(Request),
    Response(Response),
    Event(Event),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Response {
    pub seq: i64,
    pub request_seq: i64,
    /// Some adapters leave this out of error responses.
    #[serde(default)]
    pub command: String,
    pub success: bool,
    /// Short error text sent by the adapter when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Event {
    pub seq: i64,
    #[serde(rename = "event")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Message {
    pub fn seq(&self) -> i64 {
        match self {
            Message::Request(request) => request.seq,
            Message::Response(response) => response.seq,
            Message::Event(event) => event.seq,
        }
    }

    /// Returns true if this is a response to the request with the given sequence number.
    pub fn is_response_to(&self, request_seq: i64) -> bool {
        matches!(self, Message::Response(response) if response.request_seq == request_seq)
    }

    /// Returns true if this is an event with the given name.
    pub fn is_event(&self, name: &str) -> bool {
        matches!(self, Message::Event(event) if event.name == name)
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Message::Response(response) => Some(response),
            _ => None,
        }
    }

    pub fn into_event(self) -> Option<Event> {
        match self {
            Message::Event(event) => Some(event),
            _ => None,
        }
    }
}

impl Request {
    pub fn new(seq: i64, command: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            seq,
            command: command.into(),
            arguments,
        }
    }
}

impl Response {
    /// Looks up a top-level field of the response body.
    pub fn body_field(&self, key: &str) -> Option<&Value> {
        self.body.as_ref().and_then(|body| body.get(key))
    }
}

impl Event {
    /// Looks up a top-level field of the event body.
    pub fn body_field(&self, key: &str) -> Option<&Value> {
        self.body.as_ref().and_then(|body| body.get(key))
    }

    /// The `reason` of a `stopped` or `breakpoint` event.
    pub fn reason(&self) -> Option<&str> {
        self.body_field("reason").and_then(Value::as_str)
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Message::Event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serializes_with_type_tag() {
        let message = Message::Request(Request::new(1, "initialize", Some(json!({"clientID": "test"}))));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({"seq": 1, "type": "request", "command": "initialize", "arguments": {"clientID": "test"}})
        );
    }

    #[test]
    fn test_request_without_arguments_omits_field() {
        let message = Message::Request(Request::new(2, "configurationDone", None));
        let value = serde_json::to_value(&message).unwrap();
        assert!(value.get("arguments").is_none());
    }

    #[test]
    fn test_event_uses_event_key_for_name() {
        let message: Message = serde_json::from_value(json!({
            "seq": 7,
            "type": "event",
            "event": "stopped",
            "body": {"reason": "breakpoint", "threadId": 1}
        }))
        .unwrap();

        let event = message.into_event().unwrap();
        assert_eq!(event.name, "stopped");
        assert_eq!(event.reason(), Some("breakpoint"));
    }

    #[test]
    fn test_response_matching() {
        let message: Message = serde_json::from_value(json!({
            "seq": 3,
            "type": "response",
            "request_seq": 2,
            "command": "setBreakpoints",
            "success": true,
            "body": {"breakpoints": []}
        }))
        .unwrap();

        assert!(message.is_response_to(2));
        assert!(!message.is_response_to(3));
        assert!(!message.is_event("setBreakpoints"));
        assert_eq!(message.seq(), 3);
        let response = message.into_response().unwrap();
        assert_eq!(response.body_field("breakpoints"), Some(&json!([])));
        assert_eq!(response.message, None);
    }

    #[test]
    fn test_error_response_without_command() {
        let message: Message = serde_json::from_value(json!({
            "seq": 4,
            "type": "response",
            "request_seq": 3,
            "success": false,
            "message": "Not stopped"
        }))
        .unwrap();

        let response = message.into_response().unwrap();
        assert!(!response.success);
        assert_eq!(response.command, "");
        assert_eq!(response.message.as_deref(), Some("Not stopped"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_value::<Message>(json!({"seq": 1, "type": "reverseRequest"}));
        assert!(result.is_err());
    }
}
