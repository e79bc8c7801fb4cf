use std::io::{BufRead, Write};

use crate::error::FramingError;
use crate::message::Message;

pub const CONTENT_LENGTH: &str = "Content-Length:";

/// Largest payload `decode` accepts. A bigger `Content-Length` is treated as garbage.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Encodes a message as one DAP frame.
///
/// The header carries the byte length of the UTF-8 payload, not its character count.
pub fn encode(message: &Message) -> Result<Vec<u8>, serde_json::Error> {
    let payload = serde_json::to_vec(message)?;
    let mut frame = format!("{} {}\r\n\r\n", CONTENT_LENGTH, payload.len()).into_bytes();
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Writes one frame and flushes the writer.
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<(), crate::ClientError> {
    let frame = encode(message)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` when the stream is exhausted before a header line is read.
/// Empty lines ahead of the header are skipped, since some adapters end each
/// payload with a line break.
pub fn decode<R: BufRead>(reader: &mut R) -> Result<Option<Message>, FramingError> {
    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header)? == 0 {
            return Ok(None);
        }
        if !header.trim_end_matches(['\r', '\n']).is_empty() {
            break;
        }
    }

    let length = header
        .strip_prefix(CONTENT_LENGTH)
        .ok_or_else(|| FramingError::MissingHeader(header.trim_end().to_string()))?;
    let length = length
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|length| *length <= MAX_FRAME_LEN)
        .ok_or_else(|| FramingError::InvalidLength(length.trim().to_string()))?;

    let mut separator = String::new();
    if reader.read_line(&mut separator)? == 0 {
        return Err(FramingError::Truncated);
    }

    let mut payload = vec![0; length];
    reader.read_exact(&mut payload)?;

    Ok(Some(serde_json::from_slice(&payload)?))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::message::{Event, Request, Response};

    fn frame(payload: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", payload.len(), payload).into_bytes()
    }

    #[test]
    fn test_encode_uses_exact_header_layout() {
        let message = Message::Request(Request::new(1, "configurationDone", None));
        let encoded = encode(&message).unwrap();
        let text = String::from_utf8(encoded).unwrap();

        let payload = r#"{"type":"request","seq":1,"command":"configurationDone"}"#;
        assert_eq!(text, format!("Content-Length: {}\r\n\r\n{}", payload.len(), payload));
    }

    #[test]
    fn test_encode_counts_bytes_not_chars() {
        let message = Message::Event(Event {
            seq: 4,
            name: "output".to_string(),
            body: Some(json!({"output": "süßes ✓ 🦀"})),
        });
        let encoded = encode(&message).unwrap();
        let split = encoded.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        let header = std::str::from_utf8(&encoded[..split]).unwrap();
        let payload = &encoded[split + 4..];

        let length: usize = header.trim_start_matches(CONTENT_LENGTH).trim().parse().unwrap();
        assert_eq!(length, payload.len());
        assert!(length > std::str::from_utf8(payload).unwrap().chars().count());
    }

    #[rstest]
    #[case::request(Message::Request(Request::new(3, "setBreakpoints", Some(json!({"breakpoints": [{"line": 5}, {"line": 8}]})))))]
    #[case::response(Message::Response(Response {
        seq: 9,
        request_seq: 3,
        command: "setBreakpoints".to_string(),
        success: true,
        message: None,
        body: Some(json!({"breakpoints": [{"id": 5000, "line": 6, "verified": true}]})),
    }))]
    #[case::failed_response(Message::Response(Response {
        seq: 10,
        request_seq: 4,
        command: "evaluate".to_string(),
        success: false,
        message: Some("not stopped".to_string()),
        body: None,
    }))]
    #[case::event(Message::Event(Event { seq: 11, name: "terminated".to_string(), body: None }))]
    fn test_decode_reverses_encode(#[case] message: Message) {
        let mut reader = Cursor::new(encode(&message).unwrap());
        assert_eq!(decode(&mut reader).unwrap(), Some(message));
        assert!(decode(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_decode_consecutive_frames() {
        let mut bytes = frame(r#"{"seq":1,"type":"event","event":"initialized"}"#);
        bytes.extend(frame(
            r#"{"seq":2,"type":"response","request_seq":1,"command":"initialize","success":true}"#,
        ));
        let mut reader = Cursor::new(bytes);

        assert!(decode(&mut reader).unwrap().unwrap().is_event("initialized"));
        assert!(decode(&mut reader).unwrap().unwrap().is_response_to(1));
        assert!(decode(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_decode_skips_line_breaks_between_frames() {
        let mut bytes = frame(r#"{"seq":1,"type":"event","event":"initialized"}"#);
        bytes.extend(b"\r\n");
        bytes.extend(frame(r#"{"seq":2,"type":"event","event":"terminated"}"#));
        bytes.extend(b"\r\n");
        let mut reader = Cursor::new(bytes);

        assert!(decode(&mut reader).unwrap().unwrap().is_event("initialized"));
        assert!(decode(&mut reader).unwrap().unwrap().is_event("terminated"));
        assert!(decode(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_decode_empty_stream_is_end_of_stream() {
        let mut reader = Cursor::new(Vec::new());
        assert!(decode(&mut reader).unwrap().is_none());
    }

    #[rstest]
    #[case::plain_text(b"Listening on stdin\r\n".to_vec())]
    #[case::other_header(b"Content-Type: application/json\r\n\r\n{}".to_vec())]
    fn test_decode_rejects_missing_header(#[case] bytes: Vec<u8>) {
        let mut reader = Cursor::new(bytes);
        assert!(matches!(decode(&mut reader), Err(FramingError::MissingHeader(_))));
    }

    #[rstest]
    #[case::not_a_number("twelve")]
    #[case::negative("-2")]
    #[case::too_large_to_allocate("17592186044416")]
    #[case::usize_max("18446744073709551615")]
    #[case::past_usize_max("18446744073709551616")]
    #[case::just_over_limit("67108865")]
    fn test_decode_rejects_invalid_length(#[case] length: &str) {
        let mut reader = Cursor::new(format!("Content-Length: {}\r\n\r\n{{}}", length).into_bytes());
        assert!(matches!(decode(&mut reader), Err(FramingError::InvalidLength(value)) if value == length));
    }

    #[test]
    fn test_decode_accepts_length_at_limit() {
        let header = format!("Content-Length: {}\r\n\r\n{{}}", MAX_FRAME_LEN);
        let mut reader = Cursor::new(header.into_bytes());
        assert!(matches!(decode(&mut reader), Err(FramingError::Truncated)));
    }

    #[test]
    fn test_decode_truncated_payload() {
        let mut reader = Cursor::new(b"Content-Length: 40\r\n\r\n{\"seq\":1}".to_vec());
        assert!(matches!(decode(&mut reader), Err(FramingError::Truncated)));
    }

    #[test]
    fn test_decode_malformed_json() {
        let mut reader = Cursor::new(frame("{not json}"));
        assert!(matches!(decode(&mut reader), Err(FramingError::Payload(_))));
    }
}
