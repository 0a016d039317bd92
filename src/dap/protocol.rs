use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DapMessage {
    pub seq: u64,
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(flatten)]
    pub content: DapMessageContent,
}

// Untagged: variants are tried in order, so the ones with required
// distinguishing fields come before `Request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DapMessageContent {
    Response {
        request_seq: u64,
        success: bool,
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    Event {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
    },
    Request {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<Value>,
    },
}

impl DapMessage {
    pub fn request(seq: u64, command: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            seq,
            msg_type: "request".to_string(),
            content: DapMessageContent::Request {
                command: command.into(),
                arguments,
            },
        }
    }
}

/// Read one `Content-Length` framed message. `Ok(None)` at end of input.
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<DapMessage>> {
    let mut content_length: Option<usize> = None;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            if content_length.is_some() {
                break;
            }
            continue;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("Content-Length") {
                let length = value.trim().parse().map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, format!("bad Content-Length: {}", value.trim()))
                })?;
                content_length = Some(length);
            }
        }
    }

    let mut buffer = vec![0u8; content_length.unwrap_or(0)];
    reader.read_exact(&mut buffer)?;
    let msg = serde_json::from_slice(&buffer).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(msg))
}

/// Write `msg` as `Content-Length: {len}\r\n\r\n{json}` and flush.
pub fn write_message<W: Write>(writer: &mut W, msg: &DapMessage) -> io::Result<()> {
    let json = serde_json::to_string(msg)?;
    write!(writer, "Content-Length: {}\r\n\r\n{}", json.len(), json)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_frame_roundtrip_keeps_request_shape() {
        let msg = DapMessage::request(3, "launch", Some(json!({"program": "a.py"})));
        let mut out = Vec::new();
        write_message(&mut out, &msg).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.starts_with("Content-Length: "));

        let mut reader = Cursor::new(out);
        assert_eq!(read_message(&mut reader).unwrap(), Some(msg));
        assert_eq!(read_message(&mut reader).unwrap(), None);
    }

    #[test]
    fn test_response_and_event_are_distinguished() {
        let response: DapMessage = serde_json::from_value(json!({
            "seq": 1, "type": "response", "request_seq": 1, "success": true, "command": "initialize"
        }))
        .unwrap();
        assert!(matches!(response.content, DapMessageContent::Response { .. }));

        let event: DapMessage =
            serde_json::from_value(json!({"seq": 2, "type": "event", "event": "initialized"})).unwrap();
        assert!(matches!(event.content, DapMessageContent::Event { .. }));
    }

    #[test]
    fn test_bad_length_is_invalid_data() {
        let mut reader = Cursor::new(b"Content-Length: x\r\n\r\n{}".to_vec());
        let err = read_message(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
