//! Wire framing of the admin channel.
//!
//! A request is a single procedure-call expression, line-terminated. A reply
//! is a textual envelope: a `---` header line, the hex-encoded payload, and
//! a literal `...` sentinel line. The payload decodes to a JSON record
//! `{"ok": bool, "ret": <value>}`; `ok = false` carries the remote error in
//! `ret`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use shoal_core::{Result, ShoalError};

/// Header line opening a reply envelope.
pub const REPLY_HEADER: &str = "---";

/// Sentinel line terminating a reply envelope.
pub const REPLY_SENTINEL: &str = "...";

/// Decoded reply record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteReply {
    pub ok: bool,
    #[serde(default)]
    pub ret: Value,
}

impl RemoteReply {
    /// Unwraps the payload, surfacing the remote error text verbatim.
    pub fn into_result(self) -> Result<Value> {
        if self.ok {
            Ok(self.ret)
        } else {
            let message = match self.ret {
                Value::String(text) => text,
                other => other.to_string(),
            };
            Err(ShoalError::rpc(message))
        }
    }
}

/// Renders the request line for a procedure call, arguments JSON-encoded in
/// place.
pub fn call_expr(procedure: &str, args: &[Value]) -> Result<String> {
    let mut rendered = Vec::with_capacity(args.len());
    for arg in args {
        let encoded = serde_json::to_string(arg)
            .map_err(|e| ShoalError::decode(format!("failed to encode request argument: {}", e)))?;
        rendered.push(encoded);
    }
    Ok(format!("ctl.{}({})\n", procedure, rendered.join(", ")))
}

/// Encodes a reply into the response envelope. The production peer is the
/// remote cluster; this direction exists for tests and fixtures.
pub fn encode_envelope(reply: &RemoteReply) -> Result<String> {
    let payload = serde_json::to_vec(reply)
        .map_err(|e| ShoalError::decode(format!("failed to encode reply: {}", e)))?;
    Ok(format!(
        "{}\n{}\n{}\n",
        REPLY_HEADER,
        hex::encode(payload),
        REPLY_SENTINEL
    ))
}

/// Strips the envelope markers and decodes the payload.
///
/// `raw` holds the reply lines up to and including the sentinel. The header
/// and sentinel are matched exactly; anything between them is hex payload.
pub fn decode_envelope(raw: &str) -> Result<RemoteReply> {
    let mut payload = String::new();
    let mut saw_header = false;
    let mut terminated = false;

    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if !saw_header {
            if line != REPLY_HEADER {
                return Err(ShoalError::decode(format!(
                    "reply does not start with {:?}: got {:?}",
                    REPLY_HEADER, line
                )));
            }
            saw_header = true;
            continue;
        }
        if line == REPLY_SENTINEL {
            terminated = true;
            break;
        }
        payload.push_str(line.trim());
    }

    if !terminated {
        return Err(ShoalError::decode("reply envelope is missing its sentinel"));
    }

    let bytes = hex::decode(&payload)
        .map_err(|e| ShoalError::decode(format!("invalid hex payload: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ShoalError::decode(format!("invalid reply payload: {}", e)))
}
