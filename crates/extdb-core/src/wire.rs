//! Response envelopes and call splitting.
//!
//! Every response the host sees is one of five envelopes:
//!
//! ```text
//! [1]            success, no payload
//! [1, <payload>] success, inline payload (sync path)
//! [1,<payload>]  success, stored payload (paged path, no space)
//! [2,"<id>"]     success, ticketed; poll with 5:<id>
//! [3]            pending, try again
//! [0,"<msg>"]    error
//! ""             end of stream / nothing to fetch
//! ```
//!
//! The inline and stored forms differ by one space; both are fixed on the
//! wire and must not be unified.

/// Success with no payload.
pub const OK: &str = "[1]";

/// Not ready yet, poll again.
pub const PENDING: &str = "[3]";

/// Inline success envelope used by the synchronous path.
pub fn inline(payload: &str) -> String {
    format!("[1, {}]", payload)
}

/// Stored success envelope used for paged results.
pub fn stored(payload: &str) -> String {
    format!("[1,{}]", payload)
}

/// Ticket envelope carrying a request id.
pub fn ticket(id: u32) -> String {
    format!("[2,\"{}\"]", id)
}

/// Error envelope.
pub fn error(message: &str) -> String {
    format!("[0,\"{}\"]", message)
}

/// Split a `<mode>:<protocol>:<data>` call at the first colon at index >= 2.
///
/// Returns `(protocol, data)`; `None` when no such colon exists. Byte 1 is
/// not validated, routing depends only on the mode byte.
pub fn split_call(input: &str) -> Option<(&str, &str)> {
    let bytes = input.as_bytes();
    let sep = bytes.iter().skip(2).position(|&b| b == b':')? + 2;
    let protocol = input.get(2..sep)?;
    let data = input.get(sep + 1..)?;
    Some((protocol, data))
}
