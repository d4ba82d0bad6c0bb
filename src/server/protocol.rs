//! Line protocol spoken with the proxy
//!
//! Concurrent mode:     `<channel> <login> <password> <proxy_ip> <remote_ip>` -> `<channel> OK|ERR|BH`
//! Non-concurrent mode: `<login> <password> <proxy_ip> <remote_ip>` -> `OK|ERR|BH`

use crate::auth::{PendingQuery, Verdict};
use std::fmt;

/// Remote IP value the proxy sends when it does not know the client address
pub const NO_REMOTE_IP: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMode {
    /// Lines carry a leading channel token
    Concurrent,
    /// Lines carry no channel token; answers must keep input order
    Sequential,
}

impl ProtocolMode {
    pub fn from_concurrent(concurrent: bool) -> Self {
        if concurrent {
            ProtocolMode::Concurrent
        } else {
            ProtocolMode::Sequential
        }
    }

    /// Number of space separated fields in a well-formed line
    pub fn field_count(self) -> usize {
        match self {
            ProtocolMode::Concurrent => 5,
            ProtocolMode::Sequential => 4,
        }
    }
}

/// Answer codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ok,
    Err,
    /// Broken helper: the line itself could not be processed
    BrokenHelper,
}

impl Response {
    pub fn as_str(self) -> &'static str {
        match self {
            Response::Ok => "OK",
            Response::Err => "ERR",
            Response::BrokenHelper => "BH",
        }
    }
}

impl From<Verdict> for Response {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Allow => Response::Ok,
            Verdict::Deny => Response::Err,
        }
    }
}

/// One output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub token: Option<String>,
    pub response: Response,
}

impl ResultRecord {
    pub fn new(token: Option<String>, response: Response) -> Self {
        Self { token, response }
    }
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.token {
            Some(ref token) => write!(f, "{} {}", token, self.response.as_str()),
            None => f.write_str(self.response.as_str()),
        }
    }
}

/// Result of parsing one input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Query(PendingQuery),
    /// Answer `BH` right away, echoing `token` when one could be recovered
    Malformed { token: Option<String> },
}

/// Parse one input line
///
/// Fields are separated by exactly one space, so empty fields count: an empty
/// password is a lookup, a doubled separator shifts the field count. A
/// trailing `\r` is ignored.
pub fn parse_line(line: &str, mode: ProtocolMode) -> ParsedLine {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let fields: Vec<&str> = line.split(' ').collect();

    let token = match mode {
        ProtocolMode::Concurrent => fields
            .first()
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string()),
        ProtocolMode::Sequential => None,
    };

    if fields.len() != mode.field_count() {
        return ParsedLine::Malformed { token };
    }

    let rest = match mode {
        ProtocolMode::Concurrent => &fields[1..],
        ProtocolMode::Sequential => &fields[..],
    };

    if rest[3] == NO_REMOTE_IP {
        return ParsedLine::Malformed { token };
    }

    ParsedLine::Query(PendingQuery::new(token, rest[0], rest[1], rest[2], rest[3]))
}

/// Parse one raw input line, without its `\n`
///
/// A line that is not valid UTF-8 is malformed. Its channel token is still
/// echoed when the token itself decodes.
pub fn parse_raw_line(line: &[u8], mode: ProtocolMode) -> ParsedLine {
    match std::str::from_utf8(line) {
        Ok(text) => parse_line(text, mode),
        Err(_) => {
            let token = match mode {
                ProtocolMode::Concurrent => {
                    let first = line.split(|b| *b == b' ').next().unwrap_or_default();
                    std::str::from_utf8(first)
                        .ok()
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                }
                ProtocolMode::Sequential => None,
            };
            ParsedLine::Malformed { token }
        }
    }
}
