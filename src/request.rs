/// Parsed HTTP request headers.
///
/// The wire-level framing (where one request ends and the next begins,
/// chunked transfer coding, and so on) is deliberately out of scope here:
/// [`Request`] is the interface the connection state machine consumes,
/// and [`try_parse_one`] is one adequate, not exhaustive, implementation
/// of it — enough to drive pipelined GET/POST requests with a
/// `Content-Length` body.
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `Connection: close` was requested by the client.
    pub fn wants_close(&self) -> bool {
        self.header("connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false)
    }
}

/// Result of attempting to parse one request out of the front of `buf`.
pub enum ParseOutcome {
    /// A complete request was parsed, consuming `consumed` bytes.
    Complete { request: Request, consumed: usize },
    /// Not enough bytes yet; try again once more arrive.
    Incomplete,
    /// The bytes at the front of the buffer are not a valid request head.
    Invalid,
}

/// Try to parse exactly one HTTP request from the front of `buf`.
pub fn try_parse_one(buf: &[u8]) -> ParseOutcome {
    let header_end = match find_double_crlf(buf) {
        Some(pos) => pos,
        None => return ParseOutcome::Incomplete,
    };

    let head = match std::str::from_utf8(&buf[..header_end]) {
        Ok(s) => s,
        Err(_) => return ParseOutcome::Invalid,
    };

    let mut lines = head.split("\r\n");
    let request_line = match lines.next() {
        Some(l) => l,
        None => return ParseOutcome::Invalid,
    };
    let mut parts = request_line.split(' ');
    let (method, path) = match (parts.next(), parts.next()) {
        (Some(m), Some(p)) if !m.is_empty() && !p.is_empty() => (m.to_string(), p.to_string()),
        _ => return ParseOutcome::Invalid,
    };

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((k, v)) => {
                headers.insert(k.trim().to_string(), v.trim().to_string());
            }
            None => return ParseOutcome::Invalid,
        }
    }

    let body_start = header_end + 4;
    let content_length: usize = match headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .map(|(_, v)| v.parse())
    {
        Some(Ok(n)) => n,
        Some(Err(_)) => return ParseOutcome::Invalid,
        None => 0,
    };

    if buf.len() < body_start + content_length {
        return ParseOutcome::Incomplete;
    }

    let body = buf[body_start..body_start + content_length].to_vec();
    ParseOutcome::Complete {
        request: Request {
            method,
            path,
            headers,
            body,
        },
        consumed: body_start + content_length,
    }
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_get_request() {
        let raw = b"GET /nodes/a HTTP/1.1\r\nHost: x\r\n\r\n";
        match try_parse_one(raw) {
            ParseOutcome::Complete { request, consumed } => {
                assert_eq!(request.method, "GET");
                assert_eq!(request.path, "/nodes/a");
                assert_eq!(consumed, raw.len());
            }
            _ => panic!("expected a complete parse"),
        }
    }

    #[test]
    fn incomplete_head_is_reported_as_incomplete() {
        let raw = b"GET /nodes/a HTTP/1.1\r\nHost: x";
        assert!(matches!(try_parse_one(raw), ParseOutcome::Incomplete));
    }

    #[test]
    fn body_shorter_than_content_length_is_incomplete() {
        let raw = b"POST /nodes/a HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        assert!(matches!(try_parse_one(raw), ParseOutcome::Incomplete));
    }

    #[test]
    fn two_pipelined_requests_parse_one_at_a_time() {
        let raw = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
        let (req1, consumed1) = match try_parse_one(raw) {
            ParseOutcome::Complete { request, consumed } => (request, consumed),
            _ => panic!("expected complete"),
        };
        assert_eq!(req1.path, "/a");
        let (req2, _) = match try_parse_one(&raw[consumed1..]) {
            ParseOutcome::Complete { request, consumed } => (request, consumed),
            _ => panic!("expected complete"),
        };
        assert_eq!(req2.path, "/b");
    }

    #[test]
    fn malformed_request_line_is_invalid() {
        assert!(matches!(
            try_parse_one(b"not a request\r\n\r\n"),
            ParseOutcome::Invalid
        ));
    }
}
