//! Status code → canonical reason phrase.
//!
//! A fixed associative table, built once on first use and never mutated.

use std::collections::HashMap;
use std::sync::OnceLock;

static REASON_PHRASES: OnceLock<HashMap<u16, &'static str>> = OnceLock::new();

fn table() -> &'static HashMap<u16, &'static str> {
    REASON_PHRASES.get_or_init(|| {
        HashMap::from([
            (100, "Continue"),
            (101, "Switching Protocols"),
            (200, "OK"),
            (201, "Created"),
            (202, "Accepted"),
            (204, "No Content"),
            (206, "Partial Content"),
            (301, "Moved Permanently"),
            (302, "Found"),
            (303, "See Other"),
            (304, "Not Modified"),
            (307, "Temporary Redirect"),
            (308, "Permanent Redirect"),
            (400, "Bad Request"),
            (401, "Unauthorized"),
            (403, "Forbidden"),
            (404, "Not Found"),
            (405, "Method Not Allowed"),
            (408, "Request Timeout"),
            (409, "Conflict"),
            (410, "Gone"),
            (411, "Length Required"),
            (413, "Payload Too Large"),
            (414, "URI Too Long"),
            (415, "Unsupported Media Type"),
            (418, "I'm a teapot"),
            (429, "Too Many Requests"),
            (500, "Internal Server Error"),
            (501, "Not Implemented"),
            (502, "Bad Gateway"),
            (503, "Service Unavailable"),
            (504, "Gateway Timeout"),
            (505, "HTTP Version Not Supported"),
        ])
    })
}

/// Canonical reason phrase for `code`, if the code is known.
pub fn reason_phrase(code: u16) -> Option<&'static str> {
    table().get(&code).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_have_phrases() {
        assert_eq!(reason_phrase(200), Some("OK"));
        assert_eq!(reason_phrase(404), Some("Not Found"));
        assert_eq!(reason_phrase(503), Some("Service Unavailable"));
    }

    #[test]
    fn unknown_codes_are_absent() {
        assert_eq!(reason_phrase(999), None);
        assert_eq!(reason_phrase(0), None);
    }
}
