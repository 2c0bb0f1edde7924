//! HTTP message model.

use bytes::Bytes;

/// Headers kept past this count are silently dropped.
pub const MAX_HEADERS: usize = 16;

/// HTTP protocol version from a start line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

/// First line of a message: request shape or response shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request {
        method: String,
        target: String,
        version: Version,
    },
    Response {
        version: Version,
        code: u16,
        reason: String,
    },
}

/// Insertion-ordered header pairs, bounded at [`MAX_HEADERS`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Headers::default()
    }

    /// Append a pair. Silently ignored once [`MAX_HEADERS`] are held.
    pub fn push(&mut self, key: String, value: String) {
        if self.entries.len() < MAX_HEADERS {
            self.entries.push((key, value));
        }
    }

    /// First value whose key matches `key` exactly (case-sensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Classification of the `Transfer-Encoding` header.
///
/// All five registered tokens are recognised; only Identity and Chunked are
/// decodable. An absent header means Identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    Identity,
    Chunked,
    Compress,
    Deflate,
    Gzip,
}

impl TransferEncoding {
    /// Map a single encoding token. `None` for unknown tokens or
    /// comma-separated lists, which are not supported.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "identity" => Some(TransferEncoding::Identity),
            "chunked" => Some(TransferEncoding::Chunked),
            "compress" => Some(TransferEncoding::Compress),
            "deflate" => Some(TransferEncoding::Deflate),
            "gzip" => Some(TransferEncoding::Gzip),
            _ => None,
        }
    }
}

/// Decoded message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub data: Bytes,
    pub encoding: TransferEncoding,
}

impl Body {
    /// An empty identity body (GET requests, bodiless responses).
    pub fn empty() -> Self {
        Body {
            data: Bytes::new(),
            encoding: TransferEncoding::Identity,
        }
    }
}

/// A fully parsed HTTP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub start: StartLine,
    pub headers: Headers,
    pub body: Body,
}

impl Message {
    /// Response status code, if this is a response.
    pub fn status_code(&self) -> Option<u16> {
        match &self.start {
            StartLine::Response { code, .. } => Some(*code),
            StartLine::Request { .. } => None,
        }
    }

    /// First header value matching `name` exactly.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Decoded body bytes.
    pub fn body_bytes(&self) -> &[u8] {
        &self.body.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_first_match_and_case_sensitive() {
        let mut headers = Headers::new();
        headers.push("Content-Length".to_string(), "5".to_string());
        headers.push("Content-Type".to_string(), "text/plain".to_string());
        headers.push("Content-Length".to_string(), "9".to_string());

        assert_eq!(headers.get("Content-Length"), Some("5"));
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-length"), None);
        assert_eq!(headers.get("Missing"), None);
    }

    #[test]
    fn pushes_past_the_bound_are_dropped() {
        let mut headers = Headers::new();
        for i in 0..MAX_HEADERS + 4 {
            headers.push(format!("X-{i}"), "v".to_string());
        }
        assert_eq!(headers.len(), MAX_HEADERS);
        assert_eq!(headers.get("X-0"), Some("v"));
        assert_eq!(headers.get(&format!("X-{MAX_HEADERS}")), None);
    }

    #[test]
    fn transfer_encoding_tokens() {
        assert_eq!(
            TransferEncoding::from_token("chunked"),
            Some(TransferEncoding::Chunked)
        );
        assert_eq!(
            TransferEncoding::from_token("identity"),
            Some(TransferEncoding::Identity)
        );
        assert_eq!(TransferEncoding::from_token("gzip, chunked"), None);
        assert_eq!(TransferEncoding::from_token("br"), None);
    }
}
