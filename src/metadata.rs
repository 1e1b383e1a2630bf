//! HEADERS/TRAILERS payload codec: newline-separated `key: value` lines
//! (§6.1, §9).

use crate::error::HeaderEncodeError;

/// Reserved metadata keys with wire-format meaning (§6.1).
pub const KEY_PATH: &str = "path";
pub const KEY_GRPC_STATUS: &str = "grpc-status";
pub const KEY_GRPC_MESSAGE: &str = "grpc-message";
pub const KEY_AUTHORIZATION: &str = "authorization";

/// An ordered metadata map. Plain `Vec` rather than a `HashMap` because
/// duplicate keys and insertion order are both legal and occasionally
/// meaningful for header blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(Vec<(String, String)>);

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn remove_all(&mut self, key: &str) {
        self.0.retain(|(k, _)| k != key);
    }

    /// Merge `other` into `self`, matching §4.4's `setHeader`/`setTrailer`
    /// "merges metadata" semantics (append, don't replace-by-key).
    pub fn merge(&mut self, other: Metadata) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode as newline-separated `key: value` lines (writers always emit
    /// the space-after-colon form, per §9's trailer parsing tolerance
    /// note). Rejects any value containing `\n` or `\r` instead of
    /// guessing at escaping (§9's explicit "do not guess" resolution).
    pub fn encode(&self) -> Result<Vec<u8>, HeaderEncodeError> {
        let mut out = String::new();
        for (key, value) in &self.0 {
            if value.contains('\n') || value.contains('\r') {
                return Err(HeaderEncodeError::EmbeddedNewline { key: key.clone() });
            }
            if key.contains('\n') || key.contains('\r') {
                return Err(HeaderEncodeError::EmbeddedNewline { key: key.clone() });
            }
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    /// Parse a header block. Tolerates optional whitespace around the
    /// colon (§9: readers accept both `grpc-status:0` and
    /// `grpc-status: 0`) and trailing/blank lines.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut metadata = Self::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                metadata.insert(key.trim(), value.trim());
            }
        }
        metadata
    }
}

impl FromIterator<(String, String)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Metadata {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_block() {
        let mut md = Metadata::new();
        md.insert(KEY_PATH, "/greeter.Greeter/SayHello");
        md.insert(KEY_AUTHORIZATION, "Bearer abc123");
        let encoded = md.encode().unwrap();
        let decoded = Metadata::decode(&encoded);
        assert_eq!(decoded.get(KEY_PATH), Some("/greeter.Greeter/SayHello"));
        assert_eq!(decoded.get(KEY_AUTHORIZATION), Some("Bearer abc123"));
    }

    #[test]
    fn decode_tolerates_no_space_after_colon() {
        let decoded = Metadata::decode(b"grpc-status:0\ngrpc-message: ok\n");
        assert_eq!(decoded.get(KEY_GRPC_STATUS), Some("0"));
        assert_eq!(decoded.get(KEY_GRPC_MESSAGE), Some("ok"));
    }

    #[test]
    fn decode_tolerates_extra_whitespace_around_colon() {
        let decoded = Metadata::decode(b"grpc-status :  0  \n");
        assert_eq!(decoded.get(KEY_GRPC_STATUS), Some("0"));
    }

    #[test]
    fn encode_rejects_embedded_newline_in_value() {
        let mut md = Metadata::new();
        md.insert("x-custom", "line1\nline2");
        let err = md.encode().unwrap_err();
        assert_eq!(
            err,
            HeaderEncodeError::EmbeddedNewline {
                key: "x-custom".to_owned()
            }
        );
    }

    #[test]
    fn encode_rejects_embedded_carriage_return() {
        let mut md = Metadata::new();
        md.insert("x-custom", "a\rb");
        assert!(md.encode().is_err());
    }

    #[test]
    fn merge_appends_rather_than_replaces() {
        let mut a = Metadata::new();
        a.insert("k", "v1");
        let mut b = Metadata::new();
        b.insert("k", "v2");
        a.merge(b);
        let encoded = a.encode().unwrap();
        let text = String::from_utf8(encoded).unwrap();
        assert_eq!(text, "k: v1\nk: v2\n");
    }

    #[test]
    fn decode_ignores_blank_lines_and_lines_without_colon() {
        let decoded = Metadata::decode(b"path: /a/b\n\ngarbage-no-colon\ngrpc-status: 0\n");
        assert_eq!(decoded.get(KEY_PATH), Some("/a/b"));
        assert_eq!(decoded.get(KEY_GRPC_STATUS), Some("0"));
    }
}
