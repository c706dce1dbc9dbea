//! Header names and MIME types understood by the body codec.
//!
//! # Design
//! The codec never matches on raw strings directly. `Family::of` strips any
//! parameter suffix (`; charset=utf-8`) and folds the remaining type into the
//! handful of families the codec knows how to encode or decode.

/// Header used to request a response encoding.
pub const ACCEPT: &str = "Accept";

/// Header that designates the MIME type of a body.
pub const CONTENT_TYPE: &str = "Content-Type";

/// Header that identifies the client making the request.
pub const USER_AGENT: &str = "User-Agent";

/// Header that carries request credentials.
pub const AUTHORIZATION: &str = "Authorization";

pub const ACTIVITY_PUB: &str = "application/activity+json";
pub const PLAIN: &str = "text/plain";
pub const HTML: &str = "text/html";
pub const JSON: &str = "application/json";
/// <https://en.wikipedia.org/wiki/JSON-LD>
pub const JSON_LD: &str = "application/ld+json";
/// <https://en.wikipedia.org/wiki/JSON_Feed>
pub const JSON_FEED: &str = "application/feed+json";
/// JSON Resource Descriptor, used by WebFinger (RFC 7033 §10.2).
pub const JSON_RESOURCE_DESCRIPTOR: &str = "application/jrd+json";
pub const FORM: &str = "application/x-www-form-urlencoded";
pub const XML: &str = "application/xml";
pub const ATOM_XML: &str = "application/atom+xml";
pub const RSS_XML: &str = "application/rss+xml";

/// Non-standard XML type some servers still send.
const NON_STANDARD_XML_TEXT: &str = "text/xml";

/// Non-standard JSON type some servers still send.
const NON_STANDARD_JSON_TEXT: &str = "text/json";

const JSON_TYPES: [&str; 6] = [
    JSON,
    JSON_LD,
    ACTIVITY_PUB,
    JSON_RESOURCE_DESCRIPTOR,
    JSON_FEED,
    NON_STANDARD_JSON_TEXT,
];

const XML_TYPES: [&str; 4] = [XML, NON_STANDARD_XML_TEXT, ATOM_XML, RSS_XML];

/// Codec-relevant grouping of a Content-Type header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// No Content-Type at all.
    Empty,
    Plain,
    Html,
    Form,
    Json,
    Xml,
    Other,
}

impl Family {
    /// Classify a raw header value, ignoring parameters and letter case.
    pub fn of(header: &str) -> Self {
        let essence = essence(header);
        let is = |candidate: &str| essence.eq_ignore_ascii_case(candidate);

        if essence.is_empty() {
            Family::Empty
        } else if is(PLAIN) {
            Family::Plain
        } else if is(HTML) {
            Family::Html
        } else if is(FORM) {
            Family::Form
        } else if JSON_TYPES.iter().any(|t| is(t)) {
            Family::Json
        } else if XML_TYPES.iter().any(|t| is(t)) {
            Family::Xml
        } else {
            Family::Other
        }
    }
}

/// The MIME type without any `;`-separated parameters.
pub fn essence(header: &str) -> &str {
    header.split(';').next().unwrap_or_default().trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_suffix_is_ignored() {
        assert_eq!(Family::of("application/json; charset=utf-8"), Family::Json);
        assert_eq!(essence("text/html;charset=UTF-8"), "text/html");
    }

    #[test]
    fn json_family_includes_non_standard_text_json() {
        for t in ["application/ld+json", "application/activity+json", "application/jrd+json", "application/feed+json", "text/json"] {
            assert_eq!(Family::of(t), Family::Json, "{t}");
        }
    }

    #[test]
    fn xml_family_includes_feeds() {
        for t in ["application/xml", "text/xml", "application/atom+xml", "application/rss+xml"] {
            assert_eq!(Family::of(t), Family::Xml, "{t}");
        }
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(Family::of("Application/JSON"), Family::Json);
    }

    #[test]
    fn empty_and_unknown() {
        assert_eq!(Family::of(""), Family::Empty);
        assert_eq!(Family::of("  "), Family::Empty);
        assert_eq!(Family::of("application/octet-stream"), Family::Other);
    }
}
