//! Content-Type driven encoding of request bodies and decoding of responses.
//!
//! # Design
//! `Body` is a closed union over the shapes a caller can hand to a
//! transaction. Raw shapes (bytes, text, readers) bypass the Content-Type
//! table; structured values are serialized according to it. On the way back,
//! `Target` plays the same role: raw sinks copy the bytes, structured targets
//! are unmarshalled according to the response Content-Type.
//!
//! Errors here carry no transaction context. `Transaction` wraps them into
//! `crate::Error` together with an `ErrorReport`.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use url::form_urlencoded;

use crate::content_type::{essence, Family, PLAIN};
use crate::error::{BoxError, Error, ErrorReport};

/// Multi-valued name/value pairs used for query strings and form data.
/// Names encode in sorted order, values in insertion order.
pub type Values = BTreeMap<String, Vec<String>>;

/// URL-encode a set of values, e.g. `a=1&a=2&b=x+y`.
pub fn encode_values(values: &Values) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, list) in values {
        for value in list {
            serializer.append_pair(name, value);
        }
    }
    serializer.finish()
}

/// A value that can be serialized into a request body.
///
/// Implemented for every `Serialize` type so `Body` can hold any of them
/// without knowing the concrete type.
pub trait StructuredBody: Send {
    fn to_json(&self) -> serde_json::Result<Vec<u8>>;
}

impl<T: Serialize + Send> StructuredBody for T {
    fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Request body payload.
#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Text(String),
    Reader(Box<dyn Read + Send>),
    Structured(Box<dyn StructuredBody>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Reader(_) => f.write_str("Reader(..)"),
            Body::Structured(_) => f.write_str("Structured(..)"),
        }
    }
}

/// A value that a response body can be unmarshalled into.
pub trait StructuredTarget {
    fn decode_json(&mut self, body: &[u8]) -> serde_json::Result<()>;
    fn decode_xml(&mut self, body: &[u8]) -> Result<(), quick_xml::DeError>;
}

impl<T: DeserializeOwned> StructuredTarget for T {
    fn decode_json(&mut self, body: &[u8]) -> serde_json::Result<()> {
        *self = serde_json::from_slice(body)?;
        Ok(())
    }

    fn decode_xml(&mut self, body: &[u8]) -> Result<(), quick_xml::DeError> {
        *self = quick_xml::de::from_reader(body)?;
        Ok(())
    }
}

/// Destination for a response body.
pub enum Target<'a> {
    Text(&'a mut String),
    Bytes(&'a mut Vec<u8>),
    Writer(&'a mut dyn Write),
    Structured(&'a mut dyn StructuredTarget),
}

impl fmt::Debug for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Target::Text(_) => "Text",
            Target::Bytes(_) => "Bytes",
            Target::Writer(_) => "Writer",
            Target::Structured(_) => "Structured",
        };
        f.write_str(name)
    }
}

/// Codec failures before transaction context is attached.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unable to marshal JSON")]
    Json(#[source] serde_json::Error),

    #[error("unable to read request body")]
    Read(#[source] io::Error),

    #[error("unsupported Content-Type {0:?}")]
    UnsupportedContentType(String),

    #[error("{0:?} must be read into a string, byte buffer or writer")]
    UnsupportedTarget(String),

    #[error("unable to decode {format} response")]
    Decode {
        format: &'static str,
        #[source]
        source: BoxError,
    },
}

impl CodecError {
    /// Attach transaction context, turning this into a crate error.
    pub fn into_error(self, location: &'static str, report: ErrorReport) -> Error {
        let report = Box::new(report);
        match self {
            CodecError::Json(source) => Error::Encoding {
                location,
                source: Box::new(source),
                report,
            },
            CodecError::Read(source) => Error::Encoding {
                location,
                source: Box::new(source),
                report,
            },
            CodecError::UnsupportedContentType(content_type) => Error::UnsupportedContentType {
                location,
                content_type,
                report,
            },
            CodecError::UnsupportedTarget(content_type) => Error::UnsupportedTarget {
                location,
                content_type,
                report,
            },
            CodecError::Decode { format, source } => Error::Decoding {
                location,
                format,
                source,
                report,
            },
        }
    }
}

/// Encode `body` for the wire.
///
/// A streaming body is drained here and replaced with the bytes it produced,
/// so later diagnostics and re-encodes see the same payload.
pub fn encode_body(body: &mut Body, content_type: &str, form: &Values) -> Result<Vec<u8>, CodecError> {
    if let Body::Reader(reader) = body {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).map_err(CodecError::Read)?;
        *body = Body::Bytes(buffer);
    }
    encode_buffered(body, content_type, form)
}

/// Encode without draining readers; a reader encodes as an empty body.
/// Used for diagnostics, where the body must not be consumed.
pub fn encode_buffered(body: &Body, content_type: &str, form: &Values) -> Result<Vec<u8>, CodecError> {
    match body {
        Body::Bytes(bytes) => return Ok(bytes.clone()),
        Body::Text(text) => return Ok(text.as_bytes().to_vec()),
        Body::Reader(_) => return Ok(Vec::new()),
        Body::Empty | Body::Structured(_) => {}
    }

    match Family::of(content_type) {
        Family::Empty | Family::Plain => Ok(Vec::new()),
        Family::Form => Ok(encode_values(form).into_bytes()),
        Family::Json => match body {
            Body::Structured(value) => value.to_json().map_err(CodecError::Json),
            _ => Ok(b"null".to_vec()),
        },
        _ => Err(CodecError::UnsupportedContentType(content_type.to_string())),
    }
}

/// Decode a response body into `target`, dispatching on `content_type`.
pub fn decode_body(body: &[u8], target: Option<&mut Target<'_>>, content_type: &str) -> Result<(), CodecError> {
    let Some(target) = target else {
        return Ok(());
    };

    let structured = match target {
        Target::Text(text) => {
            **text = String::from_utf8_lossy(body).into_owned();
            return Ok(());
        }
        Target::Bytes(bytes) => {
            **bytes = body.to_vec();
            return Ok(());
        }
        Target::Writer(writer) => {
            return writer.write_all(body).map_err(|err| CodecError::Decode {
                format: "raw",
                source: Box::new(err),
            });
        }
        Target::Structured(structured) => structured,
    };

    match Family::of(content_type) {
        Family::Empty => Err(CodecError::UnsupportedTarget(PLAIN.to_string())),
        Family::Plain | Family::Html => Err(CodecError::UnsupportedTarget(essence(content_type).to_string())),
        Family::Xml => structured.decode_xml(body).map_err(|err| CodecError::Decode {
            format: "XML",
            source: Box::new(err),
        }),
        Family::Json => structured.decode_json(body).map_err(|err| CodecError::Decode {
            format: "JSON",
            source: Box::new(err),
        }),
        _ => Err(CodecError::UnsupportedContentType(essence(content_type).to_string())),
    }
}
