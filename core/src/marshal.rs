//! Conversion between a `Transaction` and a plain string-keyed map.
//!
//! The map form travels through task queues and JSON documents, so it only
//! holds data: the body is stored already encoded, as text. Method, URL,
//! headers and query survive a round trip exactly; the body comes back as
//! text regardless of the value it was encoded from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codec::{encode_body, Body, Values};
use crate::error::Error;
use crate::transaction::Transaction;

/// Generic payload type exchanged with queues.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Serializable snapshot of a transaction's request fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionMap {
    pub method: String,
    pub url: String,
    pub header: BTreeMap<String, String>,
    pub query: Values,
    pub form: Values,
    pub body: String,
}

impl Transaction<'_> {
    /// Snapshot the request fields, encoding the body with the current
    /// Content-Type. GET transactions store an empty body.
    pub fn to_transaction_map(&mut self) -> Result<TransactionMap, Error> {
        const LOCATION: &str = "remote::Transaction::to_transaction_map";

        let body = match self.http_method() {
            Some(method) if method.carries_body() => {
                let content_type = self.content_type_value().to_string();
                let (body, form) = self.body_and_form_mut();
                encode_body(body, &content_type, form).map_err(|err| err.into_error(LOCATION, self.error_report()))?
            }
            _ => Vec::new(),
        };

        Ok(TransactionMap {
            method: self.http_method().map(|m| m.to_string()).unwrap_or_default(),
            url: self.raw_url().to_string(),
            header: self.headers().clone(),
            query: self.query_values().clone(),
            form: self.form_values().clone(),
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    /// Overwrite the request fields from a snapshot.
    pub fn apply_transaction_map(&mut self, map: TransactionMap) -> Result<(), Error> {
        let method = if map.method.is_empty() {
            None
        } else {
            Some(map.method.parse()?)
        };
        let body = if map.body.is_empty() {
            Body::Empty
        } else {
            Body::Text(map.body)
        };
        self.replace_request_fields(method, map.url, map.header, map.query, map.form, body);
        Ok(())
    }

    pub fn marshal_map(&mut self) -> Result<Payload, Error> {
        let map = self.to_transaction_map()?;
        match serde_json::to_value(map) {
            Ok(serde_json::Value::Object(payload)) => Ok(payload),
            Ok(_) => Ok(Payload::new()),
            Err(err) => Err(self.encoding_error("remote::Transaction::marshal_map", err)),
        }
    }

    pub fn unmarshal_map(&mut self, payload: &Payload) -> Result<(), Error> {
        let map = serde_json::from_value(serde_json::Value::Object(payload.clone()))
            .map_err(|err| self.decoding_error("remote::Transaction::unmarshal_map", err))?;
        self.apply_transaction_map(map)
    }

    pub fn marshal_json(&mut self) -> Result<String, Error> {
        let map = self.to_transaction_map()?;
        serde_json::to_string(&map).map_err(|err| self.encoding_error("remote::Transaction::marshal_json", err))
    }

    pub fn unmarshal_json(&mut self, data: &str) -> Result<(), Error> {
        let map = serde_json::from_str(data)
            .map_err(|err| self.decoding_error("remote::Transaction::unmarshal_json", err))?;
        self.apply_transaction_map(map)
    }

    fn encoding_error(&self, location: &'static str, err: serde_json::Error) -> Error {
        Error::Encoding {
            location,
            source: Box::new(err),
            report: Box::new(self.error_report()),
        }
    }

    fn decoding_error(&self, location: &'static str, err: serde_json::Error) -> Error {
        Error::Decoding {
            location,
            format: "JSON",
            source: Box::new(err),
            report: Box::new(self.error_report()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::http::HttpMethod;

    #[test]
    fn map_round_trip_preserves_method_url_and_headers() {
        let mut original = crate::post("http://example.com/inbox");
        original
            .header("X-Custom", "abc")
            .query("page", "2")
            .json(HashMap::from([("first", "1")]));

        let payload = original.marshal_map().unwrap();
        assert_eq!(payload["method"], "POST");
        assert_eq!(payload["body"], r#"{"first":"1"}"#);

        let mut restored = crate::Transaction::new();
        restored.unmarshal_map(&payload).unwrap();

        assert_eq!(restored.http_method(), Some(HttpMethod::Post));
        assert_eq!(restored.raw_url(), original.raw_url());
        assert_eq!(restored.headers(), original.headers());
        assert_eq!(restored.query_values(), original.query_values());
    }

    #[test]
    fn get_transactions_store_no_body() {
        let mut txn = crate::get("http://example.com");
        txn.body("ignored");
        let map = txn.to_transaction_map().unwrap();
        assert_eq!(map.method, "GET");
        assert!(map.body.is_empty());
    }

    #[test]
    fn json_round_trip() {
        let mut original = crate::put("http://example.com/item/1");
        original.header("Authorization", "Bearer x").body("plain text");
        let json = original.marshal_json().unwrap();

        let mut restored = crate::Transaction::new();
        restored.unmarshal_json(&json).unwrap();
        assert_eq!(restored.http_method(), Some(HttpMethod::Put));
        assert_eq!(restored.headers(), original.headers());
        assert_eq!(restored.request_body().unwrap(), b"plain text");
    }

    #[test]
    fn missing_fields_default_and_bad_methods_fail() {
        let mut payload = Payload::new();
        payload.insert("url".to_string(), "http://example.com".into());
        let mut txn = crate::Transaction::new();
        txn.unmarshal_map(&payload).unwrap();
        assert_eq!(txn.http_method(), None);
        assert_eq!(txn.raw_url(), "http://example.com");

        payload.insert("method".to_string(), "BREW".into());
        assert!(matches!(txn.unmarshal_map(&payload), Err(Error::Validation { .. })));

        payload.insert("method".to_string(), 7.into());
        let err = txn.unmarshal_map(&payload).unwrap_err();
        assert!(matches!(err, Error::Decoding { format: "JSON", .. }));
        assert_eq!(err.code(), 500);
    }

    #[test]
    fn malformed_json_is_a_decoding_error() {
        let mut txn = crate::Transaction::new();
        let err = txn.unmarshal_json(r#"{"method": "POST", "url": "#).unwrap_err();
        assert!(matches!(err, Error::Decoding { format: "JSON", .. }));
        assert!(err.report().is_some());
        assert_eq!(err.to_string(), "remote::Transaction::unmarshal_json: unable to decode JSON body");
        assert_eq!(txn.http_method(), None);
    }
}
