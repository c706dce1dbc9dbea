//! Bearer capability URLs: `bear:?u=<url>&t=<token>`.
//!
//! A capability URL bundles the target URL and the bearer token that grants
//! access to it. Before a request is assembled the pseudo-URL is replaced by
//! the real one and the token moves into the `Authorization` header.

use url::form_urlencoded;

use crate::error::Error;

const PREFIX: &str = "bear:?";
const LOCATION: &str = "remote::bearcap::parse";

/// A parsed bearer capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerCap {
    pub url: String,
    pub token: String,
}

impl BearerCap {
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

pub fn is_bearcap(url: &str) -> bool {
    url.starts_with(PREFIX)
}

/// Parse a capability URL. Both `u` and `t` are required and must be
/// non-empty; other parameters are ignored.
pub fn parse(url: &str) -> Result<BearerCap, Error> {
    let Some(query) = url.strip_prefix(PREFIX) else {
        return Err(Error::Validation {
            location: LOCATION,
            message: format!("{url:?} is not a bearer capability URL"),
        });
    };

    let mut target = None;
    let mut token = None;
    for (name, value) in form_urlencoded::parse(query.as_bytes()) {
        match name.as_ref() {
            "u" if !value.is_empty() => target = Some(value.into_owned()),
            "t" if !value.is_empty() => token = Some(value.into_owned()),
            _ => {}
        }
    }

    match (target, token) {
        (Some(url), Some(token)) => Ok(BearerCap { url, token }),
        (None, _) => Err(missing("u")),
        (_, None) => Err(missing("t")),
    }
}

fn missing(param: &str) -> Error {
    Error::Validation {
        location: LOCATION,
        message: format!("bearer capability is missing required parameter {param:?}"),
    }
}
