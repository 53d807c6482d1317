use super::error::code::ErrorCode;
use super::error::NuboError;
use mail_parser::{Addr as ImapAddr, Address as ImapAddress};
use poem::error::ResponseError;
use poem::Body;
use poem::{http::StatusCode, Error, Response};
use poem_openapi::Object;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use tracing::error;

pub mod auth;
pub mod log;
pub mod rustls;
pub mod signal;

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Object)]
pub struct Addr {
    /// The optional display name associated with the email address (e.g., "John Doe").
    /// If `None`, no display name is specified.
    pub name: Option<String>,
    /// The optional email address (e.g., "john.doe@example.com").
    /// If `None`, the address is unavailable, though typically at least one of `name` or `address` is provided.
    pub address: Option<String>,
}

impl Addr {
    pub fn parse(s: &str) -> Self {
        let re = Regex::new(r#"(?:(?P<name>.*)\s*)?<(?P<email>[^<>]+)>"#).unwrap();
        if let Some(caps) = re.captures(s) {
            let name: Option<String> = caps.name("name").map(|m| m.as_str().trim().into());
            let email: Option<String> = caps.name("email").map(|m| m.as_str().trim().into());
            Addr {
                name: if let Some(n) = name {
                    if n.is_empty() {
                        None
                    } else {
                        Some(n)
                    }
                } else {
                    None
                },
                address: email,
            }
        } else {
            let s_trimmed = s.trim();
            Addr {
                name: None,
                address: if s_trimmed.is_empty() {
                    None
                } else {
                    Some(s_trimmed.into())
                },
            }
        }
    }
}

impl std::fmt::Display for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.name, &self.address) {
            (Some(name), Some(address)) => write!(f, "{} <{}>", name, address),
            (None, Some(address)) => write!(f, "<{}>", address),
            (Some(name), None) => write!(f, "{}", name),
            (None, None) => write!(f, ""),
        }
    }
}

impl<'x> From<&ImapAddr<'x>> for Addr {
    fn from(original: &ImapAddr<'x>) -> Self {
        Addr {
            name: original.name.as_ref().map(|s| s.to_string()),
            address: original.address.as_ref().map(|s| s.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddrVec(pub Vec<Addr>);

impl Deref for AddrVec {
    type Target = Vec<Addr>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'x> From<&ImapAddress<'x>> for AddrVec {
    fn from(original: &ImapAddress<'x>) -> Self {
        let vec = match original {
            ImapAddress::List(addrs) => addrs.iter().map(Addr::from).collect(),
            ImapAddress::Group(groups) => groups
                .iter()
                .flat_map(|group| group.addresses.iter().map(Addr::from))
                .collect(),
        };
        AddrVec(vec)
    }
}

#[inline]
fn create_nubo_error(message: &str, code: ErrorCode) -> NuboError {
    NuboError::Generic {
        message: message.into(),
        location: snafu::Location::default(),
        code,
    }
}

#[inline]
pub fn create_api_error_response(message: &str, code: ErrorCode) -> Error {
    let nubo_error = create_nubo_error(message, code);
    nubo_error.into()
}

impl ResponseError for NuboError {
    fn status(&self) -> StatusCode {
        match self {
            NuboError::Generic {
                message: _,
                location: _,
                code,
            } => code.status(),
        }
    }

    fn as_response(&self) -> Response
    where
        Self: std::error::Error + Send + Sync + 'static,
    {
        match self {
            NuboError::Generic {
                message,
                location,
                code,
            } => {
                error!(
                    error_code = *code as u32,
                    error_message = %message,
                    error_location = ?location
                );

                let body = Body::from_json(serde_json::json!({
                    "code": *code as u32,
                    "message": message.to_string(),
                }))
                .unwrap();

                Response::builder().status(self.status()).body(body)
            }
        }
    }
}
