//! Request and response values seen by the cache controller.

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

/// URL schemes that belong to the browser rather than the application.
const INTERNAL_SCHEMES: &[&str] = &[
    "chrome-extension",
    "moz-extension",
    "safari-extension",
    "safari-web-extension",
    "chrome",
    "about",
    "data",
    "blob",
];

/// How the client issued the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
    /// Top-level page load.
    Navigate,
    #[default]
    Other,
}

/// What the client intends to do with the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    #[default]
    Other,
}

impl Destination {
    /// Parse a `Sec-Fetch-Dest` header value.
    #[must_use]
    pub fn from_fetch_dest(value: &str) -> Self {
        match value {
            "document" | "iframe" | "frame" => Self::Document,
            "image" => Self::Image,
            "script" | "worker" | "sharedworker" => Self::Script,
            "style" => Self::Style,
            "font" => Self::Font,
            _ => Self::Other,
        }
    }
}

/// An outbound request from a client view.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub destination: Destination,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// A plain `GET` for a subresource.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::Other,
            destination: Destination::Other,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// A top-level page load.
    #[must_use]
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            destination: Destination::Document,
            ..Self::get(url)
        }
    }

    #[must_use]
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Key this request is cached under.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// Cache key for a `GET` of `url`.
#[must_use]
pub fn cache_key(url: &Url) -> String {
    format!("{} {url}", Method::GET)
}

/// A response, either fetched, cached, or synthesized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(with = "hex_body")]
    pub body: Vec<u8>,
}

impl Response {
    /// Build a response with a single `Content-Type` header.
    #[must_use]
    pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body: body.into(),
        }
    }

    /// A `text/plain` response.
    #[must_use]
    pub fn text(status: u16, body: &str) -> Self {
        Self::new(status, "text/plain; charset=utf-8", body)
    }

    /// An `application/json` response.
    #[must_use]
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, "application/json", value.to_string())
    }

    /// A `text/html` response.
    #[must_use]
    pub fn html(status: u16, body: &str) -> Self {
        Self::new(status, "text/html; charset=utf-8", body)
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// First header value with this name, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Bodies are binary; persisted generations store them as hex strings.
mod hex_body {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded).map_err(D::Error::custom)
    }
}

/// How the controller treats a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Pass through untouched.
    Bypass,
    /// Network first, cached shell on failure.
    Navigation,
    /// Network only, synthesized offline JSON on failure.
    Api,
    /// Cache first, network fill.
    Asset,
}

/// Decide how a request is handled.
///
/// Checked in order: method, scheme, origin, navigation, API prefix.
#[must_use]
pub fn classify(request: &Request, origin: &Url, api_prefix: &str) -> Route {
    if request.method != Method::GET {
        return Route::Bypass;
    }
    if INTERNAL_SCHEMES.contains(&request.url.scheme()) {
        return Route::Bypass;
    }
    if request.url.origin() != origin.origin() {
        return Route::Bypass;
    }
    if request.mode == RequestMode::Navigate {
        return Route::Navigation;
    }
    if request.url.path().contains(api_prefix) {
        return Route::Api;
    }
    Route::Asset
}
