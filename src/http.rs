use crate::error::CacheError;
use crate::io::{HttpResponse, HttpRunner};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::io::Read;

pub const ACCEPT: &str = "Accept";
pub const CACHE_CONTROL: &str = "Cache-Control";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const ETAG: &str = "ETag";
pub const LAST_MODIFIED: &str = "Last-Modified";
pub const IF_NONE_MATCH: &str = "If-None-Match";
pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";

/// Ordered multi-map of header names to values. Names keep the case they were
/// inserted with; lookups ignore case.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Headers(Vec::new())
    }

    /// Replace every value of `key` with a single `value`.
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        self.remove(&key);
        self.0.push((key, value.into()));
    }

    pub fn append<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.0.push((key.into(), value.into()));
    }

    /// First value stored for `key`.
    pub fn get(&self, key: &str) -> Option<&String> {
        self.0
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) {
        self.0.retain(|(name, _)| !name.eq_ignore_ascii_case(key));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (key, value) in iter {
            headers.append(key, value);
        }
        headers
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    GET,
    HEAD,
    OPTIONS,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::PATCH => "PATCH",
            Method::DELETE => "DELETE",
        }
    }

    /// Methods that change the resource and therefore invalidate what we
    /// have cached for it.
    pub fn is_unsafe(&self) -> bool {
        matches!(
            self,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fully resolved outbound request.
#[derive(Builder, Clone, Debug)]
#[builder(pattern = "owned")]
pub struct Request {
    #[builder(default)]
    method: Method,
    #[builder(setter(into))]
    url: String,
    #[builder(default)]
    headers: Headers,
    #[builder(setter(into, strip_option), default)]
    body: Option<Vec<u8>>,
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    pub fn new(url: &str, method: Method) -> Self {
        Request {
            method,
            url: url.to_string(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn set_header(&mut self, key: &str, value: &str) {
        self.headers.set(key, value);
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Value of the Accept header, the only header that takes part in the
    /// cache key.
    pub fn accept(&self) -> &str {
        self.headers.get(ACCEPT).map(|s| s.as_str()).unwrap_or("")
    }
}

/// Transport backed by a `ureq` agent. It knows nothing about caching.
pub struct Client {
    agent: ureq::Agent,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Client {
            agent: ureq::AgentBuilder::new().build(),
        }
    }

    pub fn with_agent(agent: ureq::Agent) -> Self {
        Client { agent }
    }
}

impl HttpRunner for Client {
    fn run(&self, request: &Request) -> Result<HttpResponse> {
        let ureq_req = self.agent.request(request.method().as_str(), request.url());
        let ureq_req = request
            .headers()
            .iter()
            .fold(ureq_req, |req, (key, value)| req.set(key, value));
        let result = match request.body() {
            Some(body) => ureq_req.send_bytes(body),
            None => ureq_req.call(),
        };
        match result {
            // ureq returns error on status codes >= 400, those are still
            // responses from the origin as far as we are concerned.
            Ok(response) | Err(ureq::Error::Status(_, response)) => into_http_response(response),
            Err(err) => Err(CacheError::HttpTransportError(err.to_string()).into()),
        }
    }
}

fn into_http_response(response: ureq::Response) -> Result<HttpResponse> {
    let status = response.status();
    let status_text = response.status_text().to_string();
    let protocol = response.http_version().to_string();
    let mut headers = Headers::new();
    for name in response.headers_names() {
        if headers.contains(&name) {
            continue;
        }
        for value in response.all(&name) {
            headers.append(name.as_str(), value);
        }
    }
    let mut body = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut body)
        .map_err(|err| CacheError::HttpTransportError(err.to_string()))?;
    let response = HttpResponse::builder()
        .status(status)
        .status_text(status_text)
        .protocol(protocol)
        .headers(headers)
        .body(body)
        .build()?;
    Ok(response)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_headers_lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.set("ETag", "\"abc\"");
        assert_eq!("\"abc\"", headers.get("etag").unwrap());
        assert_eq!("\"abc\"", headers.get("ETAG").unwrap());
        assert!(headers.get("last-modified").is_none());
    }

    #[test]
    fn test_headers_keep_insertion_order_and_multiple_values() {
        let mut headers = Headers::new();
        headers.append("Link", "<http://localhost/a>; rel=\"a\"");
        headers.append("Content-Type", "application/json");
        headers.append("link", "<http://localhost/b>; rel=\"b\"");
        assert_eq!(
            vec![
                "<http://localhost/a>; rel=\"a\"",
                "<http://localhost/b>; rel=\"b\""
            ],
            headers.get_all("LINK")
        );
        let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(vec!["Link", "Content-Type", "link"], names);
    }

    #[test]
    fn test_headers_set_replaces_all_values() {
        let mut headers = Headers::new();
        headers.append("Vary", "Accept");
        headers.append("vary", "Accept-Encoding");
        headers.set("VARY", "Origin");
        assert_eq!(vec!["Origin"], headers.get_all("vary"));
        assert_eq!(1, headers.len());
    }

    #[test]
    fn test_request_accept_header() {
        let mut request = Request::new("http://localhost/users", Method::GET);
        assert_eq!("", request.accept());
        request.set_header(ACCEPT, "application/vnd.api+json");
        assert_eq!("application/vnd.api+json", request.accept());
    }

    #[test]
    fn test_request_builder_defaults_to_get() {
        let request = Request::builder()
            .url("http://localhost/users")
            .build()
            .unwrap();
        assert_eq!(Method::GET, request.method());
        assert!(request.body().is_none());
        assert!(request.headers().is_empty());
    }

    #[test]
    fn test_unsafe_methods() {
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            assert!(method.is_unsafe());
        }
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            assert!(!method.is_unsafe());
        }
    }
}
