use crate::{
    http::{Headers, Request, CONTENT_LENGTH, CONTENT_TYPE},
    mediatype::MediaType,
    Result,
};

/// A trait for the HTTP protocol. Implementors accept a fully resolved
/// `Request` and return whatever the origin answered. Clients can potentially
/// do HTTP calls against a remote server or mock the responses for testing
/// purposes. Transport failures are errors; HTTP error statuses are not.
pub trait HttpRunner {
    fn run(&self, request: &Request) -> Result<HttpResponse>;
}

impl<R: HttpRunner + ?Sized> HttpRunner for &R {
    fn run(&self, request: &Request) -> Result<HttpResponse> {
        (**self).run(request)
    }
}

/// Adapts lower level HTTP outputs to a common response.
#[derive(Clone, Debug, Builder)]
#[builder(pattern = "owned")]
pub struct HttpResponse {
    #[builder(default)]
    pub status: u16,
    /// Reason phrase, e.g. `OK`
    #[builder(setter(into), default)]
    pub status_text: String,
    /// e.g. `HTTP/1.1`
    #[builder(setter(into), default = "String::from(\"HTTP/1.1\")")]
    pub protocol: String,
    #[builder(default)]
    pub headers: Headers,
    #[builder(setter(into), default)]
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn builder() -> HttpResponseBuilder {
        HttpResponseBuilder::default()
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|s| s.as_str())
    }

    /// Declared body size, falling back to the number of bytes read.
    pub fn content_length(&self) -> Option<u64> {
        self.header(CONTENT_LENGTH)
            .and_then(|value| value.trim().parse().ok())
            .or(Some(self.body.len() as u64))
    }

    /// Parsed Content-Type. A malformed value is treated as absent.
    pub fn media_type(&self) -> Option<MediaType> {
        self.header(CONTENT_TYPE)
            .and_then(|value| MediaType::parse(value).ok())
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }
}
