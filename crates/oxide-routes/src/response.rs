//! Response state shared by the handlers of one request.

use std::collections::HashMap;

/// An HTTP response under construction.
///
/// Handlers write into it through `&mut`; once [`Response::end`] (or one of
/// the `send` helpers) has been called the response is finished and the
/// dispatcher stops after the current phase.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
    finished: bool,
}

impl Response {
    /// Creates a new, unfinished response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
            finished: false,
        }
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    /// Sets a header.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Gets a header value, ignoring case.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Writes `body` and finishes the response.
    pub fn send(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
        self.finished = true;
    }

    /// Sets `status`, writes its reason phrase as body and finishes.
    pub fn send_status(&mut self, status: u16) {
        self.status = status;
        let text = self.status_text();
        self.send(text);
    }

    /// Finishes the response without touching the body.
    pub fn end(&mut self) {
        self.finished = true;
    }

    /// Returns `true` once a handler has finished the response.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns the body as a string.
    pub fn body_string(&self) -> Option<String> {
        String::from_utf8(self.body.clone()).ok()
    }

    /// Returns the status text for the current status code.
    pub fn status_text(&self) -> &'static str {
        match self.status {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            409 => "Conflict",
            422 => "Unprocessable Entity",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200)
    }
}
