//! Request types seen by route handlers.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

/// HTTP request methods.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET method
    Get,
    /// POST method
    Post,
    /// PUT method
    Put,
    /// PATCH method
    Patch,
    /// DELETE method
    Delete,
    /// HEAD method
    Head,
    /// OPTIONS method
    Options,
    /// Any other method token, stored upper-cased.
    Extension(String),
}

impl Method {
    /// Parses a method token. Unknown tokens become [`Method::Extension`].
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            other => Self::Extension(other.to_string()),
        }
    }

    /// Returns the method as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Extension(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named and positional request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    params: HashMap<String, String>,
}

impl Params {
    /// Creates new empty params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a parameter, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Gets a parameter value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parses a parameter as a specific type.
    pub fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Returns `true` if no parameters are set.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns an iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a copy of `self` with every entry of `overlay` applied on top.
    #[must_use]
    pub fn merged_with(&self, overlay: &Params) -> Params {
        let mut merged = self.clone();
        for (key, value) in overlay.iter() {
            merged.insert(key, value);
        }
        merged
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// An incoming request as handed to [`Router::dispatch`](crate::Router::dispatch).
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Request path, without query string.
    pub path: String,
    /// Parameters already known before routing (e.g. set by the server).
    pub params: Params,
    /// Query string parameters.
    pub query: HashMap<String, String>,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: Vec<u8>,
}

impl Request {
    /// Creates a new request. A query string in `path` is split off into
    /// [`Request::query`].
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path.to_string(), Self::parse_query_string(query)),
            None => (path, HashMap::new()),
        };
        Self {
            method,
            path,
            params: Params::new(),
            query,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Creates a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets a pre-routing parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Gets a header value.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        // Case-insensitive header lookup
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Gets a query parameter.
    pub fn get_query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Parses query parameters from a query string.
    pub fn parse_query_string(query: &str) -> HashMap<String, String> {
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_query_component(key), decode_query_component(value))
            })
            .collect()
    }
}

fn decode_query_component(s: &str) -> String {
    let s = s.replace('+', " ");
    urlencoding::decode(&s).map_or(s.clone(), |decoded| decoded.into_owned())
}

/// The request as seen by one matched route.
///
/// Built per match: the base request is borrowed unchanged and the merged
/// parameters (request parameters overlaid by the route's captures) live in
/// the view, so concurrent matches never observe each other's parameters.
#[derive(Debug, Clone)]
pub struct RouteRequest<'a> {
    request: &'a Request,
    params: Params,
    args: &'a [Value],
    route: &'a str,
}

impl<'a> RouteRequest<'a> {
    pub(crate) fn new(
        request: &'a Request,
        params: Params,
        args: &'a [Value],
        route: &'a str,
    ) -> Self {
        Self {
            request,
            params,
            args,
            route,
        }
    }

    /// The underlying request.
    pub fn request(&self) -> &'a Request {
        self.request
    }

    /// Request method.
    pub fn method(&self) -> &'a Method {
        &self.request.method
    }

    /// Request path.
    pub fn path(&self) -> &'a str {
        &self.request.path
    }

    /// Merged parameters for this match.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Shorthand for `self.params().get(key)`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }

    /// Static arguments declared on the route target.
    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    /// Source string of the route that matched.
    pub fn route(&self) -> &'a str {
        self.route
    }

    /// Gets a header value.
    pub fn get_header(&self, key: &str) -> Option<&'a str> {
        self.request.get_header(key)
    }

    /// Gets a query parameter.
    pub fn get_query(&self, key: &str) -> Option<&'a str> {
        self.request.get_query(key)
    }

    /// Request body.
    pub fn body(&self) -> &'a [u8] {
        &self.request.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!(Method::parse("GET"), Method::Get);
        assert_eq!(Method::parse("post"), Method::Post);
        assert_eq!(
            Method::parse("propfind"),
            Method::Extension("PROPFIND".to_string())
        );
        assert_eq!(Method::parse("propfind").as_str(), "PROPFIND");
    }

    #[test]
    fn test_params() {
        let mut params = Params::new();
        params.insert("id", "123");
        params.insert("name", "test");

        assert_eq!(params.get("id"), Some("123"));
        assert_eq!(params.parse::<i64>("id"), Some(123));
        assert_eq!(params.get("missing"), None);
    }

    #[test]
    fn test_merged_with_prefers_overlay() {
        let base: Params = [("id", "base"), ("lang", "en")].into_iter().collect();
        let overlay: Params = [("id", "42")].into_iter().collect();

        let merged = base.merged_with(&overlay);
        assert_eq!(merged.get("id"), Some("42"));
        assert_eq!(merged.get("lang"), Some("en"));
        assert_eq!(base.get("id"), Some("base"));
    }

    #[test]
    fn test_request_builder() {
        let req = Request::get("/users?page=1")
            .header("Content-Type", "application/json")
            .param("tenant", "acme");

        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/users");
        assert_eq!(req.get_header("content-type"), Some("application/json"));
        assert_eq!(req.get_query("page"), Some("1"));
        assert_eq!(req.params.get("tenant"), Some("acme"));
    }

    #[test]
    fn test_query_string_parsing() {
        let query = Request::parse_query_string("name=John+Doe&age=30&city=New%20York");
        assert_eq!(query.get("name"), Some(&"John Doe".to_string()));
        assert_eq!(query.get("age"), Some(&"30".to_string()));
        assert_eq!(query.get("city"), Some(&"New York".to_string()));
    }

    #[test]
    fn test_route_request_view() {
        let req = Request::get("/user/42").param("id", "stale");
        let params: Params = [("id", "42")].into_iter().collect();
        let args = [Value::from("admin")];
        let view = RouteRequest::new(&req, params, &args, "GET /user/:id");

        assert_eq!(view.param("id"), Some("42"));
        assert_eq!(view.path(), "/user/42");
        assert_eq!(view.args(), &[Value::from("admin")]);
        assert_eq!(req.params.get("id"), Some("stale"));
    }
}
