//! Structured request produced by the conversion stage.
//!
//! # Responsibilities
//! - Carry the source address, method, headers, raw path and parameters
//! - Carry a unique request ID for tracing across stages
//! - Hold the command resolved by the dispatch stage
//!
//! # Design Decisions
//! - Header names keep their original case; lookups are case-insensitive
//! - Parameters are sets: repeated identical values collapse
//! - The resolved command is written once, by the dispatch stage

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use uuid::Uuid;

/// Unique identifier attached to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a new random (v4) request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request method. Anything other than GET/POST is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Unknown,
}

impl Method {
    pub fn parse(token: &str) -> Self {
        if token.eq_ignore_ascii_case("GET") {
            Method::Get
        } else if token.eq_ignore_ascii_case("POST") {
            Method::Post
        } else {
            Method::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct Request {
    id: RequestId,
    source: String,
    method: Method,
    headers: Vec<(String, Vec<String>)>,
    path: String,
    params: HashMap<String, BTreeSet<String>>,
    command: Option<String>,
}

impl Request {
    /// Create a request for `path` received from `source`.
    pub fn new(source: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            source: source.into(),
            method,
            headers: Vec::new(),
            path: path.into(),
            params: HashMap::new(),
            command: None,
        }
    }

    /// Append a header value, keeping the first-seen spelling of the name.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some((_, values)) => values.push(value.into()),
            None => self.headers.push((name, vec![value.into()])),
        }
    }

    /// Builder form of [`Request::add_header`].
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    pub fn add_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.entry(key.into()).or_default().insert(value.into());
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_param(key, value);
        self
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// All values of a header, in arrival order.
    pub fn header_values(&self, name: &str) -> &[String] {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).first().map(String::as_str)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.headers
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn param_values(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.params.get(key)
    }

    /// Any one value of a parameter (the smallest, for determinism).
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(|values| values.iter().next())
            .map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, BTreeSet<String>> {
        &self.params
    }

    /// The command chosen by the resolver, if dispatch has happened.
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Record the resolved command. Only the dispatch stage calls this.
    pub(crate) fn set_command(&mut self, command: impl Into<String>) {
        debug_assert!(self.command.is_none(), "command resolved twice");
        self.command = Some(command.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("GET"), Method::Get);
        assert_eq!(Method::parse("post"), Method::Post);
        assert_eq!(Method::parse("DELETE"), Method::Unknown);
    }

    #[test]
    fn test_headers_keep_case_and_order() {
        let req = Request::new("10.0.0.1", Method::Get, "/")
            .with_header("X-Trace", "a")
            .with_header("x-trace", "b")
            .with_header("Accept", "text/html");

        assert_eq!(req.header_values("X-TRACE"), &["a".to_string(), "b".to_string()]);
        let names: Vec<&str> = req.headers().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["X-Trace", "Accept"]);
        assert!(req.header_values("missing").is_empty());
    }

    #[test]
    fn test_params_are_sets() {
        let req = Request::new("10.0.0.1", Method::Post, "/form")
            .with_param("tag", "b")
            .with_param("tag", "a")
            .with_param("tag", "b");

        assert_eq!(req.param_values("tag").map(|v| v.len()), Some(2));
        assert_eq!(req.param("tag"), Some("a"));
    }

    #[test]
    fn request_ids_are_unique() {
        let a = Request::new("h", Method::Get, "/");
        let b = Request::new("h", Method::Get, "/");
        assert_ne!(a.id(), b.id());
        assert!(a.command().is_none());
    }
}
