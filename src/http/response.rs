//! Response value holder.
//!
//! An [`Output`](crate::http::output::Output) hands out an empty `Response`;
//! the handler fills it in and the handler stage picks the send method from
//! its [`Status`].

use serde::Serialize;

/// Which terminal send method a response is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Ok,
    Redirect,
    Proxy,
}

/// Payload kind, used to derive the content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    #[default]
    Json,
    Html,
    Css,
    Js,
    Png,
    /// Opaque upstream payload, forwarded verbatim.
    Proxy,
}

impl DataType {
    pub fn content_type(&self) -> &'static str {
        match self {
            DataType::Json => "application/json",
            DataType::Html => "text/html; charset=utf-8",
            DataType::Css => "text/css",
            DataType::Js => "application/javascript",
            DataType::Png => "image/png",
            DataType::Proxy => "application/octet-stream",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    status: Status,
    data_type: DataType,
    body: Vec<u8>,
    headers: Vec<(String, String)>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: Serialize>(self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(self.data_type(DataType::Json).body(body))
    }

    /// Turn this response into a redirect to `location`.
    pub fn redirect(self, location: impl Into<String>) -> Self {
        self.status(Status::Redirect).header("Location", location)
    }

    /// Turn this response into an upstream-proxy payload.
    pub fn proxy(self, payload: impl Into<Vec<u8>>) -> Self {
        self.status(Status::Proxy)
            .data_type(DataType::Proxy)
            .body(payload)
    }

    pub fn get_status(&self) -> Status {
        self.status
    }

    pub fn get_data_type(&self) -> DataType {
        self.data_type
    }

    pub fn get_body(&self) -> &[u8] {
        &self.body
    }

    pub fn get_headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
