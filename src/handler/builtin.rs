//! Small handlers shipped with the binary.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::HandlerError;
use crate::handler::Handler;
use crate::http::output::ResponseGuard;
use crate::http::request::Request;
use crate::http::response::Response;

/// Answers with the crate name and version as JSON.
#[derive(Debug, Clone, Default)]
pub struct VersionHandler;

#[derive(Serialize)]
struct VersionBody {
    name: &'static str,
    version: &'static str,
}

impl Handler for VersionHandler {
    fn handle(&mut self, _request: &Request, output: &ResponseGuard) -> Result<Response, HandlerError> {
        let body = VersionBody {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        };
        Ok(output.make_response().json(&body)?)
    }

    fn copy(&self) -> Box<dyn Handler> {
        Box::new(self.clone())
    }
}

/// Echoes the request back as JSON.
#[derive(Debug, Clone, Default)]
pub struct EchoHandler;

#[derive(Serialize)]
struct EchoBody<'a> {
    request_id: String,
    source: &'a str,
    method: &'static str,
    path: &'a str,
    command: Option<&'a str>,
    params: BTreeMap<&'a str, Vec<&'a str>>,
}

impl Handler for EchoHandler {
    fn handle(&mut self, request: &Request, output: &ResponseGuard) -> Result<Response, HandlerError> {
        let params = request
            .params()
            .iter()
            .map(|(key, values)| (key.as_str(), values.iter().map(String::as_str).collect()))
            .collect();

        let body = EchoBody {
            request_id: request.id().to_string(),
            source: request.source(),
            method: request.method().as_str(),
            path: request.path(),
            command: request.command(),
            params,
        };
        Ok(output.make_response().json(&body)?)
    }

    fn copy(&self) -> Box<dyn Handler> {
        Box::new(self.clone())
    }
}

/// Redirects every request to a fixed location.
///
/// A `to` parameter overrides the location when `allow_override` is set.
#[derive(Debug, Clone)]
pub struct RedirectHandler {
    location: String,
    allow_override: bool,
}

impl RedirectHandler {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            allow_override: false,
        }
    }

    pub fn allow_override(mut self, allow: bool) -> Self {
        self.allow_override = allow;
        self
    }
}

impl Handler for RedirectHandler {
    fn handle(&mut self, request: &Request, output: &ResponseGuard) -> Result<Response, HandlerError> {
        let location = match request.param("to") {
            Some(to) if self.allow_override => {
                if !to.starts_with('/') {
                    return Err(HandlerError::BadRequest(format!("refusing off-site redirect to {:?}", to)));
                }
                to
            }
            _ => self.location.as_str(),
        };
        Ok(output.make_response().redirect(location))
    }

    fn copy(&self) -> Box<dyn Handler> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::output::Output;
    use crate::http::request::Method;
    use crate::http::response::{DataType, Status};

    struct Discard;

    impl Output for Discard {
        fn send_ok(&mut self, _: Response) -> std::io::Result<()> {
            Ok(())
        }
        fn send_redirect(&mut self, _: Response) -> std::io::Result<()> {
            Ok(())
        }
        fn send_proxy(&mut self, _: Response) -> std::io::Result<()> {
            Ok(())
        }
        fn send_error(&mut self) -> std::io::Result<()> {
            Ok(())
        }
        fn close_channel(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn output() -> ResponseGuard {
        ResponseGuard::new(Box::new(Discard))
    }

    #[test]
    fn test_version_is_json() {
        let response = VersionHandler
            .copy()
            .handle(&Request::new("::1", Method::Get, "/version"), &output())
            .unwrap();
        assert_eq!(response.get_data_type(), DataType::Json);
        let body: serde_json::Value = serde_json::from_slice(response.get_body()).unwrap();
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_echo_includes_params() {
        let request = Request::new("10.0.0.1", Method::Post, "/echo/x")
            .with_param("k", "b")
            .with_param("k", "a");
        let response = EchoHandler.copy().handle(&request, &output()).unwrap();
        let body: serde_json::Value = serde_json::from_slice(response.get_body()).unwrap();
        assert_eq!(body["method"], "POST");
        assert_eq!(body["params"]["k"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_redirect_override() {
        let template = RedirectHandler::new("/home").allow_override(true);
        let mut handler = template.copy();

        let response = handler
            .handle(&Request::new("::1", Method::Get, "/go").with_param("to", "/docs"), &output())
            .unwrap();
        assert_eq!(response.get_status(), Status::Redirect);
        assert_eq!(response.get_header("Location"), Some("/docs"));

        let err = handler
            .handle(&Request::new("::1", Method::Get, "/go").with_param("to", "http://evil"), &output())
            .unwrap_err();
        assert!(matches!(err, HandlerError::BadRequest(_)));
    }
}
