//! Request/response types and the server that drives the pipeline.
//!
//! # Data Flow
//! ```text
//! InputChannel (net)
//!     → server.rs (accept loop thread: publish Conversion + Middleware)
//!     → pipeline stages on the worker pool
//!     → request.rs (Request with RequestId, resolved command)
//!     → response.rs (Response filled by a handler)
//!     → output.rs (ResponseGuard: one send, one close)
//! ```

pub mod output;
pub mod request;
pub mod response;
pub mod server;

pub use output::{Output, ResponseGuard, Sent};
pub use request::{Method, Request, RequestId};
pub use response::{DataType, Response, Status};
pub use server::{Server, ServerBuilder, ServerState};
