//! Handler stage: run one handler instance against one request.

use std::sync::Arc;

use crate::handler::Handler;
use crate::http::output::ResponseGuard;
use crate::http::request::Request;
use crate::pipeline::{panic_message, PipelineContext};
use crate::queue::Outcome;

pub struct HandlerEvent {
    request: Request,
    output: ResponseGuard,
    handler: Box<dyn Handler>,
}

impl HandlerEvent {
    pub fn new(request: Request, output: ResponseGuard, handler: Box<dyn Handler>) -> Self {
        Self {
            request,
            output,
            handler,
        }
    }

    pub(crate) async fn execute(self, ctx: &Arc<PipelineContext>) -> Outcome {
        let request_id = self.request.id();
        let source = self.request.source().to_string();
        let path = self.request.path().to_string();
        let command = self.request.command().unwrap_or_default().to_string();

        let Self {
            request,
            mut output,
            mut handler,
        } = self;

        // The guard moves into the blocking task; a panic there drops it
        // during unwind, which sends the error response and closes.
        let result = tokio::task::spawn_blocking(move || {
            let result = handler.handle(&request, &output);
            match result {
                Ok(response) => {
                    output.respond(response);
                    output.close();
                    Ok(())
                }
                Err(e) => {
                    output.fail();
                    output.close();
                    Err(e)
                }
            }
        })
        .await;

        match result {
            Ok(Ok(())) => {
                ctx.stats.record_completed();
                tracing::debug!(request_id = %request_id, command = %command, "Request completed");
                Outcome::Completed
            }
            Ok(Err(e)) => {
                ctx.stats.record_handler_failure();
                tracing::error!(
                    request_id = %request_id,
                    source = %source,
                    path = %path,
                    command = %command,
                    error = %e,
                    "Handler failed"
                );
                Outcome::Failed(e.to_string())
            }
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic().as_ref());
                ctx.stats.record_handler_panic();
                tracing::error!(
                    request_id = %request_id,
                    source = %source,
                    path = %path,
                    command = %command,
                    panic = %message,
                    "Handler panicked"
                );
                Outcome::Panicked(message)
            }
            Err(e) => {
                tracing::warn!(request_id = %request_id, error = %e, "Handler task cancelled");
                ctx.stats.record_abandoned();
                Outcome::Abandoned
            }
        }
    }
}
