//! Dispatch stage: resolve the command and pick a handler instance.

use std::sync::Arc;

use crate::handler::DEFAULT_COMMAND;
use crate::http::output::ResponseGuard;
use crate::http::request::Request;
use crate::pipeline::handler::HandlerEvent;
use crate::pipeline::PipelineContext;
use crate::queue::{Event, Outcome};

pub struct DispatchEvent {
    request: Request,
    output: ResponseGuard,
}

impl DispatchEvent {
    pub fn new(request: Request, output: ResponseGuard) -> Self {
        Self { request, output }
    }

    pub(crate) async fn execute(self, ctx: &Arc<PipelineContext>) -> Outcome {
        let Self { mut request, mut output } = self;

        let command = ctx
            .router
            .resolve(request.path())
            .unwrap_or_else(|| DEFAULT_COMMAND.to_string());

        let Some(handler) = ctx.router.get_handler(&command) else {
            tracing::warn!(
                request_id = %request.id(),
                path = request.path(),
                "No handler for request and no default handler registered"
            );
            ctx.stats.record_unrouted();
            output.fail();
            output.close();
            return Outcome::Unrouted;
        };

        request.set_command(command);
        ctx.stats.record_dispatched();
        tracing::debug!(
            request_id = %request.id(),
            path = request.path(),
            command = request.command().unwrap_or_default(),
            "Request dispatched"
        );

        match ctx
            .queue
            .publish(Event::Handler(HandlerEvent::new(request, output, handler)))
            .await
        {
            Ok(()) => Outcome::Forwarded,
            Err(e) => {
                tracing::debug!(error = %e, "Could not publish handler, abandoning request");
                ctx.stats.record_abandoned();
                Outcome::Abandoned
            }
        }
    }
}
