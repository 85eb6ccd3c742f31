//! Middleware stage: wait for conversion, then apply access control.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::net::input::Exchange;
use crate::pipeline::conversion::ConversionResult;
use crate::pipeline::dispatch::DispatchEvent;
use crate::pipeline::PipelineContext;
use crate::queue::{Event, Outcome};
use crate::resilience::PollBackoff;

pub struct MiddlewareEvent {
    pending: oneshot::Receiver<ConversionResult>,
    accepted_at: Instant,
}

impl MiddlewareEvent {
    pub fn new(pending: oneshot::Receiver<ConversionResult>) -> Self {
        Self {
            pending,
            accepted_at: Instant::now(),
        }
    }

    pub(crate) async fn execute(self, ctx: &Arc<PipelineContext>) -> Outcome {
        let accepted_at = self.accepted_at;
        let Some(converted) = wait_for_conversion(self.pending, ctx).await else {
            ctx.stats.record_abandoned();
            return Outcome::Abandoned;
        };

        // Conversion failures were logged and counted by the conversion stage.
        let Ok(Exchange { request, mut output }) = converted else {
            return Outcome::Malformed;
        };

        let allowed = {
            let gate = Arc::clone(&ctx.gate);
            let source = request.source().to_string();
            let (reverse_lookup, case_sensitive) = (ctx.reverse_lookup, ctx.case_sensitive);
            match tokio::task::spawn_blocking(move || gate.allow(&source, reverse_lookup, case_sensitive)).await {
                Ok(allowed) => allowed,
                Err(e) => {
                    tracing::error!(request_id = %request.id(), error = %e, "Access check failed, denying");
                    false
                }
            }
        };

        if !allowed {
            tracing::warn!(
                request_id = %request.id(),
                source = request.source(),
                path = request.path(),
                "Access denied"
            );
            ctx.stats.record_denied();
            output.fail();
            output.close();
            return Outcome::Denied;
        }

        tracing::debug!(
            request_id = %request.id(),
            waited_ms = accepted_at.elapsed().as_millis() as u64,
            "Access granted"
        );

        match ctx
            .queue
            .publish(Event::Dispatch(DispatchEvent::new(request, output)))
            .await
        {
            Ok(()) => Outcome::Forwarded,
            Err(e) => {
                tracing::debug!(error = %e, "Could not publish dispatch, abandoning request");
                ctx.stats.record_abandoned();
                Outcome::Abandoned
            }
        }
    }
}

/// Poll the conversion with randomized exponential backoff.
///
/// `None` when shutdown abandons the wait or the conversion was dropped.
async fn wait_for_conversion(
    mut pending: oneshot::Receiver<ConversionResult>,
    ctx: &PipelineContext,
) -> Option<ConversionResult> {
    let mut backoff = PollBackoff::new(ctx.polling);

    loop {
        if ctx.should_abandon() {
            tracing::debug!("Shutdown while waiting for conversion, abandoning");
            return None;
        }

        match tokio::time::timeout(backoff.next_delay(), &mut pending).await {
            Ok(Ok(converted)) => return Some(converted),
            Ok(Err(_)) => {
                tracing::debug!("Conversion dropped before completing");
                return None;
            }
            Err(_) => continue,
        }
    }
}
