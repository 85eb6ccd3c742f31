//! Conversion stage: turn an accepted connection into an exchange.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::net::input::{ConversionError, Exchange, PendingExchange};
use crate::pipeline::{panic_message, PipelineContext};
use crate::queue::Outcome;

pub type ConversionResult = Result<Exchange, ConversionError>;

/// Runs a deferred conversion and hands the result to the waiting
/// middleware stage.
pub struct ConversionEvent {
    job: PendingExchange,
    reply: oneshot::Sender<ConversionResult>,
}

impl ConversionEvent {
    /// The event and the receiver its middleware stage waits on.
    pub fn new(job: PendingExchange) -> (Self, oneshot::Receiver<ConversionResult>) {
        let (reply, pending) = oneshot::channel();
        (Self { job, reply }, pending)
    }

    pub(crate) async fn execute(self, ctx: &Arc<PipelineContext>) -> Outcome {
        let converted = match tokio::task::spawn_blocking(self.job).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(ConversionError::new(format!(
                "conversion panicked: {}",
                panic_message(e.into_panic().as_ref())
            ))),
            Err(e) => Err(ConversionError::new(e.to_string())),
        };

        let outcome = match &converted {
            Ok(exchange) => {
                tracing::debug!(
                    request_id = %exchange.request.id(),
                    source = exchange.request.source(),
                    path = exchange.request.path(),
                    "Request converted"
                );
                Outcome::Forwarded
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping connection: conversion failed");
                ctx.stats.record_conversion_failure();
                Outcome::Malformed
            }
        };

        if self.reply.send(converted).is_err() {
            // Middleware gave up (shutdown); dropping the exchange closes it.
            tracing::debug!("Conversion finished after its waiter left");
            return Outcome::Abandoned;
        }
        outcome
    }
}
