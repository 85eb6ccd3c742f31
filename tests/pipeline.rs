//! End-to-end pipeline behavior over a scripted input channel.
//!
//! Every exchange must end with exactly one close and at most one
//! terminal send, whatever happens to it along the way.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use dispatch_server::net::ConversionError;
use dispatch_server::queue::{EventKind, Outcome};
use dispatch_server::Server;

const WAIT: Duration = Duration::from_secs(5);

fn start(input: &ScriptedInput, register: impl FnOnce(&Server)) -> Server {
    let server = Server::builder(test_config(), input.clone()).build().unwrap();
    register(&server);
    server.start().unwrap();
    server
}

fn stop(server: Server) {
    server.set_quitting(true);
    server.join();
}

#[test]
fn test_allowed_request_reaches_longest_prefix_handler() {
    let input = ScriptedInput::new();
    let server = start(&input, |s| {
        s.register_handler("/hello", StaticHandler("hello"));
        s.register_handler("/hello/world", StaticHandler("world"));
        s.register_handler("", StaticHandler("default"));
    });

    let (job, recorder) = exchange(get("127.0.0.1", "/hello/there"));
    input.push(job);

    let calls = recorder.wait_closed();
    calls.assert_closed_once();
    assert_eq!(calls.ok, 1);
    assert_eq!(calls.body_text(), "/hello|hello");

    let (job, recorder) = exchange(get("127.0.0.1", "/hello/world/x"));
    input.push(job);
    assert_eq!(recorder.wait_closed().body_text(), "/hello/world|world");

    assert!(wait_until(WAIT, || server.stats().snapshot().completed == 2));
    stop(server);
}

#[test]
fn test_unmatched_path_falls_back_to_default() {
    let input = ScriptedInput::new();
    let server = start(&input, |s| {
        s.register_handler("/api", StaticHandler("api"));
        s.register_handler("", StaticHandler("default"));
    });

    let (job, recorder) = exchange(get("127.0.0.1", "/elsewhere"));
    input.push(job);

    let calls = recorder.wait_closed();
    calls.assert_closed_once();
    assert_eq!(calls.ok, 1);
    assert_eq!(calls.body_text(), "|default");
    stop(server);
}

#[test]
fn test_denied_source_gets_error_and_close() {
    let input = ScriptedInput::new();
    let server = start(&input, |s| s.register_handler("", StaticHandler("default")));

    let (job, recorder) = exchange(get("10.1.2.3", "/anything"));
    input.push(job);

    let calls = recorder.wait_closed();
    calls.assert_closed_once();
    assert_eq!(calls.error, 1);
    assert_eq!(calls.ok, 0);

    assert!(wait_until(WAIT, || server.stats().snapshot().denied == 1));
    assert_eq!(server.stats().snapshot().dispatched, 0);
    stop(server);
}

#[test]
fn test_handler_error_is_answered_once() {
    let input = ScriptedInput::new();
    let server = start(&input, |s| s.register_handler("/fail", FailingHandler));

    let (job, recorder) = exchange(get("127.0.0.1", "/fail"));
    input.push(job);

    let calls = recorder.wait_closed();
    calls.assert_closed_once();
    assert_eq!(calls.error, 1);
    assert!(wait_until(WAIT, || server.stats().snapshot().handler_failures == 1));
    stop(server);
}

#[test]
fn test_handler_panic_is_contained() {
    let input = ScriptedInput::new();
    let server = start(&input, |s| {
        s.register_handler("/boom", PanickingHandler);
        s.register_handler("/ok", StaticHandler("ok"));
    });

    let (job, recorder) = exchange(get("127.0.0.1", "/boom"));
    input.push(job);

    let calls = recorder.wait_closed();
    calls.assert_closed_once();
    assert_eq!(calls.error, 1);
    assert!(wait_until(WAIT, || server.stats().snapshot().handler_panics == 1));

    // The server keeps serving after a panic.
    let (job, recorder) = exchange(get("127.0.0.1", "/ok"));
    input.push(job);
    let calls = recorder.wait_closed();
    calls.assert_closed_once();
    assert_eq!(calls.ok, 1);
    stop(server);
}

#[test]
fn test_unrouted_request_without_default() {
    let input = ScriptedInput::new();
    let server = start(&input, |s| s.register_handler("/only", StaticHandler("only")));

    let (job, recorder) = exchange(get("127.0.0.1", "/other"));
    input.push(job);

    let calls = recorder.wait_closed();
    calls.assert_closed_once();
    assert_eq!(calls.error, 1);
    assert!(wait_until(WAIT, || server.stats().snapshot().unrouted == 1));
    stop(server);
}

#[test]
fn test_malformed_input_is_closed() {
    let input = ScriptedInput::new();
    let server = start(&input, |s| s.register_handler("", StaticHandler("default")));

    let (job, recorder) = malformed();
    input.push(job);
    input.push(Box::new(|| Err(ConversionError::new("no output bound"))));

    let calls = recorder.wait_closed();
    calls.assert_closed_once();
    assert_eq!(calls.error, 1);
    assert!(wait_until(WAIT, || server.stats().snapshot().conversion_failures == 2));
    assert_eq!(server.stats().snapshot().dispatched, 0);
    stop(server);
}

#[test]
fn test_concurrent_requests_each_close_once() {
    let input = ScriptedInput::new();
    let server = start(&input, |s| {
        s.register_handler("/a", StaticHandler("a"));
        s.register_handler("/b", StaticHandler("b"));
        s.register_handler("/fail", FailingHandler);
    });

    let paths = ["/a/1", "/b/2", "/fail", "/a", "/missing"];
    let recorders: Vec<_> = (0..100)
        .map(|i| {
            let (job, recorder) = exchange(get("127.0.0.1", paths[i % paths.len()]));
            input.push(job);
            recorder
        })
        .collect();

    for recorder in &recorders {
        recorder.wait_closed().assert_closed_once();
    }

    let ok: usize = recorders.iter().map(|r| r.calls().ok).sum();
    let errors: usize = recorders.iter().map(|r| r.calls().error).sum();
    assert_eq!(ok, 60);
    assert_eq!(errors, 40);
    stop(server);
}

#[test]
fn test_result_listeners_see_every_stage() {
    let input = ScriptedInput::new();
    let seen: Arc<Mutex<Vec<(EventKind, Outcome)>>> = Arc::default();
    let sink = Arc::clone(&seen);

    let server = Server::builder(test_config(), input.clone())
        .listener(move |kind: EventKind, outcome: &Outcome, _: Duration| {
            sink.lock().unwrap().push((kind, outcome.clone()));
        })
        .build()
        .unwrap();
    server.register_handler("", StaticHandler("default"));
    server.start().unwrap();

    let (job, recorder) = exchange(get("127.0.0.1", "/x"));
    input.push(job);
    recorder.wait_closed();

    assert!(wait_until(WAIT, || seen.lock().unwrap().len() == 4));
    let seen = seen.lock().unwrap().clone();
    assert!(seen.contains(&(EventKind::Conversion, Outcome::Forwarded)));
    assert!(seen.contains(&(EventKind::Middleware, Outcome::Forwarded)));
    assert!(seen.contains(&(EventKind::Dispatch, Outcome::Forwarded)));
    assert!(seen.contains(&(EventKind::Handler, Outcome::Completed)));
    stop(server);
}

#[test]
fn test_handler_registered_while_serving() {
    let input = ScriptedInput::new();
    let server = start(&input, |s| s.register_handler("", StaticHandler("default")));

    let (job, recorder) = exchange(get("127.0.0.1", "/late/x"));
    input.push(job);
    assert_eq!(recorder.wait_closed().body_text(), "|default");

    server.register_handler("/late", StaticHandler("late"));

    let (job, recorder) = exchange(get("127.0.0.1", "/late/x"));
    input.push(job);
    assert_eq!(recorder.wait_closed().body_text(), "/late|late");
    stop(server);
}
