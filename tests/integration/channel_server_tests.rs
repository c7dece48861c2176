//! In-process tests of the channel server and the dispatcher client.
//!
//! The server runs on the test runtime with a recording output sink, and
//! the client talks to it over a real local socket.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use console_host::console::{Console, Style};
use console_host::engine::basic::BasicEngine;
use console_host::engine::{Engine, OutputSink, ScopeRef};
use console_host::ipc::client::DispatcherClient;
use console_host::ipc::endpoint::EndpointName;
use console_host::ipc::protocol::RemoteFailure;
use console_host::ipc::server::spawn_dispatch_server;
use console_host::models::exit_code;
use console_host::orchestrator::local_dispatch::LocalDispatcher;
use console_host::orchestrator::sync::OutputSync;
use console_host::remote::dispatcher::CommandDispatcher;
use console_host::remote::output::CompletionSignal;
use console_host::remote::serve;
use console_host::{AppError, Result};

use super::test_helpers::RecordingConsole;

#[derive(Default)]
struct Recorder {
    out: Mutex<Vec<String>>,
    markers: Mutex<usize>,
}

impl OutputSink for Recorder {
    fn out_line(&self, line: &str) {
        self.out.lock().unwrap().push(line.to_owned());
    }

    fn err_line(&self, _line: &str) {}
}

impl CompletionSignal for Recorder {
    fn complete(&self) {
        *self.markers.lock().unwrap() += 1;
    }
}

struct Harness {
    endpoint: EndpointName,
    dispatcher: Arc<CommandDispatcher>,
    recorder: Arc<Recorder>,
    stop: Option<oneshot::Sender<()>>,
    server: JoinHandle<Result<i32>>,
}

async fn start_harness() -> Harness {
    let endpoint = EndpointName::generate("console-host-chan");
    let recorder = Arc::new(Recorder::default());
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::new(BasicEngine::new()),
        Arc::clone(&recorder),
        ScopeRef::default(),
    ));
    let (stop, stopped) = oneshot::channel::<()>();

    let server = tokio::spawn({
        let endpoint = endpoint.clone();
        let dispatcher = Arc::clone(&dispatcher);
        let readiness: Arc<dyn CompletionSignal> = Arc::clone(&recorder) as _;
        async move {
            serve(&endpoint, dispatcher, readiness, async {
                let _ = stopped.await;
            })
            .await
        }
    });

    for _ in 0..200 {
        if *recorder.markers.lock().unwrap() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*recorder.markers.lock().unwrap(), 1, "readiness marker written");

    Harness {
        endpoint,
        dispatcher,
        recorder,
        stop: Some(stop),
        server,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn readiness_marker_precedes_first_request() {
    let harness = start_harness().await;
    let client = DispatcherClient::connect(harness.endpoint.clone())
        .await
        .expect("connect");
    assert_eq!(client.endpoint(), &harness.endpoint);
    assert_eq!(*harness.recorder.markers.lock().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn execute_round_trips_value_and_output() {
    let harness = start_harness().await;
    let client = DispatcherClient::connect(harness.endpoint.clone())
        .await
        .expect("connect");
    let unit = BasicEngine::new()
        .compile("print hello\nlet x = [1, 2]\n$x")
        .expect("compile");

    let value = client
        .execute(&unit, &ScopeRef::default())
        .await
        .expect("execute");
    assert_eq!(value, json!([1, 2]));
    assert_eq!(*harness.recorder.out.lock().unwrap(), vec!["hello"]);
    assert_eq!(*harness.recorder.markers.lock().unwrap(), 2);

    let names = client
        .member_names("", &ScopeRef::default())
        .await
        .expect("member names");
    assert_eq!(names, vec!["x"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn script_failure_arrives_typed_and_formats_remotely() {
    let harness = start_harness().await;
    let client = DispatcherClient::connect(harness.endpoint.clone())
        .await
        .expect("connect");
    let unit = BasicEngine::new().compile("fail boom").expect("compile");

    let err = client
        .execute(&unit, &ScopeRef::default())
        .await
        .unwrap_err();
    assert_eq!(err, AppError::Script("boom".into()));

    let failure = RemoteFailure::from_error(&err).expect("remote failure");
    let text = client.format_failure(&failure).await.expect("format");
    assert!(text.ends_with("ScriptError: boom"), "{text}");
}

/// Abort is served on its own connection while `execute` is blocked.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abort_reaches_running_execution() {
    let harness = start_harness().await;
    let client = DispatcherClient::connect(harness.endpoint.clone())
        .await
        .expect("connect");
    assert!(!client.abort().await.expect("idle abort"));

    let unit = BasicEngine::new().compile("spin").expect("compile");
    let running = tokio::spawn({
        let client = client.clone();
        async move { client.execute(&unit, &ScopeRef::default()).await }
    });
    for _ in 0..200 {
        if harness.dispatcher.is_executing() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(client.abort().await.expect("abort"));
    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("execute returns")
        .expect("join");
    assert!(matches!(result, Err(AppError::Interrupted(_))), "{result:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_future_ends_server_with_success() {
    let mut harness = start_harness().await;
    harness.stop.take().expect("stop handle").send(()).expect("send");
    let code = tokio::time::timeout(Duration::from_secs(5), harness.server)
        .await
        .expect("server stops")
        .expect("join")
        .expect("serve");
    assert_eq!(code, exit_code::SUCCESS);

    let err = DispatcherClient::connect(harness.endpoint.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unreachable(_)), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn script_exit_ends_server_with_its_code() {
    let harness = start_harness().await;
    let client = DispatcherClient::connect(harness.endpoint.clone())
        .await
        .expect("connect");
    let unit = BasicEngine::new().compile("exit 4").expect("compile");
    // The reply may or may not arrive before the server stops.
    let _ = client.execute(&unit, &ScopeRef::default()).await;

    let code = tokio::time::timeout(Duration::from_secs(5), harness.server)
        .await
        .expect("server stops")
        .expect("join")
        .expect("serve");
    assert_eq!(code, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registering_a_taken_endpoint_fails() {
    let harness = start_harness().await;
    let second = spawn_dispatch_server(
        &harness.endpoint,
        Arc::clone(&harness.dispatcher),
        CancellationToken::new(),
    );
    assert!(matches!(second, Err(AppError::Ipc(_))));
}

#[tokio::test]
async fn connecting_to_unknown_endpoint_is_unreachable() {
    let endpoint = EndpointName::generate("console-host-nobody");
    let err = DispatcherClient::connect(endpoint).await.unwrap_err();
    assert!(matches!(err, AppError::Unreachable(_)), "{err}");
}

/// A request that never reaches the child produces no completion marker, so
/// the adapter must not wait for one while the child is still alive.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn undelivered_execute_returns_without_waiting_for_output() {
    let mut harness = start_harness().await;
    let client = DispatcherClient::connect(harness.endpoint.clone())
        .await
        .expect("connect");
    harness.stop.take().expect("stop handle").send(()).expect("send");
    tokio::time::timeout(Duration::from_secs(5), harness.server)
        .await
        .expect("server stops")
        .expect("join")
        .expect("serve");

    let console = Arc::new(RecordingConsole::default());
    let sync = Arc::new(OutputSync::new());
    let adapter = LocalDispatcher::new(
        client,
        Arc::clone(&sync),
        Arc::clone(&console) as Arc<dyn Console>,
    );
    let unit = BasicEngine::new().compile("print lost").expect("compile");

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        adapter.execute(&unit, &ScopeRef::default()),
    )
    .await
    .expect("execute returns without a marker");
    assert!(matches!(result, Err(AppError::Unreachable(_))), "{result:?}");
    assert!(!sync.is_closed());
    assert!(console.contains(Style::Error, "unreachable"));
}
