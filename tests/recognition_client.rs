//! Recognition client lifecycle against a scripted transport.
//!
//! Runs on a paused tokio clock so reconnect delays elapse instantly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{self, BoxFuture};
use tokio::runtime::Handle;

use air_guitar::config::RecognitionConfig;
use air_guitar::error::{RecognitionError, WireErrorCode};
use air_guitar::landmarks::{Handedness, POSE_VECTOR_LEN};
use air_guitar::recognition::protocol::InferenceErrorMessage;
use air_guitar::recognition::{
    ConnectionState, InferenceRequest, InferenceResultMessage, PoseRequest, ReconnectBackoff,
    RecognitionClient, RecognitionHandle, RecognitionSnapshot, RecognizerTransport,
    ServerMessage,
};

#[derive(Default)]
struct ScriptState {
    connect_failures: u32,
    connects: u32,
    responses: VecDeque<Result<ServerMessage, RecognitionError>>,
    requests: Vec<InferenceRequest>,
}

#[derive(Clone, Default)]
struct Script(Arc<Mutex<ScriptState>>);

impl Script {
    fn failing_connects(self, count: u32) -> Self {
        self.0.lock().unwrap().connect_failures = count;
        self
    }

    fn respond(&self, response: Result<ServerMessage, RecognitionError>) {
        self.0.lock().unwrap().responses.push_back(response);
    }

    fn connects(&self) -> u32 {
        self.0.lock().unwrap().connects
    }

    fn requests(&self) -> Vec<InferenceRequest> {
        self.0.lock().unwrap().requests.clone()
    }

    fn transport(&self) -> Box<dyn RecognizerTransport> {
        Box::new(ScriptedTransport {
            script: self.clone(),
        })
    }
}

struct ScriptedTransport {
    script: Script,
}

impl RecognizerTransport for ScriptedTransport {
    fn connect(&mut self) -> BoxFuture<'_, Result<(), RecognitionError>> {
        let mut state = self.script.0.lock().unwrap();
        state.connects += 1;
        let outcome = if state.connect_failures > 0 {
            state.connect_failures -= 1;
            Err(RecognitionError::TransportFailure {
                reason: "connection refused".to_string(),
            })
        } else {
            Ok(())
        };
        Box::pin(future::ready(outcome))
    }

    fn request<'a>(
        &'a mut self,
        request: &'a InferenceRequest,
    ) -> BoxFuture<'a, Result<ServerMessage, RecognitionError>> {
        let mut state = self.script.0.lock().unwrap();
        state.requests.push(request.clone());
        let response = state
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(result_message("A_Minor", 0.9)));
        Box::pin(future::ready(response))
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(future::ready(()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn result_message(chord_id: &str, confidence: f32) -> ServerMessage {
    ServerMessage::InferenceResult(InferenceResultMessage {
        timestamp: 0.0,
        chord_id: chord_id.to_string(),
        confidence,
        fingering_map: vec![0, 0, 2, 2, 1, 0],
        correction_active: true,
        override_notes: None,
        message: None,
    })
}

fn config() -> RecognitionConfig {
    RecognitionConfig {
        publish_interval_ms: 0.0,
        offline_probe_interval_ms: 1_000,
        ..RecognitionConfig::default()
    }
}

fn spawn(script: &Script) -> RecognitionHandle {
    let backoff = ReconnectBackoff::new(10, 40, 3, 0.0);
    let (handle, _task) =
        RecognitionClient::spawn_with_backoff(&Handle::current(), &config(), script.transport(), backoff);
    handle
}

fn pose(frame_id: u64, timestamp_ms: f64) -> PoseRequest {
    PoseRequest {
        frame_id,
        timestamp_ms,
        hand: Handedness::Left,
        values: [0.1; POSE_VECTOR_LEN],
    }
}

async fn wait_for(
    handle: &RecognitionHandle,
    mut predicate: impl FnMut(&RecognitionSnapshot) -> bool,
) -> Arc<RecognitionSnapshot> {
    let mut rx = handle.subscribe();
    let snapshot = tokio::time::timeout(
        Duration::from_secs(120),
        rx.wait_for(|snapshot| predicate(snapshot)),
    )
    .await
    .expect("snapshot condition not reached")
    .expect("client stopped");
    Arc::clone(&snapshot)
}

#[tokio::test(start_paused = true)]
async fn result_is_stamped_with_request_frame_time() {
    let script = Script::default();
    let handle = spawn(&script);
    wait_for(&handle, |s| s.state == ConnectionState::Connected).await;

    handle.publish(pose(7, 1234.0));
    let snapshot = wait_for(&handle, |s| s.result.is_some()).await;

    let result = snapshot.result.as_ref().unwrap();
    assert_eq!(result.chord_id, "A_Minor");
    assert_eq!(result.timestamp_ms, 1234.0);
    assert_eq!(snapshot.requests_sent, 1);
    assert_eq!(snapshot.results_received, 1);

    let requests = script.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].timestamp, 1234);
    assert_eq!(requests[0].meta.as_ref().unwrap().frame_id, 7);
}

#[tokio::test(start_paused = true)]
async fn error_response_keeps_previous_result() {
    let script = Script::default();
    script.respond(Ok(result_message("G_Major", 0.95)));
    script.respond(Ok(ServerMessage::InferenceError(InferenceErrorMessage {
        code: WireErrorCode::LowConfidence,
        message: "Low confidence".to_string(),
    })));
    let handle = spawn(&script);

    handle.publish(pose(1, 100.0));
    wait_for(&handle, |s| s.results_received == 1).await;
    handle.publish(pose(2, 300.0));
    let snapshot = wait_for(&handle, |s| s.last_error.is_some()).await;

    assert_eq!(snapshot.result.as_ref().unwrap().chord_id, "G_Major");
    assert_eq!(snapshot.result.as_ref().unwrap().timestamp_ms, 100.0);
    assert!(matches!(
        snapshot.last_error,
        Some(RecognitionError::LowConfidence { .. })
    ));
    assert_eq!(snapshot.state, ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn malformed_result_is_discarded() {
    let script = Script::default();
    script.respond(Ok(result_message("E_Minor", 1.7)));
    let handle = spawn(&script);

    handle.publish(pose(1, 100.0));
    let snapshot = wait_for(&handle, |s| s.last_error.is_some()).await;

    assert!(snapshot.result.is_none());
    assert!(matches!(
        snapshot.last_error,
        Some(RecognitionError::MalformedResponse { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn unreachable_recognizer_goes_offline() {
    let script = Script::default().failing_connects(u32::MAX);
    let handle = spawn(&script);

    let snapshot = wait_for(&handle, |s| s.state == ConnectionState::Offline).await;

    // One initial attempt plus three scheduled retries.
    assert_eq!(script.connects(), 4);
    assert!(snapshot.result.is_none());
    assert!(snapshot.usable_result(0.0, 500.0).is_none());
    assert!(matches!(
        snapshot.last_error,
        Some(RecognitionError::TransportFailure { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn offline_probe_reconnects() {
    let script = Script::default().failing_connects(4);
    let handle = spawn(&script);

    wait_for(&handle, |s| s.state == ConnectionState::Offline).await;
    wait_for(&handle, |s| s.state == ConnectionState::Connected).await;
    assert_eq!(script.connects(), 5);

    handle.publish(pose(3, 2000.0));
    let snapshot = wait_for(&handle, |s| s.result.is_some()).await;
    assert_eq!(snapshot.result.as_ref().unwrap().timestamp_ms, 2000.0);
}

#[tokio::test(start_paused = true)]
async fn lost_connection_reconnects() {
    let script = Script::default();
    script.respond(Err(RecognitionError::TransportFailure {
        reason: "reset by peer".to_string(),
    }));
    let handle = spawn(&script);

    handle.publish(pose(1, 100.0));
    wait_for(&handle, |s| s.last_error.is_some()).await;
    wait_for(&handle, |s| s.state == ConnectionState::Connected).await;

    handle.publish(pose(2, 200.0));
    let snapshot = wait_for(&handle, |s| s.results_received == 1).await;
    assert_eq!(script.connects(), 2);
    assert_eq!(snapshot.result.as_ref().unwrap().timestamp_ms, 200.0);
}
