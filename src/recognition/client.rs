//! Recognition client task
//!
//! Runs on tokio, off the frame path. The frame cadence hands over the latest
//! fretting-hand pose through a `watch` channel (latest wins, never blocks)
//! and reads results back through a second `watch` carrying an immutable
//! `Arc<RecognitionSnapshot>`.
//!
//! Connection lifecycle:
//! ```text
//!   Connecting -> Connected -(lost)-> Reconnecting{1..N} -> Connected
//!                                         |
//!                                         +-(exhausted)-> Offline -(probe ok)-> Connected
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::RecognitionConfig;
use crate::error::{log_recognition_error, RecognitionError};
use crate::landmarks::PoseVector;
use crate::telemetry::{self, MetricEvent};

use super::backoff::ReconnectBackoff;
use super::protocol::{validate_vector, InferenceRequest, ServerMessage};
use super::transport::RecognizerTransport;
use super::{
    ConnectionState, PoseRequest, PublishThrottle, RecognitionSnapshot, RecognitionSource,
};

/// Frame-side handle to a running recognition client
#[derive(Debug)]
pub struct RecognitionHandle {
    pose_tx: watch::Sender<Option<PoseRequest>>,
    snapshot_rx: watch::Receiver<Arc<RecognitionSnapshot>>,
    throttle: PublishThrottle,
}

impl RecognitionHandle {
    /// Receiver for awaiting snapshot changes (presentation, tests)
    pub fn subscribe(&self) -> watch::Receiver<Arc<RecognitionSnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Hand a pose to the client, bypassing the throttle.
    pub fn publish(&self, request: PoseRequest) {
        self.pose_tx.send_replace(Some(request));
    }
}

impl RecognitionSource for RecognitionHandle {
    fn offer(&mut self, pose: &PoseVector, frame_id: u64) -> bool {
        if !self.throttle.try_acquire(pose.timestamp_ms) {
            return false;
        }
        self.publish(PoseRequest::from_pose(pose, frame_id));
        true
    }

    fn snapshot(&self) -> Arc<RecognitionSnapshot> {
        Arc::clone(&self.snapshot_rx.borrow())
    }
}

enum SessionEnd {
    /// The frame side dropped its handle
    Shutdown,
    /// The connection failed and must be re-established
    Lost(RecognitionError),
}

/// Background task owning the transport and the reconnect schedule
pub struct RecognitionClient {
    transport: Box<dyn RecognizerTransport>,
    backoff: ReconnectBackoff,
    request_timeout: Duration,
    probe_interval: Duration,
    pose_rx: watch::Receiver<Option<PoseRequest>>,
    snapshot_tx: watch::Sender<Arc<RecognitionSnapshot>>,
    current: RecognitionSnapshot,
}

impl RecognitionClient {
    /// Spawn the client on the current tokio runtime.
    pub fn spawn(
        config: &RecognitionConfig,
        transport: Box<dyn RecognizerTransport>,
    ) -> (RecognitionHandle, JoinHandle<()>) {
        Self::spawn_on(&Handle::current(), config, transport)
    }

    /// Spawn the client on `runtime`; callable from non-async code.
    pub fn spawn_on(
        runtime: &Handle,
        config: &RecognitionConfig,
        transport: Box<dyn RecognizerTransport>,
    ) -> (RecognitionHandle, JoinHandle<()>) {
        Self::spawn_with_backoff(runtime, config, transport, ReconnectBackoff::from_config(config))
    }

    pub fn spawn_with_backoff(
        runtime: &Handle,
        config: &RecognitionConfig,
        transport: Box<dyn RecognizerTransport>,
        backoff: ReconnectBackoff,
    ) -> (RecognitionHandle, JoinHandle<()>) {
        let (pose_tx, pose_rx) = watch::channel(None);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(RecognitionSnapshot::default()));

        tracing::info!(
            "[RecognitionClient] Starting with {} transport (publish every {}ms, timeout {}ms)",
            transport.name(),
            config.publish_interval_ms,
            config.request_timeout_ms
        );

        let client = RecognitionClient {
            transport,
            backoff,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            probe_interval: Duration::from_millis(config.offline_probe_interval_ms),
            pose_rx,
            snapshot_tx,
            current: RecognitionSnapshot::default(),
        };
        let task = runtime.spawn(client.run());

        let handle = RecognitionHandle {
            pose_tx,
            snapshot_rx,
            throttle: PublishThrottle::new(config.publish_interval_ms),
        };
        (handle, task)
    }

    async fn run(mut self) {
        loop {
            match self.transport.connect().await {
                Ok(()) => {
                    self.backoff.reset();
                    self.set_state(ConnectionState::Connected);
                    match self.serve().await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost(err) => {
                            log_recognition_error(&err, "RecognitionClient::serve");
                            self.record_error(err);
                        }
                    }
                }
                Err(err) => {
                    log_recognition_error(&err, "RecognitionClient::connect");
                    self.record_error(err);
                }
            }

            let delay = match self.backoff.next_delay() {
                Some(delay) => {
                    self.set_state(ConnectionState::Reconnecting {
                        attempt: self.backoff.attempt(),
                    });
                    delay
                }
                None => {
                    self.set_state(ConnectionState::Offline);
                    self.probe_interval
                }
            };

            if !self.sleep_unless_shutdown(delay).await {
                break;
            }
        }

        self.transport.close().await;
        tracing::info!("[RecognitionClient] Stopped");
    }

    /// Serve requests until the connection fails or the frame side goes away.
    async fn serve(&mut self) -> SessionEnd {
        loop {
            if self.pose_rx.changed().await.is_err() {
                return SessionEnd::Shutdown;
            }
            let Some(pose) = self.pose_rx.borrow_and_update().clone() else {
                continue;
            };

            if let Err(err) = validate_vector(&pose.values) {
                log_recognition_error(&err, "RecognitionClient::validate");
                self.record_error(err);
                continue;
            }

            let request = InferenceRequest::from_pose(&pose);
            self.current.requests_sent += 1;

            let response =
                tokio::time::timeout(self.request_timeout, self.transport.request(&request)).await;
            match response {
                Err(_) => {
                    return SessionEnd::Lost(RecognitionError::Timeout {
                        timeout_ms: self.request_timeout.as_millis() as u64,
                    })
                }
                Ok(Err(err)) if err.is_transport() => return SessionEnd::Lost(err),
                Ok(Err(err)) => {
                    log_recognition_error(&err, "RecognitionClient::request");
                    self.record_error(err);
                }
                Ok(Ok(ServerMessage::InferenceResult(body))) => {
                    match body.into_result(pose.timestamp_ms) {
                        Ok(result) => {
                            tracing::debug!(
                                "[RecognitionClient] {} ({:.2}) for frame {}",
                                result.chord_id,
                                result.confidence,
                                pose.frame_id
                            );
                            telemetry::hub().publish(MetricEvent::Recognition {
                                chord_id: result.chord_id.clone(),
                                confidence: result.confidence,
                                frame_timestamp_ms: result.timestamp_ms,
                            });
                            self.current.results_received += 1;
                            self.current.result = Some(result);
                            self.publish();
                        }
                        Err(err) => {
                            log_recognition_error(&err, "RecognitionClient::decode");
                            self.record_error(err);
                        }
                    }
                }
                Ok(Ok(ServerMessage::InferenceError(body))) => {
                    // The previous result stays in effect.
                    let err = RecognitionError::from(body);
                    log_recognition_error(&err, "RecognitionClient::response");
                    self.record_error(err);
                }
            }
        }
    }

    /// Sleep for `delay`; returns false if the frame side shut down meanwhile.
    async fn sleep_unless_shutdown(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                changed = self.pose_rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    // Poses offered while disconnected are dropped.
                    self.pose_rx.borrow_and_update();
                }
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.current.state == state {
            return;
        }
        match state {
            ConnectionState::Offline => tracing::warn!(
                "[RecognitionClient] Offline after {} attempts, probing every {:?}",
                self.backoff.attempt(),
                self.probe_interval
            ),
            ConnectionState::Connected => {
                tracing::info!("[RecognitionClient] Connected")
            }
            other => tracing::debug!("[RecognitionClient] {:?}", other),
        }
        telemetry::hub().publish(MetricEvent::Connectivity { state });
        self.current.state = state;
        self.publish();
    }

    fn record_error(&mut self, err: RecognitionError) {
        self.current.last_error = Some(err);
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(Arc::new(self.current.clone()));
    }
}
