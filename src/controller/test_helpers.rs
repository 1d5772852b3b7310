//! Shared test doubles for transports, executors, confirmation policies and sinks.

use crate::config::Config;
use crate::confirmation::{ConfirmationPolicy, ConfirmationReceiver};
use crate::connection::{Connection, TransmitError, Transport, TransportFactory};
use crate::controller::BulkController;
use crate::error::{ConnectionError, OperationError};
use crate::executor::UnitExecutor;
use crate::sink::{LogSink, ProgressSink};
use crate::types::{ConfirmationKind, Event, Payload, ReadinessResult};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct TransportScript {
    refuse_connect: bool,
    not_ready: Option<String>,
    drop_on_probe: bool,
    send_failures: VecDeque<TransmitError>,
    sent: Vec<Vec<u8>>,
    open_count: usize,
    probe_count: usize,
    close_count: usize,
}

/// Test-side handle for scripting and inspecting [`ScriptedTransport`]s
#[derive(Clone, Default)]
pub(crate) struct TransportProbe {
    script: Arc<Mutex<TransportScript>>,
}

impl TransportProbe {
    pub(crate) fn fail_connect(&self) {
        self.script.lock().unwrap().refuse_connect = true;
    }

    pub(crate) fn set_not_ready(&self, message: &str) {
        self.script.lock().unwrap().not_ready = Some(message.to_string());
    }

    pub(crate) fn drop_channel_on_probe(&self) {
        self.script.lock().unwrap().drop_on_probe = true;
    }

    pub(crate) fn fail_next_send(&self, error: TransmitError) {
        self.script.lock().unwrap().send_failures.push_back(error);
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.script.lock().unwrap().sent.clone()
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.script.lock().unwrap().sent.len()
    }

    pub(crate) fn open_count(&self) -> usize {
        self.script.lock().unwrap().open_count
    }

    pub(crate) fn probe_count(&self) -> usize {
        self.script.lock().unwrap().probe_count
    }

    pub(crate) fn close_count(&self) -> usize {
        self.script.lock().unwrap().close_count
    }
}

/// In-memory transport driven by a [`TransportProbe`]
pub(crate) struct ScriptedTransport {
    probe: TransportProbe,
}

impl ScriptedTransport {
    pub(crate) fn new() -> (Self, TransportProbe) {
        let probe = TransportProbe::default();
        (Self::with_probe(probe.clone()), probe)
    }

    pub(crate) fn with_probe(probe: TransportProbe) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&mut self, address: &str) -> Result<(), ConnectionError> {
        let mut script = self.probe.script.lock().unwrap();
        script.open_count += 1;
        if script.refuse_connect {
            return Err(ConnectionError::Refused {
                address: address.to_string(),
                reason: "scripted refusal".to_string(),
            });
        }
        Ok(())
    }

    async fn probe(&mut self) -> Result<ReadinessResult, ConnectionError> {
        let mut script = self.probe.script.lock().unwrap();
        script.probe_count += 1;
        if script.drop_on_probe {
            return Err(ConnectionError::Lost {
                reason: "scripted drop".to_string(),
            });
        }
        Ok(match &script.not_ready {
            Some(message) => ReadinessResult::not_ready(message.clone()),
            None => ReadinessResult::ready(),
        })
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransmitError> {
        let mut script = self.probe.script.lock().unwrap();
        if let Some(error) = script.send_failures.pop_front() {
            return Err(error);
        }
        script.sent.push(payload.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        self.probe.script.lock().unwrap().close_count += 1;
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Hands out [`ScriptedTransport`]s that all report to one probe
#[derive(Default)]
pub(crate) struct ScriptedFactory {
    probe: TransportProbe,
    created: AtomicUsize,
}

impl ScriptedFactory {
    pub(crate) fn probe(&self) -> TransportProbe {
        self.probe.clone()
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl TransportFactory for ScriptedFactory {
    fn create(&self) -> Box<dyn Transport> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(ScriptedTransport::with_probe(self.probe.clone()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Executor that fails chosen steps and records every call
#[derive(Default)]
pub(crate) struct ScriptedExecutor {
    failing: HashSet<u32>,
    cancel_during: Option<(u32, CancellationToken)>,
    calls: Mutex<Vec<u32>>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fail `step` with a `NotSent` error
    pub(crate) fn fail_on(mut self, step: u32) -> Self {
        self.failing.insert(step);
        self
    }

    /// Fire `token` while `step` is in flight
    pub(crate) fn cancel_during(mut self, step: u32, token: CancellationToken) -> Self {
        self.cancel_during = Some((step, token));
        self
    }

    /// Steps executed so far, in call order
    pub(crate) fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl UnitExecutor for ScriptedExecutor {
    async fn execute_one(
        &self,
        conn: &mut Connection,
        step: u32,
        _payload: &Payload,
    ) -> Result<(), OperationError> {
        self.calls.lock().unwrap().push(step);
        if let Some((cancel_step, token)) = &self.cancel_during
            && *cancel_step == step
        {
            token.cancel();
        }
        if !conn.is_connected() {
            return Err(OperationError::NotConnected { step });
        }
        if self.failing.contains(&step) {
            return Err(OperationError::NotSent {
                step,
                reason: "paper jam".to_string(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Default)]
struct PolicyScript {
    answers: VecDeque<bool>,
    asked: Vec<(ConfirmationKind, String)>,
}

/// Answers confirmations from a queue (approves once the queue is empty)
#[derive(Clone, Default)]
pub(crate) struct ScriptedPolicy {
    script: Arc<Mutex<PolicyScript>>,
}

impl ScriptedPolicy {
    pub(crate) fn answering(answers: &[bool]) -> Self {
        let policy = Self::default();
        policy.script.lock().unwrap().answers = answers.iter().copied().collect();
        policy
    }

    /// Every request seen so far
    pub(crate) fn asked(&self) -> Vec<(ConfirmationKind, String)> {
        self.script.lock().unwrap().asked.clone()
    }
}

#[async_trait]
impl ConfirmationPolicy for ScriptedPolicy {
    async fn decide(&self, kind: ConfirmationKind, prompt: &str) -> bool {
        let mut script = self.script.lock().unwrap();
        script.asked.push((kind, prompt.to_string()));
        script.answers.pop_front().unwrap_or(true)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Sink that records everything it receives
#[derive(Default)]
pub(crate) struct RecordingSink {
    progress: Mutex<Vec<u32>>,
    lines: Mutex<Vec<String>>,
    clears: AtomicUsize,
}

impl RecordingSink {
    pub(crate) fn progress(&self) -> Vec<u32> {
        self.progress.lock().unwrap().clone()
    }

    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub(crate) fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl ProgressSink for RecordingSink {
    fn report_progress(&self, current: u32, _total: u32) {
        self.progress.lock().unwrap().push(current);
    }
}

impl LogSink for RecordingSink {
    fn log_event(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.lines.lock().unwrap().clear();
    }
}

/// Controller wired to scripted doubles
pub(crate) struct TestRig {
    pub(crate) controller: BulkController,
    pub(crate) receiver: Option<ConfirmationReceiver>,
    pub(crate) factory: Arc<ScriptedFactory>,
    pub(crate) executor: Arc<ScriptedExecutor>,
}

impl TestRig {
    /// Rig with no pacing delay
    pub(crate) fn new(executor: ScriptedExecutor) -> Self {
        Self::with_pacing(executor, Duration::ZERO)
    }

    pub(crate) fn with_pacing(executor: ScriptedExecutor, pacing: Duration) -> Self {
        Self::with_config(executor, |config| config.run.pacing_delay = pacing)
    }

    /// Zero pacing, then `tweak` applied to the default config
    pub(crate) fn with_config(executor: ScriptedExecutor, tweak: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::default();
        config.run.pacing_delay = Duration::ZERO;
        tweak(&mut config);

        let factory = Arc::new(ScriptedFactory::default());
        let executor = Arc::new(executor);
        let (controller, receiver) =
            BulkController::with_parts(config, factory.clone(), executor.clone()).unwrap();

        Self {
            controller,
            receiver: Some(receiver),
            factory,
            executor,
        }
    }

    /// Service confirmations with `policy` on a background task
    pub(crate) fn respond_with<P: ConfirmationPolicy + 'static>(&mut self, policy: P) {
        let receiver = self.receiver.take().unwrap();
        receiver.serve(policy);
    }

    /// Take the receiver to answer confirmations by hand
    pub(crate) fn take_receiver(&mut self) -> ConfirmationReceiver {
        self.receiver.take().unwrap()
    }

    /// A connection opened through the rig's factory
    pub(crate) async fn connection(&self) -> Connection {
        let mut conn = Connection::new(self.factory.create());
        conn.connect("printer.local").await.unwrap();
        conn
    }
}

/// Drain every event currently buffered in `events`
pub(crate) fn drain(events: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// The `current` field of every progress event, in order
pub(crate) fn progress_of(events: &[Event]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Progress { current, .. } => Some(*current),
            _ => None,
        })
        .collect()
}
