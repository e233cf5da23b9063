use crate::core::clock::Clock;
use crate::core::models::PersistedState;
use crate::core::notifications::StatusSink;
use crate::core::schedule::{Anchor, ScheduleParams};
use crate::core::settings::DEFAULT_STATUS_POINTER;
use crate::core::store::{LoadOutcome, StateStore};
use crate::providers::Transport;
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;

/// Outcome of a single iteration, consumed by [`PollLoop::run`].
#[derive(Debug)]
pub enum Step {
    Continue(Iteration),
    Stop(anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iteration {
    Responded {
        status: Option<String>,
        changed: bool,
    },
    TransportFailed,
}

pub struct PollLoop {
    target: Url,
    params: ScheduleParams,
    status_pointer: String,
    transport: Arc<dyn Transport>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn StatusSink>,
    state: PersistedState,
    last_observed_status: Option<String>,
}

impl PollLoop {
    pub fn new(
        target: Url,
        params: ScheduleParams,
        transport: Arc<dyn Transport>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            target,
            params,
            status_pointer: DEFAULT_STATUS_POINTER.to_string(),
            transport,
            store,
            clock,
            sink,
            state: PersistedState::default(),
            last_observed_status: None,
        }
    }

    pub fn with_status_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.status_pointer = pointer.into();
        self
    }

    pub fn state(&self) -> PersistedState {
        self.state
    }

    /// Loads persisted state. Corrupted storage may hide a query that was
    /// in flight, so the worst-case wait is served once before continuing.
    pub async fn start(&mut self) {
        self.last_observed_status = None;

        match self.store.load() {
            LoadOutcome::Loaded(state) => {
                tracing::info!(
                    empty = state.is_empty(),
                    last_query = ?state.last_query_time,
                    last_response = ?state.last_response_time,
                    in_flight = state.is_in_flight(),
                    "Loaded persisted state"
                );
                self.state = state;
            }
            LoadOutcome::Absent => {
                tracing::info!("No persisted state, starting fresh");
                self.state = PersistedState::default();
            }
            LoadOutcome::Corrupted => {
                let delay = self.params.worst_case_wait();
                tracing::warn!(
                    delay_ms = delay.as_millis() as u64,
                    "Persisted state is corrupted, delaying first query"
                );
                self.state = PersistedState::default();
                self.clock.sleep(delay).await;
            }
        }
    }

    /// Runs until a non-transport error occurs.
    pub async fn run(mut self) -> anyhow::Result<()> {
        self.start().await;

        loop {
            match self.step().await {
                Step::Continue(Iteration::Responded { status, changed }) => {
                    tracing::debug!(?status, changed, "Query answered");
                }
                Step::Continue(Iteration::TransportFailed) => {}
                Step::Stop(err) => {
                    tracing::error!(error = %err, "Poll loop stopped");
                    return Err(err);
                }
            }
        }
    }

    pub async fn step(&mut self) -> Step {
        let anchor = Anchor::from_state(&self.state);
        let wait = self.params.compute_wait(self.state, self.clock.now());
        tracing::debug!(
            anchor = anchor.label(),
            wait_ms = wait.as_millis() as u64,
            "Waiting before next query"
        );
        self.clock.sleep(wait).await;

        self.state.record_query(self.clock.now());
        self.store.store(self.state);
        tracing::debug!(url = %self.target, "Sending query");

        match self.transport.send(&self.target).await {
            Ok(payload) => {
                self.state.record_response(self.clock.now());
                self.store.store(self.state);

                let status = extract_status(&payload, &self.status_pointer);
                let changed = self.observe(status.as_deref());
                Step::Continue(Iteration::Responded { status, changed })
            }
            Err(e) if e.is_transport() => {
                self.state.record_response(self.clock.now());
                self.store.store(self.state);

                tracing::warn!(error = %e, "Query failed, will retry on schedule");
                Step::Continue(Iteration::TransportFailed)
            }
            Err(e) => Step::Stop(e.into_anyhow()),
        }
    }

    fn observe(&mut self, status: Option<&str>) -> bool {
        let Some(status) = status.filter(|s| !s.is_empty()) else {
            return false;
        };

        if self.last_observed_status.as_deref() == Some(status) {
            return false;
        }

        tracing::info!(
            previous = ?self.last_observed_status,
            status,
            "Observed new status"
        );
        self.sink.status_changed(status);
        self.last_observed_status = Some(status.to_string());
        true
    }
}

/// Projects the status string out of a response body.
pub fn extract_status(payload: &Value, pointer: &str) -> Option<String> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_owned)
}
