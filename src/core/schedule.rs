use crate::core::models::PersistedState;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Minimum spacing between queries published by the provider.
pub const MIN_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Upper bound on how long after sending a query the provider may register it.
pub const MAX_RECEPTION_DELAY: Duration = Duration::from_secs(60);

/// Assumed clock-rate drift, per side, in parts per million.
const CLOCK_DRIFT_PPM: u128 = 20;

/// Timestamp the next wait is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Nothing has ever been sent.
    None,
    /// The last query completed; measure from its response.
    Response(DateTime<Utc>),
    /// The last query never completed; measure from when it was sent.
    Query(DateTime<Utc>),
}

impl Anchor {
    pub fn from_state(state: &PersistedState) -> Self {
        match (state.last_query_time, state.last_response_time) {
            (None, _) => Anchor::None,
            (Some(query), Some(response)) if response >= query => Anchor::Response(response),
            (Some(query), _) => Anchor::Query(query),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Anchor::None => "none",
            Anchor::Response(_) => "response",
            Anchor::Query(_) => "query",
        }
    }

    pub fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            Anchor::None => None,
            Anchor::Response(at) | Anchor::Query(at) => Some(*at),
        }
    }
}

/// Rate-limit parameters, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleParams {
    min_interval: Duration,
    clock_tolerance_margin: Duration,
    max_reception_delay: Duration,
}

impl ScheduleParams {
    /// Derives the clock tolerance margin from `min_interval`.
    pub fn new(min_interval: Duration, max_reception_delay: Duration) -> Self {
        Self::with_margin(
            min_interval,
            tolerance_margin(min_interval),
            max_reception_delay,
        )
    }

    pub fn with_margin(
        min_interval: Duration,
        clock_tolerance_margin: Duration,
        max_reception_delay: Duration,
    ) -> Self {
        Self {
            min_interval,
            clock_tolerance_margin,
            max_reception_delay,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn clock_tolerance_margin(&self) -> Duration {
        self.clock_tolerance_margin
    }

    pub fn max_reception_delay(&self) -> Duration {
        self.max_reception_delay
    }

    pub fn effective_interval(&self) -> Duration {
        self.min_interval + self.clock_tolerance_margin
    }

    /// Wait required when only the send time of the last query is known.
    pub fn worst_case_wait(&self) -> Duration {
        self.effective_interval() + self.max_reception_delay
    }

    pub fn required_wait(&self, anchor: &Anchor) -> Duration {
        match anchor {
            Anchor::None => Duration::ZERO,
            Anchor::Response(_) => self.effective_interval(),
            Anchor::Query(_) => self.worst_case_wait(),
        }
    }

    /// How long to sleep at `now` before the next query may be sent.
    pub fn compute_wait(&self, state: PersistedState, now: DateTime<Utc>) -> Duration {
        let anchor = Anchor::from_state(&state);
        let Some(at) = anchor.at() else {
            return Duration::ZERO;
        };

        remaining(self.required_wait(&anchor), now.signed_duration_since(at))
    }
}

impl Default for ScheduleParams {
    fn default() -> Self {
        Self::new(MIN_INTERVAL, MAX_RECEPTION_DELAY)
    }
}

/// Both clocks may drift in opposite directions, rounded up to whole ms.
fn tolerance_margin(interval: Duration) -> Duration {
    let scaled = interval.as_nanos() * (2 * CLOCK_DRIFT_PPM);
    let millis = scaled.div_ceil(1_000_000 * 1_000_000);
    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}

fn remaining(required: Duration, elapsed: TimeDelta) -> Duration {
    let Ok(required_delta) = TimeDelta::from_std(required) else {
        return required;
    };

    match required_delta.checked_sub(&elapsed) {
        Some(left) => left.to_std().unwrap_or(Duration::ZERO),
        None => required,
    }
}
