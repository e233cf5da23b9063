use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two timestamps that survive restarts.
///
/// `last_query_time` is written before a request leaves the process and
/// `last_response_time` once the request has resolved, so a response time
/// older than the query time marks an iteration that never completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(
        rename = "lastAPIQueryTime",
        default,
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub last_query_time: Option<DateTime<Utc>>,
    #[serde(
        rename = "lastAPIResponseTime",
        default,
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub last_response_time: Option<DateTime<Utc>>,
}

impl PersistedState {
    pub fn is_empty(&self) -> bool {
        self.last_query_time.is_none() && self.last_response_time.is_none()
    }

    /// True when the most recent query has no matching response.
    pub fn is_in_flight(&self) -> bool {
        match (self.last_query_time, self.last_response_time) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(query), Some(response)) => response < query,
        }
    }

    pub fn record_query(&mut self, at: DateTime<Utc>) {
        self.last_query_time = Some(at);
    }

    pub fn record_response(&mut self, at: DateTime<Utc>) {
        self.last_response_time = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ms(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn test_default_state_is_empty() {
        let state = PersistedState::default();
        assert!(state.is_empty());
        assert!(!state.is_in_flight());
    }

    #[test]
    fn test_in_flight_detection() {
        let mut state = PersistedState::default();
        state.record_query(ms(10_000));
        assert!(state.is_in_flight());

        state.record_response(ms(10_500));
        assert!(!state.is_in_flight());

        state.record_query(ms(20_000));
        assert!(state.is_in_flight());
    }

    #[test]
    fn test_serializes_epoch_millis_with_fixed_field_names() {
        let state = PersistedState {
            last_query_time: Some(ms(1_700_000_000_123)),
            last_response_time: None,
        };

        let json = serde_json::to_value(state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "lastAPIQueryTime": 1_700_000_000_123_i64,
                "lastAPIResponseTime": null,
            })
        );
    }

    #[test]
    fn test_missing_fields_read_as_none() {
        let state: PersistedState = serde_json::from_str("{}").unwrap();
        assert!(state.is_empty());

        let state: PersistedState =
            serde_json::from_str(r#"{"lastAPIResponseTime": 1700000000999}"#).unwrap();
        assert_eq!(state.last_query_time, None);
        assert_eq!(state.last_response_time, Some(ms(1_700_000_000_999)));
    }

    #[test]
    fn test_rejects_non_numeric_timestamps() {
        let parsed = serde_json::from_str::<PersistedState>(r#"{"lastAPIQueryTime": "soon"}"#);
        assert!(parsed.is_err());
    }
}
