use crate::core::clock::{Clock, SystemClock};
use crate::core::schedule::{Anchor, ScheduleParams};
use crate::core::settings::Settings;
use crate::core::store::{FileStateStore, LoadOutcome};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct StatusOutput {
    state_path: String,
    storage: &'static str,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    last_query_time: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    last_response_time: Option<DateTime<Utc>>,
    in_flight: bool,
    anchor: &'static str,
    next_wait_ms: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    evaluated_at: DateTime<Utc>,
}

pub async fn run(settings: Settings, json: bool) -> Result<()> {
    let state_path = settings.state_path()?;
    let outcome = FileStateStore::read(&state_path);
    let output = build_output(
        &ScheduleParams::default(),
        state_path.display().to_string(),
        outcome,
        SystemClock.now(),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text_output(&output);
    }

    Ok(())
}

fn build_output(
    params: &ScheduleParams,
    state_path: String,
    outcome: LoadOutcome,
    now: DateTime<Utc>,
) -> StatusOutput {
    let (storage, wait) = match &outcome {
        LoadOutcome::Loaded(state) => ("ok", params.compute_wait(*state, now)),
        LoadOutcome::Absent => ("absent", Duration::ZERO),
        // A run would serve the worst-case delay before its first query.
        LoadOutcome::Corrupted => ("corrupted", params.worst_case_wait()),
    };
    let state = outcome.into_state();

    StatusOutput {
        state_path,
        storage,
        last_query_time: state.last_query_time,
        last_response_time: state.last_response_time,
        in_flight: state.is_in_flight(),
        anchor: Anchor::from_state(&state).label(),
        next_wait_ms: wait.as_millis() as u64,
        evaluated_at: now,
    }
}

fn format_wait(wait: Duration) -> String {
    let total_secs = wait.as_secs();
    if total_secs == 0 {
        return if wait.is_zero() {
            "now".to_string()
        } else {
            format!("{}ms", wait.as_millis())
        };
    }

    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn print_text_output(output: &StatusOutput) {
    println!("State file     {} ({})", output.state_path, output.storage);
    println!("Last query     {}", format_time(output.last_query_time));
    println!("Last response  {}", format_time(output.last_response_time));

    if output.in_flight {
        println!("               last query has no recorded response");
    }

    println!(
        "Next query     {} (anchor: {})",
        format_wait(Duration::from_millis(output.next_wait_ms)),
        output.anchor
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::PersistedState;
    use chrono::TimeZone;

    const T: i64 = 1_700_000_000_000;

    fn ms(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn test_format_wait() {
        assert_eq!(format_wait(Duration::ZERO), "now");
        assert_eq!(format_wait(Duration::from_millis(450)), "450ms");
        assert_eq!(format_wait(Duration::from_secs(42)), "42s");
        assert_eq!(format_wait(Duration::from_millis(200_080)), "3m 20s");
        assert_eq!(format_wait(Duration::from_secs(360)), "6m 00s");
    }

    #[test]
    fn test_output_for_completed_query() {
        let state = PersistedState {
            last_query_time: Some(ms(T)),
            last_response_time: Some(ms(T + 1_000)),
        };
        let output = build_output(
            &ScheduleParams::default(),
            "state.json".to_string(),
            LoadOutcome::Loaded(state),
            ms(T + 101_000),
        );

        assert_eq!(output.storage, "ok");
        assert_eq!(output.anchor, "response");
        assert!(!output.in_flight);
        assert_eq!(output.next_wait_ms, 200_012);
    }

    #[test]
    fn test_output_for_corrupted_storage() {
        let output = build_output(
            &ScheduleParams::default(),
            "state.json".to_string(),
            LoadOutcome::Corrupted,
            ms(T),
        );

        assert_eq!(output.storage, "corrupted");
        assert_eq!(output.anchor, "none");
        assert_eq!(output.next_wait_ms, 360_012);
        assert!(output.last_query_time.is_none());
    }

    #[test]
    fn test_json_output_shape() {
        let state = PersistedState {
            last_query_time: Some(ms(T)),
            last_response_time: None,
        };
        let output = build_output(
            &ScheduleParams::default(),
            "state.json".to_string(),
            LoadOutcome::Loaded(state),
            ms(T + 60_000),
        );

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["storage"], "ok");
        assert_eq!(json["last_query_time"], T);
        assert!(json["last_response_time"].is_null());
        assert_eq!(json["in_flight"], true);
        assert_eq!(json["anchor"], "query");
        assert_eq!(json["next_wait_ms"], 300_012);
    }
}
