mod polling;

use crate::core::clock::SystemClock;
use crate::core::notifications::{DesktopSink, LogSink, MultiSink, StatusSink};
use crate::core::schedule::ScheduleParams;
use crate::core::settings::Settings;
use crate::core::store::FileStateStore;
use crate::providers::HttpTransport;
use anyhow::Result;
use std::sync::Arc;

pub use polling::PollLoop;

pub async fn run(settings: Settings, desktop: bool) -> Result<()> {
    settings.validate()?;
    let target = settings.target_url()?;
    let state_path = settings.state_path()?;
    let params = ScheduleParams::default();

    tracing::info!(
        url = %target,
        state_path = %state_path.display(),
        min_interval_ms = params.min_interval().as_millis() as u64,
        clock_margin_ms = params.clock_tolerance_margin().as_millis() as u64,
        effective_interval_ms = params.effective_interval().as_millis() as u64,
        max_reception_delay_ms = params.max_reception_delay().as_millis() as u64,
        "Starting poller"
    );

    let store = Arc::new(FileStateStore::open(state_path));
    let transport = Arc::new(HttpTransport::new()?);
    let sink = build_sink(&settings, desktop);

    let poll_loop = PollLoop::new(
        target,
        params,
        transport,
        store.clone(),
        Arc::new(SystemClock),
        sink,
    )
    .with_status_pointer(settings.status_pointer.clone());

    let result = tokio::select! {
        result = poll_loop.run() => result,
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal, stopping");
            Ok(())
        }
    };

    store.flush().await;
    result
}

fn build_sink(settings: &Settings, desktop: bool) -> Arc<dyn StatusSink> {
    let mut sinks: Vec<Box<dyn StatusSink>> = vec![Box::new(LogSink)];
    if desktop && settings.notifications.desktop {
        sinks.push(Box::new(DesktopSink::new(&settings.notifications)));
    }
    Arc::new(MultiSink::new(sinks))
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
