use crate::core::settings::NotificationSettings;
use anyhow::Result;
use notify_rust::Notification;

/// Receives the extracted status whenever it changes.
pub trait StatusSink: Send + Sync {
    fn status_changed(&self, status: &str);
}

pub struct LogSink;

impl StatusSink for LogSink {
    fn status_changed(&self, status: &str) {
        tracing::info!(status, "Status changed");
    }
}

pub struct DesktopSink {
    app_name: String,
}

impl DesktopSink {
    pub fn new(settings: &NotificationSettings) -> Self {
        Self {
            app_name: settings.app_name.clone(),
        }
    }

    fn send(&self, status: &str) -> Result<()> {
        Notification::new()
            .summary("Status changed")
            .body(&format!("New status: {status}"))
            .appname(&self.app_name)
            .timeout(notify_rust::Timeout::Milliseconds(5000))
            .show()?;

        tracing::debug!(status, "Sent desktop notification");
        Ok(())
    }
}

impl StatusSink for DesktopSink {
    fn status_changed(&self, status: &str) {
        if let Err(e) = self.send(status) {
            tracing::warn!(error = %e, "Failed to show desktop notification");
        }
    }
}

/// Fans a status change out to every inner sink.
pub struct MultiSink {
    sinks: Vec<Box<dyn StatusSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn StatusSink>>) -> Self {
        Self { sinks }
    }
}

impl StatusSink for MultiSink {
    fn status_changed(&self, status: &str) {
        for sink in &self.sinks {
            sink.status_changed(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl StatusSink for Recorder {
        fn status_changed(&self, status: &str) {
            self.0.lock().unwrap().push(status.to_string());
        }
    }

    #[test]
    fn test_multi_sink_fans_out() {
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        let sink = MultiSink::new(vec![
            Box::new(Recorder(Arc::clone(&first))),
            Box::new(LogSink),
            Box::new(Recorder(Arc::clone(&second))),
        ]);

        sink.status_changed("running");

        assert_eq!(*first.lock().unwrap(), vec!["running".to_string()]);
        assert_eq!(*second.lock().unwrap(), vec!["running".to_string()]);
    }
}
