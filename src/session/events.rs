//! Session event hooks

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::factory::SessionContext;

/// Callbacks fired by the protocol layer around session activity. Every
/// method defaults to doing nothing.
pub trait SessionEventListener: Send + Sync {
    fn initialized(&self, _session: &SessionContext, _version: u32) {}

    fn destroying(&self, _session: &SessionContext) {}

    /// A read finished; `result` is the byte count or the failure
    fn read(
        &self,
        _session: &SessionContext,
        _path: &str,
        _offset: u64,
        _result: std::result::Result<usize, &Error>,
    ) {
    }

    /// A write finished; `result` is the byte count or the failure
    fn written(
        &self,
        _session: &SessionContext,
        _path: &str,
        _offset: u64,
        _result: std::result::Result<usize, &Error>,
    ) {
    }
}

/// Listener that records events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventListener;

impl SessionEventListener for LoggingEventListener {
    fn initialized(&self, session: &SessionContext, version: u32) {
        info!(
            "Session {} for {} connected (protocol version {}, from {})",
            session.session_id,
            session.username,
            version,
            session.remote_address.as_deref().unwrap_or("unknown")
        );
    }

    fn destroying(&self, session: &SessionContext) {
        info!("Session {} for {} disconnected", session.session_id, session.username);
    }

    fn read(
        &self,
        session: &SessionContext,
        path: &str,
        offset: u64,
        result: std::result::Result<usize, &Error>,
    ) {
        match result {
            Ok(len) => debug!("{} read {} at offset {} ({} bytes)", session.username, path, offset, len),
            Err(e) => warn!("{} failed to read {} at offset {}: {}", session.username, path, offset, e),
        }
    }

    fn written(
        &self,
        session: &SessionContext,
        path: &str,
        offset: u64,
        result: std::result::Result<usize, &Error>,
    ) {
        match result {
            Ok(len) => debug!("{} wrote {} at offset {} ({} bytes)", session.username, path, offset, len),
            Err(e) => warn!("{} failed to write {} at offset {}: {}", session.username, path, offset, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Listener that keeps a transcript
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl SessionEventListener for Recorder {
        fn initialized(&self, session: &SessionContext, version: u32) {
            self.events
                .lock()
                .unwrap()
                .push(format!("init {} v{}", session.username, version));
        }

        fn written(
            &self,
            _session: &SessionContext,
            path: &str,
            offset: u64,
            result: std::result::Result<usize, &Error>,
        ) {
            let line = match result {
                Ok(len) => format!("write {}@{} {}", path, offset, len),
                Err(_) => format!("write {}@{} failed", path, offset),
            };
            self.events.lock().unwrap().push(line);
        }
    }

    #[test]
    fn test_default_methods_are_noops() {
        let recorder = Recorder::default();
        let session = SessionContext::new("dave");
        let listeners: Vec<Box<dyn SessionEventListener>> =
            vec![Box::new(LoggingEventListener), Box::new(Recorder::default())];

        for listener in &listeners {
            listener.initialized(&session, 3);
            listener.read(&session, "/a", 0, Ok(10));
            listener.destroying(&session);
        }

        recorder.initialized(&session, 3);
        recorder.read(&session, "/a", 0, Ok(10));
        recorder.written(&session, "/a", 4, Ok(2));
        recorder.written(&session, "/b", 0, Err(&Error::ChannelClosed));

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["init dave v3", "write /a@4 2", "write /b@0 failed"]
        );
    }
}
