//! LogHandler - logs payload summaries via tracing

use contracts::{Flow, Handler};
use tracing::{debug, info};

/// Handler that logs every payload it sees, for debugging
pub struct LogHandler {
    name: String,
    flow: Flow,
    /// Bytes of the payload rendered in hex (0 = none)
    preview_len: usize,
}

impl LogHandler {
    /// Create a new LogHandler with the given name; it never propagates
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flow: Flow::Stop,
            preview_len: 8,
        }
    }

    /// Verdict returned after logging
    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flow = flow;
        self
    }

    pub fn with_preview_len(mut self, bytes: usize) -> Self {
        self.preview_len = bytes;
        self
    }

    fn preview(&self, payload: &[u8]) -> String {
        let shown = &payload[..payload.len().min(self.preview_len)];
        let mut hex: String = shown.iter().map(|b| format!("{b:02x}")).collect();
        if payload.len() > shown.len() {
            hex.push_str("..");
        }
        hex
    }
}

impl Handler for LogHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, payload: &[u8]) -> Flow {
        if self.preview_len == 0 {
            debug!(handler = %self.name, len = payload.len(), "Payload received");
        } else {
            info!(
                handler = %self.name,
                len = payload.len(),
                payload = %self.preview(payload),
                "Payload received"
            );
        }
        self.flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_handler_flow() {
        let handler = LogHandler::new("test_log");
        assert_eq!(handler.invoke(&[1, 2, 3]), Flow::Stop);

        let handler = LogHandler::new("relay").with_flow(Flow::Propagate);
        assert_eq!(handler.invoke(&[1, 2, 3]), Flow::Propagate);
    }

    #[test]
    fn test_log_handler_name() {
        let handler = LogHandler::new("my_logger");
        assert_eq!(handler.name(), "my_logger");
    }

    #[test]
    fn test_preview_truncates() {
        let handler = LogHandler::new("p").with_preview_len(2);
        assert_eq!(handler.preview(&[0xab, 0x01, 0xff]), "ab01..");
        assert_eq!(handler.preview(&[0x0f]), "0f");
    }
}
