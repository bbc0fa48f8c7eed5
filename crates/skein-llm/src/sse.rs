/// Incremental framer for `text/event-stream` bodies as chat-completions
/// endpoints emit them: `data: <json>` lines terminated by `data: [DONE]`.
/// Bytes arrive in arbitrary chunk boundaries; the framer buffers partial
/// lines across pushes.
#[derive(Debug, Default)]
pub struct SseFramer {
    buffer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim_start();
            if payload == "[DONE]" {
                events.push(SseEvent::Done);
            } else if !payload.is_empty() {
                events.push(SseEvent::Data(payload.to_string()));
            }
        }
        events
    }
}
