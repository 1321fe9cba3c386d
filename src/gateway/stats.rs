/// Frame counters for one gateway connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    frames_sent: u64,
    frames_received: u64,
    binary_ignored: u64,
    send_failures: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_sent(&mut self) {
        self.frames_sent += 1;
    }

    pub(crate) fn record_received(&mut self) {
        self.frames_received += 1;
    }

    pub(crate) fn record_binary(&mut self) {
        self.binary_ignored += 1;
    }

    pub(crate) fn record_send_failure(&mut self) {
        self.send_failures += 1;
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn binary_ignored(&self) -> u64 {
        self.binary_ignored
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures
    }
}
