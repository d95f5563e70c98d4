use crossbeam_channel::{Receiver, Sender};

/// Receives the log lines of a job, on the job's worker thread.
///
/// Implementations must not block for long: the worker does not start the next
/// batch until `on_line` returns.
pub trait LineSink: Send + Sync {
    fn on_line(&self, line: &str);
}

impl<F> LineSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_line(&self, line: &str) {
        self(line)
    }
}

/// Forwards lines into a channel so the host can drain them on its own thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<String>,
}

impl ChannelSink {
    pub fn new(tx: Sender<String>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end of an unbounded channel.
    pub fn unbounded() -> (Self, Receiver<String>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }
}

impl LineSink for ChannelSink {
    fn on_line(&self, line: &str) {
        // The host dropped its receiver: nobody is listening any more.
        let _ = self.tx.send(line.to_owned());
    }
}
