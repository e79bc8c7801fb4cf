use std::io::{self, Write};

use crossbeam_channel::{Receiver, Sender};
use tracing_subscriber::fmt::MakeWriter;

/// Sink for everything that should end up in a scenario's captured output:
/// relayed adapter stderr, scenario notes and, through [`MakeWriter`], tracing output.
#[derive(Clone, Debug)]
pub struct DiagnosticLog {
    sender: Sender<String>,
}

impl DiagnosticLog {
    pub fn new() -> (Self, Receiver<String>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { sender: tx }, rx)
    }

    /// Appends one line. A trailing newline is added if missing.
    pub fn line(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        let line = if text.ends_with('\n') {
            text.to_string()
        } else {
            format!("{}\n", text)
        };
        // The receiver goes away once the scenario result is finalized; late lines are dropped.
        let _ = self.sender.send(line);
    }
}

impl Write for DiagnosticLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.sender.send(String::from_utf8_lossy(buf).into_owned());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for DiagnosticLog {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Collects everything currently buffered in a log receiver.
pub fn collect(receiver: &Receiver<String>) -> String {
    receiver.try_iter().collect()
}
