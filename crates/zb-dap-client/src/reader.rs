use std::io::{self, BufRead, BufReader, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use tracing::{debug, trace, warn};

use crate::codec;
use crate::diagnostics::DiagnosticLog;
use crate::message::Message;

/// Decodes frames from the adapter's stdout into the inbox until the stream ends,
/// a frame fails to decode, or the session is shut down.
pub fn spawn_transport_reader<R>(
    label: &str,
    stream: R,
    inbox: Sender<Message>,
    alive: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let label = label.to_string();
    thread::Builder::new()
        .name(format!("{}-transport", label))
        .spawn(move || {
            let mut reader = BufReader::new(stream);
            while alive.load(Ordering::Acquire) {
                match codec::decode(&mut reader) {
                    Ok(Some(message)) => {
                        trace!(session = %label, seq = message.seq(), "Received message");
                        if inbox.send(message).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!(session = %label, "Adapter stdout closed");
                        break;
                    }
                    Err(e) => {
                        if alive.load(Ordering::Acquire) {
                            warn!(session = %label, error = %e, "Stopping transport reader");
                        }
                        break;
                    }
                }
            }
        })
}

/// Relays the adapter's stderr line by line.
///
/// Reads to the end of the stream, so the adapter never blocks on a full pipe and
/// whatever it printed while going down is kept.
pub fn spawn_diagnostic_reader<R>(label: &str, stream: R, log: DiagnosticLog) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    let label = label.to_string();
    thread::Builder::new()
        .name(format!("{}-stderr", label))
        .spawn(move || {
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end();
                        debug!(target: "zb_dap::adapter", session = %label, "{}", line);
                        log.line(format!("[{}] {}", label, line));
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!(session = %label, error = %e, "Adapter stderr unreadable");
                        break;
                    }
                }
            }
        })
}
