use std::io::{BufWriter, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::codec;
use crate::diagnostics::DiagnosticLog;
use crate::error::{ClientError, Result};
use crate::inbox::Inbox;
use crate::message::{Event, Message, Request, Response};
use crate::process::{AdapterProcess, DEFAULT_GRACE_PERIOD, ExitReport, KillSwitch, LaunchConfig};
use crate::reader;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

const READER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One DAP conversation with a debug adapter.
///
/// Requests are written from the calling thread. Everything the adapter sends is
/// decoded by a background reader into the session's [`Inbox`], where the `wait_*`
/// methods pick out what they need without disturbing the rest.
pub struct Session {
    label: String,
    writer: Option<Box<dyn Write + Send>>,
    next_seq: i64,
    inbox: Inbox,
    alive: Arc<AtomicBool>,
    readers: Vec<JoinHandle<()>>,
    process: Option<AdapterProcess>,
    grace_period: Duration,
    log: DiagnosticLog,
    default_timeout: Duration,
    /// A write to the adapter failed; it is most likely gone.
    hung_up: bool,
    exit: Option<ExitReport>,
}

impl Session {
    /// Spawns the adapter described by `launch` and connects to its stdio.
    pub fn spawn(launch: &LaunchConfig, log: DiagnosticLog) -> Result<Self> {
        let (process, pipes) = AdapterProcess::spawn(launch)?;
        let (tx, inbox) = Inbox::channel();
        let mut session = Self {
            label: launch.label.clone(),
            writer: Some(Box::new(BufWriter::new(pipes.stdin))),
            next_seq: 1,
            inbox,
            alive: Arc::new(AtomicBool::new(true)),
            readers: Vec::with_capacity(2),
            process: Some(process),
            grace_period: launch.grace_period,
            log,
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
            hung_up: false,
            exit: None,
        };

        // On error the session is dropped here, which terminates the process.
        session.readers.push(reader::spawn_transport_reader(
            &session.label,
            pipes.stdout,
            tx,
            Arc::clone(&session.alive),
        )?);
        session
            .readers
            .push(reader::spawn_diagnostic_reader(&session.label, pipes.stderr, session.log.clone())?);

        Ok(session)
    }

    /// Connects to an adapter over arbitrary byte streams instead of a subprocess.
    ///
    /// `stdout` and `stderr` should reach end of stream once `stdin` is dropped;
    /// `shutdown` detaches readers that are still blocked after the grace period.
    pub fn from_streams<W, R>(
        label: &str,
        stdin: W,
        stdout: R,
        stderr: Option<Box<dyn Read + Send>>,
        log: DiagnosticLog,
    ) -> Result<Self>
    where
        W: Write + Send + 'static,
        R: Read + Send + 'static,
    {
        let (tx, inbox) = Inbox::channel();
        let alive = Arc::new(AtomicBool::new(true));
        let mut readers = vec![reader::spawn_transport_reader(label, stdout, tx, Arc::clone(&alive))?];
        if let Some(stderr) = stderr {
            readers.push(reader::spawn_diagnostic_reader(label, stderr, log.clone())?);
        }

        Ok(Self {
            label: label.to_string(),
            writer: Some(Box::new(stdin)),
            next_seq: 1,
            inbox,
            alive,
            readers,
            process: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            log,
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
            hung_up: false,
            exit: None,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn set_default_timeout(&mut self, timeout: Duration) {
        self.default_timeout = timeout;
    }

    /// True until `shutdown` has been called.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// True once the adapter's output ended and a wait has seen every message it sent.
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }

    /// Handle that kills the adapter from another thread. `None` without a subprocess.
    pub fn kill_switch(&self) -> Option<KillSwitch> {
        self.process.as_ref().map(AdapterProcess::kill_switch)
    }

    /// Appends a line to the captured diagnostic text.
    pub fn note(&self, text: impl AsRef<str>) {
        self.log.line(text);
    }

    /// Sends a request without waiting for its response.
    ///
    /// The sequence number is consumed even if writing fails.
    pub fn send_request(&mut self, command: &str, arguments: Option<Value>) -> Result<i64> {
        let seq = self.next_seq;
        self.next_seq += 1;

        let writer = self.writer.as_mut().ok_or(ClientError::Closed)?;
        debug!(session = %self.label, seq, command, "Sending request");
        if let Err(e) = codec::write_message(writer, &Message::Request(Request::new(seq, command, arguments))) {
            self.hung_up = true;
            return Err(e);
        }
        Ok(seq)
    }

    /// Removes and returns the oldest response to request `seq`.
    pub fn wait_for_response(&mut self, seq: i64, timeout: Duration) -> Option<Response> {
        let response = self
            .inbox
            .take_first(|message| message.is_response_to(seq), timeout)
            .and_then(Message::into_response);
        match &response {
            Some(response) => debug!(
                session = %self.label,
                seq,
                command = %response.command,
                success = response.success,
                "Received response"
            ),
            None => debug!(session = %self.label, seq, closed = self.inbox.is_closed(), "No response"),
        }
        response
    }

    /// Removes and returns the oldest event called `name`.
    pub fn wait_for_event(&mut self, name: &str, timeout: Duration) -> Option<Event> {
        let event = self
            .inbox
            .take_first(|message| message.is_event(name), timeout)
            .and_then(Message::into_event);
        match &event {
            Some(event) => debug!(session = %self.label, event = name, seq = event.seq, "Received event"),
            None => debug!(session = %self.label, event = name, closed = self.inbox.is_closed(), "No event"),
        }
        event
    }

    /// Takes every buffered message plus whatever arrives within `timeout`.
    pub fn drain(&mut self, timeout: Duration) -> Vec<Message> {
        let messages = self.inbox.drain(timeout);
        debug!(session = %self.label, count = messages.len(), "Drained messages");
        messages
    }

    /// Sends a request and waits up to the default timeout for its response.
    pub fn request(&mut self, command: &str, arguments: Option<Value>) -> Result<Response> {
        let seq = self.send_request(command, arguments)?;
        match self.wait_for_response(seq, self.default_timeout) {
            Some(response) => Ok(response),
            None if self.inbox.is_closed() => Err(ClientError::Closed),
            None => Err(ClientError::Timeout {
                command: command.to_string(),
                seq,
            }),
        }
    }

    /// Like [`Session::request`], but a response with `success: false` is an error too.
    pub fn request_ok(&mut self, command: &str, arguments: Option<Value>) -> Result<Response> {
        let response = self.request(command, arguments)?;
        if response.success {
            Ok(response)
        } else {
            Err(ClientError::RequestFailed {
                command: command.to_string(),
                message: response.message.unwrap_or_else(|| "no message".to_string()),
            })
        }
    }

    /// Stops the readers and the adapter. Calling it again returns the first report.
    pub fn shutdown(&mut self) -> ExitReport {
        if let Some(report) = self.exit {
            return report;
        }

        self.alive.store(false, Ordering::Release);
        let report = match &self.process {
            Some(process) => {
                // An adapter that closed its end may still be exiting; let it finish first.
                let hung_up = self.hung_up
                    || self.inbox.is_closed()
                    || self.readers.first().is_some_and(JoinHandle::is_finished);
                if hung_up {
                    process.wait_for_exit(self.grace_period);
                }
                process.terminate(self.grace_period)
            }
            None => ExitReport::detached(),
        };
        drop(self.writer.take());

        self.join_readers();

        info!(session = %self.label, exit = %report, "Session shut down");
        self.exit = Some(report);
        report
    }

    /// Joins the readers that finish within the grace period and detaches the rest.
    ///
    /// A reader stays blocked for as long as anything holds the other end of its
    /// pipe open, e.g. a grandchild the adapter left behind.
    fn join_readers(&mut self) {
        let deadline = Instant::now().checked_add(self.grace_period);
        while !self.readers.iter().all(JoinHandle::is_finished)
            && deadline.is_none_or(|deadline| Instant::now() < deadline)
        {
            thread::sleep(READER_POLL_INTERVAL);
        }

        for handle in self.readers.drain(..) {
            if !handle.is_finished() {
                let name = handle.thread().name().unwrap_or("reader").to_string();
                warn!(session = %self.label, thread = %name, "Reader still blocked after shutdown, detaching it");
                continue;
            }
            if handle.join().is_err() {
                warn!(session = %self.label, "Reader thread panicked");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};
    use std::sync::Mutex;
    use std::time::Instant;

    use serde_json::json;

    use super::*;
    use crate::codec::{decode, encode};
    use crate::diagnostics;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn messages(&self) -> Vec<Message> {
            let bytes = self.0.lock().unwrap().clone();
            let mut reader = Cursor::new(bytes);
            let mut messages = Vec::new();
            while let Some(message) = decode(&mut reader).unwrap() {
                messages.push(message);
            }
            messages
        }
    }

    fn frames(messages: &[Message]) -> Cursor<Vec<u8>> {
        Cursor::new(messages.iter().flat_map(|m| encode(m).unwrap()).collect())
    }

    fn event(seq: i64, name: &str) -> Message {
        Message::Event(Event {
            seq,
            name: name.to_string(),
            body: None,
        })
    }

    fn response(seq: i64, request_seq: i64, command: &str, success: bool) -> Message {
        Message::Response(Response {
            seq,
            request_seq,
            command: command.to_string(),
            success,
            message: (!success).then(|| "not stopped".to_string()),
            body: None,
        })
    }

    fn session(stdout: Cursor<Vec<u8>>) -> (Session, SharedBuf) {
        let stdin = SharedBuf::default();
        let (log, _rx) = DiagnosticLog::new();
        let session = Session::from_streams("test", stdin.clone(), stdout, None, log).unwrap();
        (session, stdin)
    }

    #[test]
    fn test_sequence_numbers_start_at_one_and_increase() {
        let (mut session, stdin) = session(frames(&[]));

        let seqs: Vec<i64> = (0..5)
            .map(|_| session.send_request("threads", None).unwrap())
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);

        let written: Vec<i64> = stdin.messages().iter().map(Message::seq).collect();
        assert_eq!(written, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_send_request_writes_arguments() {
        let (mut session, stdin) = session(frames(&[]));
        session
            .send_request("initialize", Some(json!({"clientID": "test"})))
            .unwrap();

        assert_eq!(
            stdin.messages(),
            vec![Message::Request(Request::new(1, "initialize", Some(json!({"clientID": "test"}))))]
        );
    }

    #[test]
    fn test_wait_for_event_leaves_other_messages_in_order() {
        let (mut session, _) = session(frames(&[event(1, "B"), event(2, "A"), event(3, "D")]));

        assert_eq!(session.wait_for_event("A", Duration::from_secs(1)).unwrap().seq, 2);
        assert_eq!(session.wait_for_event("B", Duration::from_secs(1)).unwrap().seq, 1);
        assert!(session.wait_for_event("C", Duration::from_millis(200)).is_none());
        assert_eq!(session.drain(Duration::from_millis(50)), vec![event(3, "D")]);
    }

    #[test]
    fn test_wait_for_response_matches_request_seq() {
        let (mut session, _) = session(frames(&[
            event(1, "output"),
            response(2, 2, "stackTrace", true),
            response(3, 1, "threads", true),
        ]));
        let first = session.send_request("threads", None).unwrap();
        let second = session.send_request("stackTrace", None).unwrap();

        assert_eq!(session.wait_for_response(first, Duration::from_secs(1)).unwrap().command, "threads");
        assert_eq!(session.wait_for_response(second, Duration::from_secs(1)).unwrap().command, "stackTrace");
        assert!(session.wait_for_response(first, Duration::from_millis(50)).is_none());
        assert_eq!(session.drain(Duration::ZERO), vec![event(1, "output")]);
    }

    #[test]
    fn test_request_ok_reports_failure_message() {
        let (mut session, _) = session(frames(&[response(1, 1, "evaluate", false)]));

        match session.request_ok("evaluate", None) {
            Err(ClientError::RequestFailed { command, message }) => {
                assert_eq!(command, "evaluate");
                assert_eq!(message, "not stopped");
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.seq)),
        }
    }

    #[test]
    fn test_request_on_closed_stream_fails_fast() {
        let (mut session, _) = session(frames(&[]));

        let started = Instant::now();
        assert!(matches!(session.request("threads", None), Err(ClientError::Closed)));
        assert!(started.elapsed() < session.default_timeout());
    }

    #[test]
    fn test_shutdown_is_idempotent_and_closes_writer() {
        let (mut session, _) = session(frames(&[event(1, "initialized")]));

        let first = session.shutdown();
        assert_eq!(first, ExitReport::detached());
        assert!(!session.is_alive());
        assert_eq!(session.shutdown(), first);
        assert!(matches!(session.send_request("threads", None), Err(ClientError::Closed)));
    }

    #[test]
    fn test_note_and_stderr_share_the_log() {
        let (log, rx) = DiagnosticLog::new();
        let stderr: Box<dyn Read + Send> = Box::new(Cursor::new(b"vm ready\n".to_vec()));
        let mut session = Session::from_streams("cvm", SharedBuf::default(), frames(&[]), Some(stderr), log).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "[cvm] vm ready\n");
        session.shutdown();
        session.note("scenario finished");
        assert_eq!(diagnostics::collect(&rx), "scenario finished\n");
    }

    #[test]
    fn test_stream_session_has_no_kill_switch() {
        let (session, _) = session(frames(&[]));
        assert!(session.kill_switch().is_none());
        assert_eq!(session.label(), "test");
    }
}
