use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::message::Message;

/// How long `drain` keeps listening after the last message before giving up early.
pub const DRAIN_QUIET_PERIOD: Duration = Duration::from_millis(100);

/// Ordered buffer of decoded messages that have not been consumed yet.
///
/// The transport reader feeds the channel; only the owning session reads from it.
/// Messages that were looked at but did not match sit in `pending`, and every
/// message in `pending` arrived before every message still in the channel.
/// Scanning `pending` first and then pulling from the channel therefore visits
/// messages strictly in arrival order, and a message that is skipped keeps its
/// position for later waits.
#[derive(Debug)]
pub struct Inbox {
    incoming: Receiver<Message>,
    pending: VecDeque<Message>,
    closed: bool,
}

impl Inbox {
    /// Creates an inbox and the sender the transport reader pushes into.
    pub fn channel() -> (Sender<Message>, Inbox) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            tx,
            Inbox {
                incoming: rx,
                pending: VecDeque::new(),
                closed: false,
            },
        )
    }

    /// Removes and returns the oldest message accepted by `matches`.
    ///
    /// Blocks until a match arrives or the deadline passes. Returns early once the
    /// sending side is gone and nothing buffered matches.
    pub fn take_first<F>(&mut self, mut matches: F, timeout: Duration) -> Option<Message>
    where
        F: FnMut(&Message) -> bool,
    {
        if let Some(index) = self.pending.iter().position(&mut matches) {
            return self.pending.remove(index);
        }

        loop {
            match self.incoming.try_recv() {
                Ok(message) if matches(&message) => return Some(message),
                Ok(message) => self.pending.push_back(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    return None;
                }
            }
        }

        // A timeout too large to represent as an instant means wait without a deadline.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let received = match deadline {
                Some(deadline) => self.incoming.recv_deadline(deadline),
                None => self.incoming.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(message) if matches(&message) => return Some(message),
                Ok(message) => self.pending.push_back(message),
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    /// Removes and returns every buffered message plus whatever arrives within `timeout`.
    ///
    /// Stops early after [`DRAIN_QUIET_PERIOD`] without a new message.
    pub fn drain(&mut self, timeout: Duration) -> Vec<Message> {
        let deadline = Instant::now().checked_add(timeout);
        let mut messages: Vec<Message> = self.pending.drain(..).collect();
        messages.extend(self.incoming.try_iter());

        loop {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => DRAIN_QUIET_PERIOD,
            };
            if remaining.is_zero() {
                break;
            }
            match self.incoming.recv_timeout(remaining.min(DRAIN_QUIET_PERIOD)) {
                Ok(message) => messages.push(message),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }

        messages
    }

    /// Number of messages buffered right now, whether or not they were looked at.
    pub fn len(&self) -> usize {
        self.pending.len() + self.incoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True once the transport reader has stopped and nothing more will arrive.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
