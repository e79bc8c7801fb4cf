//! Debug Adapter Protocol client for driving a debug adapter over stdio.
//!
//! A [`Session`] owns one adapter subprocess (or any pair of byte streams), writes
//! framed requests to it and collects everything it sends back in an ordered
//! [`Inbox`]. Responses and events are picked out by sequence number or name with a
//! deadline, leaving unrelated messages in place for later waits.
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use serde_json::json;
//! use zb_dap_client::{DiagnosticLog, LaunchConfig, Session};
//!
//! let (log, _captured) = DiagnosticLog::new();
//! let launch = LaunchConfig::new("./zig-out/bin/zb").args(["cvm", "run", "--debug-dap"]);
//! let mut session = Session::spawn(&launch, log).unwrap();
//!
//! let seq = session.send_request("initialize", Some(json!({"clientID": "test"}))).unwrap();
//! assert!(session.wait_for_response(seq, Duration::from_secs(2)).is_some());
//! assert!(session.wait_for_event("initialized", Duration::from_secs(2)).is_some());
//! session.shutdown();
//! ```
pub mod codec;
pub mod diagnostics;
pub mod error;
pub mod inbox;
pub mod message;
pub mod process;
pub mod reader;
pub mod session;

pub use diagnostics::DiagnosticLog;
pub use error::{ClientError, FramingError, Result};
pub use inbox::Inbox;
pub use message::{Event, Message, Request, Response};
pub use process::{AdapterProcess, ExitReport, KillSwitch, LaunchConfig};
pub use session::Session;
