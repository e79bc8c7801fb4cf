//! A scripted debug adapter for exercising DAP clients.
//!
//! `zb-dap-mock` accepts the same command lines as `zb cvm run ... --debug-dap` and
//! `zb txe <test> --debug-dap`, then walks a canned program instead of executing a
//! real circuit. Breakpoints snap to the next executable line, stepping honours call
//! depth, and nested contract calls run in their own VM index, which is enough
//! to drive every scenario of the harness without a Noir toolchain.
pub mod adapter;
pub mod breakpoints;
pub mod cli;
pub mod error;
pub mod inspect;
pub mod program;
pub mod server;
pub mod vm;

pub use adapter::{Flow, MockAdapter};
pub use cli::Cli;
pub use error::MockAdapterError;
pub use program::Program;
