use std::io::{Read, Write};
use std::path::PathBuf;

use dap::events::{BreakpointEventBody, OutputEventBody, StoppedEventBody, TerminatedEventBody};
use dap::prelude::*;
use dap::responses::{
    ContinueResponse, ScopesResponse, SetBreakpointsResponse, SetExceptionBreakpointsResponse,
    StackTraceResponse, ThreadsResponse, VariablesResponse,
};
use dap::types::{Breakpoint, BreakpointEventReason, Source, StackFrame, StoppedEventReason, Thread};
use serde_json::Value;
use tracing::{debug, info};

use crate::breakpoints::{BreakpointState, BreakpointTable};
use crate::error::Result;
use crate::inspect;
use crate::program::Program;
use crate::vm::{Outcome, Resume, StopReason, Vm};

pub const THREAD_ID: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

pub struct MockAdapter {
    vm: Vm,
    breakpoints: BreakpointTable,
    /// Directory the program's source path is resolved against.
    source_root: PathBuf,
}

impl MockAdapter {
    pub fn new(program: Program, source_root: PathBuf) -> Self {
        Self {
            vm: Vm::new(program),
            breakpoints: BreakpointTable::default(),
            source_root,
        }
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// Answers one request. Anything the simulated VM does as a result follows as events.
    pub fn handle_request<R: Read, W: Write>(&mut self, req: Request, server: &mut Server<R, W>) -> Result<Flow> {
        match &req.command {
            Command::Initialize(args) => {
                debug!(client = ?args.client_id, "Received Initialize request");
                let capabilities = types::Capabilities {
                    supports_configuration_done_request: Some(true),
                    supports_terminate_request: Some(true),
                    ..Default::default()
                };
                server.respond(req.success(ResponseBody::Initialize(capabilities)))?;
                server.send_event(Event::Initialized)?;
            }
            Command::Launch(_) => {
                debug!("Received Launch request");
                server.respond(req.success(ResponseBody::Launch))?;
                let program = self.vm.program();
                let output = format!("Loaded {} ({} steps)\n", program.name, program.steps.len());
                self.send_output(server, output)?;
            }
            Command::SetBreakpoints(args) => {
                let source = source_key(&args.source).to_string();
                let lines: Vec<i64> = args.breakpoints.iter().flatten().map(|bp| bp.line).collect();
                debug!(%source, ?lines, "Received SetBreakpoints request");

                let states = self
                    .breakpoints
                    .set(self.vm.program(), &source, &lines, self.vm.has_started());
                let breakpoints = states.iter().map(to_dap).collect();
                server.respond(req.success(ResponseBody::SetBreakpoints(SetBreakpointsResponse { breakpoints })))?;
            }
            Command::SetExceptionBreakpoints(_) => {
                server.respond(req.success(ResponseBody::SetExceptionBreakpoints(
                    SetExceptionBreakpointsResponse { breakpoints: None },
                )))?;
            }
            Command::ConfigurationDone => {
                debug!("Received ConfigurationDone request");
                server.respond(req.success(ResponseBody::ConfigurationDone))?;
                if !self.vm.has_started() {
                    self.start(server)?;
                }
            }
            Command::Threads => {
                server.respond(req.success(ResponseBody::Threads(ThreadsResponse {
                    threads: vec![Thread {
                        id: THREAD_ID,
                        name: "main".to_string(),
                    }],
                })))?;
            }
            Command::StackTrace(_) => {
                let frames = self.vm.frames();
                if frames.is_empty() {
                    server.respond(req.error("Not stopped"))?;
                    return Ok(Flow::Continue);
                }
                let source = self.source();
                let stack_frames: Vec<StackFrame> = frames
                    .into_iter()
                    .map(|frame| StackFrame {
                        id: frame.id,
                        name: frame.name,
                        line: frame.line,
                        column: 1,
                        source: Some(source.clone()),
                        ..Default::default()
                    })
                    .collect();
                let total_frames = Some(stack_frames.len() as i64);
                server.respond(req.success(ResponseBody::StackTrace(StackTraceResponse {
                    stack_frames,
                    total_frames,
                })))?;
            }
            Command::Scopes(args) => {
                let frame_id = args.frame_id;
                let rsp = match inspect::scopes(&self.vm) {
                    Some(scopes) => req.success(ResponseBody::Scopes(ScopesResponse { scopes })),
                    None => req.error(&format!("No frame {} while running", frame_id)),
                };
                server.respond(rsp)?;
            }
            Command::Variables(args) => {
                let reference = args.variables_reference;
                let rsp = match inspect::variables(&self.vm, reference) {
                    Some(variables) => req.success(ResponseBody::Variables(VariablesResponse { variables })),
                    None => req.error(&format!("Unknown variablesReference {}", reference)),
                };
                server.respond(rsp)?;
            }
            Command::Continue(_) => self.resume(req, Resume::Continue, server)?,
            Command::Next(_) => self.resume(req, Resume::Next, server)?,
            Command::StepIn(_) => self.resume(req, Resume::StepIn, server)?,
            Command::StepOut(_) => self.resume(req, Resume::StepOut, server)?,
            Command::Pause(_) => match self.vm.pause() {
                Some(outcome) => {
                    server.respond(req.success(ResponseBody::Pause))?;
                    self.report(outcome, server)?;
                }
                None => server.respond(req.error("Nothing is running"))?,
            },
            Command::Terminate(_) => {
                debug!("Received Terminate request");
                server.respond(req.success(ResponseBody::Terminate))?;
                self.vm.terminate();
                self.report(Outcome::Terminated, server)?;
            }
            Command::Disconnect(_) => {
                debug!("Received Disconnect request");
                server.respond(req.success(ResponseBody::Disconnect))?;
                return Ok(Flow::Shutdown);
            }
            command => {
                let message = format!("Unsupported command: {:?}", command);
                debug!(%message, "Rejecting request");
                server.respond(req.error(&message))?;
            }
        }
        Ok(Flow::Continue)
    }

    fn resume<R: Read, W: Write>(&mut self, req: Request, mode: Resume, server: &mut Server<R, W>) -> Result<()> {
        debug!(?mode, "Received resume request");
        let Some(outcome) = self.vm.resume(mode, &self.breakpoints) else {
            server.respond(req.error("Not stopped"))?;
            return Ok(());
        };

        let body = match mode {
            Resume::Continue => ResponseBody::Continue(ContinueResponse {
                all_threads_continued: Some(true),
            }),
            Resume::Next => ResponseBody::Next,
            Resume::StepIn => ResponseBody::StepIn,
            Resume::StepOut => ResponseBody::StepOut,
        };
        server.respond(req.success(body))?;
        self.report(outcome, server)
    }

    /// Places pending breakpoints and runs the program to its first stop.
    fn start<R: Read, W: Write>(&mut self, server: &mut Server<R, W>) -> Result<()> {
        info!(program = %self.vm.program().name, "Starting execution");
        for state in self.breakpoints.resolve_pending(self.vm.program()) {
            server.send_event(Event::Breakpoint(BreakpointEventBody {
                reason: BreakpointEventReason::Changed,
                breakpoint: to_dap(&state),
            }))?;
        }
        let outcome = self.vm.start(&self.breakpoints);
        self.report(outcome, server)
    }

    fn report<R: Read, W: Write>(&self, outcome: Outcome, server: &mut Server<R, W>) -> Result<()> {
        match outcome {
            Outcome::Stopped {
                reason,
                line,
                breakpoint_id,
            } => {
                debug!(?reason, line, "Sending stopped event");
                let (reason, description) = match reason {
                    StopReason::Entry => (StoppedEventReason::Entry, "Stopped on entry"),
                    StopReason::Breakpoint => (StoppedEventReason::Breakpoint, "Breakpoint hit"),
                    StopReason::Step => (StoppedEventReason::Step, "Step completed"),
                    StopReason::Pause => (StoppedEventReason::Pause, "Paused"),
                };
                server.send_event(Event::Stopped(StoppedEventBody {
                    reason,
                    description: Some(format!("{} at line {}", description, line)),
                    thread_id: Some(THREAD_ID),
                    preserve_focus_hint: None,
                    text: None,
                    all_threads_stopped: Some(true),
                    hit_breakpoint_ids: breakpoint_id.map(|id| vec![id]),
                }))?;
            }
            Outcome::Running => {}
            Outcome::Terminated => {
                debug!("Sending terminated event");
                server.send_event(Event::Terminated(Some(TerminatedEventBody {
                    restart: Some(Value::Bool(false)),
                })))?;
            }
        }
        Ok(())
    }

    fn send_output<R: Read, W: Write>(&self, server: &mut Server<R, W>, output: String) -> Result<()> {
        server.send_event(Event::Output(OutputEventBody {
            output,
            category: Some(types::OutputEventCategory::Console),
            group: None,
            variables_reference: None,
            source: None,
            line: None,
            column: None,
            data: None,
        }))?;
        Ok(())
    }

    fn source(&self) -> Source {
        let program = self.vm.program();
        Source {
            name: Some(program.source_name().to_string()),
            path: Some(self.source_root.join(program.source).to_string_lossy().to_string()),
            adapter_data: None,
            source_reference: None,
            presentation_hint: None,
            origin: None,
            checksums: None,
            sources: None,
        }
    }
}

/// Breakpoints are keyed by the client's path, or its name when no path was sent.
fn source_key(source: &Source) -> &str {
    source
        .path
        .as_deref()
        .or(source.name.as_deref())
        .unwrap_or("<unknown>")
}

fn to_dap(state: &BreakpointState) -> Breakpoint {
    Breakpoint {
        id: Some(state.id),
        verified: state.verified,
        message: state.message.clone(),
        source: Some(Source {
            name: None,
            path: Some(state.source.clone()),
            adapter_data: None,
            source_reference: None,
            presentation_hint: None,
            origin: None,
            checksums: None,
            sources: None,
        }),
        line: Some(state.line),
        column: None,
        end_line: None,
        end_column: None,
        instruction_reference: None,
        offset: None,
    }
}
