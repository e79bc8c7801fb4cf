use crate::breakpoints::BreakpointTable;
use crate::program::{Program, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Entry,
    Breakpoint,
    Step,
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    Continue,
    Next,
    StepIn,
    StepOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NotStarted,
    Stopped { index: usize, reason: StopReason },
    /// Past the last step, waiting to be paused or terminated.
    Idle,
    Terminated,
}

/// What the client should be told after the VM moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Stopped {
        reason: StopReason,
        line: i64,
        breakpoint_id: Option<i64>,
    },
    Running,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: i64,
    pub name: String,
    pub line: i64,
    pub vm: u32,
}

/// Simulated VM walking a [`Program`]'s steps.
#[derive(Debug)]
pub struct Vm {
    program: Program,
    state: State,
    /// Last step that was executed, used when pausing an idle VM.
    last_index: usize,
}

impl Vm {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            state: State::NotStarted,
            last_index: 0,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn has_started(&self) -> bool {
        self.state != State::NotStarted
    }

    /// Index of the current step while stopped.
    pub fn current_index(&self) -> Option<usize> {
        match self.state {
            State::Stopped { index, .. } => Some(index),
            _ => None,
        }
    }

    pub fn current_step(&self) -> Option<Step> {
        self.current_index().map(|index| self.program.steps[index])
    }

    pub fn start(&mut self, breakpoints: &BreakpointTable) -> Outcome {
        if self.program.stops_on_entry() {
            return self.stop_at(0, StopReason::Entry, None);
        }
        self.run_from(0, breakpoints, |_| false)
    }

    /// Resumes execution. Returns `None` if the VM is not stopped.
    pub fn resume(&mut self, mode: Resume, breakpoints: &BreakpointTable) -> Option<Outcome> {
        let index = match self.state {
            State::Stopped { index, .. } => index,
            State::Idle if mode == Resume::Continue => return Some(Outcome::Running),
            _ => return None,
        };
        let depth = self.program.steps[index].depth;
        let from = index + 1;

        let outcome = match mode {
            Resume::Continue => self.run_from(from, breakpoints, |_| false),
            Resume::StepIn => self.run_from(from, breakpoints, |_| true),
            Resume::Next => self.run_from(from, breakpoints, |step| step.depth <= depth),
            Resume::StepOut => self.run_from(from, breakpoints, |step| step.depth < depth),
        };
        Some(outcome)
    }

    /// Pauses a running or stopped VM at its current position.
    pub fn pause(&mut self) -> Option<Outcome> {
        match self.state {
            State::Stopped { index, .. } => Some(self.stop_at(index, StopReason::Pause, None)),
            State::Idle => Some(self.stop_at(self.last_index, StopReason::Pause, None)),
            State::NotStarted | State::Terminated => None,
        }
    }

    pub fn terminate(&mut self) {
        self.state = State::Terminated;
    }

    /// Call stack while stopped, innermost frame first.
    pub fn frames(&self) -> Vec<Frame> {
        let Some(index) = self.current_index() else {
            return Vec::new();
        };
        let steps = &self.program.steps;
        let mut frames = vec![steps[index]];
        let mut depth = steps[index].depth;
        for step in steps[..index].iter().rev() {
            if step.depth < depth {
                frames.push(*step);
                depth = step.depth;
            }
        }

        frames
            .into_iter()
            .enumerate()
            .map(|(i, step)| Frame {
                id: i as i64 + 1,
                name: format!("{}:{}", step.vm, step.function),
                line: step.line,
                vm: step.vm,
            })
            .collect()
    }

    /// Executes steps from `from` until a breakpoint or a step accepted by `stop_here`.
    fn run_from<F>(&mut self, from: usize, breakpoints: &BreakpointTable, stop_here: F) -> Outcome
    where
        F: Fn(&Step) -> bool,
    {
        for index in from..self.program.steps.len() {
            let step = self.program.steps[index];
            self.last_index = index;
            if let Some(id) = breakpoints.hit(&self.program, step.line) {
                return self.stop_at(index, StopReason::Breakpoint, Some(id));
            }
            if stop_here(&step) {
                return self.stop_at(index, StopReason::Step, None);
            }
        }

        if self.program.idles_at_end() {
            self.state = State::Idle;
            Outcome::Running
        } else {
            self.state = State::Terminated;
            Outcome::Terminated
        }
    }

    fn stop_at(&mut self, index: usize, reason: StopReason, breakpoint_id: Option<i64>) -> Outcome {
        self.state = State::Stopped { index, reason };
        self.last_index = index;
        Outcome::Stopped {
            reason,
            line: self.program.steps[index].line,
            breakpoint_id,
        }
    }
}
