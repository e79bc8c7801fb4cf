use std::collections::HashMap;

use crate::program::Program;

/// A breakpoint as the adapter currently sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointState {
    pub id: i64,
    pub source: String,
    pub requested_line: i64,
    /// Line the breakpoint was placed on, once the VM is running.
    pub line: i64,
    pub verified: bool,
    pub message: Option<String>,
}

impl BreakpointState {
    pub fn moved(&self) -> bool {
        self.verified && self.line != self.requested_line
    }
}

/// Breakpoints per source file.
///
/// Each source path gets a slot number the first time it is seen; a breakpoint's id
/// is derived from its slot and requested line, so re-sending the same set keeps ids.
#[derive(Debug, Default)]
pub struct BreakpointTable {
    slots: Vec<String>,
    by_source: HashMap<String, Vec<BreakpointState>>,
}

impl BreakpointTable {
    fn slot(&mut self, source: &str) -> i64 {
        let index = match self.slots.iter().position(|known| known == source) {
            Some(index) => index,
            None => {
                self.slots.push(source.to_string());
                self.slots.len() - 1
            }
        };
        index as i64 + 1
    }

    /// Replaces the breakpoints of `source`.
    ///
    /// Before the VM has started nothing is verified and lines are reported as requested.
    pub fn set(&mut self, program: &Program, source: &str, lines: &[i64], vm_started: bool) -> Vec<BreakpointState> {
        let slot = self.slot(source);
        let owned = program.owns_source(source);
        let states: Vec<BreakpointState> = lines
            .iter()
            .map(|&requested_line| {
                let mut state = BreakpointState {
                    id: requested_line * 1000 + slot,
                    source: source.to_string(),
                    requested_line,
                    line: requested_line,
                    verified: false,
                    message: None,
                };
                if !owned {
                    state.message = Some(format!("{} is not part of {}", source, program.name));
                } else if vm_started {
                    resolve(program, &mut state);
                }
                state
            })
            .collect();

        self.by_source.insert(source.to_string(), states.clone());
        states
    }

    /// Places every pending breakpoint of the program's source. Returns the ones that changed.
    pub fn resolve_pending(&mut self, program: &Program) -> Vec<BreakpointState> {
        let mut changed = Vec::new();
        for (source, states) in self.by_source.iter_mut() {
            if !program.owns_source(source) {
                continue;
            }
            for state in states.iter_mut().filter(|state| !state.verified) {
                resolve(program, state);
                if state.verified {
                    changed.push(state.clone());
                }
            }
        }
        changed.sort_by_key(|state| state.id);
        changed
    }

    /// Id of the verified breakpoint placed on `line`, if any.
    pub fn hit(&self, program: &Program, line: i64) -> Option<i64> {
        self.by_source
            .iter()
            .filter(|(source, _)| program.owns_source(source))
            .flat_map(|(_, states)| states.iter())
            .filter(|state| state.verified && state.line == line)
            .map(|state| state.id)
            .min()
    }
}

fn resolve(program: &Program, state: &mut BreakpointState) {
    match program.snap_line(state.requested_line) {
        Some(line) => {
            state.line = line;
            state.verified = true;
            state.message = (line != state.requested_line)
                .then(|| format!("Breakpoint moved from line {} to line {}", state.requested_line, line));
        }
        None => {
            state.message = Some(format!("No executable code at or after line {}", state.requested_line));
        }
    }
}
