use dap::types::{Scope, Variable};

use crate::program::{Kind, Step};
use crate::vm::Vm;

const TEST_ACCOUNT: &str = "0x0a7c2e6b7a1d4f1b3c5e9d2f8a6b4c1e0d3f5a7b9c2e4d6f8a1b3c5e7d9f0a2b";
const COUNTER_CONTRACT: &str = "0x1f3e5d7c9b2a4c6e8d0f1a3b5c7d9e2f4a6b8c0d1e3f5a7b9c2d4e6f8a0b1c3d";

/// Everything a `variablesReference` can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    GlobalState,
    VmState,
    CallState,
    Notes,
    MemoryWrites,
}

impl Container {
    fn reference(self, kind: Kind) -> i64 {
        match (kind, self) {
            (Kind::Cvm, Container::VmState) => 1,
            (Kind::Cvm, Container::MemoryWrites) => 2,
            (Kind::Txe, Container::GlobalState) => 1,
            (Kind::Txe, Container::VmState) => 2,
            (Kind::Txe, Container::CallState) => 3,
            (Kind::Txe, Container::Notes) => 4,
            (Kind::Txe, Container::MemoryWrites) => 5,
            (Kind::Cvm, _) => 0,
        }
    }

    fn from_reference(kind: Kind, reference: i64) -> Option<Self> {
        [
            Container::GlobalState,
            Container::VmState,
            Container::CallState,
            Container::Notes,
            Container::MemoryWrites,
        ]
        .into_iter()
        .find(|container| reference > 0 && container.reference(kind) == reference)
    }
}

/// Scopes of the current stop position, or `None` while not stopped.
pub fn scopes(vm: &Vm) -> Option<Vec<Scope>> {
    let step = vm.current_step()?;
    let kind = vm.program().kind;
    let vm_state = format!("VM State (vm{})", step.vm);

    let scopes = match kind {
        Kind::Cvm => vec![
            scope(&vm_state, Container::VmState.reference(kind), false),
            scope("Memory Writes", Container::MemoryWrites.reference(kind), true),
        ],
        Kind::Txe => vec![
            scope("TXE Global State", Container::GlobalState.reference(kind), false),
            scope(&vm_state, Container::VmState.reference(kind), false),
            scope("Current Call State", Container::CallState.reference(kind), false),
        ],
    };
    Some(scopes)
}

/// Children of `reference`, or `None` if it does not name anything at the current position.
pub fn variables(vm: &Vm, reference: i64) -> Option<Vec<Variable>> {
    let index = vm.current_index()?;
    let kind = vm.program().kind;
    let steps = &vm.program().steps[..=index];
    let step = steps[index];

    let variables = match Container::from_reference(kind, reference)? {
        Container::GlobalState => vec![
            variable("block_number", 1, "u32", 0),
            variable("timestamp", 1_700_000_000u64 + index as u64, "u64", 0),
            variable("chain_id", "0x01", "Field", 0),
            variable("version", "0x01", "Field", 0),
        ],
        Container::VmState => {
            let mut vars = vec![
                variable("pc", index * 4, "u32", 0),
                variable("depth", step.depth, "u32", 0),
            ];
            if kind == Kind::Txe {
                let notes = notes_in(steps);
                vars.extend([
                    variable("contract_address", address_of(&step), "AztecAddress", 0),
                    variable("side_effect_counter", index, "u32", 0),
                    variable(
                        "notes",
                        format!("[{} notes]", notes),
                        "Vec<ValueNote>",
                        Container::Notes.reference(kind),
                    ),
                ]);
            }
            vars
        }
        Container::CallState => {
            let writes = storage_writes_in(steps);
            vec![
                variable("contract_address", address_of(&step), "AztecAddress", 0),
                variable("is_static_call", false, "bool", 0),
                variable("num_storage_writes", writes, "usize", 0),
                variable("num_private_logs", notes_in(steps), "usize", 0),
                variable(
                    "memory_writes",
                    format!("[{} writes]", steps.len()),
                    "Vec<MemoryWrite>",
                    Container::MemoryWrites.reference(kind),
                ),
            ]
        }
        Container::Notes => (0..notes_in(steps))
            .map(|i| {
                variable(
                    &format!("note[{}]", i),
                    format!("ValueNote {{ value: {}, owner: {} }}", i + 1, TEST_ACCOUNT),
                    "ValueNote",
                    0,
                )
            })
            .collect(),
        Container::MemoryWrites => steps
            .iter()
            .enumerate()
            .map(|(i, step)| variable(&format!("mem[{}]", i * 2), format!("0x{:04x}", step.line), "Field", 0))
            .collect(),
    };
    Some(variables)
}

fn notes_in(steps: &[Step]) -> usize {
    steps.iter().filter(|step| step.vm > 0).count()
}

fn storage_writes_in(steps: &[Step]) -> usize {
    steps.iter().filter(|step| step.vm > 0 && step.line % 2 == 0).count()
}

fn address_of(step: &Step) -> &'static str {
    if step.vm == 0 { TEST_ACCOUNT } else { COUNTER_CONTRACT }
}

fn scope(name: &str, variables_reference: i64, expensive: bool) -> Scope {
    Scope {
        name: name.to_string(),
        variables_reference,
        expensive,
        named_variables: None,
        indexed_variables: None,
        source: None,
        line: None,
        column: None,
        end_line: None,
        end_column: None,
        presentation_hint: None,
    }
}

fn variable(name: &str, value: impl ToString, type_name: &str, variables_reference: i64) -> Variable {
    Variable {
        name: name.to_string(),
        value: value.to_string(),
        type_field: Some(type_name.to_string()),
        variables_reference,
        named_variables: None,
        indexed_variables: None,
        presentation_hint: None,
        evaluate_name: Some(name.to_string()),
        memory_reference: None,
    }
}
