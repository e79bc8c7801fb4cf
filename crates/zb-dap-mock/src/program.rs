use std::path::Path;

/// One executable position of a simulated program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub line: i64,
    /// Call depth, 1 for the outermost function.
    pub depth: u32,
    /// Index of the VM executing this step; nested contract calls run in their own VM.
    pub vm: u32,
    pub function: &'static str,
}

impl Step {
    const fn new(line: i64, depth: u32, vm: u32, function: &'static str) -> Self {
        Self {
            line,
            depth,
            vm,
            function,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Cvm,
    Txe,
}

/// A scripted program: the sequence of lines the simulated VM walks through.
#[derive(Debug, Clone)]
pub struct Program {
    pub kind: Kind,
    pub name: String,
    /// Source path relative to the repository root.
    pub source: &'static str,
    pub steps: Vec<Step>,
}

const CVM_STEPS: &[Step] = &[
    Step::new(6, 1, 0, "main"),
    Step::new(9, 1, 0, "main"),
    Step::new(12, 2, 0, "compute"),
    Step::new(15, 1, 0, "main"),
    Step::new(18, 1, 0, "main"),
];

const TXE_TEST_FUNCTION: &str = "extended_incrementing_and_decrementing_pass";

const TXE_STEPS: &[Step] = &[
    Step::new(172, 1, 0, TXE_TEST_FUNCTION),
    Step::new(174, 1, 0, TXE_TEST_FUNCTION),
    Step::new(74, 2, 1, "increment"),
    Step::new(76, 2, 1, "increment"),
    Step::new(77, 2, 1, "increment"),
    Step::new(80, 2, 1, "increment"),
    Step::new(175, 1, 0, TXE_TEST_FUNCTION),
    Step::new(176, 1, 0, TXE_TEST_FUNCTION),
];

impl Program {
    /// The `simple_test` circuit run by `zb cvm run`.
    pub fn cvm(artifact: &Path) -> Self {
        Self {
            kind: Kind::Cvm,
            name: artifact
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_else(|| "simple_test".to_string()),
            source: "simple_test/src/main.nr",
            steps: CVM_STEPS.to_vec(),
        }
    }

    /// The counter contract test run by `zb txe`.
    pub fn txe(test: &Path) -> Self {
        Self {
            kind: Kind::Txe,
            name: test
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_string())
                .unwrap_or_else(|| TXE_TEST_FUNCTION.to_string()),
            source: "aztec-packages/noir-projects/noir-contracts/contracts/test/counter_contract/src/main.nr",
            steps: TXE_STEPS.to_vec(),
        }
    }

    /// TXE sessions stop on entry; CVM sessions run straight to the first breakpoint.
    pub fn stops_on_entry(&self) -> bool {
        self.kind == Kind::Txe
    }

    /// TXE keeps running after the test body finishes until it is paused or terminated.
    pub fn idles_at_end(&self) -> bool {
        self.kind == Kind::Txe
    }

    pub fn source_name(&self) -> &'static str {
        Path::new(self.source)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(self.source)
    }

    /// True if a client-side path refers to this program's source file.
    pub fn owns_source(&self, path: &str) -> bool {
        Path::new(path)
            .file_name()
            .is_some_and(|name| name == self.source_name())
    }

    /// The first executable line at or after `line`.
    pub fn snap_line(&self, line: i64) -> Option<i64> {
        self.steps
            .iter()
            .map(|step| step.line)
            .filter(|&candidate| candidate >= line)
            .min()
    }
}
