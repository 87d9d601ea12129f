//! Execution engine.
//!
//! The VM fetches the instruction at `ip`, dispatches it to the matching
//! state transition and repeats until the machine halts or a fault aborts
//! the run. It never stops by falling off the end of the program: fetching
//! past the last instruction is reported as [`VMError::InvalidIP`].
//!
//! All faults are terminal. A halted or aborted VM keeps reporting the same
//! outcome or error instead of executing anything further.

mod budget;

pub use budget::{ExecutionProfile, ProfileEntry, StepBudget};

use crate::virtual_machine::assembler::AsmInstr;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::program::Program;
use crate::virtual_machine::state::{MachineState, Snapshot};
use crate::virtual_machine::trace::{NoopTracer, StepEvent, Tracer};
use crate::warn;

/// Which instruction halted the machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HaltReason {
    /// `HLT` executed (stack cleared).
    Hlt,
    /// `CMP n` found `cmp >= n` (stack untouched).
    Cmp,
}

/// Lifecycle of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Running,
    Halted(HaltReason),
    Aborted,
}

/// Result of a run that reached a halt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Outcome {
    pub reason: HaltReason,
    /// Number of executed instructions.
    pub steps: u64,
    /// Final registers and stack.
    pub snapshot: Snapshot,
}

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        instr = $instr:ident,
        operand = $operand:ident,
        { $( $variant:ident => $handler:ident ( $( $field:ident : $kind:ident ),* ) ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => {
                    $( let $field = exec_vm!(@read $vm, $instr, $operand, $kind)?; )*
                    $vm.$handler($( $field ),*)
                }
            ),*
        }
    }};

    // Signed immediate
    (@read $vm:ident, $instr:ident, $operand:ident, Imm) => {{
        $operand.ok_or_else(|| VMError::ArityMismatch {
            instruction: $instr.mnemonic().to_string(),
            expected: 1,
            actual: 0,
        })
    }};

    // 1-based instruction number, converted to a 0-based index
    (@read $vm:ident, $instr:ident, $operand:ident, Line) => {{
        let target = exec_vm!(@read $vm, $instr, $operand, Imm)?;
        usize::try_from(target)
            .ok()
            .and_then(|t| t.checked_sub(1))
            .ok_or(VMError::InvalidJumpTarget {
                ip: $vm.state.ip(),
                target,
            })
    }};
}

/// Sequential stack machine executing one borrowed [`Program`].
pub struct VM<'p> {
    /// Instructions to execute.
    program: &'p Program,
    /// Registers, stack and halt flag.
    state: MachineState,
    /// Set once the machine halts.
    halted: Option<HaltReason>,
    /// Set once a fault aborts the run.
    fault: Option<VMError>,
    /// Executed-instruction counter and optional limit.
    budget: StepBudget,
    /// Per-instruction execution counts.
    profile: ExecutionProfile,
    /// Set after the first tracer error; later events are not delivered.
    tracer_failed: bool,
}

impl<'p> VM<'p> {
    /// Creates a VM with a fresh machine state and no step limit.
    pub fn new(program: &'p Program) -> Self {
        Self::with_budget(program, StepBudget::unlimited())
    }

    /// Creates a VM that aborts with [`VMError::StepLimitExceeded`] after
    /// `limit` instructions.
    pub fn with_step_limit(program: &'p Program, limit: u64) -> Self {
        Self::with_budget(program, StepBudget::limited(limit))
    }

    fn with_budget(program: &'p Program, budget: StepBudget) -> Self {
        Self {
            program,
            state: MachineState::new(),
            halted: None,
            fault: None,
            budget,
            profile: ExecutionProfile::new(),
            tracer_failed: false,
        }
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    pub fn profile(&self) -> &ExecutionProfile {
        &self.profile
    }

    /// Number of instructions executed so far.
    ///
    /// An instruction that faults is counted; a step-limit trip is not.
    pub fn steps(&self) -> u64 {
        self.budget.used()
    }

    pub fn status(&self) -> Status {
        match (self.halted, &self.fault) {
            (_, Some(_)) => Status::Aborted,
            (Some(reason), None) => Status::Halted(reason),
            (None, None) => Status::Running,
        }
    }

    /// Runs until the machine halts or faults.
    pub fn run(&mut self) -> Result<Outcome, VMError> {
        self.run_with(&mut NoopTracer)
    }

    /// Runs until the machine halts or faults, reporting every executed
    /// instruction to `tracer`.
    pub fn run_with<T: Tracer>(&mut self, tracer: &mut T) -> Result<Outcome, VMError> {
        loop {
            if let Status::Halted(reason) = self.step_with(tracer)? {
                return Ok(Outcome {
                    reason,
                    steps: self.budget.used(),
                    snapshot: self.state.snapshot(),
                });
            }
        }
    }

    /// Executes exactly one instruction.
    pub fn step(&mut self) -> Result<Status, VMError> {
        self.step_with(&mut NoopTracer)
    }

    /// Executes exactly one instruction and reports it to `tracer`.
    ///
    /// On a halted VM this does nothing and returns the halted status; on an
    /// aborted VM it returns the first fault again.
    pub fn step_with<T: Tracer>(&mut self, tracer: &mut T) -> Result<Status, VMError> {
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }
        if self.halted.is_some() {
            return Ok(self.status());
        }

        match self.execute_next() {
            Ok(executed) => {
                self.notify(tracer, executed);
                Ok(self.status())
            }
            Err(err) => {
                self.fault = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Fetches, charges and executes the instruction at `ip`.
    fn execute_next(&mut self) -> Result<&'p AsmInstr, VMError> {
        let ip = self.state.ip();
        let program = self.program;
        let asm = program.get(ip).ok_or(VMError::InvalidIP {
            ip,
            len: program.len(),
        })?;

        self.budget.charge()?;

        match asm {
            AsmInstr::Known { instr, operand } => {
                self.profile.record(ProfileEntry::Instruction(*instr));
                self.exec(*instr, *operand)?;
            }
            // Unknown operators have no handler, so nothing steps `ip`.
            AsmInstr::Unknown { .. } => self.profile.record(ProfileEntry::Unknown),
        }
        Ok(asm)
    }

    fn notify<T: Tracer>(&mut self, tracer: &mut T, executed: &AsmInstr) {
        if self.tracer_failed {
            return;
        }
        let snapshot = self.state.snapshot();
        let next = if self.halted.is_some() {
            None
        } else {
            self.program.get(snapshot.ip)
        };
        let event = StepEvent {
            step: self.budget.used(),
            instruction: executed,
            next,
            snapshot: &snapshot,
        };
        if let Err(e) = tracer.on_step(&event) {
            warn!("step tracer failed, tracing disabled for the rest of the run: {e}");
            self.tracer_failed = true;
        }
    }

    /// Executes a single decoded instruction.
    fn exec(&mut self, instruction: Instruction, operand: Option<i64>) -> Result<(), VMError> {
        exec_vm! {
            vm = self,
            instr = instruction,
            operand = operand,
            {
                Start => op_start(),
                Hlt => op_hlt(),
                Push => op_push(value: Imm),
                Add => op_add(),
                Pop => op_pop(),
                Jmp => op_jmp(target: Line),
                Sum => op_sum(),
                Cmp => op_cmp(threshold: Imm),
            }
        }
    }

    fn op_start(&mut self) -> Result<(), VMError> {
        self.state.reset();
        self.state.step();
        Ok(())
    }

    fn op_hlt(&mut self) -> Result<(), VMError> {
        self.state.mark_halt();
        self.halted = Some(HaltReason::Hlt);
        self.state.step();
        Ok(())
    }

    fn op_push(&mut self, value: i64) -> Result<(), VMError> {
        self.state.push(value)?;
        self.state.step();
        Ok(())
    }

    fn op_add(&mut self) -> Result<(), VMError> {
        self.state.reduce_all()?;
        self.state.step();
        Ok(())
    }

    fn op_pop(&mut self) -> Result<(), VMError> {
        self.state.pop()?;
        self.state.step();
        Ok(())
    }

    fn op_jmp(&mut self, target: usize) -> Result<(), VMError> {
        self.state.jump(target);
        Ok(())
    }

    fn op_sum(&mut self) -> Result<(), VMError> {
        self.state.accumulate_compare();
        self.state.step();
        Ok(())
    }

    fn op_cmp(&mut self, threshold: i64) -> Result<(), VMError> {
        if self.state.cmp() >= threshold {
            self.state.set_halt();
            self.halted = Some(HaltReason::Cmp);
        } else {
            self.state.step();
        }
        Ok(())
    }
}
