//! Machine state: register file, bounded stack and halt flag.
//!
//! [`MachineState`] owns every mutable register of a run and exposes one
//! checked primitive per mutation. The engine never touches the stack
//! directly; it goes through these primitives, which either apply their
//! effect completely or fail without changing anything.
//!
//! Slots at or above `sp` are not cleared by `POP` or `ADD` and keep their
//! stale values until the next `START` or `HLT`.

use crate::virtual_machine::errors::VMError;

/// Number of stack slots.
pub const CAPACITY: usize = 5;

/// Read-only copy of the machine registers and stack.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Snapshot {
    /// Stack pointer (next free slot).
    pub sp: usize,
    /// Instruction pointer (0-based).
    pub ip: usize,
    /// Accumulator.
    pub acc: i64,
    /// Compare register.
    pub cmp: i64,
    /// Halt flag.
    pub halt: bool,
    /// All slots, including stale ones above `sp`.
    pub stack: [i64; CAPACITY],
}

impl Snapshot {
    /// Returns the live part of the stack (`stack[0..sp]`).
    pub fn live(&self) -> &[i64] {
        &self.stack[..self.sp.min(CAPACITY)]
    }
}

/// Register file and bounded stack for one run.
#[derive(Clone, Debug, Default)]
pub struct MachineState {
    sp: usize,
    ip: usize,
    acc: i64,
    cmp: i64,
    halt: bool,
    stack: [i64; CAPACITY],
}

impl MachineState {
    /// Creates a zeroed machine: empty stack, all registers 0, not halted.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sp(&self) -> usize {
        self.sp
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn acc(&self) -> i64 {
        self.acc
    }

    pub fn cmp(&self) -> i64 {
        self.cmp
    }

    pub fn is_halted(&self) -> bool {
        self.halt
    }

    /// Returns every stack slot, including stale ones above `sp`.
    pub fn stack(&self) -> &[i64; CAPACITY] {
        &self.stack
    }

    /// Soft reset used by `START`: clears the stack, `sp` and `acc`.
    ///
    /// `cmp` and `halt` are deliberately left alone; a program can rely on
    /// `cmp` surviving a restart as a loop counter.
    pub fn reset(&mut self) {
        self.stack = [0; CAPACITY];
        self.sp = 0;
        self.acc = 0;
    }

    /// Writes `value` to `stack[sp]` and increments `sp`.
    ///
    /// Returns [`VMError::StackOverflow`] if every slot is in use.
    pub fn push(&mut self, value: i64) -> Result<(), VMError> {
        let slot = self
            .stack
            .get_mut(self.sp)
            .ok_or(VMError::StackOverflow {
                ip: self.ip,
                capacity: CAPACITY,
            })?;
        *slot = value;
        self.sp += 1;
        Ok(())
    }

    /// Decrements `sp`. The popped value stays in its slot.
    ///
    /// Returns [`VMError::StackUnderflow`] if the stack is empty.
    pub fn pop(&mut self) -> Result<(), VMError> {
        self.sp = self
            .sp
            .checked_sub(1)
            .ok_or(VMError::StackUnderflow { ip: self.ip })?;
        Ok(())
    }

    /// Collapses every live slot into `stack[0]`.
    ///
    /// The sum (wrapping) is written to both `acc` and `stack[0]`, and `sp`
    /// becomes 1. Slots `1..sp` keep their old values.
    ///
    /// Returns [`VMError::InvalidReduction`] if the stack is empty.
    pub fn reduce_all(&mut self) -> Result<i64, VMError> {
        if self.sp == 0 {
            return Err(VMError::InvalidReduction { ip: self.ip });
        }
        let total = self.stack[..self.sp]
            .iter()
            .fold(0i64, |acc, &v| acc.wrapping_add(v));
        self.acc = total;
        self.stack[0] = total;
        self.sp = 1;
        Ok(total)
    }

    /// `cmp += acc` (wrapping).
    pub fn accumulate_compare(&mut self) {
        self.cmp = self.cmp.wrapping_add(self.acc);
    }

    /// Sets the halt flag without touching the stack (used by `CMP`).
    pub fn set_halt(&mut self) {
        self.halt = true;
    }

    /// Sets the halt flag and clears the stack and `sp` (used by `HLT`).
    pub fn mark_halt(&mut self) {
        self.halt = true;
        self.stack = [0; CAPACITY];
        self.sp = 0;
    }

    /// Advances `ip` by one.
    pub fn step(&mut self) {
        self.ip += 1;
    }

    /// Sets `ip` to a 0-based instruction index.
    pub fn jump(&mut self, ip: usize) {
        self.ip = ip;
    }

    /// Copies the registers and stack.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            sp: self.sp,
            ip: self.ip,
            acc: self.acc,
            cmp: self.cmp,
            halt: self.halt,
            stack: self.stack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_stack(values: &[i64]) -> MachineState {
        let mut state = MachineState::new();
        for &v in values {
            state.push(v).unwrap();
        }
        state
    }

    #[test]
    fn new_state_is_zeroed() {
        let snap = MachineState::new().snapshot();
        assert_eq!(snap, Snapshot::default());
        assert!(snap.live().is_empty());
    }

    #[test]
    fn push_fills_slots_in_order() {
        let state = with_stack(&[7, 8]);
        assert_eq!(state.sp(), 2);
        assert_eq!(state.stack()[..2], [7, 8]);
    }

    #[test]
    fn push_rejects_full_stack() {
        let mut state = with_stack(&[1, 2, 3, 4, 5]);
        assert_eq!(state.push(6), Err(VMError::StackOverflow { ip: 0, capacity: CAPACITY }));
        assert_eq!(state.sp(), CAPACITY);
        assert_eq!(state.stack(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn pop_leaves_stale_slot() {
        let mut state = with_stack(&[4, 9]);
        state.pop().unwrap();
        assert_eq!(state.sp(), 1);
        assert_eq!(state.stack()[1], 9);
        assert_eq!(state.snapshot().live(), &[4]);
    }

    #[test]
    fn pop_rejects_empty_stack() {
        let mut state = MachineState::new();
        assert_eq!(state.pop(), Err(VMError::StackUnderflow { ip: 0 }));
        assert_eq!(state.sp(), 0);
    }

    #[test]
    fn reduce_two_values() {
        let mut state = with_stack(&[1, 2]);
        assert_eq!(state.reduce_all(), Ok(3));
        assert_eq!(state.stack()[0], 3);
        assert_eq!(state.sp(), 1);
        assert_eq!(state.acc(), 3);
    }

    #[test]
    fn reduce_collapses_whole_stack() {
        let mut state = with_stack(&[1, 2, 3, 4, 5]);
        assert_eq!(state.reduce_all(), Ok(15));
        assert_eq!(state.sp(), 1);
        assert_eq!(state.stack(), &[15, 2, 3, 4, 5]);
    }

    #[test]
    fn reduce_single_value_is_identity() {
        let mut state = with_stack(&[42]);
        assert_eq!(state.reduce_all(), Ok(42));
        assert_eq!(state.sp(), 1);
        assert_eq!(state.acc(), 42);
    }

    #[test]
    fn reduce_rejects_empty_stack() {
        let mut state = MachineState::new();
        assert_eq!(state.reduce_all(), Err(VMError::InvalidReduction { ip: 0 }));
        assert_eq!(state.sp(), 0);
        assert_eq!(state.acc(), 0);
    }

    #[test]
    fn reduce_wraps_on_overflow() {
        let mut state = with_stack(&[i64::MAX, 1]);
        assert_eq!(state.reduce_all(), Ok(i64::MIN));
    }

    #[test]
    fn reset_keeps_cmp_and_halt() {
        let mut state = with_stack(&[5, 6]);
        state.reduce_all().unwrap();
        state.accumulate_compare();
        state.set_halt();
        state.reset();
        assert_eq!(state.sp(), 0);
        assert_eq!(state.acc(), 0);
        assert_eq!(state.stack(), &[0; CAPACITY]);
        assert_eq!(state.cmp(), 11);
        assert!(state.is_halted());
    }

    #[test]
    fn accumulate_compare_adds_acc() {
        let mut state = with_stack(&[2, 3]);
        state.reduce_all().unwrap();
        state.accumulate_compare();
        state.accumulate_compare();
        assert_eq!(state.cmp(), 10);
    }

    #[test]
    fn mark_halt_clears_stack_but_set_halt_does_not() {
        let mut state = with_stack(&[1, 2]);
        state.set_halt();
        assert_eq!(state.sp(), 2);

        state.mark_halt();
        assert!(state.is_halted());
        assert_eq!(state.sp(), 0);
        assert_eq!(state.stack(), &[0; CAPACITY]);
    }

    #[test]
    fn step_and_jump_move_ip() {
        let mut state = MachineState::new();
        state.step();
        state.step();
        assert_eq!(state.ip(), 2);
        state.jump(0);
        assert_eq!(state.ip(), 0);
    }
}
