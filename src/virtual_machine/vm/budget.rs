use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{INSTRUCTION_COUNT, Instruction};

/// Number of profile buckets: one per instruction plus one for unknown operators.
const PROFILE_SLOTS: usize = INSTRUCTION_COUNT + 1;

/// Execution category recorded by [`ExecutionProfile`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ProfileEntry {
    /// An instruction from the fixed set.
    Instruction(Instruction),
    /// An operator outside the set (executed as a no-op).
    Unknown,
}

impl ProfileEntry {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProfileEntry::Instruction(instr) => instr.mnemonic(),
            ProfileEntry::Unknown => "<unknown>",
        }
    }

    const fn slot(&self) -> usize {
        match self {
            ProfileEntry::Instruction(instr) => *instr as usize,
            ProfileEntry::Unknown => INSTRUCTION_COUNT,
        }
    }

    fn from_slot(slot: usize) -> Self {
        match Instruction::ALL.get(slot) {
            Some(instr) => ProfileEntry::Instruction(*instr),
            None => ProfileEntry::Unknown,
        }
    }
}

/// Per-instruction execution counts for one run.
///
/// Backed by a flat array indexed by opcode, with a trailing slot for
/// unknown operators.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutionProfile {
    counts: [u64; PROFILE_SLOTS],
}

impl Default for ExecutionProfile {
    fn default() -> Self {
        Self {
            counts: [0; PROFILE_SLOTS],
        }
    }
}

impl ExecutionProfile {
    /// Creates a new empty profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one execution of `entry`.
    #[inline(always)]
    pub fn record(&mut self, entry: ProfileEntry) {
        let slot = &mut self.counts[entry.slot()];
        *slot = slot.saturating_add(1);
    }

    /// Returns how many times `entry` executed.
    pub fn count(&self, entry: ProfileEntry) -> u64 {
        self.counts[entry.slot()]
    }

    /// Returns the total number of executed instructions.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |acc, &v| acc.saturating_add(v))
    }

    /// Returns an iterator over all entries and their counts, in opcode order.
    pub fn iter(&self) -> impl Iterator<Item = (ProfileEntry, u64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .map(|(slot, &count)| (ProfileEntry::from_slot(slot), count))
    }
}

/// Optional upper bound on the number of executed instructions.
///
/// The engine has no built-in limit; a budget only exists when the caller
/// asks for one, and it never changes what an instruction does.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StepBudget {
    used: u64,
    limit: Option<u64>,
}

impl StepBudget {
    /// A budget that never runs out.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// A budget allowing at most `limit` instructions.
    pub fn limited(limit: u64) -> Self {
        Self {
            used: 0,
            limit: Some(limit),
        }
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    /// Charges one instruction.
    ///
    /// Returns [`VMError::StepLimitExceeded`] without charging if the budget
    /// is already spent.
    pub fn charge(&mut self) -> Result<(), VMError> {
        if let Some(limit) = self.limit
            && self.used >= limit
        {
            return Err(VMError::StepLimitExceeded { limit });
        }
        self.used = self.used.saturating_add(1);
        Ok(())
    }
}
