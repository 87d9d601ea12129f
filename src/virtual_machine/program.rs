//! Immutable instruction sequence handed to the engine.
//!
//! A [`Program`] is built once, either from decoded instructions or from
//! source text, and never changes afterwards. Construction enforces the same
//! operand grammar as the assembler, so programs assembled in code and from
//! text behave identically.

use crate::virtual_machine::assembler::{AsmInstr, assemble_source};
use crate::virtual_machine::errors::VMError;
use std::fmt;
use std::str::FromStr;

/// Ordered, immutable list of decoded instructions.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Program {
    instructions: Vec<AsmInstr>,
}

impl Program {
    /// Creates a program, rejecting known instructions with the wrong operand count.
    pub fn new(instructions: Vec<AsmInstr>) -> Result<Self, VMError> {
        for instr in &instructions {
            instr.validate()?;
        }
        Ok(Self { instructions })
    }

    /// Assembles a program from source text.
    pub fn from_source(source: impl AsRef<str>) -> Result<Self, VMError> {
        assemble_source(source)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Returns the instruction at 0-based index `ip`.
    pub fn get(&self, ip: usize) -> Option<&AsmInstr> {
        self.instructions.get(ip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AsmInstr> {
        self.instructions.iter()
    }
}

impl FromStr for Program {
    type Err = VMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_source(s)
    }
}

/// Renders one instruction per line, in source form.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instr in &self.instructions {
            writeln!(f, "{instr}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a AsmInstr;
    type IntoIter = std::slice::Iter<'a, AsmInstr>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::isa::Instruction;

    #[test]
    fn new_accepts_well_formed_instructions() {
        let program = Program::new(vec![
            AsmInstr::bare(Instruction::Start).unwrap(),
            AsmInstr::with_operand(Instruction::Push, 4).unwrap(),
            AsmInstr::Unknown {
                text: "NOP".to_string(),
            },
        ])
        .unwrap();
        assert_eq!(program.len(), 3);
        assert_eq!(program.get(1).and_then(AsmInstr::operand), Some(4));
        assert!(program.get(3).is_none());
    }

    #[test]
    fn new_rejects_missing_operand() {
        let err = Program::new(vec![AsmInstr::Known {
            instr: Instruction::Jmp,
            operand: None,
        }])
        .unwrap_err();
        assert!(matches!(err, VMError::ArityMismatch { expected: 1, actual: 0, .. }));
    }

    #[test]
    fn display_reassembles_to_same_program() {
        let program: Program = "START\nPUSH 1\nPUSH 2\nADD\nCMP 3\nJMP 2\nHLT".parse().unwrap();
        let text = program.to_string();
        assert_eq!(text, "START\nPUSH 1\nPUSH 2\nADD\nCMP 3\nJMP 2\nHLT\n");
        assert_eq!(Program::from_source(&text).unwrap(), program);
    }

    #[test]
    fn iterates_in_order() {
        let program = Program::from_source("SUM\nPOP").unwrap();
        let ops: Vec<_> = program.iter().filter_map(AsmInstr::instruction).collect();
        assert_eq!(ops, vec![Instruction::Sum, Instruction::Pop]);
    }
}
