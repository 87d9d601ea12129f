use stackvm_derive::Error;

/// Exit status reported when `POP` hits an empty stack.
pub const STACK_UNDERFLOW_EXIT_CODE: i32 = 64;

/// Errors that can occur during VM execution or assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VMError {
    /// Wrong number of operands for an instruction.
    #[error("{instruction} expects {expected} operand(s), got {actual}")]
    ArityMismatch {
        instruction: String,
        expected: usize,
        actual: usize,
    },
    /// Operand token is not a decimal integer.
    #[error("invalid operand '{token}' for {instruction}")]
    InvalidOperand {
        instruction: &'static str,
        token: String,
    },
    /// Empty instruction text.
    #[error("empty instruction")]
    EmptyInstruction,
    /// `POP` executed with no live stack slots.
    #[error("stack underflow at ip {ip}: couldn't pop an empty stack")]
    StackUnderflow { ip: usize },
    /// `PUSH` executed with every stack slot in use.
    #[error("stack overflow at ip {ip}: all {capacity} slots are in use")]
    StackOverflow { ip: usize, capacity: usize },
    /// `ADD` executed with no live stack slots to reduce.
    #[error("invalid reduction at ip {ip}: ADD needs at least one value on the stack")]
    InvalidReduction { ip: usize },
    /// `JMP` operand has no corresponding 0-based instruction index.
    #[error("invalid jump target {target} at ip {ip}: targets are 1-based")]
    InvalidJumpTarget { ip: usize, target: i64 },
    /// Instruction pointer walked off the program.
    #[error("invalid instruction pointer {ip} (program has {len} instructions)")]
    InvalidIP { ip: usize, len: usize },
    /// Optional step guard tripped.
    #[error("step limit of {limit} instructions exceeded")]
    StepLimitExceeded { limit: u64 },
    /// Assembly error with line number context.
    #[error("line {line}: {source}")]
    AssemblyError {
        line: usize,
        offset: usize,
        source: String,
    },
    /// File I/O error during assembly.
    #[error("io error on {path}: {source}")]
    IoError { path: String, source: String },
    /// Label defined more than once.
    #[error("duplicate label: {label}")]
    DuplicateLabel { label: String },
    /// Reference to undefined label.
    #[error("undefined label: {label}")]
    UndefinedLabel { label: String },
}

impl VMError {
    /// Process exit status for this error.
    ///
    /// Stack underflow has its own distinguished status; everything else
    /// exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            VMError::StackUnderflow { .. } => STACK_UNDERFLOW_EXIT_CODE,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_interpolates_named_fields() {
        let err = VMError::StackOverflow { ip: 3, capacity: 5 };
        assert_eq!(
            err.to_string(),
            "stack overflow at ip 3: all 5 slots are in use"
        );
    }

    #[test]
    fn display_skips_unmentioned_fields() {
        let err = VMError::AssemblyError {
            line: 4,
            offset: 9,
            source: "undefined label: top".to_string(),
        };
        assert_eq!(err.to_string(), "line 4: undefined label: top");
    }

    #[test]
    fn underflow_has_distinguished_exit_code() {
        assert_eq!(VMError::StackUnderflow { ip: 0 }.exit_code(), 64);
        assert_eq!(VMError::InvalidReduction { ip: 0 }.exit_code(), 1);
        assert_eq!(VMError::EmptyInstruction.exit_code(), 1);
    }
}
