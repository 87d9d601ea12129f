//! Instruction decoder and program assembler.
//!
//! Converts human-readable instruction text into [`AsmInstr`] values and
//! whole sources into a [`Program`].
//!
//! # Syntax
//!
//! ```text
//! [label:] OPERATOR [operand]  # optional comment
//! ```
//!
//! - Operators are uppercase and matched exactly (e.g., `PUSH`, `JMP`)
//! - Operands are decimal integers (e.g., `42`, `-1`)
//! - `JMP` takes a 1-based instruction number or a label name
//! - Comments start with `#`
//! - Commas between tokens are ignored
//!
//! An operator outside the instruction set is not an error: it is kept as
//! [`AsmInstr::Unknown`] and executes as a no-op.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::program::Program;
use crate::warn;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write;
use std::fs;
use std::path::Path;
use std::str::FromStr;

const COMMENT_CHAR: char = '#';
const LABEL_SUFFIX: char = ':';

/// One decoded instruction: an opcode with its optional operand.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum AsmInstr {
    /// Instruction from the fixed set.
    ///
    /// `operand` is `Some` exactly when [`Instruction::takes_operand`] is true.
    Known {
        instr: Instruction,
        operand: Option<i64>,
    },
    /// Operator outside the instruction set, kept verbatim.
    Unknown { text: String },
}

impl AsmInstr {
    /// Builds a known instruction, checking the operand against its arity.
    pub fn new(instr: Instruction, operand: Option<i64>) -> Result<Self, VMError> {
        let asm = AsmInstr::Known { instr, operand };
        asm.validate()?;
        Ok(asm)
    }

    /// Builds an instruction with no operand.
    pub fn bare(instr: Instruction) -> Result<Self, VMError> {
        Self::new(instr, None)
    }

    /// Builds an instruction with an operand.
    pub fn with_operand(instr: Instruction, operand: i64) -> Result<Self, VMError> {
        Self::new(instr, Some(operand))
    }

    /// Returns the instruction, or `None` for an unknown operator.
    pub fn instruction(&self) -> Option<Instruction> {
        match self {
            AsmInstr::Known { instr, .. } => Some(*instr),
            AsmInstr::Unknown { .. } => None,
        }
    }

    pub fn operand(&self) -> Option<i64> {
        match self {
            AsmInstr::Known { operand, .. } => *operand,
            AsmInstr::Unknown { .. } => None,
        }
    }

    /// Returns an error if the operand does not match the instruction arity.
    pub fn validate(&self) -> Result<(), VMError> {
        if let AsmInstr::Known { instr, operand } = self {
            let actual = usize::from(operand.is_some());
            if actual != instr.arity() {
                return Err(VMError::ArityMismatch {
                    instruction: instr.mnemonic().to_string(),
                    expected: instr.arity(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for AsmInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmInstr::Known {
                instr,
                operand: Some(v),
            } => write!(f, "{} {}", instr.mnemonic(), v),
            AsmInstr::Known {
                instr,
                operand: None,
            } => f.write_str(instr.mnemonic()),
            AsmInstr::Unknown { text } => f.write_str(text),
        }
    }
}

impl FromStr for AsmInstr {
    type Err = VMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

/// Return the line/column/message triple for assembly-related errors.
fn assembly_error_location(err: &VMError) -> Option<(usize, usize, String)> {
    match err {
        VMError::AssemblyError {
            line,
            offset,
            source,
        } => Some((*line, *offset, source.clone())),
        _ => None,
    }
}

/// Formats a compiler-style diagnostic for assembly failures.
fn render_assembly_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    offset: usize,
    message: &str,
) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{offset}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(offset.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

/// Emit a helpful diagnostic to stderr for assembly errors.
fn log_assembly_error(file: &str, source: &str, err: &VMError) {
    if let Some((line, offset, message)) = assembly_error_location(err) {
        eprintln!(
            "{}",
            render_assembly_diagnostic(file, source, line, offset, &message)
        );
    } else {
        eprintln!("error: {err}");
    }
}

/// Label table built during the first assembly pass.
///
/// Labels map to the 1-based number of the instruction that follows them,
/// which is exactly the operand `JMP` expects.
#[derive(Debug, Default)]
pub struct AsmContext {
    labels: HashMap<String, i64>,
}

impl AsmContext {
    /// Creates an empty assembly context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a label for the given 1-based instruction number.
    pub(crate) fn define_label(&mut self, name: String, target: i64) -> Result<(), VMError> {
        if self.labels.contains_key(&name) {
            return Err(VMError::DuplicateLabel { label: name });
        }
        self.labels.insert(name, target);
        Ok(())
    }

    /// Resolves a label to its 1-based instruction number.
    pub(crate) fn resolve_label(&self, name: &str) -> Result<i64, VMError> {
        self.labels
            .get(name)
            .copied()
            .ok_or(VMError::UndefinedLabel {
                label: name.to_string(),
            })
    }
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
}

/// Tokenize a single line.
///
/// Rules:
/// - `#` starts a comment
/// - commas and whitespace separate tokens
fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut out = Vec::with_capacity(3);
    let mut start: Option<usize> = None;

    for (i, c) in line.char_indices() {
        if c == COMMENT_CHAR {
            break;
        }
        if c == ',' || c.is_whitespace() {
            if let Some(s) = start.take() {
                out.push(Token {
                    text: &line[s..i],
                    offset: s + 1,
                });
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }

    if let Some(s) = start {
        let end = line.find(COMMENT_CHAR).unwrap_or(line.len());
        out.push(Token {
            text: &line[s..end],
            offset: s + 1,
        });
    }

    out
}

/// Parse an i64 immediate
pub(crate) fn parse_i64(instr: Instruction, tok: &str) -> Result<i64, VMError> {
    tok.parse::<i64>().map_err(|_| VMError::InvalidOperand {
        instruction: instr.mnemonic(),
        token: tok.to_string(),
    })
}

/// Parses an integer or, for `JMP`, a label name.
fn parse_operand(instr: Instruction, tok: &str, ctx: &AsmContext) -> Result<i64, VMError> {
    match tok.parse::<i64>() {
        Ok(v) => Ok(v),
        Err(_) if instr == Instruction::Jmp && is_label_name(tok) => ctx.resolve_label(tok),
        Err(_) => parse_i64(instr, tok),
    }
}

/// Label names start with a letter or underscore.
fn is_label_name(tok: &str) -> bool {
    tok.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
}

/// Checks if a token is a label definition (ends with `:`)
fn is_label_def(tok: &str) -> bool {
    tok.ends_with(LABEL_SUFFIX) && is_label_name(tok)
}

/// Extracts the label name from a label definition token.
fn label_name(tok: &str) -> &str {
    &tok[..tok.len() - 1]
}

/// Decodes tokens into an [`AsmInstr`].
fn decode_tokens(tokens: &[Token], ctx: &AsmContext) -> Result<AsmInstr, VMError> {
    let Some(head) = tokens.first() else {
        return Err(VMError::EmptyInstruction);
    };

    let Some(instr) = Instruction::from_mnemonic(head.text) else {
        let text = tokens.iter().map(|t| t.text).collect::<Vec<_>>().join(" ");
        return Ok(AsmInstr::Unknown { text });
    };

    let actual = tokens.len() - 1;
    if actual != instr.arity() {
        return Err(VMError::ArityMismatch {
            instruction: head.text.to_string(),
            expected: instr.arity(),
            actual,
        });
    }

    let operand = match tokens.get(1) {
        Some(tok) => Some(parse_operand(instr, tok.text, ctx)?),
        None => None,
    };
    Ok(AsmInstr::Known { instr, operand })
}

/// Decodes one instruction's text (`"PUSH 1"`, `"HLT"`, ...).
///
/// Unknown operators decode to [`AsmInstr::Unknown`]; known ones must carry
/// exactly the operands they take.
pub fn decode(text: &str) -> Result<AsmInstr, VMError> {
    decode_tokens(&tokenize(text), &AsmContext::new())
}

/// Performs two-pass assembly.
///
/// Pass 1: tokenizes all lines and records label positions.
///
/// Pass 2: decodes instructions with label resolution.
fn assemble_lines(source: &str, source_name: &str) -> Result<Program, VMError> {
    let mut ctx = AsmContext::new();
    let mut pending: Vec<(usize, Vec<Token>)> = Vec::new();

    for (line_no, line) in source.lines().enumerate() {
        let mut tokens = tokenize(line);
        while tokens.first().is_some_and(|t| is_label_def(t.text)) {
            let label = tokens.remove(0);
            let target = pending.len() as i64 + 1;
            ctx.define_label(label_name(label.text).to_string(), target)
                .map_err(|e| VMError::AssemblyError {
                    line: line_no + 1,
                    offset: label.offset,
                    source: e.to_string(),
                })?;
        }
        if !tokens.is_empty() {
            pending.push((line_no + 1, tokens));
        }
    }

    let mut instructions = Vec::with_capacity(pending.len());
    for (line, tokens) in pending {
        let instr = decode_tokens(&tokens, &ctx).map_err(|e| VMError::AssemblyError {
            line,
            offset: tokens.get(1).map(|t| t.offset).unwrap_or(tokens[0].offset),
            source: e.to_string(),
        })?;
        if let AsmInstr::Unknown { text } = &instr {
            warn!("{source_name}:{line}: unknown instruction '{text}' will be ignored");
        }
        instructions.push(instr);
    }

    Program::new(instructions)
}

/// Assemble a full source string into a [`Program`].
///
/// One instruction per line; blank lines, comments and label-only lines do
/// not count toward instruction numbers.
pub fn assemble_source(source: impl AsRef<str>) -> Result<Program, VMError> {
    assemble_source_with_name(source.as_ref(), "<source>")
}

/// Assembles source with an associated filename for error diagnostics.
fn assemble_source_with_name(source: &str, source_name: &str) -> Result<Program, VMError> {
    let result = assemble_lines(source, source_name);
    if let Err(err) = &result {
        log_assembly_error(source_name, source, err);
    }
    result
}

/// Convenience: assemble directly from file path
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Program, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|e| VMError::IoError {
        path: path_ref.display().to_string(),
        source: e.to_string(),
    })?;
    assemble_source_with_name(&source, &path_ref.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(instr: Instruction, operand: Option<i64>) -> AsmInstr {
        AsmInstr::Known { instr, operand }
    }

    #[test]
    fn decode_bare_and_operand_forms() {
        assert_eq!(decode("START").unwrap(), known(Instruction::Start, None));
        assert_eq!(decode("PUSH 1").unwrap(), known(Instruction::Push, Some(1)));
        assert_eq!(decode("PUSH -7").unwrap(), known(Instruction::Push, Some(-7)));
        assert_eq!(decode("CMP 20").unwrap(), known(Instruction::Cmp, Some(20)));
        assert_eq!(decode("JMP 2").unwrap(), known(Instruction::Jmp, Some(2)));
    }

    #[test]
    fn decode_ignores_commas_comments_and_padding() {
        assert_eq!(
            decode("  PUSH, 5   # five").unwrap(),
            known(Instruction::Push, Some(5))
        );
        assert_eq!(decode("\tHLT#stop").unwrap(), known(Instruction::Hlt, None));
    }

    #[test]
    fn decode_unknown_operator_is_kept() {
        let instr = decode("ACC").unwrap();
        assert_eq!(
            instr,
            AsmInstr::Unknown {
                text: "ACC".to_string()
            }
        );
        assert_eq!(instr.instruction(), None);
        assert_eq!(decode("push 1").unwrap().to_string(), "push 1");
    }

    #[test]
    fn decode_missing_operand() {
        assert!(matches!(
            decode("PUSH"),
            Err(VMError::ArityMismatch {
                expected: 1,
                actual: 0,
                ..
            })
        ));
    }

    #[test]
    fn decode_unexpected_operand() {
        assert!(matches!(
            decode("POP 3"),
            Err(VMError::ArityMismatch {
                expected: 0,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn decode_invalid_operand() {
        assert!(matches!(
            decode("PUSH 1x"),
            Err(VMError::InvalidOperand {
                instruction: "PUSH",
                ..
            })
        ));
        assert!(matches!(
            decode("CMP ten"),
            Err(VMError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn decode_jmp_label_without_context() {
        assert!(matches!(
            decode("JMP top"),
            Err(VMError::UndefinedLabel { ref label }) if label == "top"
        ));
    }

    #[test]
    fn decode_empty_line() {
        assert_eq!(decode("   # nothing"), Err(VMError::EmptyInstruction));
    }

    #[test]
    fn decode_encode_round_trip() {
        for text in ["START", "HLT", "PUSH 1", "PUSH -3", "ADD", "POP", "JMP 2", "SUM", "CMP 20", "NOP"] {
            let decoded = decode(text).unwrap();
            assert_eq!(decoded.to_string(), text);
            assert_eq!(decode(&decoded.to_string()).unwrap(), decoded);
        }
    }

    #[test]
    fn from_str_delegates_to_decode() {
        let instr: AsmInstr = "SUM".parse().unwrap();
        assert_eq!(instr, known(Instruction::Sum, None));
    }

    #[test]
    fn constructors_check_arity() {
        assert!(AsmInstr::bare(Instruction::Add).is_ok());
        assert!(AsmInstr::with_operand(Instruction::Push, 3).is_ok());
        assert!(AsmInstr::bare(Instruction::Cmp).is_err());
        assert!(AsmInstr::with_operand(Instruction::Sum, 1).is_err());
    }

    #[test]
    fn tokenize_reports_columns() {
        let tokens = tokenize("  PUSH  42");
        assert_eq!(tokens.len(), 2);
        assert_eq!((tokens[0].text, tokens[0].offset), ("PUSH", 3));
        assert_eq!((tokens[1].text, tokens[1].offset), ("42", 9));
    }

    #[test]
    fn assemble_empty_source() {
        let program = assemble_source("").unwrap();
        assert!(program.is_empty());
    }

    #[test]
    fn assemble_comments_and_blank_lines() {
        let source = format!(
            r#"
            {COMMENT_CHAR} this is a comment

            PUSH 1 {COMMENT_CHAR} inline
        "#
        );
        let program = assemble_source(source).unwrap();
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn assemble_resolves_labels_to_instruction_numbers() {
        let program = assemble_source(
            r#"
            START
            top:
                PUSH 1
                JMP top
            end: HLT
                JMP end
        "#,
        )
        .unwrap();
        assert_eq!(program.len(), 5);
        assert_eq!(program.get(2).and_then(AsmInstr::operand), Some(2));
        assert_eq!(program.get(4).and_then(AsmInstr::operand), Some(4));
    }

    #[test]
    fn assemble_several_labels_on_one_line() {
        let program = assemble_source("START\na: b: HLT\nJMP a\nJMP b").unwrap();
        assert_eq!(program.len(), 4);
        assert_eq!(program.get(1), Some(&AsmInstr::bare(Instruction::Hlt).unwrap()));
        assert_eq!(program.get(2).and_then(AsmInstr::operand), Some(2));
        assert_eq!(program.get(3).and_then(AsmInstr::operand), Some(2));
    }

    #[test]
    fn assemble_duplicate_label() {
        let err = assemble_source("a: START\na: HLT").unwrap_err();
        assert!(matches!(
            err,
            VMError::AssemblyError { line: 2, ref source, .. } if source.contains("duplicate label")
        ));
    }

    #[test]
    fn assemble_undefined_label() {
        let err = assemble_source("START\nJMP nowhere").unwrap_err();
        assert!(matches!(
            err,
            VMError::AssemblyError { line: 2, offset: 5, ref source } if source.contains("undefined label")
        ));
    }

    #[test]
    fn assemble_wrong_arity_reports_line() {
        let err = assemble_source("START\n\nADD 1").unwrap_err();
        assert!(matches!(err, VMError::AssemblyError { line: 3, .. }));
    }

    #[test]
    fn assemble_keeps_unknown_operators() {
        let program = assemble_source("START\nNOP\nHLT").unwrap();
        assert_eq!(program.len(), 3);
        assert_eq!(program.get(1).and_then(AsmInstr::instruction), None);
    }

    #[test]
    fn assemble_file_missing() {
        let err = assemble_file("/definitely/not/here.asm").unwrap_err();
        assert!(matches!(err, VMError::IoError { .. }));
    }

    #[test]
    fn diagnostic_points_at_column() {
        let diag = render_assembly_diagnostic("prog.asm", "START\nPUSH x", 2, 6, "bad operand");
        assert!(diag.starts_with("error: bad operand\n --> prog.asm:2:6\n"));
        assert!(diag.contains("   2 | PUSH x"));
        assert!(diag.ends_with("  |      ^\n"));
    }
}
