//! Step observers.
//!
//! The engine calls a [`Tracer`] once after every executed instruction with a
//! [`StepEvent`]. Observers only read; whatever they do (print, block for
//! input, collect) has no effect on execution.
//!
//! - [`NoopTracer`]: discards events
//! - [`DumpTracer`]: coloured register and stack dump
//! - [`Paced`]: waits for a line of input after each event
//! - any `FnMut(&StepEvent) -> io::Result<()>` closure

use crate::virtual_machine::assembler::AsmInstr;
use crate::virtual_machine::state::Snapshot;
use std::io::{self, BufRead};
use termcolor::{Color, ColorSpec, WriteColor};

const REGISTERS_BANNER: &str = "==============REGISTERS==============";
const STACK_BANNER: &str = "================STACK================";
const SEPARATOR: &str = "--------------------------------------";
const CURRENT_LABEL: &str = "Current instruction:   ";
const NEXT_LABEL: &str = "Next instruction:      ";

/// What the engine reports after executing one instruction.
#[derive(Clone, Copy, Debug)]
pub struct StepEvent<'a> {
    /// 1-based count of executed instructions in this run.
    pub step: u64,
    /// Instruction that was just executed.
    pub instruction: &'a AsmInstr,
    /// Instruction at the new `ip`, or `None` when halted or past the end.
    pub next: Option<&'a AsmInstr>,
    /// Machine state after the instruction.
    pub snapshot: &'a Snapshot,
}

/// Observer invoked after every executed instruction.
pub trait Tracer {
    fn on_step(&mut self, event: &StepEvent<'_>) -> io::Result<()>;
}

impl<F> Tracer for F
where
    F: FnMut(&StepEvent<'_>) -> io::Result<()>,
{
    fn on_step(&mut self, event: &StepEvent<'_>) -> io::Result<()> {
        self(event)
    }
}

/// Tracer that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn on_step(&mut self, _event: &StepEvent<'_>) -> io::Result<()> {
        Ok(())
    }
}

/// Prints the registers, the full stack and the current/next instruction.
pub struct DumpTracer<W: WriteColor> {
    out: W,
}

impl<W: WriteColor> DumpTracer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn colored(&mut self, color: Color, text: &str) -> io::Result<()> {
        self.out.set_color(ColorSpec::new().set_fg(Some(color)))?;
        write!(self.out, "{text}")?;
        self.out.reset()
    }

    fn write_registers(&mut self, snap: &Snapshot) -> io::Result<()> {
        writeln!(self.out, "{REGISTERS_BANNER}")?;
        self.colored(Color::Blue, "SP: ")?;
        write!(self.out, "{} | ", snap.sp)?;
        self.colored(Color::Red, "IP: ")?;
        write!(self.out, "{} | ", snap.ip)?;
        self.colored(Color::Yellow, "ACC: ")?;
        write!(self.out, "{} | ", snap.acc)?;
        self.colored(Color::Magenta, "CMP: ")?;
        writeln!(self.out, "{}", snap.cmp)
    }

    fn write_stack(&mut self, snap: &Snapshot) -> io::Result<()> {
        writeln!(self.out, "{STACK_BANNER}")?;
        for (slot, value) in snap.stack.iter().enumerate() {
            write!(self.out, "#{slot}:\t{}\t\t{value}", hex(*value))?;
            if slot == snap.sp {
                write!(self.out, "    ")?;
                self.colored(Color::Green, "<- sp")?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }
}

impl<W: WriteColor> Tracer for DumpTracer<W> {
    fn on_step(&mut self, event: &StepEvent<'_>) -> io::Result<()> {
        self.write_registers(event.snapshot)?;
        self.write_stack(event.snapshot)?;
        writeln!(self.out, "{SEPARATOR}")?;

        self.colored(Color::Green, CURRENT_LABEL)?;
        writeln!(self.out, " {}", event.instruction)?;
        self.colored(Color::Green, NEXT_LABEL)?;
        match event.next {
            Some(next) if !event.snapshot.halt => writeln!(self.out, " {next}")?,
            _ => writeln!(self.out)?,
        }
        writeln!(self.out)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

/// Formats a slot value as `0x` followed by at least four uppercase hex digits.
fn hex(value: i64) -> String {
    if value < 0 {
        format!("-0x{:04X}", value.unsigned_abs())
    } else {
        format!("0x{:04X}", value)
    }
}

/// Wraps a tracer and blocks for one line of input after every event.
///
/// Once the input reaches end-of-file the remaining steps run unpaced.
pub struct Paced<T, R> {
    inner: T,
    input: R,
    exhausted: bool,
}

impl<T: Tracer, R: BufRead> Paced<T, R> {
    pub fn new(inner: T, input: R) -> Self {
        Self {
            inner,
            input,
            exhausted: false,
        }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Tracer, R: BufRead> Tracer for Paced<T, R> {
    fn on_step(&mut self, event: &StepEvent<'_>) -> io::Result<()> {
        self.inner.on_step(event)?;
        if !self.exhausted {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                self.exhausted = true;
            }
        }
        Ok(())
    }
}
