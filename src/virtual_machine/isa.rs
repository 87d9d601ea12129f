//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical, fixed instruction table and invokes a callback macro for code
//! generation, so the engine dispatch and the assembler never restate the
//! mnemonic list by hand.
//!
//! This module generates:
//! - The [`Instruction`] enum with dense opcode indices
//! - Mnemonic lookup in both directions and operand arity
//!
//! # Operand kinds
//!
//! - `Imm`: signed 64-bit decimal immediate
//! - `Line`: 1-based instruction number (the engine subtracts one)

/// Invokes a callback macro with the complete instruction definition list.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            /// START ; clear stack, sp and acc (cmp and halt survive)
            Start = 0, "START" => [],
            /// HLT ; set halt, clear stack and sp, then step
            Hlt = 1, "HLT" => [],
            /// PUSH n ; stack[sp] = n, sp += 1
            Push = 2, "PUSH" => [value: Imm],
            /// ADD ; acc = stack[0] + .. + stack[sp-1], stack[0] = acc, sp = 1
            Add = 3, "ADD" => [],
            /// POP ; sp -= 1 (fatal on an empty stack)
            Pop = 4, "POP" => [],
            /// JMP n ; ip = n - 1
            Jmp = 5, "JMP" => [target: Line],
            /// SUM ; cmp += acc
            Sum = 6, "SUM" => [],
            /// CMP n ; halt if cmp >= n, otherwise step
            Cmp = 7, "CMP" => [threshold: Imm],
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl Instruction {
            /// Every instruction in opcode order.
            pub const ALL: [Instruction; $crate::define_instructions!(@count $( $name ),*)] = [
                $( Instruction::$name, )*
            ];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Looks up an instruction by its exact (case-sensitive) mnemonic.
            pub fn from_mnemonic(name: &str) -> Option<Self> {
                match name {
                    $( $mnemonic => Some(Instruction::$name), )*
                    _ => None,
                }
            }

            /// Number of operands the instruction takes (0 or 1).
            pub const fn arity(&self) -> usize {
                match self {
                    $( Instruction::$name => $crate::define_instructions!(@count $( $field ),*), )*
                }
            }

            /// Returns true if the instruction requires an operand.
            pub const fn takes_operand(&self) -> bool {
                self.arity() > 0
            }
        }
    };

    (@count $( $x:ident ),* ) => {
        <[()]>::len(&[ $( $crate::define_instructions!(@unit $x) ),* ])
    };

    (@unit $x:ident) => { () };
}

for_each_instruction!(define_instructions);

/// Number of instructions in the fixed set.
pub const INSTRUCTION_COUNT: usize = Instruction::ALL.len();

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
