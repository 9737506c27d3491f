//! Textual model of the MIPS-like assembly dialect the code generator
//! emits. Every variant renders to exactly one line; the optimizer and the
//! assembler both re-read the rendered text, so `Display` here defines the
//! dialect.

mod reg;

use std::fmt::Display;

pub use self::reg::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Comment(String),
    Label(String),
    Directive(String),
    /// `name: .word 0` entry in `.data`.
    WordSlot(String),
    /// `name: .asciiz "…"` entry in `.data`.
    Asciiz(String, String),
    /// `lw rt, imm(rs)`
    Lw(Reg, i32, Reg),
    /// `sw rt, imm(rs)`
    Sw(Reg, i32, Reg),
    Li(Reg, i32),
    La(Reg, String),
    Move(Reg, Reg),
    Add(Reg, Reg, Reg),
    Addiu(Reg, Reg, i32),
    Sub(Reg, Reg, Reg),
    Mul(Reg, Reg, Reg),
    And(Reg, Reg, Reg),
    Slt(Reg, Reg, Reg),
    Seq(Reg, Reg, Reg),
    Sne(Reg, Reg, Reg),
    Beqz(Reg, String),
    B(String),
    J(String),
    Jal(String),
    Jr(Reg),
    Syscall,
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Instruction::Comment(comment) => format!("# {comment}"),
            Instruction::Label(label) => format!("{label}:"),
            Instruction::Directive(directive) => format!(".{directive}"),
            Instruction::WordSlot(name) => format!("{name}: .word 0"),
            Instruction::Asciiz(name, value) => format!("{name}: .asciiz \"{value}\""),
            Instruction::Lw(rt, imm, rs) => format!("\tlw {rt}, {imm}({rs})"),
            Instruction::Sw(rt, imm, rs) => format!("\tsw {rt}, {imm}({rs})"),
            Instruction::Li(rt, imm) => format!("\tli {rt}, {imm}"),
            Instruction::La(rt, label) => format!("\tla {rt}, {label}"),
            Instruction::Move(rd, rs) => format!("\tmove {rd}, {rs}"),
            Instruction::Add(rd, rs, rt) => format!("\tadd {rd}, {rs}, {rt}"),
            Instruction::Addiu(rt, rs, imm) => format!("\taddiu {rt}, {rs}, {imm}"),
            Instruction::Sub(rd, rs, rt) => format!("\tsub {rd}, {rs}, {rt}"),
            Instruction::Mul(rd, rs, rt) => format!("\tmul {rd}, {rs}, {rt}"),
            Instruction::And(rd, rs, rt) => format!("\tand {rd}, {rs}, {rt}"),
            Instruction::Slt(rd, rs, rt) => format!("\tslt {rd}, {rs}, {rt}"),
            Instruction::Seq(rd, rs, rt) => format!("\tseq {rd}, {rs}, {rt}"),
            Instruction::Sne(rd, rs, rt) => format!("\tsne {rd}, {rs}, {rt}"),
            Instruction::Beqz(rs, label) => format!("\tbeqz {rs}, {label}"),
            Instruction::B(label) => format!("\tb {label}"),
            Instruction::J(label) => format!("\tj {label}"),
            Instruction::Jal(label) => format!("\tjal {label}"),
            Instruction::Jr(rs) => format!("\tjr {rs}"),
            Instruction::Syscall => "\tsyscall".to_string(),
        };
        f.write_str(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_operand_rendering() {
        assert_eq!(
            Instruction::Lw(Reg::A0, 4, Reg::Fp).to_string(),
            "\tlw $a0, 4($fp)"
        );
        assert_eq!(
            Instruction::Sw(Reg::Fp, 0, Reg::Sp).to_string(),
            "\tsw $fp, 0($sp)"
        );
    }

    #[test]
    fn test_negative_immediates_render_signed() {
        assert_eq!(
            Instruction::Addiu(Reg::Sp, Reg::Sp, -8).to_string(),
            "\taddiu $sp, $sp, -8"
        );
    }

    #[test]
    fn test_data_entries() {
        assert_eq!(Instruction::WordSlot("x".into()).to_string(), "x: .word 0");
        assert_eq!(
            Instruction::Asciiz("newline".into(), "\\n".into()).to_string(),
            "newline: .asciiz \"\\n\""
        );
    }
}
