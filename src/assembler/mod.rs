//! Two-pass assembler: assembly text → 32-bit instruction words.
//!
//! Pass 1 walks the lines assigning a word address to every label;
//! directives and blank lines consume no space, and a line carrying a
//! label is a label, nothing else. Pass 2 encodes each instruction into
//! its R-, I- or J-type word. A line the assembler cannot encode becomes
//! a diagnostic and is skipped; assembly always runs to the end.
//!
//! The emitted words are big-endian, with no header or relocations.

use std::{collections::HashMap, fmt::Display};

use log::debug;
use once_cell::sync::Lazy;

static R_TYPE_FUNCT: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("add", 0x20),
        ("sub", 0x22),
        ("mul", 0x18),
        ("and", 0x24),
        ("slt", 0x2a),
    ])
});

static I_TYPE_OPCODE: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("addi", 0x8),
        ("addiu", 0x9),
        ("beqz", 0x4),
        ("beq", 0x4),
        ("li", 0x8),
        ("lw", 0x23),
        ("sw", 0x2b),
    ])
});

static J_TYPE_OPCODE: Lazy<HashMap<&'static str, u32>> =
    Lazy::new(|| HashMap::from([("j", 0x2), ("jal", 0x3)]));

static REGISTERS: Lazy<HashMap<String, u32>> = Lazy::new(|| {
    const NAMES: [&str; 32] = [
        "$zero", "$at", "$v0", "$v1", "$a0", "$a1", "$a2", "$a3", "$t0", "$t1", "$t2", "$t3",
        "$t4", "$t5", "$t6", "$t7", "$s0", "$s1", "$s2", "$s3", "$s4", "$s5", "$s6", "$s7", "$t8",
        "$t9", "$k0", "$k1", "$gp", "$sp", "$fp", "$ra",
    ];
    let mut map = HashMap::new();
    for (index, name) in NAMES.iter().enumerate() {
        map.insert((*name).to_string(), index as u32);
        map.insert(format!("${index}"), index as u32);
    }
    map
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmDiagnostic {
    pub line_number: usize,
    pub line: String,
    pub message: String,
}

impl Display for AsmDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: {} ('{}'); line skipped",
            self.line_number, self.message, self.line
        )
    }
}

#[derive(Debug, Clone)]
pub struct AssembleResult {
    pub words: Vec<u32>,
    pub diagnostics: Vec<AsmDiagnostic>,
}

/// Serialize instruction words as big-endian bytes.
pub fn to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_be_bytes()).collect()
}

pub fn assemble(code: &str) -> AssembleResult {
    Assembler::default().assemble(code)
}

#[derive(Debug, Default)]
pub struct Assembler {
    labels: HashMap<String, u32>,
    /// `(address, source line number, text)` kept for the second pass.
    instructions: Vec<(u32, usize, String)>,
}

type EncodeResult = Result<u32, String>;

impl Assembler {
    pub fn assemble(mut self, code: &str) -> AssembleResult {
        self.first_pass(code);

        let mut words = vec![];
        let mut diagnostics = vec![];
        for (address, line_number, line) in self.instructions.clone() {
            match self.encode_instruction(&line, address) {
                Ok(word) => words.push(word),
                Err(message) => diagnostics.push(AsmDiagnostic {
                    line_number,
                    line,
                    message,
                }),
            }
        }

        debug!(
            "assembled {} words, {} lines skipped",
            words.len(),
            diagnostics.len()
        );
        AssembleResult { words, diagnostics }
    }

    /// Pass 1: label addresses. Only plain instruction lines advance the
    /// word counter; a line holding a label holds nothing else.
    fn first_pass(&mut self, code: &str) {
        let mut address = 0u32;
        for (line_number, raw) in code.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() || line.starts_with('.') {
                continue;
            }
            if let Some((label, _)) = line.split_once(':') {
                self.labels.insert(label.trim().to_string(), address);
            } else {
                self.instructions
                    .push((address, line_number + 1, line.to_string()));
                address += 4;
            }
        }
    }

    fn register(&self, name: &str) -> Result<u32, String> {
        REGISTERS
            .get(name)
            .copied()
            .ok_or_else(|| format!("invalid register '{name}'"))
    }

    fn immediate(&self, text: &str) -> Result<i32, String> {
        let parsed = if let Some(hex) = text.strip_prefix("0x") {
            i64::from_str_radix(hex, 16)
        } else {
            text.parse::<i64>()
        };
        parsed
            .map(|value| value as i32)
            .map_err(|_| format!("invalid immediate '{text}'"))
    }

    /// Signed word offset from the instruction following the branch to
    /// the target label.
    fn branch_offset(&self, target: &str, address: u32) -> Result<i32, String> {
        if let Ok(value) = self.immediate(target) {
            return Ok(value);
        }
        let label_address = *self
            .labels
            .get(target)
            .ok_or_else(|| format!("unknown label '{target}'"))?;
        Ok((label_address as i64 - address as i64 - 4) as i32 / 4)
    }

    fn operands<'a>(parts: &'a [&'a str], expected: usize) -> Result<&'a [&'a str], String> {
        if parts.len() - 1 != expected {
            return Err(format!(
                "expected {expected} operands for '{}', got {}",
                parts[0],
                parts.len() - 1
            ));
        }
        Ok(&parts[1..])
    }

    fn memory_operand(&self, operand: &str) -> Result<(i32, u32), String> {
        let Some((offset, base)) = operand.split_once('(') else {
            return Err(format!("invalid memory operand '{operand}'"));
        };
        let base = base
            .strip_suffix(')')
            .ok_or_else(|| format!("invalid memory operand '{operand}'"))?;
        Ok((self.immediate(offset)?, self.register(base)?))
    }

    fn r_type(&self, funct: u32, rd: &str, rs: &str, rt: &str) -> EncodeResult {
        Ok((self.register(rs)? << 21)
            | (self.register(rt)? << 16)
            | (self.register(rd)? << 11)
            | funct)
    }

    fn i_type(&self, opcode: u32, rs: u32, rt: u32, immediate: i32) -> u32 {
        (opcode << 26) | (rs << 21) | (rt << 16) | (immediate as u32 & 0xFFFF)
    }

    fn encode_instruction(&self, line: &str, address: u32) -> EncodeResult {
        let parts: Vec<&str> = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|part| !part.is_empty())
            .collect();
        let op = parts[0].to_lowercase();
        let op = op.as_str();

        if let Some(&funct) = R_TYPE_FUNCT.get(op) {
            let args = Self::operands(&parts, 3)?;
            return self.r_type(funct, args[0], args[1], args[2]);
        }

        match op {
            // sll writes the shift amount into the shamt field; funct 0
            "sll" => {
                let args = Self::operands(&parts, 3)?;
                let shamt = self.immediate(args[2])? as u32 & 0x1F;
                Ok((self.register(args[1])? << 16) | (self.register(args[0])? << 11) | (shamt << 6))
            }
            "jr" => {
                let args = Self::operands(&parts, 1)?;
                Ok((self.register(args[0])? << 21) | 0x08)
            }
            "lw" | "sw" => {
                let args = Self::operands(&parts, 2)?;
                let rt = self.register(args[0])?;
                let (offset, base) = self.memory_operand(args[1])?;
                Ok(self.i_type(I_TYPE_OPCODE[op], base, rt, offset))
            }
            "beqz" => {
                let args = Self::operands(&parts, 2)?;
                let rs = self.register(args[0])?;
                let offset = self.branch_offset(args[1], address)?;
                Ok(self.i_type(I_TYPE_OPCODE[op], rs, 0, offset))
            }
            "beq" => {
                let args = Self::operands(&parts, 3)?;
                let rs = self.register(args[0])?;
                let rt = self.register(args[1])?;
                let offset = self.branch_offset(args[2], address)?;
                Ok(self.i_type(I_TYPE_OPCODE[op], rs, rt, offset))
            }
            "addi" | "addiu" => {
                let args = Self::operands(&parts, 3)?;
                let rt = self.register(args[0])?;
                let rs = self.register(args[1])?;
                let immediate = self.immediate(args[2])?;
                Ok(self.i_type(I_TYPE_OPCODE[op], rs, rt, immediate))
            }
            // li rt, imm assembles as addi rt, $zero, imm
            "li" => {
                let args = Self::operands(&parts, 2)?;
                let rt = self.register(args[0])?;
                let immediate = self.immediate(args[1])?;
                Ok(self.i_type(I_TYPE_OPCODE[op], 0, rt, immediate))
            }
            // move rd, rs assembles as add rd, $zero, rs
            "move" => {
                let args = Self::operands(&parts, 2)?;
                self.r_type(R_TYPE_FUNCT["add"], args[0], "$zero", args[1])
            }
            // b label assembles as beq $zero, $zero, label
            "b" => {
                let args = Self::operands(&parts, 1)?;
                let offset = self.branch_offset(args[0], address)?;
                Ok(self.i_type(I_TYPE_OPCODE["beq"], 0, 0, offset))
            }
            "j" | "jal" => {
                let args = Self::operands(&parts, 1)?;
                let target = *self
                    .labels
                    .get(args[0])
                    .ok_or_else(|| format!("unknown label '{}'", args[0]))?;
                Ok((J_TYPE_OPCODE[op] << 26) | ((target >> 2) & 0x03FF_FFFF))
            }
            "syscall" => Ok(0x0000_000c),
            _ => Err(format!("unknown instruction '{op}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_word(line: &str) -> u32 {
        let result = assemble(line);
        assert!(
            result.diagnostics.is_empty(),
            "diagnostics: {:?}",
            result.diagnostics
        );
        assert_eq!(result.words.len(), 1);
        result.words[0]
    }

    #[test]
    fn test_encode_r_type_add() {
        assert_eq!(single_word("\tadd $t0, $t1, $t2"), 0x012A_4020);
    }

    #[test]
    fn test_encode_r_type_sub_mul_slt_and() {
        assert_eq!(single_word("\tsub $a0, $t1, $a0") & 0x3F, 0x22);
        assert_eq!(single_word("\tmul $a0, $t1, $a0") & 0x3F, 0x18);
        assert_eq!(single_word("\tslt $a0, $t1, $a0") & 0x3F, 0x2a);
        assert_eq!(single_word("\tand $a0, $t1, $a0") & 0x3F, 0x24);
    }

    #[test]
    fn test_encode_jr_ra() {
        assert_eq!(single_word("\tjr $ra"), (31 << 21) | 0x08);
    }

    #[test]
    fn test_encode_memory_forms() {
        assert_eq!(single_word("\tlw $t0, 4($sp)"), 0x8FA8_0004);
        assert_eq!(single_word("\tsw $fp, 0($sp)"), 0xAFBE_0000);
    }

    #[test]
    fn test_encode_addiu_negative_immediate() {
        assert_eq!(single_word("\taddiu $sp, $sp, -4"), 0x27BD_FFFC);
    }

    #[test]
    fn test_encode_li_as_addi() {
        assert_eq!(single_word("\tli $v0, 10"), 0x2002_000A);
    }

    #[test]
    fn test_encode_move_as_add_with_zero() {
        assert_eq!(single_word("\tmove $a0, $v0"), 0x0002_2020);
    }

    #[test]
    fn test_encode_sll() {
        // sll $a0, $t1, 3: rt=9, rd=4, shamt=3, funct=0
        assert_eq!(single_word("\tsll $a0, $t1, 3"), 0x0009_20C0);
    }

    #[test]
    fn test_encode_syscall() {
        assert_eq!(single_word("\tsyscall"), 0x0000_000C);
    }

    #[test]
    fn test_numeric_register_names() {
        assert_eq!(single_word("\tadd $8, $9, $10"), 0x012A_4020);
    }

    #[test]
    fn test_jal_encodes_word_address() {
        let code = "\tli $v0, 0\n\tli $v0, 0\nA.m:\n\tjr $ra\nmain:\n\tjal A.m";
        let result = assemble(code);

        assert!(result.diagnostics.is_empty());
        // A.m sits at byte address 8
        assert_eq!(result.words[3], (0x3 << 26) | (8 >> 2));
    }

    #[test]
    fn test_backward_branch_offset() {
        // the label line holds no instruction, so the branch is at 0 and
        // targets itself: offset -1
        let code = "L1: add $a0, $a0, $a0\nbeqz $t0, L1";
        let result = assemble(code);

        assert_eq!(result.words.len(), 1);
        assert_eq!(result.words[0] & 0xFFFF, 0xFFFF);
    }

    #[test]
    fn test_b_expands_to_beq_zero_zero() {
        let code = "loop:\n\tb loop";
        let result = assemble(code);

        // branch at 0 to label at 0: offset -1
        assert_eq!(result.words[0], (0x4 << 26) | 0xFFFF);
    }

    #[test]
    fn test_directives_and_data_consume_no_space() {
        let code = ".data\nnewline: .asciiz \"\\n\"\nx: .word 0\n.text\n.globl main\nmain:\n\tsyscall";
        let result = assemble(code);

        assert!(result.diagnostics.is_empty());
        assert_eq!(result.words, vec![0x0000_000C]);
    }

    #[test]
    fn test_unknown_mnemonic_is_skipped_with_diagnostic() {
        let code = "main:\n\tseq $a0, $t1, $a0\n\tsyscall";
        let result = assemble(code);

        assert_eq!(result.words, vec![0x0000_000C]);
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].message.contains("unknown instruction"));
    }

    #[test]
    fn test_unknown_label_is_skipped_with_diagnostic() {
        let result = assemble("\tjal nowhere");

        assert!(result.words.is_empty());
        assert!(result.diagnostics[0].message.contains("unknown label"));
    }

    #[test]
    fn test_wrong_operand_count_is_skipped() {
        let result = assemble("\tadd $a0, $t1");

        assert!(result.words.is_empty());
        assert!(result.diagnostics[0].message.contains("expected 3 operands"));
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let code = "main:\n\tli $v0, 10\n\tsyscall";

        assert_eq!(assemble(code).words, assemble(code).words);
    }

    #[test]
    fn test_words_serialize_big_endian() {
        assert_eq!(
            to_bytes(&[0x0000_000C, 0x2002_000A]),
            vec![0x00, 0x00, 0x00, 0x0C, 0x20, 0x02, 0x00, 0x0A]
        );
    }
}
