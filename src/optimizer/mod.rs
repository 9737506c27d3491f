//! Line-oriented peephole optimizer over the assembly text.
//!
//! Runs between code generation and assembly. Every pass walks the line
//! stream, understands only the instructions it cares about, and passes
//! everything else through untouched. Directives and labels are never
//! moved or dropped.

use std::collections::{HashMap, HashSet};

use log::debug;

/// What a single assembly line is, as far as the optimizer cares.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Blank,
    Comment,
    Directive,
    Label(String),
    Instruction { op: String, args: Vec<String> },
}

fn classify(line: &str) -> Line {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Line::Blank;
    }
    if trimmed.starts_with('#') {
        return Line::Comment;
    }
    if trimmed.starts_with('.') {
        return Line::Directive;
    }
    if let Some((label, _)) = trimmed.split_once(':') {
        return Line::Label(label.trim().to_string());
    }

    let code = trimmed.split('#').next().unwrap_or_default().trim();
    if code.is_empty() {
        return Line::Comment;
    }
    let mut parts = code
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty());
    let op = parts.next().unwrap_or_default().to_string();
    Line::Instruction {
        op,
        args: parts.map(str::to_string).collect(),
    }
}

#[derive(Debug, Default)]
pub struct MipsOptimizer {
    labels: HashSet<String>,
    /// Method labels (`Class.method`) plus `main`; they bound the regions
    /// dead-code elimination may not touch.
    functions: HashSet<String>,
    label_references: HashMap<String, usize>,
    branch_targets: HashSet<String>,
    register_values: HashMap<String, i64>,
}

/// Run all passes, in their fixed order, over an assembly listing.
pub fn optimize(code: &str) -> String {
    let mut optimizer = MipsOptimizer::default();
    let lines: Vec<String> = code.lines().map(str::to_string).collect();

    optimizer.scan_program(&lines);
    let lines = optimizer.eliminate_dead_code(lines);
    let lines = optimizer.track_constants(lines);
    let lines = optimizer.reduce_strength(lines);
    let lines = optimizer.rewrite_load_idioms(lines);
    let lines = optimizer.remove_redundant_moves(lines);
    let lines = optimizer.remove_noops(lines);

    lines
        .into_iter()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

impl MipsOptimizer {
    /// Pass 1: program structure. Collect labels, method labels, and
    /// branch/jump reference counts; later passes consult these.
    fn scan_program(&mut self, lines: &[String]) {
        self.labels.clear();
        self.functions.clear();
        self.label_references.clear();
        self.branch_targets.clear();

        for line in lines {
            match classify(line) {
                Line::Label(label) => {
                    if label.contains('.') {
                        self.functions.insert(label.clone());
                    }
                    self.labels.insert(label);
                }
                Line::Instruction { op, args } => {
                    if matches!(op.as_str(), "j" | "jal" | "beq" | "bne" | "beqz" | "bnez") {
                        if let Some(target) = args.last() {
                            *self.label_references.entry(target.clone()).or_default() += 1;
                            self.branch_targets.insert(target.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        debug!(
            "program scan: {} labels, {} functions, {} branch targets",
            self.labels.len(),
            self.functions.len(),
            self.branch_targets.len()
        );
    }

    /// Pass 2: drop instructions that sit outside any function body. A
    /// body starts at a method label (or `main`) and ends after `jr $ra`.
    /// Calls, returns and syscalls are kept wherever they appear.
    fn eliminate_dead_code(&self, lines: Vec<String>) -> Vec<String> {
        let mut alive = vec![];
        let mut in_function = false;

        for line in lines {
            match classify(&line) {
                Line::Blank | Line::Comment | Line::Directive => alive.push(line),
                Line::Label(label) => {
                    if self.functions.contains(&label) || label == "main" {
                        in_function = true;
                    }
                    alive.push(line);
                }
                Line::Instruction { op, args } => {
                    if in_function || matches!(op.as_str(), "jal" | "jr" | "syscall") {
                        alive.push(line);
                    }
                    if op == "jr" && args.first().map(String::as_str) == Some("$ra") {
                        in_function = false;
                    }
                }
            }
        }
        alive
    }

    /// Pass 3: record which registers hold known `li` constants,
    /// invalidating on every write. Structural only; the line stream is
    /// returned unchanged.
    fn track_constants(&mut self, lines: Vec<String>) -> Vec<String> {
        self.register_values.clear();

        for line in &lines {
            let Line::Instruction { op, args } = classify(line) else {
                continue;
            };
            if op == "li" && args.len() == 2 {
                if let Ok(value) = args[1].parse::<i64>() {
                    self.register_values.insert(args[0].clone(), value);
                    continue;
                }
            }
            if let Some(destination) = args.first() {
                self.register_values.remove(destination);
            }
        }
        lines
    }

    /// Pass 4: `mul rd, rs, 2^k` → `sll rd, rs, k`.
    fn reduce_strength(&self, lines: Vec<String>) -> Vec<String> {
        lines
            .into_iter()
            .map(|line| {
                let Line::Instruction { op, args } = classify(&line) else {
                    return line;
                };
                if op != "mul" || args.len() != 3 {
                    return line;
                }
                let Ok(value) = args[2].parse::<i64>() else {
                    return line;
                };
                if value > 0 && (value & (value - 1)) == 0 {
                    let shift = 63 - value.leading_zeros() as i64;
                    return format!("\tsll {}, {}, {}", args[0], args[1], shift);
                }
                line
            })
            .collect()
    }

    /// Pass 5: three-line windows of the shapes
    /// `li t, 0; lw x, m; add d, t, x` and `li t, 1; lw x, m; mul d, t, x`
    /// (either operand order) collapse to `lw d, m`.
    fn rewrite_load_idioms(&self, lines: Vec<String>) -> Vec<String> {
        let parsed: Vec<Line> = lines.iter().map(|line| classify(line)).collect();
        let mut rewritten = vec![];
        let mut index = 0;

        while index < lines.len() {
            if index + 2 < lines.len() {
                if let Some(replacement) =
                    Self::load_idiom(&parsed[index], &parsed[index + 1], &parsed[index + 2])
                {
                    rewritten.push(replacement);
                    index += 3;
                    continue;
                }
            }
            rewritten.push(lines[index].clone());
            index += 1;
        }
        rewritten
    }

    fn load_idiom(first: &Line, second: &Line, third: &Line) -> Option<String> {
        let Line::Instruction { op: li, args: li_args } = first else {
            return None;
        };
        let Line::Instruction { op: lw, args: lw_args } = second else {
            return None;
        };
        let Line::Instruction { op: combine, args: combine_args } = third else {
            return None;
        };
        if li != "li" || lw != "lw" || li_args.len() != 2 || lw_args.len() != 2 {
            return None;
        }
        if combine_args.len() != 3 {
            return None;
        }

        let identity = li_args[1].parse::<i64>().ok()?;
        let neutral_op = match identity {
            0 => "add",
            1 => "mul",
            _ => return None,
        };
        if combine != neutral_op {
            return None;
        }

        let temp = &li_args[0];
        let loaded = &lw_args[0];
        let operands = (&combine_args[1], &combine_args[2]);
        if operands != (temp, loaded) && operands != (loaded, temp) {
            return None;
        }

        Some(format!("\tlw {}, {}", combine_args[0], lw_args[1]))
    }

    /// Pass 6: `move rd, rd` does nothing.
    fn remove_redundant_moves(&self, lines: Vec<String>) -> Vec<String> {
        lines
            .into_iter()
            .filter(|line| {
                let Line::Instruction { op, args } = classify(line) else {
                    return true;
                };
                !(op == "move" && args.len() == 2 && args[0] == args[1])
            })
            .collect()
    }

    /// Pass 7: `add`/`sub` with `$zero` as the last operand and the
    /// destination equal to the first source does nothing.
    fn remove_noops(&self, lines: Vec<String>) -> Vec<String> {
        lines
            .into_iter()
            .filter(|line| {
                let Line::Instruction { op, args } = classify(line) else {
                    return true;
                };
                let is_noop = matches!(op.as_str(), "add" | "sub")
                    && args.len() == 3
                    && args[2] == "$zero"
                    && args[0] == args[1];
                !is_noop
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_reduction_power_of_two() {
        let optimized = optimize("Fac.go:\n\tmul $a0, $t1, 8\n\tjr $ra");

        assert!(optimized.contains("\tsll $a0, $t1, 3"));
        assert!(!optimized.contains("mul"));
    }

    #[test]
    fn test_strength_reduction_skips_non_powers() {
        let optimized = optimize("Fac.go:\n\tmul $a0, $t1, 6\n\tjr $ra");

        assert!(optimized.contains("\tmul $a0, $t1, 6"));
    }

    #[test]
    fn test_dead_code_outside_functions_is_dropped() {
        let code = "\tadd $t0, $t1, $t2\nmain:\n\tli $v0, 10\n\tsyscall";
        let optimized = optimize(code);

        assert!(!optimized.contains("add $t0"));
        assert!(optimized.contains("main:"));
        assert!(optimized.contains("\tli $v0, 10"));
    }

    #[test]
    fn test_calls_survive_outside_functions() {
        let optimized = optimize("\tjal A.m\nmain:\n\tsyscall");

        assert!(optimized.contains("\tjal A.m"));
    }

    #[test]
    fn test_function_body_ends_at_jr_ra() {
        let code = "A.m:\n\tadd $a0, $t1, $a0\n\tjr $ra\n\tadd $t5, $t5, $t6\nmain:\n\tsyscall";
        let optimized = optimize(code);

        assert!(optimized.contains("\tadd $a0, $t1, $a0"));
        assert!(!optimized.contains("$t5"));
    }

    #[test]
    fn test_load_idiom_add_zero() {
        let code = "main:\n\tli $t5, 0\n\tlw $t1, 4($sp)\n\tadd $a0, $t5, $t1\n\tsyscall";
        let optimized = optimize(code);

        assert!(optimized.contains("\tlw $a0, 4($sp)"));
        assert!(!optimized.contains("$t5"));
    }

    #[test]
    fn test_load_idiom_mul_one_swapped_operands() {
        let code = "main:\n\tli $t5, 1\n\tlw $t1, 8($fp)\n\tmul $a0, $t1, $t5\n\tsyscall";
        let optimized = optimize(code);

        assert!(optimized.contains("\tlw $a0, 8($fp)"));
        assert!(!optimized.contains("mul"));
    }

    #[test]
    fn test_load_idiom_requires_matching_registers() {
        let code = "main:\n\tli $t5, 0\n\tlw $t1, 4($sp)\n\tadd $a0, $t6, $t1\n\tsyscall";
        let optimized = optimize(code);

        assert!(optimized.contains("\tli $t5, 0"));
        assert!(optimized.contains("\tadd $a0, $t6, $t1"));
    }

    #[test]
    fn test_redundant_move_removed() {
        let optimized = optimize("main:\n\tmove $a0, $a0\n\tmove $a0, $v0\n\tsyscall");

        assert!(!optimized.contains("move $a0, $a0"));
        assert!(optimized.contains("\tmove $a0, $v0"));
    }

    #[test]
    fn test_zero_noops_removed() {
        let code = "main:\n\tadd $a0, $a0, $zero\n\tsub $t1, $t1, $zero\n\tadd $a0, $t1, $zero\n\tsyscall";
        let optimized = optimize(code);

        assert!(!optimized.contains("add $a0, $a0, $zero"));
        assert!(!optimized.contains("sub $t1, $t1, $zero"));
        // destination differs from first source: not a no-op
        assert!(optimized.contains("\tadd $a0, $t1, $zero"));
    }

    #[test]
    fn test_directives_labels_and_comments_pass_through() {
        let code = ".data\nnewline: .asciiz \"\\n\"\n.text\n.globl main\nmain:\n# ERROR: marker\n\tsyscall";
        let optimized = optimize(code);

        for kept in [".data", "newline: .asciiz", ".globl main", "main:", "# ERROR: marker"] {
            assert!(optimized.contains(kept), "lost line: {kept}");
        }
    }

    #[test]
    fn test_optimizer_is_deterministic() {
        let code = "main:\n\tmul $a0, $t1, 4\n\tmove $a0, $a0\n\tsyscall";

        assert_eq!(optimize(code), optimize(code));
    }
}
