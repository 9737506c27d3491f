//! End-to-end scenarios through the whole pipeline: source text to
//! optimized assembly to encoded instruction words.

use mj_lang::{assembler, codegen, lexer::Lexer, optimizer, parser, semantic};

fn compile_to_assembly(source: &str) -> String {
    let tokens = Lexer::new(source).lex().expect("lexing must succeed");
    let mut tree = parser::parse(tokens).expect("parsing must succeed");
    let analysis = semantic::analyze(&mut tree).expect("analysis must succeed");
    codegen::generate(&tree, &analysis).assembly
}

fn compile_to_words(source: &str) -> Vec<u32> {
    let optimized = optimizer::optimize(&compile_to_assembly(source));
    assembler::assemble(&optimized).words
}

const EXIT_WORD: u32 = 0x0000_000C;

#[test]
fn empty_main_produces_single_exit() {
    let source = "class P { public static void main(String[] a){ } }";
    let assembly = compile_to_assembly(source);

    assert_eq!(assembly.matches("main:").count(), 1);
    assert!(assembly.contains("\tsw $fp, 0($sp)\n\tmove $fp, $sp\n\tsw $ra, -4($sp)"));
    assert!(assembly.contains("\tli $v0, 10\n\tsyscall"));

    let words = compile_to_words(source);
    let exits = words.iter().filter(|word| **word == EXIT_WORD).count();
    assert_eq!(exits, 1);
}

#[test]
fn print_literal_emits_syscall_pair() {
    let source = "class P { public static void main(String[] a){ System.out.println(42); } }";
    let assembly = compile_to_assembly(source);

    assert!(assembly.contains(
        "\tli $a0, 42\n\tli $v0, 1\n\tsyscall\n\tli $v0, 4\n\tla $a0, newline\n\tsyscall"
    ));
}

#[test]
fn constant_folding_materializes_single_literal() {
    let source = "class P { public static void main(String[] a){ System.out.println(new C().m()); } }
                  class C { public int m() { int x; x = 2 + 3 * 4; return x; } }";
    let optimized = optimizer::optimize(&compile_to_assembly(source));

    assert!(optimized.contains("\tli $a0, 14"));
    for stale in ["\tli $a0, 2\n", "\tli $a0, 3\n", "\tli $a0, 4\n"] {
        assert!(
            !optimized.contains(stale),
            "unfolded operand survived: {stale:?}"
        );
    }
}

#[test]
fn strength_reduced_multiply_assembles_as_shift() {
    let stream = "main:\n\tmul $a0, $t1, 8\n\tsyscall";
    let optimized = optimizer::optimize(stream);

    assert!(optimized.contains("\tsll $a0, $t1, 3"));

    let result = assembler::assemble(&optimized);
    assert!(result.diagnostics.is_empty());
    // sll $a0, $t1, 3: rt=9, rd=4, shamt=3, funct=0
    assert_eq!(result.words[0], 0x0009_20C0);
}

#[test]
fn inherited_call_dispatches_to_declaring_class() {
    let source = "class P { public static void main(String[] a){ System.out.println(new B().m()); } }
                  class A { public int m() { return 41; } }
                  class B extends A { public int unused() { return 0; } }";
    let assembly = compile_to_assembly(source);

    assert!(assembly.contains("\tjal A.m"));
    assert!(!assembly.contains("\tjal B.m"));
}

#[test]
fn backward_branch_encodes_signed_word_offset() {
    let code = "L1: add $a0, $a0, $a0\nbeqz $t0, L1";
    let result = assembler::assemble(code);

    assert_eq!(result.words.len(), 1);
    assert_eq!(result.words[0] & 0xFFFF, 0xFFFF);
    assert_eq!(result.words[0] >> 26, 0x4);
}

#[test]
fn whole_program_with_loops_and_arrays_assembles() {
    let source = "class P { public static void main(String[] a){ System.out.println(new Sum().go(5)); } }
                  class Sum {
                      public int go(int n) {
                          int[] v;
                          int i;
                          int total;
                          v = new int[8];
                          i = 0;
                          while (i < n) {
                              v[i] = i * 2;
                              i = i + 1;
                          }
                          total = 0;
                          i = 0;
                          while (i < v.length) {
                              if (i < n) { total = total + v[i]; } else { total = total + 0; }
                              i = i + 1;
                          }
                          return total;
                      }
                  }";
    let assembly = compile_to_assembly(source);
    let optimized = optimizer::optimize(&assembly);
    let result = assembler::assemble(&optimized);

    assert!(!result.words.is_empty());
    // everything except seq/sne/la comparisons must encode
    for diagnostic in &result.diagnostics {
        assert!(
            diagnostic.message.contains("unknown instruction"),
            "unexpected diagnostic: {diagnostic}"
        );
    }
    // allocation math: double, double, plus length word
    assert!(assembly.contains("\tadd $a0, $a0, $a0\n\tadd $a0, $a0, $a0\n\taddiu $a0, $a0, 4"));
}
