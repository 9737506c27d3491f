//! # mjc
//!
//! Command line driver of the mj compiler. It runs the full pipeline over
//! one source file and writes every intermediate artifact next to the
//! final binary: `tokenized.txt`, `assembly.txt`, `optimized.txt` and
//! `program.bin`.

mod cli;

use cli::*;

use std::{error::Error, fs};

use log::{error, info, warn};
use mj_lang::{assembler, codegen, lexer::Lexer, optimizer, parser, semantic};

fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::init();

    simple_logger::init_with_level((&args.verbosity).into()).unwrap();

    let source = fs::read_to_string(&args.file)?;
    fs::create_dir_all(&args.out_dir)?;

    info!("Tokenizing '{}'...", args.file.display());
    let tokens = match Lexer::new(&source).lex() {
        Ok(tokens) => tokens,
        Err(lex_error) => {
            error!("{lex_error}");
            std::process::exit(1);
        }
    };

    let token_listing = tokens
        .iter()
        .map(|token| format!("{token}\n"))
        .collect::<String>();
    fs::write(args.out_dir.join("tokenized.txt"), token_listing)?;

    if args.dump_tokens {
        info!("Tokens:\n{}", serde_json::to_string_pretty(&tokens)?);
    }

    info!("Parsing...");
    let mut tree = match parser::parse(tokens) {
        Ok(tree) => tree,
        Err(parse_error) => {
            error!("{parse_error}");
            std::process::exit(1);
        }
    };

    info!("Analyzing...");
    let analysis = match semantic::analyze(&mut tree) {
        Ok(analysis) => analysis,
        Err(semantic_error) => {
            error!("{semantic_error}");
            std::process::exit(1);
        }
    };

    if args.dump_ast {
        info!("Analyzed AST:\n{}", serde_json::to_string_pretty(&tree)?);
    }

    info!("Generating code...");
    let generated = codegen::generate(&tree, &analysis);
    for diagnostic in &generated.diagnostics {
        warn!("codegen: {diagnostic}");
    }
    fs::write(args.out_dir.join("assembly.txt"), &generated.assembly)?;

    info!("Optimizing...");
    let optimized = optimizer::optimize(&generated.assembly);
    fs::write(args.out_dir.join("optimized.txt"), &optimized)?;

    info!("Assembling...");
    let assembled = assembler::assemble(&optimized);
    for diagnostic in &assembled.diagnostics {
        warn!("assembler: {diagnostic}");
    }
    fs::write(
        args.out_dir.join("program.bin"),
        assembler::to_bytes(&assembled.words),
    )?;

    info!(
        "Wrote {} instruction words to '{}'",
        assembled.words.len(),
        args.out_dir.join("program.bin").display()
    );

    Ok(())
}
