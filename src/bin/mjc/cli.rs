//! CLI argument handling for mjc.

use clap::{Parser, ValueEnum};

/// Struct containing the CLI configuration for mjc.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// The path to the mj source file.
    #[arg(index = 1)]
    pub file: std::path::PathBuf,

    /// Directory the pipeline artifacts are written to.
    #[arg(short, long, default_value = ".")]
    pub out_dir: std::path::PathBuf,

    /// Whether to dump the token stream as JSON (for debugging).
    #[arg(long)]
    pub dump_tokens: bool,

    /// Whether to dump the analyzed AST as JSON (for debugging).
    #[arg(long)]
    pub dump_ast: bool,

    /// Specify the log level of the compiler.
    #[arg(value_enum, short, long, default_value_t = LogLevel::default())]
    pub verbosity: LogLevel,
}

impl Cli {
    pub fn init() -> Self {
        Cli::parse()
    }
}

/// Enum for specifying the log level of mjc.
#[derive(ValueEnum, Clone, Default, Debug)]
pub enum LogLevel {
    /// The default log level. Only critical errors will be logged.
    #[default]
    #[value(alias("0"))]
    Error,

    /// Also log warnings, e.g. non-fatal codegen and assembler findings.
    #[value(alias("1"))]
    Warn,

    /// Also log information about the general state of the compiler.
    #[value(alias("2"))]
    Info,

    /// Log everything which happens internally in the compiler.
    #[value(alias("3"))]
    Debug,

    /// Log extra information beyond Debug.
    #[value(alias("4"))]
    Trace,
}

impl From<&LogLevel> for log::Level {
    fn from(value: &LogLevel) -> Self {
        match value {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}
