//! # Safyr
//!
//! This binary is the Safyr interpreter. It combines lexer, parser, and
//! evaluator into a single application.
extern crate safyr;

mod cli;

use cli::*;

use std::{error::Error, fs, path::PathBuf};

use log::{error, info};
use safyr::{
    interpreter::{global_context, FsResolver, Interpreter},
    lexer::Lexer,
    parser::Parser,
};

fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::init();

    simple_logger::init_with_level((&args.verbosity).into()).unwrap();

    match args.command {
        Commands::Run(run_args) => run(run_args),
    }
}

fn run(args: RunArgs) -> Result<(), Box<dyn Error>> {
    let mut file = args.file.clone();
    if file.extension().is_none() {
        file.set_extension("sfr");
    }
    let file = fs::canonicalize(&file)?;
    let source = fs::read_to_string(&file)?;

    let name = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "<input>".to_string());

    if args.dump_tokens || args.dump_parsed {
        let tokens = match Lexer::named(&name, &source).tokenize() {
            Ok(tokens) => tokens,
            Err(e) => {
                error!("{e}");
                std::process::exit(1);
            }
        };
        if args.dump_tokens {
            info!("Tokens:\n{}", serde_json::to_string_pretty(&tokens)?);
        }
        if args.dump_parsed {
            match Parser::new(tokens).parse() {
                Ok(ast) => info!("Parsed AST:\n{}", serde_json::to_string_pretty(&ast)?),
                Err(e) => {
                    error!("{e}");
                    std::process::exit(1);
                }
            }
        }
    }

    let root = file
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut interpreter = Interpreter::with_resolver(Box::new(FsResolver { root }));
    let ctx = global_context();

    match interpreter.run_source(&name, &source, &ctx) {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}
