//! powerlang: run a script, or dump its tokens or AST.
use clap::Parser; // trait import enables PowerlangCli::parse()
use std::process::exit;

use powerlang::cli::{Command, PowerlangCli};
use powerlang::commands;
use powerlang::config::Config;
use powerlang::core::debug::init_logging;
use powerlang::core::interpreter::LogicMode;

fn main() -> anyhow::Result<()> {
    let args = PowerlangCli::parse();
    init_logging(args.verbose);

    let config = Config::load(args.config.as_deref())?;
    let pretty = args.pretty_errors || config.pretty_errors;
    let mut options = config.runtime_options();
    if args.short_circuit {
        options.logic = LogicMode::ShortCircuit;
    }
    if let Some(scope) = args.scope {
        options.scope = scope.into();
    }

    let code = match (args.cmd, args.input) {
        (Some(Command::Run { input }), _) | (None, Some(input)) => {
            commands::run::main_with_opts(&input, options, pretty)?
        }
        (Some(Command::Tokens { input }), _) => commands::tokens::main(&input, pretty)?,
        (Some(Command::Ast { input }), _) => commands::ast::main(&input, pretty)?,
        (None, None) => {
            eprintln!("Usage: powerlang <file.pow>");
            1
        }
    };
    if code != 0 {
        exit(code);
    }
    Ok(())
}
