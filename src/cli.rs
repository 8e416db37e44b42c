use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::core::environment::ScopeMode;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    /// `=` rebinds an existing outer variable
    #[value(alias = "define-upward")]
    Upward,
    /// `=` always binds in the current block
    Shadow,
}

impl From<ScopeArg> for ScopeMode {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Upward => ScopeMode::DefineUpward,
            ScopeArg::Shadow => ScopeMode::Shadow,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "powerlang",
    about = "Run PowerShell-flavored .pow scripts",
    version,
    propagate_version = true,
    disable_help_subcommand = true
)]
pub struct PowerlangCli {
    /// Global: pretty diagnostics
    #[arg(long = "pretty-errors", action = ArgAction::SetTrue, global = true)]
    pub pretty_errors: bool,

    /// Global: path to config (TOML); default: ~/.powerlang/config.toml
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Global: stop evaluating `-and`/`-or` once the result is known
    #[arg(long = "short-circuit", action = ArgAction::SetTrue, global = true)]
    pub short_circuit: bool,

    /// Global: how assignment treats variables of enclosing scopes
    #[arg(long = "scope", value_enum, value_name = "MODE", global = true)]
    pub scope: Option<ScopeArg>,

    /// Global: more logging (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Script to run when no subcommand is given
    #[arg(value_name = "FILE")]
    pub input: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a script
    Run {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Dump the token stream
    Tokens {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Dump the parsed program
    Ast {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}
