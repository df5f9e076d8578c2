//! `gasbench analyze`: static bytecode analysis, no fork involved.

use clap::Parser;

use crate::{
    common::{load_hex, Result},
    print_json,
};

/// Statically analyze contract bytecode
#[derive(Parser, Debug)]
pub struct Cmd {
    /// Bytecode as hex string (positional argument)
    #[arg(value_name = "CODE")]
    pub code: Option<String>,

    /// File containing the bytecode. If '-' is specified, it is read from stdin
    #[arg(long = "codefile")]
    pub codefile: Option<String>,
}

impl Cmd {
    /// Execute the analyze command
    pub fn run(&self) -> Result<()> {
        let bytecode = load_hex(self.code.as_deref(), self.codefile.as_deref())?;
        let report = gasbench::analyze(&bytecode).map_err(gasbench::Error::from)?;
        print_json(&report)
    }
}
