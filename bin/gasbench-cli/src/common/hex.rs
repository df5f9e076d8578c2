//! Hex loading utilities for gasbench

use std::{fs, io::Read};

use super::{CliError, Result};

/// Load hex-encoded bytecode from an argument or a file. If the file is a dash (-), read from
/// stdin. Priority: arg > file.
pub fn load_hex(arg: Option<&str>, file: Option<&str>) -> Result<String> {
    let hex_string = match (arg, file) {
        (Some(arg), _) => arg.to_string(),
        (None, Some("-")) => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
        (None, Some(file)) => fs::read_to_string(file)?,
        (None, None) => {
            return Err(CliError::InvalidInput(
                "no bytecode given, pass CODE or --codefile".to_string(),
            ))
        }
    };
    Ok(hex_string.trim().to_string())
}
