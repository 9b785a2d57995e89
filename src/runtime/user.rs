//! User interaction operations (confirmation prompts).

use anyhow::Result;

use super::RealRuntime;

use std::io::{self, BufRead, Write};

/// Core, testable implementation that reads from any BufRead and writes to any Write.
/// An empty answer (or end of input) selects `default`.
pub(crate) fn confirm_with_io<R: BufRead, W: Write>(
    prompt: &str,
    default: bool,
    input: &mut R,
    output: &mut W,
) -> Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    write!(output, "{} {} ", prompt, hint)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;

    let response = line.trim().to_lowercase();
    Ok(match response.as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    })
}

impl RealRuntime {
    pub(crate) fn confirm_impl(&self, prompt: &str, default: bool) -> Result<bool> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut stdin_lock = stdin.lock();
        confirm_with_io(prompt, default, &mut stdin_lock, &mut stdout)
    }
}
