//! Optional confirmation gate between identification and execution
//!
//! Not part of the engine's control flow: automated runs pass `--yes` and
//! skip it entirely.

use std::io::{self, BufRead, Write};

/// `Some(true)` for y/yes, `Some(false)` for n/no, `None` otherwise
pub fn parse_answer(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Ask until a valid answer arrives; end of input counts as "no"
pub fn ask<R: BufRead, W: Write>(prompt: &str, input: &mut R, output: &mut W) -> io::Result<bool> {
    loop {
        write!(output, "{} [y/n] ", prompt)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(false);
        }
        match parse_answer(&line) {
            Some(answer) => return Ok(answer),
            None => writeln!(output, "Invalid input. Please enter y/yes or n/no")?,
        }
    }
}

/// Ask on the terminal
pub fn ask_stdin(prompt: &str) -> io::Result<bool> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    ask(prompt, &mut input, &mut io::stdout())
}
