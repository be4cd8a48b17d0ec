//! Interactive topic input.

use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};

pub const TOPIC_PROMPT: &str = "Enter topic for debate: ";

/// Prompt on `output` and read one line from `input`.
pub fn read_topic<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<String> {
    write!(output, "{TOPIC_PROMPT}").context("write topic prompt")?;
    output.flush().context("flush topic prompt")?;
    let mut line = String::new();
    let read = input.read_line(&mut line).context("read topic")?;
    if read == 0 {
        bail!("no topic given on stdin");
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
