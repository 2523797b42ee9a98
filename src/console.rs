//! Interactive console shell.
//!
//! A line-oriented loop over any reader/writer pair, so tests can drive it
//! with in-memory buffers. The session therapy type is asked for once at
//! startup (unless given on the command line) and applies to every question.

use anyhow::Result;
use std::io::{BufRead, Write};

use panchakarma_core::Responder;

pub const BANNER: &str = "=== Panchakarma Chatbot (Hybrid Gemini Console Mode) ===";
pub const THERAPY_PROMPT: &str = "Enter therapy type (optional, e.g., Virechana): ";
pub const USER_PROMPT: &str = "You: ";
pub const FAREWELL: &str = "Thank you! Stay healthy.";

const EXIT_WORDS: [&str; 3] = ["quit", "exit", "bye"];

fn is_exit_word(input: &str) -> bool {
    EXIT_WORDS.iter().any(|w| input.eq_ignore_ascii_case(w))
}

/// Read one trimmed line, or `None` at end of input.
fn read_trimmed<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Run the console session until an exit word or end of input.
pub async fn run_console<R: BufRead, W: Write>(
    responder: &Responder,
    therapy: Option<String>,
    mut reader: R,
    mut writer: W,
) -> Result<()> {
    writeln!(writer, "{}", BANNER)?;

    let therapy = match therapy {
        Some(t) => t.trim().to_string(),
        None => {
            write!(writer, "{}", THERAPY_PROMPT)?;
            writer.flush()?;
            read_trimmed(&mut reader)?.unwrap_or_default()
        }
    };
    let label = if therapy.is_empty() {
        "General"
    } else {
        therapy.as_str()
    };
    writeln!(writer, "Therapy set to: {}\n", label)?;

    loop {
        write!(writer, "{}", USER_PROMPT)?;
        writer.flush()?;

        let Some(input) = read_trimmed(&mut reader)? else {
            writeln!(writer)?;
            break;
        };

        if is_exit_word(&input) {
            writeln!(writer, "{}", FAREWELL)?;
            break;
        }
        if input.is_empty() {
            continue;
        }

        let response = responder.respond(&input, Some(&therapy)).await;
        writeln!(writer, "\nBot: {}", response)?;
        writeln!(writer, "{}", "-".repeat(50))?;
    }

    writer.flush()?;
    Ok(())
}
