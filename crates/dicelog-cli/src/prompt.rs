//! Terminal input with echo suppressed.

use std::io::{self, Write};

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use dicelog::PasswordPrompt;

/// Restores cooked mode when dropped.
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Prints `prompt` and reads one line from the terminal without echoing it.
pub fn read_hidden(prompt: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()?;

    let line = {
        let _raw = RawMode::enable()?;
        read_raw_line()
    };
    writeln!(stdout)?;
    line
}

/// Reads one visible line from stdin.
pub fn read_line(prompt: &str) -> io::Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

/// Reads a password twice and insists both entries match.
pub fn read_new_password() -> anyhow::Result<String> {
    let first = read_hidden("New password: ")?;
    let second = read_hidden("Repeat password: ")?;
    if first != second {
        anyhow::bail!("passwords do not match");
    }
    Ok(first)
}

fn read_raw_line() -> io::Result<String> {
    let mut line = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind == KeyEventKind::Release {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(line),
            KeyCode::Backspace => {
                line.pop();
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "input cancelled"));
            }
            KeyCode::Esc => {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "input cancelled"));
            }
            KeyCode::Char(c) => line.push(c),
            _ => {}
        }
    }
}

/// Asks the operator for the password whenever the server wants one.
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn password(&mut self, username: &str, attempts_left: usize) -> io::Result<String> {
        let prompt =
            format!("Password for {username} ({attempts_left} attempts left): ");
        // Blocks on the terminal.
        tokio::task::block_in_place(|| read_hidden(&prompt))
    }
}
