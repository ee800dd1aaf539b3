//! Dice notation parser and evaluator.
//!
//! ```text
//! [w] term ([+|-]+ term)* [label]
//! term = N | [x]d[y]
//! ```
//!
//! `x` defaults to 1 and `y` to 6; a die with fewer than two faces becomes a
//! d6. The first unsigned token after a term starts the free-text label.

use std::fmt;

use dicelog_store::DieRoll;
use rand::Rng;

/// Most dice a single `xdy` term may roll.
pub const MAX_DICE_PER_TERM: u32 = 1000;

/// Most result lines a leading repeat count may ask for.
pub const MAX_REPEAT: u32 = 100;

/// Most dice one command may roll, across every term and repetition.
pub const MAX_TOTAL_DICE: u64 = 10_000;

/// Notation guide returned for empty input, `h` and `help`.
pub const HELP: &str = "Notation:\
\n\t/r xdy          | Roll x dice with y faces and add them up.\
\n\t/r dy           | Same as 1dy.\
\n\t/r xd           | Same as xd6.\
\n\t/r xdy+z        | Roll xdy and add z.\
\n\t/r xdy-z        | Roll xdy and subtract z.\
\n\t/r xdy+vdw      | Roll xdy and vdw and add the results.\
\n\t/r xdy <text>   | Roll xdy and show <text> with the result.\
\n\t/r w xdy        | Roll xdy w times.\
\n\tThe forms above can be combined.\
\n\t/r h            | Show this guide.\
\n\t/r help         | Same as /r h.";

/// Input that names dice the roller refuses to throw.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RollError {
    #[error("too many dice in \"{0}\" (at most {max})", max = MAX_DICE_PER_TERM)]
    TooManyDice(String),

    #[error("number too large in \"{0}\"")]
    NumberTooLarge(String),

    #[error("too many dice in one roll ({0}, at most {max})", max = MAX_TOTAL_DICE)]
    TooManyDiceTotal(u64),
}

/// Text reply for a roll command and every die it threw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollOutcome {
    pub text: String,
    pub rolls: Vec<DieRoll>,
}

impl RollOutcome {
    fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rolls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Term {
    Constant(u32),
    Dice { count: u32, sides: u32 },
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Constant(n) => write!(f, "{n}"),
            Term::Dice { count, sides } => write!(f, "{count}d{sides}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SignedTerm {
    negative: bool,
    term: Term,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Expression {
    terms: Vec<SignedTerm>,
    label: String,
}

/// Parses and rolls `input`, drawing faces from `rng`.
pub fn roll<R: Rng + ?Sized>(input: &str, rng: &mut R) -> RollOutcome {
    let Some(first) = input.split_whitespace().next() else {
        return RollOutcome::text_only(HELP);
    };
    if first.eq_ignore_ascii_case("h") || first.eq_ignore_ascii_case("help") {
        return RollOutcome::text_only(HELP);
    }

    let mut text = format!("Command: \"{input}\" | Roll: ");

    let (repeat, rest) = match first.parse::<u32>() {
        Ok(count) => {
            let rest = &input.trim_start()[first.len()..];
            if rest.trim().is_empty() {
                text.push_str(&format!("{count}\n`{count}`"));
                return RollOutcome::text_only(text);
            }
            (count.clamp(1, MAX_REPEAT), rest)
        }
        Err(_) => (1, input),
    };

    let expression = match parse_expression(rest) {
        Ok(expression) => expression,
        Err(e) => {
            text.push_str(&format!("Error: {e}"));
            return RollOutcome::text_only(text);
        }
    };

    let total_dice = u64::from(repeat) * expression.dice_count();
    if total_dice > MAX_TOTAL_DICE {
        text.push_str(&format!("Error: {}", RollError::TooManyDiceTotal(total_dice)));
        return RollOutcome::text_only(text);
    }

    if repeat != 1 {
        text.push_str(&format!("{repeat} "));
    }
    if expression.terms.is_empty() {
        text.push_str("[No input]");
    } else {
        let mut normalized = String::new();
        for signed in &expression.terms {
            push_signed(&mut normalized, signed.negative, &signed.term.to_string());
        }
        text.push_str(&normalized);
    }
    if !expression.label.is_empty() {
        text.push_str(&format!(" | Tag: {}", expression.label));
    }
    text.push('\n');

    if expression.terms.is_empty() {
        text.push_str("[No result]");
        return RollOutcome::text_only(text);
    }

    let mut rolls = Vec::new();
    let lines: Vec<String> = (0..repeat)
        .map(|_| evaluate(&expression.terms, rng, &mut rolls))
        .collect();
    text.push_str(&lines.join("\n"));

    RollOutcome { text, rolls }
}

impl Expression {
    fn dice_count(&self) -> u64 {
        self.terms
            .iter()
            .map(|signed| match signed.term {
                Term::Dice { count, .. } => u64::from(count),
                Term::Constant(_) => 0,
            })
            .sum()
    }
}

fn parse_expression(input: &str) -> Result<Expression, RollError> {
    let bytes = input.as_bytes();
    let mut pos = 0;
    let mut terms = Vec::new();
    let mut label = "";

    while pos < bytes.len() {
        while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t') {
            pos += 1;
        }
        if pos == bytes.len() {
            break;
        }

        let mut negative = false;
        let mut signed = false;
        while pos < bytes.len() && matches!(bytes[pos], b'+' | b'-') {
            negative ^= bytes[pos] == b'-';
            signed = true;
            pos += 1;
        }

        if !signed && !terms.is_empty() {
            label = &input[pos..];
            break;
        }

        let start = pos;
        let mut seen_d = false;
        while pos < bytes.len() {
            match bytes[pos] {
                b'0'..=b'9' => pos += 1,
                b'd' | b'D' if !seen_d => {
                    seen_d = true;
                    pos += 1;
                }
                _ => break,
            }
        }

        let raw = &input[start..pos];
        if raw.is_empty() {
            label = &input[pos..];
            break;
        }
        terms.push(SignedTerm {
            negative,
            term: parse_term(raw)?,
        });
    }

    Ok(Expression {
        terms,
        label: label.trim().to_owned(),
    })
}

fn parse_term(raw: &str) -> Result<Term, RollError> {
    let number = |digits: &str| {
        digits
            .parse::<u32>()
            .map_err(|_| RollError::NumberTooLarge(raw.to_owned()))
    };

    let Some(at) = raw.find(['d', 'D']) else {
        return Ok(Term::Constant(number(raw)?));
    };

    let count = match &raw[..at] {
        "" => 1,
        digits => number(digits)?.max(1),
    };
    let sides = match &raw[at + 1..] {
        "" => 6,
        digits => number(digits)?,
    };
    let sides = if sides < 2 { 6 } else { sides };

    if count > MAX_DICE_PER_TERM {
        return Err(RollError::TooManyDice(raw.to_owned()));
    }
    Ok(Term::Dice { count, sides })
}

/// Rolls one line and renders it as `` `expanded` = `total` ``.
fn evaluate<R: Rng + ?Sized>(
    terms: &[SignedTerm],
    rng: &mut R,
    rolls: &mut Vec<DieRoll>,
) -> String {
    let mut line = String::new();
    let mut total: i64 = 0;

    for &SignedTerm { negative, term } in terms {
        let (value, shown) = match term {
            Term::Constant(n) => (i64::from(n), n.to_string()),
            Term::Dice { count, sides } => {
                let faces: Vec<u32> =
                    (0..count).map(|_| rng.random_range(1..=sides)).collect();
                rolls.extend(faces.iter().map(|&value| DieRoll {
                    die_size: sides,
                    value,
                }));
                let shown = faces
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                (faces.iter().map(|&f| i64::from(f)).sum(), format!("[{shown}]"))
            }
        };
        push_signed(&mut line, negative, &shown);
        total += if negative { -value } else { value };
    }

    format!("`{line}` = `{total}`")
}

/// Appends `text` with its sign; a leading `+` is omitted.
fn push_signed(out: &mut String, negative: bool, text: &str) {
    if negative {
        out.push('-');
    } else if !out.is_empty() {
        out.push('+');
    }
    out.push_str(text);
}
