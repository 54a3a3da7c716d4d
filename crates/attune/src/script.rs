//! Scripted input for driving a session without a UI.
//!
//! A script is a list of steps separated by whitespace, commas or newlines:
//!
//! ```text
//! grant start clear_fragment*8 next wait:2.5 arousal=3 next
//! ```
//!
//! - any event name [`Event`] parses, optionally with `*N` to repeat it
//! - `wait:<secs>` advances the simulated clock
//! - `grant` requests audio permission, as a tap on "begin" would

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::stage::{Event, ParseEventError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Event(Event),
    Wait(Duration),
    Grant,
}

#[derive(Debug, Error, PartialEq)]
pub enum ScriptError {
    #[error("step {index} ({token}): {source}")]
    Event {
        index: usize,
        token: String,
        source: ParseEventError,
    },

    #[error("step {index}: invalid wait '{value}', expected seconds like wait:1.5")]
    Wait { index: usize, value: String },

    #[error("step {index}: invalid repeat count in '{token}'")]
    Repeat { index: usize, token: String },
}

/// Parse a whole script into steps, expanding repeats.
pub fn parse(script: &str) -> Result<Vec<Step>, ScriptError> {
    let mut steps = Vec::new();

    let tokens = script
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|t| !t.is_empty());

    for (index, token) in tokens.enumerate() {
        let lower = token.to_ascii_lowercase();

        if lower == "grant" {
            steps.push(Step::Grant);
            continue;
        }

        if let Some(value) = lower.strip_prefix("wait:") {
            let secs = f64::from_str(value)
                .ok()
                .filter(|s| s.is_finite() && *s >= 0.0)
                .ok_or_else(|| ScriptError::Wait {
                    index,
                    value: value.to_string(),
                })?;
            steps.push(Step::Wait(Duration::from_secs_f64(secs)));
            continue;
        }

        let (name, count) = match token.split_once('*') {
            Some((name, count)) => {
                let count = count.parse::<usize>().map_err(|_| ScriptError::Repeat {
                    index,
                    token: token.to_string(),
                })?;
                (name, count)
            }
            None => (token, 1),
        };

        let event = Event::from_str(name).map_err(|source| ScriptError::Event {
            index,
            token: token.to_string(),
            source,
        })?;
        steps.extend(std::iter::repeat(Step::Event(event)).take(count));
    }

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_script() {
        let steps = parse("grant, start clear_fragment*3\nwait:0.5 arousal=4").unwrap();
        assert_eq!(
            steps,
            vec![
                Step::Grant,
                Step::Event(Event::Start),
                Step::Event(Event::ClearFragment),
                Step::Event(Event::ClearFragment),
                Step::Event(Event::ClearFragment),
                Step::Wait(Duration::from_millis(500)),
                Step::Event(Event::ArousalUpdate { level: 4 }),
            ]
        );
    }

    #[test]
    fn test_empty_script() {
        assert_eq!(parse("  \n ,").unwrap(), vec![]);
    }

    #[test]
    fn test_bad_tokens_report_position() {
        assert!(matches!(parse("start bogus"), Err(ScriptError::Event { index: 1, .. })));
        assert!(matches!(parse("wait:-1"), Err(ScriptError::Wait { index: 0, .. })));
        assert!(matches!(parse("next*x"), Err(ScriptError::Repeat { index: 0, .. })));
    }
}
