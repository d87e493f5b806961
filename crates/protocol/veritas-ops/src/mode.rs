//! Answer modes and their system prompts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the model should treat the user's statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Objective, sourced answer.
    #[default]
    Truth,
    /// Surface assumptions and cognitive biases.
    Bias,
    /// Strongest charitable version of the user's point.
    Steelman,
    /// Split the statement into facts, assumptions and emotions.
    Audit,
}

impl Mode {
    /// All modes, in display order.
    pub const ALL: [Mode; 4] = [Mode::Truth, Mode::Bias, Mode::Steelman, Mode::Audit];

    /// Parse a mode name, falling back to `Truth` for anything unrecognized.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Lowercase name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Truth => "truth",
            Mode::Bias => "bias",
            Mode::Steelman => "steelman",
            Mode::Audit => "audit",
        }
    }

    /// System instruction sent ahead of the user's input.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Mode::Truth => {
                "You are Veritas, an AI that delivers only objective truth. Be direct, avoid opinion, and source your facts."
            }
            Mode::Bias => {
                "You are Veritas Bias Mode. Identify assumptions, emotional reasoning, and cognitive biases in the user's statement."
            }
            Mode::Steelman => {
                "You are Veritas Steelman Mode. Interpret the user charitably and make the strongest possible version of their point."
            }
            Mode::Audit => {
                "You are Veritas Audit Mode. Break down the user's statement into verifiable facts, assumptions, and emotions."
            }
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "truth" => Ok(Mode::Truth),
            "bias" => Ok(Mode::Bias),
            "steelman" => Ok(Mode::Steelman),
            "audit" => Ok(Mode::Audit),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Steelman".parse::<Mode>().unwrap(), Mode::Steelman);
        assert_eq!(" AUDIT ".parse::<Mode>().unwrap(), Mode::Audit);
    }

    #[test]
    fn test_unknown_mode_falls_back_to_truth() {
        assert!("sarcasm".parse::<Mode>().is_err());
        assert_eq!(Mode::parse_lenient("sarcasm"), Mode::Truth);
        assert_eq!(Mode::parse_lenient(""), Mode::Truth);
    }

    #[test]
    fn test_every_mode_has_distinct_prompt() {
        let prompts: std::collections::HashSet<_> =
            Mode::ALL.iter().map(|m| m.system_prompt()).collect();
        assert_eq!(prompts.len(), Mode::ALL.len());
        assert!(Mode::Bias.system_prompt().contains("cognitive biases"));
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Mode::Bias).unwrap(), "\"bias\"");
        let mode: Mode = serde_json::from_str("\"audit\"").unwrap();
        assert_eq!(mode, Mode::Audit);
    }
}
