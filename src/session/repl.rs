//! REPL mode detection for debug console input

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::common::Error;
use crate::engine::{DebugEngine, FrameId};

/// How debug console input is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplMode {
    /// Evaluate input as an expression
    Variable,
    /// Run input as a debugger command
    Command,
    /// Decide per line
    #[default]
    Auto,
}

impl ReplMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Variable => "variable",
            Self::Command => "command",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for ReplMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "variable" => Ok(Self::Variable),
            "command" => Ok(Self::Command),
            "auto" => Ok(Self::Auto),
            other => Err(Error::InvalidReplMode(other.to_string())),
        }
    }
}

/// Outcome of classifying one console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplDetection {
    /// `Auto` only for partial input that cannot be decided yet
    pub mode: ReplMode,
    /// The input with any escape prefix removed
    pub expression: String,
    /// Shown to the user when a token is both a variable and a command
    pub warning: Option<String>,
}

/// Classify `expression` as a variable expression or a debugger command
///
/// `partial` is set when the client asks about a line that is still being
/// typed (completions); a first token with nothing after it may still grow
/// and is left undecided.
pub fn detect_repl_mode<E: DebugEngine>(
    engine: &E,
    frame: Option<FrameId>,
    expression: &str,
    escape_prefix: &str,
    mode: ReplMode,
    partial: bool,
) -> ReplDetection {
    let decided = |mode| ReplDetection {
        mode,
        expression: expression.to_string(),
        warning: None,
    };

    if !expression.is_empty() {
        if let Some(command) = expression.strip_prefix(escape_prefix) {
            return ReplDetection {
                mode: ReplMode::Command,
                expression: command.to_string(),
                warning: None,
            };
        }
    }

    match mode {
        ReplMode::Variable | ReplMode::Command => decided(mode),
        ReplMode::Auto => {
            let input = expression.trim_start_matches(|c: char| c.is_ascii_whitespace());
            let (term, rest) = input
                .find(|c: char| c.is_ascii_whitespace())
                .map(|end| input.split_at(end))
                .unwrap_or((input, ""));

            if partial && rest.is_empty() {
                return decided(ReplMode::Auto);
            }

            let is_command = !term.is_empty() && engine.command_exists(term);
            let is_variable = !term.is_empty()
                && frame
                    .and_then(|frame| engine.find_variable(frame, term))
                    .is_some();

            // Variables win: commands stay reachable through the prefix
            let mut detection = match (is_variable, is_command) {
                (false, true) => decided(ReplMode::Command),
                _ => decided(ReplMode::Variable),
            };

            if is_variable && is_command {
                let warning = format!(
                    "Warning: Expression '{term}' is both a debugger command and variable. \
                     It will be evaluated as a variable. To evaluate the expression as a \
                     debugger command, use '{escape_prefix}' as a prefix.\n"
                );
                tracing::warn!(term, "Console input is both a command and a variable");
                detection.warning = Some(warning);
            }

            detection
        }
    }
}
