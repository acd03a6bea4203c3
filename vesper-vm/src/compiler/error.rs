// vesper-vm - Bytecode compiler and virtual machine for the Vesper programming language
// Copyright (c) 2025 The Vesper Authors. MIT licensed.

//! Compile-time error reporting.

use std::fmt;

/// What the error message points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
    /// The token whose lexeme is quoted in the message.
    Lexeme(String),
    /// End of input.
    End,
    /// No location text; used for scanner errors, whose message already
    /// says what was wrong.
    None,
}

/// A single compile error.
///
/// Displays as `[line N] Error at 'lexeme': message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub line: u32,
    pub location: ErrorLocation,
    pub message: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error", self.line)?;
        match &self.location {
            ErrorLocation::Lexeme(lexeme) => write!(f, " at '{}'", lexeme)?,
            ErrorLocation::End => write!(f, " at end")?,
            ErrorLocation::None => {}
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for CompileError {}

/// Everything the compiler reported for one source text. Panic-mode
/// recovery means one syntax error can suppress its immediate cascade but
/// later statements still get their own reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileReport {
    pub errors: Vec<CompileError>,
}

impl fmt::Display for CompileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileReport {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_match_the_reporting_convention() {
        let at_token = CompileError {
            line: 3,
            location: ErrorLocation::Lexeme("}".to_string()),
            message: "Expect expression.".to_string(),
        };
        assert_eq!(at_token.to_string(), "[line 3] Error at '}': Expect expression.");

        let at_end = CompileError {
            line: 9,
            location: ErrorLocation::End,
            message: "Expect '}' after block.".to_string(),
        };
        assert_eq!(at_end.to_string(), "[line 9] Error at end: Expect '}' after block.");

        let bare = CompileError {
            line: 1,
            location: ErrorLocation::None,
            message: "Unterminated string.".to_string(),
        };
        assert_eq!(bare.to_string(), "[line 1] Error: Unterminated string.");
    }
}
