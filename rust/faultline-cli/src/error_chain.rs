//! Error cause chains for CLI diagnostics.
//!
//! Collects an error and its `source()` chain into one value that prints as
//!
//! ```text
//! error: <primary message>
//!   caused by: <cause 1>
//!   caused by: <cause 2>
//! ```

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorChain {
    pub primary: String,
    /// Outermost cause first.
    pub causes: Vec<String>,
}

impl ErrorChain {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            causes: Vec::new(),
        }
    }

    pub fn caused_by(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Walk the `source()` chain of `err`. Causes whose message repeats the
    /// message before them are skipped, since transparent wrappers print the
    /// same text as what they wrap.
    pub fn from_error(err: &dyn std::error::Error) -> Self {
        let mut chain = Self::new(err.to_string());
        let mut last = chain.primary.clone();
        let mut source = err.source();
        while let Some(cause) = source {
            let message = cause.to_string();
            if message != last {
                chain.causes.push(message.clone());
                last = message;
            }
            source = cause.source();
        }
        chain
    }

    pub fn format_for_display(&self) -> String {
        format!("error: {}", self)
    }
}

impl fmt::Display for ErrorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        for cause in &self.causes {
            write!(f, "\n  caused by: {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorChain {}

/// Format any error with its full cause chain.
pub fn format_error_chain(err: &dyn std::error::Error) -> String {
    ErrorChain::from_error(err).format_for_display()
}
