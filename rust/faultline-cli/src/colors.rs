//! ANSI color helpers for terminal output.

use std::io::IsTerminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Yellow,
    Cyan,
    Gray,
    Bold,
}

impl Color {
    fn code(self) -> &'static str {
        match self {
            Color::Red => "31",
            Color::Green => "32",
            Color::Yellow => "33",
            Color::Cyan => "36",
            Color::Gray => "90",
            Color::Bold => "1",
        }
    }
}

/// Decides whether output gets escape codes at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Colors on when stdout is a terminal and `NO_COLOR` is unset.
    pub fn detect() -> Self {
        Self::new(std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none())
    }

    pub fn plain() -> Self {
        Self::new(false)
    }

    pub fn paint(&self, color: Color, s: &str) -> String {
        if self.enabled {
            format!("\x1b[{}m{}\x1b[0m", color.code(), s)
        } else {
            s.to_string()
        }
    }

    /// Right-aligned bold green label.
    pub fn status(&self, label: &str) -> String {
        if self.enabled {
            format!("\x1b[1;32m{:>12}\x1b[0m", label)
        } else {
            format!("{:>12}", label)
        }
    }

    /// A correctness probability, red when the step is likely wrong and
    /// green when likely correct.
    pub fn probability(&self, p: f64) -> String {
        let text = format!("{:.4}", p);
        let color = if p < 0.3 {
            Color::Red
        } else if p < 0.7 {
            Color::Yellow
        } else {
            Color::Green
        };
        self.paint(color, &text)
    }
}
