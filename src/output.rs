//! # Terminal Styling
//!
//! Decides whether the human-readable reports use color and emoji. A
//! successful run reports on stdout and a failed one on stderr, so the
//! decision is made per stream: `scoped-sync sync ... > summary.txt` keeps
//! a styled failure report on the terminal and a plain success report in
//! the file.
//!
//! `--color always|never` wins. With `auto` the usual conventions apply
//! before falling back to terminal detection:
//!
//! - `NO_COLOR` set (even empty), `CLICOLOR=0` or `TERM=dumb` turn styling off
//! - `CLICOLOR_FORCE` set to anything but `0` turns it on
//!
//! ```
//! use console::Style;
//! use scoped_sync::output::{ColorChoice, OutputConfig, Stream};
//!
//! let painter = OutputConfig::new(ColorChoice::Never).painter(Stream::Stdout);
//! assert_eq!(painter.marker("✅", "[OK]"), "[OK]");
//! assert_eq!(painter.paint(&Style::new().green(), "Ready:"), "Ready:");
//! ```

use clap::ValueEnum;
use console::{Style, Term};
use std::env;
use std::ffi::OsString;

/// Value of the global `--color` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Style streams that are terminals, honoring NO_COLOR and CLICOLOR
    #[default]
    Auto,
    /// Always style
    Always,
    /// Never style
    Never,
}

/// Output stream a report is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Styling decision for both output streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    stdout: bool,
    stderr: bool,
}

impl OutputConfig {
    /// Resolve `choice` against the process environment and the terminal.
    pub fn new(choice: ColorChoice) -> Self {
        Self::resolve(
            choice,
            |key| env::var_os(key),
            |stream| match stream {
                Stream::Stdout => Term::stdout().features().colors_supported(),
                Stream::Stderr => Term::stderr().features().colors_supported(),
            },
        )
    }

    fn resolve(
        choice: ColorChoice,
        var: impl Fn(&str) -> Option<OsString>,
        is_color_terminal: impl Fn(Stream) -> bool,
    ) -> Self {
        let convention = environment_preference(&var);
        let decide = |stream| match choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => convention.unwrap_or_else(|| is_color_terminal(stream)),
        };
        Self {
            stdout: decide(Stream::Stdout),
            stderr: decide(Stream::Stderr),
        }
    }

    /// Whether reports written to `stream` are styled.
    pub fn enabled(&self, stream: Stream) -> bool {
        match stream {
            Stream::Stdout => self.stdout,
            Stream::Stderr => self.stderr,
        }
    }

    /// Styling helper for a report written to `stream`.
    pub fn painter(&self, stream: Stream) -> Painter {
        Painter {
            styled: self.enabled(stream),
        }
    }
}

/// What NO_COLOR, CLICOLOR, CLICOLOR_FORCE and TERM ask for, if anything.
fn environment_preference(var: &impl Fn(&str) -> Option<OsString>) -> Option<bool> {
    let is = |key: &str, value: &str| var(key).is_some_and(|v| v == value);

    if var("NO_COLOR").is_some() || is("CLICOLOR", "0") {
        return Some(false);
    }
    if var("CLICOLOR_FORCE").is_some_and(|v| !v.is_empty() && v != "0") {
        return Some(true);
    }
    if is("TERM", "dumb") {
        return Some(false);
    }
    None
}

/// Applies styling to the text of one report.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    styled: bool,
}

impl Painter {
    /// A painter that never styles.
    pub fn plain() -> Self {
        Self { styled: false }
    }

    /// `emoji` when styling, the bracketed `plain` tag otherwise.
    pub fn marker<'a>(&self, emoji: &'a str, plain: &'a str) -> &'a str {
        if self.styled {
            emoji
        } else {
            plain
        }
    }

    /// Apply `style` to `text` when styling.
    pub fn paint(&self, style: &Style, text: &str) -> String {
        if self.styled {
            style.clone().force_styling(true).apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }
}
