//! Bounded log fields for text the client controls.
//!
//! Worker stderr is a pipe; a peer that sends huge method names or paths
//! must not be able to turn each request into megabytes of log output.

use std::fmt;

/// Longest client-supplied text written into a log field, in characters.
pub const MAX_LOGGED_CHARS: usize = 256;

/// Display adapter that cuts text after [`MAX_LOGGED_CHARS`] characters.
pub(crate) struct Clipped<'a>(&'a str);

pub(crate) fn clip(text: &str) -> Clipped<'_> {
    Clipped(text)
}

impl fmt::Display for Clipped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.char_indices().nth(MAX_LOGGED_CHARS) {
            Some((at, _)) => write!(f, "{}... ({} bytes)", &self.0[..at], self.0.len()),
            None => f.write_str(self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(clip("tools/list").to_string(), "tools/list");
    }

    #[test]
    fn long_text_is_cut_on_a_char_boundary() {
        let long = "é".repeat(1000);
        let shown = clip(&long).to_string();
        assert!(shown.starts_with(&"é".repeat(MAX_LOGGED_CHARS)));
        assert!(shown.ends_with("... (2000 bytes)"));
        assert!(shown.chars().count() < MAX_LOGGED_CHARS + 20);
    }
}
