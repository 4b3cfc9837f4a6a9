//! String-level neutralization of markup and script content.
//!
//! Each string leaf is HTML-escaped, then script blocks, `javascript:` and
//! `vbscript:` schemes, inline event handlers and `data:text/html` URIs are
//! stripped.
//!
//! The transform is idempotent: an `&` that already starts one of the
//! entities we emit is left alone, and stripping repeats until nothing
//! matches, so a second pass over sanitized output changes nothing.

use std::borrow::Cow;

use regex::Regex;

use crate::error::AdmissionError;
use crate::pipeline::envelope::RequestEnvelope;

/// Entities produced by [`escape_html`].
const ENTITIES: [&str; 8] = [
    "&amp;", "&lt;", "&gt;", "&quot;", "&#x27;", "&#x2F;", "&#x5C;", "&#96;",
];

/// Escape markup-significant characters.
pub fn escape_html(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"', '\'', '/', '\\', '`']) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 16);
    for (i, c) in input.char_indices() {
        match c {
            '&' if ENTITIES.iter().any(|e| input[i..].starts_with(e)) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            '\\' => out.push_str("&#x5C;"),
            '`' => out.push_str("&#96;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Markup sanitizer applied to every string in the envelope.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    strip: Vec<Regex>,
    max_depth: usize,
}

impl Sanitizer {
    pub fn new(max_depth: usize) -> Self {
        let patterns = [
            r"(?is)<script\b.*?</script\s*>",
            r"(?i)javascript\s*:",
            r"(?i)vbscript\s*:",
            r"(?i)\bon\w+\s*=",
            r"(?i)data\s*:\s*text(?:/|&#x2F;)html",
        ];
        let strip = patterns
            .iter()
            .map(|p| Regex::new(p).expect("built-in sanitizer pattern is valid"))
            .collect();
        Self { strip, max_depth }
    }

    /// Sanitize one string.
    pub fn clean(&self, input: &str) -> String {
        let mut value = escape_html(input).into_owned();
        loop {
            let mut changed = false;
            for re in &self.strip {
                let stripped = match re.replace_all(&value, "") {
                    Cow::Owned(stripped) => Some(stripped),
                    Cow::Borrowed(_) => None,
                };
                if let Some(stripped) = stripped {
                    value = stripped;
                    changed = true;
                }
            }
            if !changed {
                return value;
            }
        }
    }

    /// Rewrite every string leaf of body, query and params in place.
    pub fn sanitize(&self, envelope: &mut RequestEnvelope) -> Result<(), AdmissionError> {
        envelope.rewrite_strings(self.max_depth, |s| self.clean(s))
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(32)
    }
}
