//! Client roster — the fixed, ordered list of in-app users reachable from
//! the IVR menu.
//!
//! Digit `n` on the keypad selects the `n`th roster entry (1-based). The
//! roster is built once from configuration and never mutated afterwards.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;

/// Largest roster that still fits a single-digit DTMF menu.
pub const MAX_ROSTER_LEN: usize = 9;

/// Greeting spoken before the menu options.
const PROMPT_GREETING: &str = "Welcome to our company. ";

static ROSTER_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,+\s*").expect("static regex"));

/// Ordered set of lowercase user names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    names: Vec<String>,
}

impl Roster {
    /// Build a roster from raw names.
    ///
    /// Names are trimmed and lowercased; blanks are dropped and duplicates
    /// keep the position of their first occurrence.
    pub fn build<I, S>(raw: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let names: Vec<String> = raw
            .into_iter()
            .map(|name| name.as_ref().trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .filter(|name| seen.insert(name.clone()))
            .collect();

        if names.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }
        if names.len() > MAX_ROSTER_LEN {
            return Err(ConfigError::RosterTooLarge {
                len: names.len(),
                max: MAX_ROSTER_LEN,
            });
        }

        Ok(Self { names })
    }

    /// Parse a comma-separated roster string such as `"Alice, bob,,carol"`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Self::build(ROSTER_SEPARATOR.split(raw.trim()))
    }

    /// Exact (case-sensitive) membership check.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Roster entry selected by a keypad digit string, if any.
    ///
    /// Non-numeric input, `0` and digits past the end of the roster select
    /// nothing.
    pub fn select(&self, digits: &str) -> Option<&str> {
        let digit: usize = digits.trim().parse().ok()?;
        let index = digit.checked_sub(1)?;
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Spoken IVR menu: greeting followed by one option per entry, in order.
    pub fn prompt(&self) -> String {
        self.names
            .iter()
            .enumerate()
            .fold(PROMPT_GREETING.to_string(), |mut prompt, (i, name)| {
                prompt.push_str(&format!("To speak to {name}, press {}. ", i + 1));
                prompt
            })
    }
}
