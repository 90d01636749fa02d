// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The two values a station account is provisioned from.
//!
//! Both values are bounded exactly once, when they are constructed. Every
//! command assembled afterwards works from the bounded value, so no step can
//! receive more than [`IDENTIFIER_MAX_CHARS`] or [`PASSWORD_MAX_CHARS`]
//! characters regardless of what was passed on the command line.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Error;

/// Portable upper bound on the length of an account name.
pub const IDENTIFIER_MAX_CHARS: usize = 8;

/// Station passwords are issued with exactly this many characters.
pub const PASSWORD_MAX_CHARS: usize = 32;

lazy_static! {
    /// A letter prefix followed by six digits, e.g. `U123456`.
    static ref STATION_FORMAT: Regex =
        Regex::new(r"^[A-Za-z][0-9]{6}$").expect("static regex is valid");
}

/// Keep at most `max` characters of `value`, never splitting a character.
fn truncate_chars(value: &str, max: usize) -> (&str, bool) {
    match value.char_indices().nth(max) {
        Some((byte_index, _)) => (&value[..byte_index], true),
        None => (value, false),
    }
}

/// The login name of the station account, also the last segment of its home
/// directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountIdentifier(String);

impl AccountIdentifier {
    /// Bound and check a raw identifier.
    ///
    /// Input longer than [`IDENTIFIER_MAX_CHARS`] is truncated. The result
    /// must be non-empty, must not look like a command-line option, and must
    /// not contain characters that change the meaning of a path or of a
    /// `name:password` line (`/`, `:`, whitespace, control characters).
    pub fn new(raw: &str) -> Result<Self, Error> {
        let (bounded, truncated) = truncate_chars(raw, IDENTIFIER_MAX_CHARS);
        if truncated {
            tracing::warn!(
                original_len = raw.chars().count(),
                identifier = bounded,
                "Identifier exceeds {} characters and was truncated",
                IDENTIFIER_MAX_CHARS
            );
        }

        if bounded.is_empty() {
            return Err(Error::InvalidInput {
                details: "identifier must not be empty".to_string(),
            });
        }
        if bounded.starts_with('-') {
            return Err(Error::InvalidInput {
                details: format!("identifier '{bounded}' must not start with '-'"),
            });
        }
        if let Some(c) = bounded
            .chars()
            .find(|c| *c == '/' || *c == ':' || c.is_whitespace() || c.is_control())
        {
            return Err(Error::InvalidInput {
                details: format!(
                    "identifier contains a forbidden character {c:?}"
                ),
            });
        }

        Ok(Self(bounded.to_string()))
    }

    /// Whether the identifier follows the letter + six digits convention.
    pub fn is_station_format(&self) -> bool {
        STATION_FORMAT.is_match(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The station's initial password.
///
/// The value is only ever handed to the password facility through its stdin
/// pipe. `Debug` and `Display` are redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct PlaintextPassword(String);

impl PlaintextPassword {
    pub fn new(raw: &str) -> Result<Self, Error> {
        let (bounded, truncated) = truncate_chars(raw, PASSWORD_MAX_CHARS);
        if truncated {
            tracing::warn!(
                "Password exceeds {} characters and was truncated",
                PASSWORD_MAX_CHARS
            );
        }

        if bounded.is_empty() {
            return Err(Error::InvalidInput {
                details: "password must not be empty".to_string(),
            });
        }
        // chpasswd reads one `name:password` record per line.
        if bounded.contains(['\n', '\r', '\0']) {
            return Err(Error::InvalidInput {
                details: "password must not contain line breaks or NUL"
                    .to_string(),
            });
        }

        let len = bounded.chars().count();
        if len < PASSWORD_MAX_CHARS {
            tracing::warn!(
                len,
                "Password is shorter than the {} characters issued to stations",
                PASSWORD_MAX_CHARS
            );
        }

        Ok(Self(bounded.to_string()))
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for PlaintextPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PlaintextPassword(<redacted>)")
    }
}

impl std::fmt::Display for PlaintextPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PASSWORD: &str = "0123456789abcdefghijABCDEFGHIJ-_";

    #[test]
    fn station_identifier_is_kept_as_is() {
        let id = AccountIdentifier::new("U123456").unwrap();
        assert_eq!(id.as_str(), "U123456");
        assert!(id.is_station_format());
    }

    #[test]
    fn long_identifier_is_truncated_to_bound() {
        let id = AccountIdentifier::new("S1234567890123456789").unwrap();
        assert_eq!(id.as_str(), "S1234567");
        assert!(!id.is_station_format());
    }

    #[test]
    fn truncation_respects_character_boundaries() {
        let id = AccountIdentifier::new("üüüüüüüüüü").unwrap();
        assert_eq!(id.as_str().chars().count(), IDENTIFIER_MAX_CHARS);
        assert_eq!(id.as_str(), "üüüüüüüü");
    }

    #[test]
    fn identifier_rejects_option_like_and_path_like_values() {
        for raw in ["", "-rf", "../etc", "a:b", "U12 456", "U1\n"] {
            assert!(
                matches!(
                    AccountIdentifier::new(raw),
                    Err(Error::InvalidInput { .. })
                ),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn password_is_truncated_to_bound() {
        let long = format!("{PASSWORD}overflow");
        let password = PlaintextPassword::new(&long).unwrap();
        assert_eq!(password.expose(), PASSWORD);
        assert_eq!(password.len(), PASSWORD_MAX_CHARS);
    }

    #[test]
    fn password_rejects_line_breaks() {
        assert!(PlaintextPassword::new("abc\ndef").is_err());
        assert!(PlaintextPassword::new("").is_err());
    }

    #[test]
    fn password_is_redacted_in_debug_and_display() {
        let password = PlaintextPassword::new(PASSWORD).unwrap();
        assert_eq!(format!("{password:?}"), "PlaintextPassword(<redacted>)");
        assert_eq!(format!("{password}"), "<redacted>");
    }

    #[test]
    #[tracing_test::traced_test]
    fn truncated_password_is_not_logged() {
        let long = format!("{PASSWORD}{PASSWORD}");
        let _ = PlaintextPassword::new(&long).unwrap();
        assert!(logs_contain("was truncated"));
        assert!(!logs_contain(PASSWORD));
    }

    proptest! {
        #[test]
        fn identifier_never_exceeds_bound(raw in "[A-Za-z][A-Za-z0-9]{0,200}") {
            let id = AccountIdentifier::new(&raw).unwrap();
            prop_assert!(id.as_str().chars().count() <= IDENTIFIER_MAX_CHARS);
            prop_assert!(raw.starts_with(id.as_str()));
        }

        #[test]
        fn arbitrary_input_never_panics(raw in "\\PC{0,512}") {
            if let Ok(id) = AccountIdentifier::new(&raw) {
                prop_assert!(id.as_str().chars().count() <= IDENTIFIER_MAX_CHARS);
            }
            if let Ok(password) = PlaintextPassword::new(&raw) {
                prop_assert!(password.len() <= PASSWORD_MAX_CHARS);
            }
        }
    }
}
