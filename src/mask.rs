//! Rendering secrets safely for diagnostics.
//!
//! [`mask`] shows a fixed run of mask characters followed by the last four
//! characters of the secret. The prefix length does not depend on the secret
//! length, and secrets shorter than four characters are masked completely.
//!
//! [`Secret`] wraps the raw value so that formatting it with `{}` or `{:?}`
//! only ever prints the masked form.

use std::fmt;

/// Character used for the hidden part of a masked secret.
pub const MASK_CHAR: char = '*';

/// Number of mask characters in front of the revealed tail.
const MASK_PREFIX_LEN: usize = 8;

/// Number of trailing characters revealed.
const REVEALED_TAIL_LEN: usize = 4;

/// Mask `secret` for display.
///
/// Returns eight mask characters followed by the last four characters of the
/// secret. Secrets shorter than four characters produce twelve mask
/// characters and no plaintext at all.
///
/// ```
/// use scoped_sync::mask::mask;
///
/// assert_eq!(mask("ghp_abcdefgh1234"), "********1234");
/// assert_eq!(mask("abc"), "************");
/// ```
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    let mut masked: String = std::iter::repeat(MASK_CHAR).take(MASK_PREFIX_LEN).collect();

    if chars.len() < REVEALED_TAIL_LEN {
        masked.extend(std::iter::repeat(MASK_CHAR).take(REVEALED_TAIL_LEN));
    } else {
        masked.extend(&chars[chars.len() - REVEALED_TAIL_LEN..]);
    }
    masked
}

/// An access secret with an explicit lifetime.
///
/// The raw value is only reachable through [`Secret::expose`]. `Debug` and
/// `Display` print the masked form, and the buffer is zeroed when the value is
/// dropped.
pub struct Secret(String);

impl Secret {
    /// Wrap a raw secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret. Only the credential store writer should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// The masked form, see [`mask`].
    pub fn masked(&self) -> String {
        mask(&self.0)
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Secret").field(&self.masked()).finish()
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        let mut bytes = std::mem::take(&mut self.0).into_bytes();
        bytes.fill(0);
        std::hint::black_box(&bytes);
    }
}
