use std::fmt;

/// The shared key that callback signatures are computed with.
///
/// Formatting a `Secret` prints a mask, so a secret held in a config struct can be logged with `{:?}` safely. The key
/// material itself is only reachable through [`Secret::reveal`] and [`Secret::as_bytes`].
#[derive(Clone, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    /// Reads a secret from a configuration value. Surrounding whitespace (a trailing newline in a `.env` file, say) is
    /// not part of the key, and a blank value counts as unset.
    pub fn from_config(value: &str) -> Option<Self> {
        let value = value.trim();
        (!value.is_empty()).then(|| Self::new(value))
    }

    pub fn reveal(&self) -> &str {
        &self.0
    }

    /// The HMAC key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}
