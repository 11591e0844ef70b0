//! Extensions to the `secrecy` crate. Specifically, to make secrets comparable.

use derive_more::AsRef;
use secrecy::{ExposeSecret, Secret};
use subtle::ConstantTimeEq;

/// The literal substituted in for any redacted secret in debugging output.
pub const REDACTION_LITERAL: &str = "<REDACTED>";

/// [`Secret`], specialized to [`String`], with constant-time comparisons.
#[derive(Debug, Clone, AsRef)]
pub struct ComparableSecretString(Secret<String>);

impl PartialEq for ComparableSecretString {
    fn eq(&self, other: &Self) -> bool {
        let lhs = self.0.expose_secret().as_bytes();
        let rhs = other.0.expose_secret().as_bytes();
        ConstantTimeEq::ct_eq(lhs, rhs).into()
    }
}

impl Eq for ComparableSecretString {}

impl From<String> for ComparableSecretString {
    fn from(value: String) -> Self {
        let secret = Secret::new(value);
        Self(secret)
    }
}

impl From<&str> for ComparableSecretString {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl ComparableSecretString {
    /// Expose the secret value.
    ///
    /// Callers must take care not to log or otherwise surface this value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_secrets_compare_equal() {
        let a = ComparableSecretString::from("hunter2");
        let b = ComparableSecretString::from("hunter2");
        assert_eq!(a, b);
    }

    #[test]
    fn different_secrets_compare_unequal() {
        let a = ComparableSecretString::from("hunter2");
        let b = ComparableSecretString::from("hunter3");
        assert_ne!(a, b);
    }
}
