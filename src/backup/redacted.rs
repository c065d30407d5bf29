//! Passwords that stay out of logs.
//!
//! `RedactedString` holds the SMTP password of the report mail. It prints and
//! serializes as a placeholder and zeroes its memory on drop.

use bon::Builder;
use getset::Getters;
use derive_more::From;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Formatter};
use std::result;
use zeroize::Zeroize;

/// Shown instead of the secret in logs, debug output and serialized config.
pub static REDACTED_PASSWORD: &str = "###REDACTED_PASSWORD###";

#[derive(Clone, Zeroize, From, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct RedactedString {
    #[builder(into)]
    inner: String,
}

impl Debug for RedactedString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", REDACTED_PASSWORD)
    }
}

impl Serialize for RedactedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED_PASSWORD)
    }
}

impl<'de> Deserialize<'de> for RedactedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(RedactedStringVisitor)
    }
}

impl Drop for RedactedString {
    fn drop(&mut self) {
        self.zeroize();
    }
}

pub struct RedactedStringVisitor;

impl Visitor<'_> for RedactedStringVisitor {
    type Value = RedactedString;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a string")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(RedactedString::builder().inner(v).build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_in_debug_and_serialization() {
        let redacted = RedactedString::builder().inner("hunter2").build();
        assert_eq!(format!("{redacted:?}"), REDACTED_PASSWORD);
        assert_eq!(
            serde_json::to_string(&redacted).unwrap(),
            format!("\"{REDACTED_PASSWORD}\"")
        );
    }

    #[test]
    fn test_deserialize_keeps_secret() {
        let redacted: RedactedString = serde_yml::from_str("hunter2").unwrap();
        assert_eq!(redacted.inner(), "hunter2");
    }

    #[test]
    fn test_redacted_string_zeroize() {
        let mut redacted = RedactedString::builder().inner("hunter2").build();
        redacted.zeroize();
        assert!(redacted.inner().is_empty());
    }
}
