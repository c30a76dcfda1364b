use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for client contact data (email, phone) that keeps it out of log output.
///
/// `Debug` and `Display` print a redacted hint; serialization still emits the real
/// value because API responses and stored rows need it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    /// Redacted form used in logs: keeps the first character and, for emails, the domain.
    pub fn redacted(&self) -> String {
        let raw = self.0.as_ref();
        match raw.split_once('@') {
            Some((local, domain)) => {
                let head: String = local.chars().take(1).collect();
                format!("{}***@{}", head, domain)
            }
            None => {
                let tail: String = raw
                    .chars()
                    .rev()
                    .take(2)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();
                if raw.chars().count() <= 2 {
                    "********".to_string()
                } else {
                    format!("******{}", tail)
                }
            }
        }
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl From<String> for Masked<String> {
    fn from(value: String) -> Self {
        Masked(value)
    }
}

impl From<&str> for Masked<String> {
    fn from(value: &str) -> Self {
        Masked(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_is_redacted_in_logs() {
        let email = Masked::from("jane.doe@example.com");
        assert_eq!(format!("{:?}", email), "j***@example.com");
        assert_eq!(email.to_string(), "j***@example.com");
    }

    #[test]
    fn test_phone_keeps_last_digits_only() {
        let phone = Masked::from("+15551234567");
        assert_eq!(phone.to_string(), "******67");
        assert_eq!(Masked::from("12").to_string(), "********");
    }

    #[test]
    fn test_serialization_keeps_real_value() {
        let email = Masked::from("jane@example.com");
        let json = serde_json::to_string(&email).unwrap();
        assert_eq!(json, "\"jane@example.com\"");

        let back: Masked<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.into_inner(), "jane@example.com");
    }
}
