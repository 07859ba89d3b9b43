//! Credential handle shared by the key pool, dispatcher and transport

use std::fmt;

use crate::Secret;

/// One provider credential with a stable display name.
///
/// Names follow insertion order (`key1`, `key2`, ...) and, together with the
/// fingerprint, are the only identifiers that appear in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    name: String,
    fingerprint: String,
    secret: Secret<String>,
}

impl ApiKey {
    pub fn new(name: impl Into<String>, secret: Secret<String>) -> Self {
        let fingerprint = secret.fingerprint();
        Self {
            name: name.into(),
            fingerprint,
            secret,
        }
    }

    /// Build keys named `key1..keyN` from raw credential strings.
    pub fn numbered<I, S>(raw: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        raw.into_iter()
            .enumerate()
            .map(|(i, value)| Self::new(format!("key{}", i + 1), Secret::new(value.into())))
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Raw credential for the outbound call.
    pub fn expose(&self) -> &str {
        self.secret.expose()
    }

    pub fn secret(&self) -> &Secret<String> {
        &self.secret
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("name", &self.name)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_assigns_names_in_order() {
        let keys = ApiKey::numbered(["a", "b", "c"]);
        let names: Vec<&str> = keys.iter().map(ApiKey::name).collect();
        assert_eq!(names, vec!["key1", "key2", "key3"]);
        assert_eq!(keys[1].expose(), "b");
    }

    #[test]
    fn debug_and_display_never_print_secret() {
        let key = ApiKey::new("key1", Secret::new("sk-live-secret".to_string()));
        let debug = format!("{key:?}");
        let display = key.to_string();
        assert!(!debug.contains("sk-live-secret"), "debug leaked: {debug}");
        assert!(!display.contains("sk-live-secret"), "display leaked: {display}");
        assert!(display.starts_with("key1 ("));
    }
}
