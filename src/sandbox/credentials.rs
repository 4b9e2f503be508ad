//! Credential sources for generated tools.
//!
//! Generated API tools carry a placeholder constant instead of a real key.
//! Right before execution the executor asks a [`CredentialSource`] for the
//! real value. Sources may block (the terminal prompt does), so the executor
//! calls them from a blocking task.

use secrecy::{ExposeSecret, SecretString};

/// Placeholder value generated API tools use for their key.
pub const CREDENTIAL_PLACEHOLDER: &str = "YOUR_API_KEY";

/// Supplies a real value for a credential placeholder.
pub trait CredentialSource: Send + Sync {
    /// Return the value to substitute for `placeholder`, or `None` when no
    /// credential is available.
    fn credential(&self, placeholder: &str) -> Option<SecretString>;
}

/// Reads the credential from configuration (`TOOL_API_KEY`).
#[derive(Debug, Default)]
pub struct EnvCredentials {
    value: Option<SecretString>,
}

impl EnvCredentials {
    pub fn new(value: Option<SecretString>) -> Self {
        Self { value }
    }

    pub fn from_env() -> Result<Self, crate::error::ConfigError> {
        let value = crate::config::helpers::optional_env("TOOL_API_KEY")?.map(SecretString::from);
        Ok(Self { value })
    }
}

impl CredentialSource for EnvCredentials {
    fn credential(&self, _placeholder: &str) -> Option<SecretString> {
        self.value.clone()
    }
}

/// Always answers with the same value.
pub struct StaticCredentials(SecretString);

impl StaticCredentials {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }
}

impl CredentialSource for StaticCredentials {
    fn credential(&self, _placeholder: &str) -> Option<SecretString> {
        Some(self.0.clone())
    }
}

/// Returns true if the code still carries the credential placeholder.
pub fn needs_credential(code: &str) -> bool {
    code.contains(CREDENTIAL_PLACEHOLDER)
}

/// Replace every placeholder occurrence with the real value.
pub(crate) fn substitute_credential(code: &str, value: &SecretString) -> String {
    code.replace(CREDENTIAL_PLACEHOLDER, value.expose_secret())
}
