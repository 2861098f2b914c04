use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// Fixed header set attached to every request, plus an overlay that is only
/// added for privileged operations. Values never appear in `Debug` output.
#[derive(Default)]
pub struct CredentialBundle {
    headers: Vec<(String, SecretString)>,
    privileged: Vec<(String, SecretString)>,
}

impl CredentialBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), SecretString::from(value.into())));
        self
    }

    pub fn with_privileged_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.privileged.push((name.into(), SecretString::from(value.into())));
        self
    }

    pub fn header_names(&self) -> Vec<&str> {
        self.headers.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn privileged_header_names(&self) -> Vec<&str> {
        self.privileged.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Header pairs for one request. Overlay entries replace base entries
    /// with the same (case-insensitive) name.
    pub fn headers_for(&self, privileged: bool) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(n, v)| (n.as_str(), v.expose_secret()))
            .collect();
        if privileged {
            for (name, value) in &self.privileged {
                out.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
                out.push((name.as_str(), value.expose_secret()));
            }
        }
        out
    }

    /// Scrub credential material from text that may end up in a report.
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (_, secret) in self.headers.iter().chain(self.privileged.iter()) {
            let value = secret.expose_secret();
            for token in std::iter::once(value).chain(value.split_whitespace()) {
                if token.len() >= 8 {
                    out = out.replace(token, "***");
                }
            }
        }
        out
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("headers", &self.header_names())
            .field("privileged", &self.privileged_header_names())
            .finish()
    }
}
