//! Jurisdiction registry adapters for counterparty normalization (§4.D,
//! §6.4 `type: registry-ru` / `registry-kz`). Looks a legal entity up by
//! its tax/registration identifier instead of asking a language model.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::completion::Completion;
use crate::error::ProviderError;
use crate::provider_trait::AiProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jurisdiction {
    /// Russian INN: 10 digits (legal entities) or 12 (individuals/sole traders).
    Ru,
    /// Kazakhstani BIN: 12 digits.
    Kz,
}

impl Jurisdiction {
    pub fn accepts_length(self, len: usize) -> bool {
        match self {
            Jurisdiction::Ru => len == 10 || len == 12,
            Jurisdiction::Kz => len == 12,
        }
    }
}

/// Find the first run of digits in `text` whose length matches one of the
/// registry identifier lengths (10 or 12), per §4.D's router rule.
pub fn extract_identifier(text: &str) -> Option<String> {
    let mut current = String::new();
    let mut found: Option<String> = None;
    let mut flush = |current: &mut String, found: &mut Option<String>| {
        if found.is_none() && (current.len() == 10 || current.len() == 12) {
            *found = Some(std::mem::take(current));
        } else {
            current.clear();
        }
    };
    for c in text.chars() {
        if c.is_ascii_digit() {
            current.push(c);
        } else {
            flush(&mut current, &mut found);
        }
    }
    flush(&mut current, &mut found);
    found
}

pub struct RegistryAdapter {
    id: String,
    jurisdiction: Jurisdiction,
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl RegistryAdapter {
    pub fn new(id: impl Into<String>, jurisdiction: Jurisdiction, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("refnorm-engine/0.1")
            .build()
            .expect("failed to build registry HTTP client");
        Self { id: id.into(), jurisdiction, base_url: base_url.into(), api_key, http }
    }
}

#[derive(Deserialize)]
struct RegistryEntry {
    name: String,
}

#[async_trait]
impl AiProvider for RegistryAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    /// Ignores `system_prompt`; `user_prompt` is searched for a digit run
    /// matching the adapter's jurisdiction and that identifier is looked
    /// up directly against the registry.
    async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<Completion, ProviderError> {
        let identifier = extract_identifier(user_prompt).ok_or(ProviderError::EmptyResponse)?;
        if !self.jurisdiction.accepts_length(identifier.len()) {
            return Err(ProviderError::EmptyResponse);
        }

        let mut request = self.http.get(format!("{}/entities/{}", self.base_url, identifier));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus(status.as_u16()));
        }

        let entry: RegistryEntry = response.json().await?;
        if entry.name.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(Completion::new(entry.name).with_confidence(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ten_digit_run() {
        assert_eq!(extract_identifier("ИНН 7712345678 найден"), Some("7712345678".to_string()));
    }

    #[test]
    fn extracts_twelve_digit_run() {
        assert_eq!(extract_identifier("BIN: 123456789012"), Some("123456789012".to_string()));
    }

    #[test]
    fn ignores_runs_of_other_lengths() {
        assert_eq!(extract_identifier("код 12345 и еще 123"), None);
    }

    #[test]
    fn jurisdiction_accepts_only_its_lengths() {
        assert!(Jurisdiction::Ru.accepts_length(10));
        assert!(Jurisdiction::Ru.accepts_length(12));
        assert!(!Jurisdiction::Kz.accepts_length(10));
        assert!(Jurisdiction::Kz.accepts_length(12));
    }
}
