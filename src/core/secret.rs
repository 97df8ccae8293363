//! Credential masking for task results and logs.
//!
//! Error bodies from model endpoints sometimes echo the request's API key.
//! Everything recorded on a task or logged passes through [`mask_secrets`].

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Patterns that match API key formats accepted by the supported endpoints.
const SECRET_PATTERNS: &[(&str, &str)] = &[
    (r"sk-or-v1-[a-zA-Z0-9]{20,}", "[MASKED_OPENROUTER_KEY]"),
    (r"sk-ant-[a-zA-Z0-9-]{20,}", "[MASKED_ANTHROPIC_KEY]"),
    (r"sk-proj-[a-zA-Z0-9-]{20,}", "[MASKED_OPENAI_KEY]"),
    (r"sk-[a-zA-Z0-9]{20,}", "[MASKED_API_KEY]"),
    (r"(?i)bearer\s+[a-zA-Z0-9._-]+", "[MASKED_BEARER_TOKEN]"),
];

/// Compiled secret patterns.
pub struct SecretMasker {
    patterns: Vec<(Regex, &'static str)>,
}

impl Default for SecretMasker {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretMasker {
    /// Create a masker with the default patterns.
    #[must_use]
    pub fn new() -> Self {
        let patterns = SECRET_PATTERNS
            .iter()
            .filter_map(|(pattern, replacement)| {
                Regex::new(pattern).ok().map(|re| (re, *replacement))
            })
            .collect();

        Self { patterns }
    }

    /// Mask secrets in a string.
    #[must_use]
    pub fn mask<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut result = Cow::Borrowed(text);

        for (pattern, replacement) in &self.patterns {
            if pattern.is_match(&result) {
                result = Cow::Owned(pattern.replace_all(&result, *replacement).into_owned());
            }
        }

        result
    }
}

static MASKER: LazyLock<SecretMasker> = LazyLock::new(SecretMasker::new);

/// Mask known key formats, plus an exact secret if one is given.
#[must_use]
pub fn mask_secrets<'a>(text: &'a str, known: Option<&str>) -> Cow<'a, str> {
    let masked = MASKER.mask(text);
    match known {
        Some(secret) if secret.len() >= 8 && masked.contains(secret) => {
            Cow::Owned(masked.replace(secret, "[MASKED_SECRET]"))
        }
        _ => masked,
    }
}
