//! Model catalog.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Selectable model identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,
    #[serde(rename = "claude-3-haiku")]
    Claude3Haiku,
    #[serde(rename = "mistral-medium")]
    MistralMedium,
    #[default]
    #[serde(rename = "gemini-flash")]
    GeminiFlash,
    #[serde(rename = "gemini-pro")]
    GeminiPro,
    #[serde(rename = "llama-3-8b")]
    Llama3_8b,
    #[serde(rename = "llama-3-70b")]
    Llama3_70b,
    #[serde(rename = "llama-3.1-8b")]
    Llama31_8b,
    #[serde(rename = "llama-3.2-3b")]
    Llama32_3b,
    #[serde(rename = "mixtral-8x7b")]
    Mixtral8x7b,
    #[serde(rename = "mistral-7b")]
    Mistral7b,
    #[serde(rename = "phi-3-mini")]
    Phi3Mini,
    #[serde(rename = "phi-3-medium")]
    Phi3Medium,
    #[serde(rename = "codellama-7b")]
    CodeLlama7b,
    #[serde(rename = "zephyr-7b")]
    Zephyr7b,
    #[serde(rename = "openchat-7b")]
    OpenChat7b,
}

/// Display metadata for a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub id: ModelId,
    pub name: &'static str,
    pub provider: &'static str,
    pub free: bool,
    pub description: &'static str,
}

const fn info(
    id: ModelId,
    name: &'static str,
    provider: &'static str,
    free: bool,
    description: &'static str,
) -> ModelInfo {
    ModelInfo {
        id,
        name,
        provider,
        free,
        description,
    }
}

/// Every selectable model, premium first.
pub const CATALOG: &[ModelInfo] = &[
    info(ModelId::Gpt4Turbo, "GPT-4 Turbo", "OpenAI", false, "Most capable model for complex tasks"),
    info(ModelId::Claude3Haiku, "Claude 3 Haiku", "Anthropic", false, "Fast and efficient for most tasks"),
    info(ModelId::MistralMedium, "Mistral Medium", "Mistral", false, "Balanced performance and cost"),
    info(ModelId::GeminiFlash, "Gemini 1.5 Flash", "Google", true, "Fast, versatile model for diverse tasks"),
    info(ModelId::GeminiPro, "Gemini Pro", "Google", true, "Powerful reasoning and analysis"),
    info(ModelId::Llama3_8b, "Llama 3 8B", "Meta", true, "General purpose conversational AI"),
    info(ModelId::Llama3_70b, "Llama 3 70B", "Meta", true, "Larger model for complex reasoning"),
    info(ModelId::Llama31_8b, "Llama 3.1 8B", "Meta", true, "Latest Llama with improved capabilities"),
    info(ModelId::Llama32_3b, "Llama 3.2 3B", "Meta", true, "Lightweight, efficient model"),
    info(ModelId::Mixtral8x7b, "Mixtral 8x7B", "Mistral AI", true, "Mixture of experts model"),
    info(ModelId::Mistral7b, "Mistral 7B", "Mistral AI", true, "Efficient open source model"),
    info(ModelId::Phi3Mini, "Phi-3 Mini", "Microsoft", true, "Small but capable reasoning model"),
    info(ModelId::Phi3Medium, "Phi-3 Medium", "Microsoft", true, "Balanced size and performance"),
    info(ModelId::CodeLlama7b, "CodeLlama 7B", "Meta", true, "Code generation and analysis"),
    info(ModelId::Zephyr7b, "Zephyr 7B", "Hugging Face", true, "Fine-tuned for helpfulness"),
    info(ModelId::OpenChat7b, "OpenChat 7B", "OpenChat", true, "Open source conversational AI"),
];

impl ModelId {
    /// Identifier used in settings and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gpt4Turbo => "gpt-4-turbo",
            Self::Claude3Haiku => "claude-3-haiku",
            Self::MistralMedium => "mistral-medium",
            Self::GeminiFlash => "gemini-flash",
            Self::GeminiPro => "gemini-pro",
            Self::Llama3_8b => "llama-3-8b",
            Self::Llama3_70b => "llama-3-70b",
            Self::Llama31_8b => "llama-3.1-8b",
            Self::Llama32_3b => "llama-3.2-3b",
            Self::Mixtral8x7b => "mixtral-8x7b",
            Self::Mistral7b => "mistral-7b",
            Self::Phi3Mini => "phi-3-mini",
            Self::Phi3Medium => "phi-3-medium",
            Self::CodeLlama7b => "codellama-7b",
            Self::Zephyr7b => "zephyr-7b",
            Self::OpenChat7b => "openchat-7b",
        }
    }

    /// Model name understood by the `OpenRouter`-compatible endpoint.
    #[must_use]
    pub const fn upstream_id(self) -> &'static str {
        match self {
            Self::Gpt4Turbo => "openai/gpt-4-turbo",
            Self::Claude3Haiku => "anthropic/claude-3-haiku",
            Self::MistralMedium => "mistralai/mistral-medium",
            Self::GeminiFlash => "google/gemini-flash-1.5",
            Self::GeminiPro => "google/gemini-pro",
            Self::Llama3_8b => "meta-llama/llama-3-8b-instruct",
            Self::Llama3_70b => "meta-llama/llama-3-70b-instruct",
            Self::Llama31_8b => "meta-llama/llama-3.1-8b-instruct",
            Self::Llama32_3b => "meta-llama/llama-3.2-3b-instruct",
            Self::Mixtral8x7b => "mistralai/mixtral-8x7b-instruct",
            Self::Mistral7b => "mistralai/mistral-7b-instruct",
            Self::Phi3Mini => "microsoft/phi-3-mini-128k-instruct",
            Self::Phi3Medium => "microsoft/phi-3-medium-128k-instruct",
            Self::CodeLlama7b => "meta-llama/codellama-7b-instruct",
            Self::Zephyr7b => "huggingfaceh4/zephyr-7b-beta",
            Self::OpenChat7b => "openchat/openchat-7b",
        }
    }

    /// Catalog entry for this model.
    #[must_use]
    pub fn info(self) -> &'static ModelInfo {
        CATALOG
            .iter()
            .find(|m| m.id == self)
            .unwrap_or(&CATALOG[0])
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Unknown model identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model '{0}'")]
pub struct UnknownModel(pub String);

impl FromStr for ModelId {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        CATALOG
            .iter()
            .map(|m| m.id)
            .find(|id| id.as_str() == lower)
            .ok_or_else(|| UnknownModel(s.to_string()))
    }
}
