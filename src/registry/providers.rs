//! The provider table

use serde::Serialize;

/// The request/response shape an API follows.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Compatibility {
    OpenAI,
    Anthropic,
    Custom,
}

#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuthType {
    ApiKey,
    /// Personal access token
    Pat,
    #[serde(rename = "oauth")]
    #[strum(serialize = "oauth")]
    OAuth,
    None,
}

/// A request used to check that a provider is reachable.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProbeSpec {
    pub method: &'static str,
    pub path: &'static str,
    pub headers: &'static [(&'static str, &'static str)],
}

impl ProbeSpec {
    const fn get(path: &'static str) -> ProbeSpec {
        ProbeSpec {
            method: "GET",
            path,
            headers: &[],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownProvider {
    pub slug: &'static str,
    pub name: &'static str,
    pub domains: &'static [&'static str],
    /// The canonical base URL. `None` only for deployment-specific providers,
    /// whose endpoint depends on the customer's account.
    pub api_url: Option<&'static str>,
    pub description: &'static str,
    pub compatibility: Compatibility,
    pub auth_type: AuthType,
    pub is_local: bool,
    pub default_local_url: Option<&'static str>,
    pub models_probe: ProbeSpec,
    pub health_probe: Option<ProbeSpec>,
    pub deployment_specific: bool,
}

impl KnownProvider {
    /// The URL a caller should use for this provider, if there is a single one.
    pub fn base_url(&self) -> Option<&'static str> {
        if self.is_local {
            self.default_local_url
        } else {
            self.api_url
        }
    }
}

const MODELS_V1: ProbeSpec = ProbeSpec::get("/v1/models");

// Cloud providers with an OpenAI compatible surface differ only in name,
// domains and endpoint.
const fn openai_compatible(
    slug: &'static str,
    name: &'static str,
    domains: &'static [&'static str],
    api_url: &'static str,
    description: &'static str,
) -> KnownProvider {
    KnownProvider {
        slug,
        name,
        domains,
        api_url: Some(api_url),
        description,
        compatibility: Compatibility::OpenAI,
        auth_type: AuthType::ApiKey,
        is_local: false,
        default_local_url: None,
        models_probe: MODELS_V1,
        health_probe: None,
        deployment_specific: false,
    }
}

/// Every known provider. Lookups that match several entries resolve to the
/// earliest one.
pub(super) static PROVIDERS: &[KnownProvider] = &[
    openai_compatible(
        "openai",
        "OpenAI",
        &["openai.com", "platform.openai.com"],
        "https://api.openai.com",
        "GPT models, embeddings, image and audio generation",
    ),
    KnownProvider {
        slug: "anthropic",
        name: "Anthropic",
        domains: &["anthropic.com", "console.anthropic.com"],
        api_url: Some("https://api.anthropic.com"),
        description: "Claude family of models",
        compatibility: Compatibility::Anthropic,
        auth_type: AuthType::ApiKey,
        is_local: false,
        default_local_url: None,
        models_probe: ProbeSpec {
            method: "GET",
            path: "/v1/models",
            headers: &[("anthropic-version", "2023-06-01")],
        },
        health_probe: None,
        deployment_specific: false,
    },
    openai_compatible(
        "mistral",
        "Mistral AI",
        &["mistral.ai", "console.mistral.ai"],
        "https://api.mistral.ai",
        "Open-weight and commercial Mistral models",
    ),
    openai_compatible(
        "groq",
        "Groq",
        &["groq.com", "console.groq.com"],
        "https://api.groq.com/openai",
        "Low-latency inference on LPU hardware",
    ),
    openai_compatible(
        "together",
        "Together AI",
        &["together.ai", "together.xyz"],
        "https://api.together.xyz",
        "Hosted open-source models",
    ),
    openai_compatible(
        "fireworks",
        "Fireworks AI",
        &["fireworks.ai"],
        "https://api.fireworks.ai/inference",
        "Fast inference for open models",
    ),
    openai_compatible(
        "deepseek",
        "DeepSeek",
        &["deepseek.com", "platform.deepseek.com"],
        "https://api.deepseek.com",
        "DeepSeek chat and reasoning models",
    ),
    KnownProvider {
        slug: "cohere",
        name: "Cohere",
        domains: &["cohere.com", "cohere.ai", "dashboard.cohere.com"],
        api_url: Some("https://api.cohere.com"),
        description: "Command models, embeddings and rerankers",
        compatibility: Compatibility::Custom,
        auth_type: AuthType::ApiKey,
        is_local: false,
        default_local_url: None,
        models_probe: MODELS_V1,
        health_probe: None,
        deployment_specific: false,
    },
    openai_compatible(
        "perplexity",
        "Perplexity",
        &["perplexity.ai"],
        "https://api.perplexity.ai",
        "Search-grounded Sonar models",
    ),
    KnownProvider {
        slug: "openrouter",
        name: "OpenRouter",
        domains: &["openrouter.ai"],
        api_url: Some("https://openrouter.ai/api"),
        description: "A single API routing to many model providers",
        compatibility: Compatibility::OpenAI,
        auth_type: AuthType::ApiKey,
        is_local: false,
        default_local_url: None,
        models_probe: MODELS_V1,
        health_probe: Some(ProbeSpec::get("/v1/auth/key")),
        deployment_specific: false,
    },
    openai_compatible(
        "xai",
        "xAI",
        &["x.ai", "console.x.ai"],
        "https://api.x.ai",
        "Grok models",
    ),
    KnownProvider {
        slug: "google",
        name: "Google Gemini",
        domains: &["ai.google.dev", "aistudio.google.com"],
        api_url: Some("https://generativelanguage.googleapis.com"),
        description: "Gemini models through the Generative Language API",
        compatibility: Compatibility::Custom,
        auth_type: AuthType::ApiKey,
        is_local: false,
        default_local_url: None,
        models_probe: ProbeSpec::get("/v1beta/models"),
        health_probe: None,
        deployment_specific: false,
    },
    openai_compatible(
        "cerebras",
        "Cerebras",
        &["cerebras.ai", "cloud.cerebras.ai"],
        "https://api.cerebras.ai",
        "Wafer-scale inference",
    ),
    KnownProvider {
        slug: "huggingface",
        name: "Hugging Face",
        domains: &["huggingface.co", "hf.co"],
        api_url: Some("https://api-inference.huggingface.co"),
        description: "Serverless inference for models on the Hugging Face Hub",
        compatibility: Compatibility::Custom,
        auth_type: AuthType::Pat,
        is_local: false,
        default_local_url: None,
        models_probe: ProbeSpec::get("/models"),
        health_probe: None,
        deployment_specific: false,
    },
    KnownProvider {
        slug: "replicate",
        name: "Replicate",
        domains: &["replicate.com"],
        api_url: Some("https://api.replicate.com"),
        description: "Run open-source models through a prediction API",
        compatibility: Compatibility::Custom,
        auth_type: AuthType::ApiKey,
        is_local: false,
        default_local_url: None,
        models_probe: ProbeSpec::get("/v1/models"),
        health_probe: Some(ProbeSpec::get("/v1/account")),
        deployment_specific: false,
    },
    KnownProvider {
        slug: "ai21",
        name: "AI21 Labs",
        domains: &["ai21.com", "studio.ai21.com"],
        api_url: Some("https://api.ai21.com/studio"),
        description: "Jamba models",
        compatibility: Compatibility::Custom,
        auth_type: AuthType::ApiKey,
        is_local: false,
        default_local_url: None,
        models_probe: MODELS_V1,
        health_probe: None,
        deployment_specific: false,
    },
    KnownProvider {
        slug: "azure-openai",
        name: "Azure OpenAI",
        domains: &["azure.microsoft.com", "oai.azure.com"],
        api_url: None,
        description: "OpenAI models hosted in a customer's Azure resource",
        compatibility: Compatibility::OpenAI,
        auth_type: AuthType::ApiKey,
        is_local: false,
        default_local_url: None,
        models_probe: ProbeSpec::get("/openai/models"),
        health_probe: None,
        deployment_specific: true,
    },
    KnownProvider {
        slug: "bedrock",
        name: "Amazon Bedrock",
        domains: &["aws.amazon.com"],
        api_url: None,
        description: "Foundation models in a customer's AWS region",
        compatibility: Compatibility::Custom,
        auth_type: AuthType::ApiKey,
        is_local: false,
        default_local_url: None,
        models_probe: ProbeSpec::get("/foundation-models"),
        health_probe: None,
        deployment_specific: true,
    },
    KnownProvider {
        slug: "ollama",
        name: "Ollama",
        domains: &["ollama.com", "ollama.ai"],
        api_url: None,
        description: "Run open models locally",
        compatibility: Compatibility::OpenAI,
        auth_type: AuthType::None,
        is_local: true,
        default_local_url: Some("http://localhost:11434"),
        models_probe: ProbeSpec::get("/api/tags"),
        health_probe: Some(ProbeSpec::get("/api/version")),
        deployment_specific: false,
    },
    KnownProvider {
        slug: "lmstudio",
        name: "LM Studio",
        domains: &["lmstudio.ai"],
        api_url: None,
        description: "Desktop app serving local models over an OpenAI compatible API",
        compatibility: Compatibility::OpenAI,
        auth_type: AuthType::None,
        is_local: true,
        default_local_url: Some("http://localhost:1234"),
        models_probe: MODELS_V1,
        health_probe: None,
        deployment_specific: false,
    },
];
