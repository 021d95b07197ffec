//! Model metadata: a compile-time table of known models and keyword-based ability
//! detection for models the table does not know.
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAbilities {
    #[serde(default)]
    pub function_call: bool,
    #[serde(default)]
    pub vision: bool,
    #[serde(default)]
    pub reasoning: bool,
    #[serde(default)]
    pub files: bool,
    #[serde(default)]
    pub search: bool,
    #[serde(default)]
    pub image_output: bool,
}

impl ModelAbilities {
    const fn chat(function_call: bool, vision: bool, reasoning: bool) -> Self {
        ModelAbilities {
            function_call,
            vision,
            reasoning,
            files: false,
            search: false,
            image_output: false,
        }
    }

    const fn with_search(self) -> Self {
        ModelAbilities {
            search: true,
            ..self
        }
    }

    const fn with_image_output(self) -> Self {
        ModelAbilities {
            image_output: true,
            ..self
        }
    }

    const NONE: ModelAbilities = ModelAbilities::chat(false, false, false);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Chat,
    Image,
    Embedding,
    Tts,
}

/// A model as presented to callers of `models()`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCard {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub abilities: ModelAbilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output: Option<u64>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, rename = "type")]
    pub kind: ModelKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
}

impl ModelCard {
    pub fn new<S: Into<String>>(id: S) -> Self {
        let id = id.into();
        ModelCard {
            display_name: id.clone(),
            id,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct KnownModel {
    pub id: &'static str,
    pub display_name: &'static str,
    pub abilities: ModelAbilities,
    pub context_window_tokens: Option<u64>,
    pub kind: ModelKind,
}

impl From<&KnownModel> for ModelCard {
    fn from(known: &KnownModel) -> Self {
        ModelCard {
            id: known.id.to_string(),
            display_name: known.display_name.to_string(),
            abilities: known.abilities,
            context_window_tokens: known.context_window_tokens,
            kind: known.kind,
            ..Default::default()
        }
    }
}

const fn chat(
    id: &'static str,
    display_name: &'static str,
    abilities: ModelAbilities,
    context_window_tokens: u64,
) -> KnownModel {
    KnownModel {
        id,
        display_name,
        abilities,
        context_window_tokens: Some(context_window_tokens),
        kind: ModelKind::Chat,
    }
}

const fn other(id: &'static str, display_name: &'static str, kind: ModelKind) -> KnownModel {
    KnownModel {
        id,
        display_name,
        abilities: ModelAbilities::NONE,
        context_window_tokens: None,
        kind,
    }
}

const OPENAI_MODELS: &[KnownModel] = &[
    chat("gpt-4.1", "GPT-4.1", ModelAbilities::chat(true, true, false), 1_047_576),
    chat("gpt-4.1-mini", "GPT-4.1 mini", ModelAbilities::chat(true, true, false), 1_047_576),
    chat("gpt-4o", "GPT-4o", ModelAbilities::chat(true, true, false), 128_000),
    chat("gpt-4o-mini", "GPT-4o mini", ModelAbilities::chat(true, true, false), 128_000),
    chat("gpt-3.5-turbo", "GPT-3.5 Turbo", ModelAbilities::chat(true, false, false), 16_385),
    chat("o1", "o1", ModelAbilities::chat(true, true, true), 200_000),
    chat("o3-mini", "o3-mini", ModelAbilities::chat(true, false, true), 200_000),
    chat("o4-mini", "o4-mini", ModelAbilities::chat(true, true, true), 200_000),
    other("dall-e-3", "DALL·E 3", ModelKind::Image),
    other("gpt-image-1", "GPT Image 1", ModelKind::Image),
    other("text-embedding-3-small", "Text Embedding 3 Small", ModelKind::Embedding),
    other("tts-1", "TTS-1", ModelKind::Tts),
];

const GOOGLE_MODELS: &[KnownModel] = &[
    chat(
        "gemini-2.5-pro",
        "Gemini 2.5 Pro",
        ModelAbilities::chat(true, true, true).with_search(),
        1_114_112,
    ),
    chat(
        "gemini-2.5-flash",
        "Gemini 2.5 Flash",
        ModelAbilities::chat(true, true, true).with_search(),
        1_114_112,
    ),
    chat(
        "gemini-2.0-flash",
        "Gemini 2.0 Flash",
        ModelAbilities::chat(true, true, false).with_search(),
        1_056_768,
    ),
    chat(
        "gemini-2.0-flash-preview-image-generation",
        "Gemini 2.0 Flash Image Generation",
        ModelAbilities::chat(false, true, false).with_image_output(),
        40_960,
    ),
    other("imagen-4.0-generate-001", "Imagen 4", ModelKind::Image),
    other("text-embedding-004", "Text Embedding 004", ModelKind::Embedding),
];

const ANTHROPIC_MODELS: &[KnownModel] = &[
    chat(
        "claude-sonnet-4-20250514",
        "Claude Sonnet 4",
        ModelAbilities::chat(true, true, true),
        200_000,
    ),
    chat(
        "claude-3-5-sonnet-20241022",
        "Claude 3.5 Sonnet",
        ModelAbilities::chat(true, true, false),
        200_000,
    ),
    chat(
        "claude-3-5-haiku-20241022",
        "Claude 3.5 Haiku",
        ModelAbilities::chat(true, false, false),
        200_000,
    ),
];

const DEEPSEEK_MODELS: &[KnownModel] = &[
    chat("deepseek-chat", "DeepSeek V3", ModelAbilities::chat(true, false, false), 65_536),
    chat("deepseek-reasoner", "DeepSeek R1", ModelAbilities::chat(false, false, true), 65_536),
];

const ALL_PROVIDER_MODELS: &[&[KnownModel]] =
    &[OPENAI_MODELS, GOOGLE_MODELS, ANTHROPIC_MODELS, DEEPSEEK_MODELS];

pub fn provider_models(provider: &str) -> &'static [KnownModel] {
    match provider {
        "openai" => OPENAI_MODELS,
        "google" => GOOGLE_MODELS,
        "anthropic" => ANTHROPIC_MODELS,
        "deepseek" => DEEPSEEK_MODELS,
        _ => &[],
    }
}

/// Find a known model, preferring the given provider's table over the global list
pub fn find_known_model(model_id: &str, provider: Option<&str>) -> Option<&'static KnownModel> {
    let lower = model_id.to_lowercase();
    let find = |models: &'static [KnownModel]| models.iter().find(|m| m.id == lower);

    provider
        .and_then(|p| find(provider_models(p)))
        .or_else(|| ALL_PROVIDER_MODELS.iter().find_map(|&models| find(models)))
}

/// Keyword lists used to guess abilities of unknown models
#[derive(Debug, Default)]
pub struct KeywordConfig {
    pub function_call: &'static [&'static str],
    pub reasoning: &'static [&'static str],
    pub vision: &'static [&'static str],
    pub exclude: &'static [&'static str],
}

pub fn keyword_config(provider: &str) -> Option<&'static KeywordConfig> {
    static ANTHROPIC: KeywordConfig = KeywordConfig {
        function_call: &["claude"],
        reasoning: &["-3-7", "3.7", "-4"],
        vision: &["claude"],
        exclude: &[],
    };
    static DEEPSEEK: KeywordConfig = KeywordConfig {
        function_call: &["v3", "r1"],
        reasoning: &["r1"],
        vision: &[],
        exclude: &[],
    };
    static GOOGLE: KeywordConfig = KeywordConfig {
        function_call: &["gemini"],
        reasoning: &["thinking", "-2.5-"],
        vision: &["gemini", "learnlm"],
        exclude: &[],
    };
    static LLAMA: KeywordConfig = KeywordConfig {
        function_call: &["llama-3.2", "llama-3.3", "llama-4"],
        reasoning: &[],
        vision: &["llava"],
        exclude: &[],
    };
    static MOONSHOT: KeywordConfig = KeywordConfig {
        function_call: &["moonshot", "kimi"],
        reasoning: &["thinking"],
        vision: &["vision", "kimi-latest", "kimi-thinking-preview"],
        exclude: &[],
    };
    static OPENAI: KeywordConfig = KeywordConfig {
        function_call: &["4o", "4.1", "o3", "o4", "oss"],
        reasoning: &["o1", "o3", "o4", "oss"],
        vision: &["4o", "4.1", "o4"],
        exclude: &["audio"],
    };
    static QWEN: KeywordConfig = KeywordConfig {
        function_call: &[
            "qwen-max",
            "qwen-plus",
            "qwen-turbo",
            "qwen-long",
            "qwen1.5",
            "qwen2",
            "qwen2.5",
            "qwen3",
        ],
        reasoning: &["qvq", "qwq", "qwen3", "!-instruct-", "!-coder-"],
        vision: &["qvq", "vl"],
        exclude: &[],
    };
    static XAI: KeywordConfig = KeywordConfig {
        function_call: &["grok"],
        reasoning: &["mini", "grok-4"],
        vision: &["vision", "grok-4"],
        exclude: &[],
    };
    static ZHIPU: KeywordConfig = KeywordConfig {
        function_call: &["glm-4", "glm-z1"],
        reasoning: &["glm-zero", "glm-z1", "glm-4.5"],
        vision: &["glm-4v", "glm-4.1v", "glm-4.5v"],
        exclude: &[],
    };

    match provider {
        "anthropic" => Some(&ANTHROPIC),
        "deepseek" => Some(&DEEPSEEK),
        "google" => Some(&GOOGLE),
        "llama" => Some(&LLAMA),
        "moonshot" => Some(&MOONSHOT),
        "openai" => Some(&OPENAI),
        "qwen" => Some(&QWEN),
        "xai" => Some(&XAI),
        "zhipu" => Some(&ZHIPU),
        _ => None,
    }
}

const PROVIDER_DETECTION: &[(&str, &[&str])] = &[
    ("anthropic", &["claude"]),
    ("deepseek", &["deepseek"]),
    ("google", &["gemini", "imagen"]),
    ("llama", &["llama", "llava"]),
    ("moonshot", &["moonshot", "kimi"]),
    ("openai", &["o1", "o3", "o4", "gpt-"]),
    ("qwen", &["qwen", "qwq", "qvq"]),
    ("xai", &["grok"]),
    ("zhipu", &["glm"]),
];

const IMAGE_MODEL_KEYWORDS: &[&str] = &[
    "dall-e",
    "dalle",
    "midjourney",
    "stable-diffusion",
    "sd",
    "flux",
    "imagen",
    "firefly",
    "cogview",
    "wanxiang",
    "describe",
    "upscale",
    "-image",
    "^v3",
    "^v_2",
    "^v_1",
];

fn keyword_matches(model_id: &str, keyword: &str) -> bool {
    match keyword.strip_prefix('^') {
        Some(prefix) => model_id.starts_with(prefix),
        None => model_id.contains(keyword),
    }
}

/// Match a lowercase model id against a keyword list.
///
/// `^kw` matches at the start only, `!kw` excludes and wins over every inclusion,
/// anything else matches as a substring.
pub fn is_keyword_list_match(model_id: &str, keywords: &[&str]) -> bool {
    let excluded = keywords
        .iter()
        .filter_map(|k| k.strip_prefix('!'))
        .any(|k| keyword_matches(model_id, k));
    if excluded {
        return false;
    }
    keywords
        .iter()
        .filter(|k| !k.starts_with('!'))
        .any(|k| keyword_matches(model_id, k))
}

/// Guess the provider family a model id belongs to, `openai` when nothing matches
pub fn detect_model_provider(model_id: &str) -> &'static str {
    let lower = model_id.to_lowercase();
    PROVIDER_DETECTION
        .iter()
        .find(|(provider, keywords)| {
            is_keyword_list_match(&lower, keywords) && keyword_config(provider).is_some()
        })
        .map(|(provider, _)| *provider)
        .unwrap_or("openai")
}

fn detect_abilities(lower_id: &str, config: &KeywordConfig) -> ModelAbilities {
    let excluded = is_keyword_list_match(lower_id, config.exclude);
    ModelAbilities {
        function_call: is_keyword_list_match(lower_id, config.function_call) && !excluded,
        vision: is_keyword_list_match(lower_id, config.vision) && !excluded,
        reasoning: is_keyword_list_match(lower_id, config.reasoning),
        ..Default::default()
    }
}

lazy_static! {
    static ref PARENTHETICAL: Regex = Regex::new(r"\s*[(（][^)）]*[)）]\s*").unwrap();
}

/// Turn a raw listing of model ids into cards.
///
/// With a provider, its keyword config and known-model table are used for every id;
/// without one the provider family is detected per model. Image models that the
/// known-model table does not describe are dropped.
pub fn process_model_list(ids: &[String], provider: Option<&str>) -> Vec<ModelCard> {
    ids.iter()
        .filter_map(|id| {
            let family = provider.unwrap_or_else(|| detect_model_provider(id));
            let known = find_known_model(id, Some(family));
            let lower = id.to_lowercase();

            let kind = match known {
                Some(known) => known.kind,
                None if is_keyword_list_match(&lower, IMAGE_MODEL_KEYWORDS) => ModelKind::Image,
                None => ModelKind::Chat,
            };
            if kind == ModelKind::Image && known.is_none() {
                return None;
            }

            let abilities = match (known, keyword_config(family)) {
                (Some(known), _) => known.abilities,
                (None, Some(config)) => detect_abilities(&lower, config),
                (None, None) => ModelAbilities::default(),
            };
            let display_name = known.map(|k| k.display_name).unwrap_or(id.as_str());

            Some(ModelCard {
                id: id.clone(),
                display_name: PARENTHETICAL.replace_all(display_name, "").trim().to_string(),
                abilities,
                context_window_tokens: known.and_then(|k| k.context_window_tokens),
                kind,
                ..Default::default()
            })
        })
        .collect()
}

/// Capability predicates the context pipeline consults
pub trait ModelCapabilities: Send + Sync {
    fn can_use_vision(&self, model: &str, provider: &str) -> bool;
    fn can_use_function_call(&self, model: &str, provider: &str) -> bool;
}

/// Capability lookup over configured cards, the known-model table and keyword detection
#[derive(Debug, Default)]
pub struct ModelBank {
    cards: HashMap<(String, String), ModelAbilities>,
}

impl ModelBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register cards declared for a provider; they take precedence over detection
    pub fn with_cards<'a, I>(mut self, provider: &str, cards: I) -> Self
    where
        I: IntoIterator<Item = &'a ModelCard>,
    {
        for card in cards {
            self.cards.insert(
                (provider.to_string(), card.id.to_lowercase()),
                card.abilities,
            );
        }
        self
    }

    pub fn abilities(&self, model: &str, provider: &str) -> ModelAbilities {
        let lower = model.to_lowercase();
        if let Some(abilities) = self.cards.get(&(provider.to_string(), lower.clone())) {
            return *abilities;
        }
        if let Some(known) = find_known_model(model, Some(provider)) {
            return known.abilities;
        }
        let family = match keyword_config(provider) {
            Some(_) => provider,
            None => detect_model_provider(model),
        };
        keyword_config(family)
            .map(|config| detect_abilities(&lower, config))
            .unwrap_or_default()
    }
}

impl ModelCapabilities for ModelBank {
    fn can_use_vision(&self, model: &str, provider: &str) -> bool {
        self.abilities(model, provider).vision
    }

    fn can_use_function_call(&self, model: &str, provider: &str) -> bool {
        self.abilities(model, provider).function_call
    }
}
