//! Model list strings, as found in deployment configuration.
//!
//! `+gpt-4o,-gpt-3.5-turbo,my-model=My Model<32000:vision:fc>` adds, removes and
//! describes models; `-all` drops every default model first.
use crate::model_bank::{find_known_model, ModelAbilities, ModelCard, ModelKind};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelListChanges {
    pub add: Vec<ModelCard>,
    pub removed: Vec<String>,
    pub remove_all: bool,
}

fn apply_capability(abilities: &mut ModelAbilities, capability: &str) {
    match capability {
        "reasoning" => abilities.reasoning = true,
        "vision" => abilities.vision = true,
        "fc" => abilities.function_call = true,
        "file" => abilities.files = true,
        "search" => abilities.search = true,
        "imageOutput" => abilities.image_output = true,
        other => tracing::warn!(capability = other, "unknown model capability"),
    }
}

pub fn parse_model_string(
    provider: &str,
    model_string: &str,
    with_deployment_name: bool,
) -> ModelListChanges {
    let mut changes = ModelListChanges::default();

    for item in model_string.split([',', '，']).filter(|s| !s.is_empty()) {
        let disable = item.starts_with('-');
        let name_config = item
            .strip_prefix('+')
            .or_else(|| item.strip_prefix('-'))
            .unwrap_or(item);

        let mut sections = name_config.split('<');
        let id_and_display = sections.next().unwrap_or_default();
        let capabilities = sections.next();

        let (mut id, display_name) = match id_and_display.split_once('=') {
            Some((id, display)) => (id, Some(display)),
            None => (id_and_display, None),
        };

        let mut deployment_name = None;
        if with_deployment_name {
            if let Some((model_id, deployment)) = id.split_once("->") {
                id = model_id;
                deployment_name = Some(deployment.to_string());
            }
        }

        if disable {
            if id == "all" {
                changes.remove_all = true;
            }
            changes.removed.push(id.to_string());
            continue;
        }

        if item.trim().is_empty() {
            continue;
        }

        changes.add.retain(|model| model.id != id);

        let mut card = ModelCard {
            id: id.to_string(),
            display_name: display_name.unwrap_or_default().to_string(),
            kind: find_known_model(id, Some(provider))
                .map(|known| known.kind)
                .unwrap_or(ModelKind::Chat),
            deployment_name,
            ..Default::default()
        };

        if let Some(capabilities) = capabilities {
            let mut parts = capabilities.trim_end_matches('>').split(':');
            card.context_window_tokens = parts.next().and_then(|s| s.parse().ok());
            for capability in parts {
                apply_capability(&mut card.abilities, capability);
            }
        }

        changes.add.push(card);
    }

    changes
}

fn merge_abilities(base: ModelAbilities, extra: ModelAbilities) -> ModelAbilities {
    ModelAbilities {
        function_call: base.function_call || extra.function_call,
        vision: base.vision || extra.vision,
        reasoning: base.reasoning || extra.reasoning,
        files: base.files || extra.files,
        search: base.search || extra.search,
        image_output: base.image_output || extra.image_output,
    }
}

fn merge_card(base: &ModelCard, addition: ModelCard) -> ModelCard {
    let display_name = [&addition.display_name, &base.display_name, &base.id]
        .into_iter()
        .find(|name| !name.is_empty())
        .cloned()
        .unwrap_or_default();
    ModelCard {
        display_name,
        abilities: merge_abilities(base.abilities, addition.abilities),
        context_window_tokens: addition.context_window_tokens.or(base.context_window_tokens),
        deployment_name: addition.deployment_name.or_else(|| base.deployment_name.clone()),
        enabled: true,
        kind: base.kind,
        description: base.description.clone(),
        max_output: base.max_output,
        id: addition.id,
    }
}

/// Apply a model string to a provider's default models.
///
/// Returns `None` for an empty string so callers keep their defaults untouched.
pub fn transform_to_model_list(
    model_string: &str,
    default_models: &[ModelCard],
    provider: &str,
    with_deployment_name: bool,
) -> Option<Vec<ModelCard>> {
    if model_string.is_empty() {
        return None;
    }

    let changes = parse_model_string(provider, model_string, with_deployment_name);
    let mut models: Vec<ModelCard> = if changes.remove_all {
        Vec::new()
    } else {
        default_models
            .iter()
            .filter(|m| !changes.removed.contains(&m.id))
            .cloned()
            .collect()
    };

    for mut addition in changes.add {
        let known = find_known_model(&addition.id, Some(provider));
        if with_deployment_name && addition.deployment_name.is_none() {
            addition.deployment_name = Some(addition.id.clone());
        }

        match (known, models.iter().position(|m| m.id == addition.id)) {
            (Some(_), Some(index)) => {
                models[index] = merge_card(&models[index], addition);
            }
            (Some(known), None) => {
                models.push(merge_card(&ModelCard::from(known), addition));
            }
            (None, _) => {
                if addition.display_name.is_empty() {
                    addition.display_name = addition.id.clone();
                }
                addition.enabled = true;
                models.push(addition);
            }
        }
    }

    Some(models)
}

/// Ids a model string explicitly enables, `None` when it enables nothing
pub fn extract_enabled_models(
    provider: &str,
    model_string: &str,
    with_deployment_name: bool,
) -> Option<Vec<String>> {
    let ids: Vec<String> = parse_model_string(provider, model_string, with_deployment_name)
        .add
        .into_iter()
        .map(|m| m.id)
        .collect();
    (!ids.is_empty()).then_some(ids)
}
