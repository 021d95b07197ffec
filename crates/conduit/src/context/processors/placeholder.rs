use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

use super::Processor;
use crate::context::{ContextError, PipelineContext};

pub type VariableGenerator = Arc<dyn Fn() -> String + Send + Sync>;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{\{\s*([\w.-]+)\s*\}\}").unwrap();
}

fn generator<F>(f: F) -> VariableGenerator
where
    F: Fn() -> String + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn default_variable_generators() -> HashMap<String, VariableGenerator> {
    let generators: [(&str, VariableGenerator); 12] = [
        ("date", generator(|| Local::now().format("%Y-%m-%d").to_string())),
        ("time", generator(|| Local::now().format("%H:%M:%S").to_string())),
        (
            "datetime",
            generator(|| Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        ),
        ("iso", generator(|| Local::now().to_rfc3339())),
        (
            "timestamp",
            generator(|| Local::now().timestamp_millis().to_string()),
        ),
        ("year", generator(|| Local::now().format("%Y").to_string())),
        ("month", generator(|| Local::now().format("%m").to_string())),
        ("day", generator(|| Local::now().format("%d").to_string())),
        ("weekday", generator(|| Local::now().format("%A").to_string())),
        ("uuid", generator(|| uuid::Uuid::new_v4().to_string())),
        ("nanoid", generator(|| nanoid::nanoid!())),
        (
            "random",
            generator(|| (uuid::Uuid::new_v4().as_u128() % 1_000_000).to_string()),
        ),
    ];
    generators
        .into_iter()
        .map(|(name, generate)| (name.to_string(), generate))
        .collect()
}

/// Expands `{{name}}` placeholders with registered generators.
///
/// Placeholders without a generator stay as written.
pub struct PlaceholderVariablesProcessor {
    generators: HashMap<String, VariableGenerator>,
}

impl PlaceholderVariablesProcessor {
    pub fn new(generators: HashMap<String, VariableGenerator>) -> Self {
        Self { generators }
    }

    fn expand(&self, text: &str) -> Option<String> {
        if !PLACEHOLDER.is_match(text) {
            return None;
        }
        let expanded = PLACEHOLDER.replace_all(text, |caps: &Captures| {
            match self.generators.get(&caps[1]) {
                Some(generate) => generate(),
                None => caps[0].to_string(),
            }
        });
        (expanded != text).then(|| expanded.into_owned())
    }
}

impl Default for PlaceholderVariablesProcessor {
    fn default() -> Self {
        Self::new(default_variable_generators())
    }
}

#[async_trait]
impl Processor for PlaceholderVariablesProcessor {
    fn name(&self) -> &'static str {
        "PlaceholderVariablesProcessor"
    }

    async fn transform(
        &self,
        mut context: PipelineContext,
    ) -> Result<PipelineContext, ContextError> {
        let mut expanded = 0;
        for message in &mut context.messages {
            if let Some(text) = self.expand(&message.message.content) {
                message.message.content = text;
                expanded += 1;
            }
        }
        context.add_to_counter("placeholderVariablesProcessed", expanded);
        Ok(context)
    }
}
