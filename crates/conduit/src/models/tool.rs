use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const TOOL_NAME_SEPARATOR: &str = "____";
/// Longest function name backends accept
const MAX_TOOL_NAME_LEN: usize = 64;

/// A function declaration handed to a backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name the model calls the tool by
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// JSON schema of the accepted arguments
    pub parameters: Value,
}

impl Tool {
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as a JSON encoded string
    pub arguments: String,
}

/// A tool call in the wire shape sent to backends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new<I, N, A>(id: I, name: N, arguments: A) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        ToolCall {
            id: id.into(),
            kind: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolApi {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
}

/// An installed tool: its identity, its callable apis and optional instructions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolManifest {
    pub identifier: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub system_role: Option<String>,
    #[serde(rename = "type", default = "default_tool_type")]
    pub kind: String,
    #[serde(default)]
    pub api: Vec<ToolApi>,
}

pub(crate) fn default_tool_type() -> String {
    "default".to_string()
}

impl ToolManifest {
    pub fn new<S: Into<String>>(identifier: S) -> Self {
        ToolManifest {
            identifier: identifier.into(),
            title: None,
            system_role: None,
            kind: default_tool_type(),
            api: Vec::new(),
        }
    }

    pub fn with_api<N, D>(mut self, name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        self.api.push(ToolApi {
            name: name.into(),
            description: description.into(),
            parameters,
        });
        self
    }

    pub fn with_system_role<S: Into<String>>(mut self, system_role: S) -> Self {
        self.system_role = Some(system_role.into());
        self
    }

    /// Function declarations for every api, named by `name_fn(identifier, api, type)`
    pub fn to_tools<F>(&self, name_fn: F) -> Vec<Tool>
    where
        F: Fn(&str, &str, &str) -> String,
    {
        self.api
            .iter()
            .map(|api| {
                Tool::new(
                    name_fn(&self.identifier, &api.name, &self.kind),
                    api.description.clone(),
                    api.parameters.clone(),
                )
            })
            .collect()
    }
}

/// Function name a backend sees for a tool api.
///
/// `identifier____api`, with `____type` appended for non-default tool types. Names too
/// long for backends replace the api name with a hash of it.
pub fn tool_calling_name(identifier: &str, api_name: &str, kind: &str) -> String {
    let suffix = match kind {
        "" | "default" => String::new(),
        kind => format!("{TOOL_NAME_SEPARATOR}{kind}"),
    };
    let name = format!("{identifier}{TOOL_NAME_SEPARATOR}{api_name}{suffix}");
    if name.len() < MAX_TOOL_NAME_LEN {
        return name;
    }

    let digest = Sha256::digest(api_name.as_bytes());
    let hash: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("{identifier}{TOOL_NAME_SEPARATOR}HASH_{hash}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_calling_name() {
        assert_eq!(tool_calling_name("search", "query", "default"), "search____query");
        assert_eq!(
            tool_calling_name("search", "query", "builtin"),
            "search____query____builtin"
        );

        let long_api = "a".repeat(70);
        let name = tool_calling_name("search", &long_api, "default");
        assert!(name.len() < MAX_TOOL_NAME_LEN);
        assert!(name.starts_with("search____HASH_"));
        assert_eq!(name, tool_calling_name("search", &long_api, "default"));
    }

    #[test]
    fn test_tool_call_wire_shape() {
        let call = ToolCall::new("call_1", "search____query", r#"{"q":"rust"}"#);
        assert_eq!(
            serde_json::to_value(&call).unwrap(),
            json!({
                "id": "call_1",
                "type": "function",
                "function": {"name": "search____query", "arguments": "{\"q\":\"rust\"}"}
            })
        );
    }

    #[test]
    fn test_manifest_to_tools() {
        let manifest = ToolManifest::new("weather")
            .with_api("today", "Weather today", json!({"type": "object"}))
            .with_api("week", "Weather this week", json!({"type": "object"}));

        let tools = manifest.to_tools(|id, api, _| format!("{id}.{api}"));
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "weather.today");
        assert_eq!(tools[1].description, "Weather this week");
    }

    #[test]
    fn test_manifest_defaults() {
        let manifest: ToolManifest =
            serde_json::from_value(json!({"identifier": "calc"})).unwrap();
        assert_eq!(manifest.kind, "default");
        assert!(manifest.api.is_empty());
    }
}
