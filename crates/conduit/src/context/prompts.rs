use indoc::indoc;
use serde_json::json;

use crate::models::message::{FileAttachment, ImageAttachment};
use crate::models::tool::{tool_calling_name, ToolManifest};
use crate::prompt_template::render_template;

pub const INBOX_SESSION_ID: &str = "inbox";

pub const INBOX_GUIDE_SYSTEM_ROLE: &str = indoc! {"
    You are the default assistant of this workspace, answering the first question of a new user.
    Keep the first answer short and friendly. When the user asks what you can do, explain that
    they can create dedicated assistants with their own system role, enable tools for live data,
    attach files and images to a message, and switch models per conversation.
    Answer in the language the user writes in."};

pub const FILE_CONTEXT_START: &str = "<!-- SYSTEM CONTEXT (NOT PART OF USER QUERY) -->";
pub const FILE_CONTEXT_END: &str = "<!-- END SYSTEM CONTEXT -->";

const HISTORY_SUMMARY_TEMPLATE: &str = indoc! {"
    <chat_history_summary>
    <docstring>Users may have lots of chat messages, here is the summary of the history:</docstring>
    <summary>{{ summary }}</summary>
    </chat_history_summary>"};

const TOOLS_TEMPLATE: &str = indoc! {r#"
    <plugins description="The plugins you can use below">
    {%- for tool in tools %}
    <collection name="{{ tool.name }}">
    <collection.instructions>{{ tool.system_role }}</collection.instructions>
    {%- for api in tool.apis %}
    <api identifier="{{ api.name }}">{{ api.description }}</api>
    {%- endfor %}
    </collection>
    {%- endfor %}
    </plugins>"#};

const FILES_TEMPLATE: &str = indoc! {r#"
    <context.instruction>following part contains context information injected by the system. Please follow these instructions:

    1. Always prioritize handling user-visible content.
    2. the context is only required when user's queries rely on it.
    </context.instruction>
    <files_info>
    {%- if images %}
    <images>
    <images_docstring>here are user upload images you can refer to</images_docstring>
    {%- for image in images %}
    <image name="{{ image.name }}"{% if include_url %} url="{{ image.url }}"{% endif %}></image>
    {%- endfor %}
    </images>
    {%- endif %}
    {%- if files %}
    <files>
    <files_docstring>here are user upload files you can refer to</files_docstring>
    {%- for file in files %}
    <file id="{{ file.id }}" name="{{ file.name }}" type="{{ file.type }}" size="{{ file.size }}"{% if include_url %} url="{{ file.url }}"{% endif %}></file>
    {%- endfor %}
    </files>
    {%- endif %}
    </files_info>"#};

pub fn history_summary_prompt(summary: &str) -> Result<String, tera::Error> {
    render_template(HISTORY_SUMMARY_TEMPLATE, &json!({ "summary": summary }))
}

/// Instructions for the enabled tools that carry a system role, `None` if none do
pub fn tools_system_roles(manifests: &[ToolManifest]) -> Result<Option<String>, tera::Error> {
    let tools: Vec<_> = manifests
        .iter()
        .filter_map(|manifest| {
            let system_role = manifest.system_role.as_deref()?.trim();
            if system_role.is_empty() {
                return None;
            }
            let apis: Vec<_> = manifest
                .api
                .iter()
                .map(|api| {
                    json!({
                        "name": tool_calling_name(&manifest.identifier, &api.name, &manifest.kind),
                        "description": api.description,
                    })
                })
                .collect();
            Some(json!({
                "name": manifest.title.as_deref().unwrap_or(&manifest.identifier),
                "system_role": system_role,
                "apis": apis,
            }))
        })
        .collect();

    if tools.is_empty() {
        return Ok(None);
    }
    render_template(TOOLS_TEMPLATE, &json!({ "tools": tools })).map(Some)
}

/// The marked context block describing attachments of a user message
pub fn files_prompt(
    files: &[FileAttachment],
    images: &[ImageAttachment],
    include_url: bool,
) -> Result<String, tera::Error> {
    let files: Vec<_> = files
        .iter()
        .map(|file| {
            json!({
                "id": file.id,
                "name": file.name,
                "type": file.file_type,
                "size": file.size,
                "url": file.url,
            })
        })
        .collect();
    let images: Vec<_> = images
        .iter()
        .map(|image| {
            json!({
                "name": image.alt.as_deref().unwrap_or(&image.id),
                "url": image.url,
            })
        })
        .collect();

    let body = render_template(
        FILES_TEMPLATE,
        &json!({ "files": files, "images": images, "include_url": include_url }),
    )?;
    Ok(format!("{FILE_CONTEXT_START}\n{body}\n{FILE_CONTEXT_END}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_summary_prompt() {
        let prompt = history_summary_prompt("we talked about rust").unwrap();
        assert!(prompt.starts_with("<chat_history_summary>"));
        assert!(prompt.contains("<summary>we talked about rust</summary>"));
    }

    #[test]
    fn test_tools_system_roles_skips_tools_without_instructions() {
        let manifests = vec![
            ToolManifest::new("calc").with_api("add", "Add numbers", json!({})),
            ToolManifest::new("search")
                .with_system_role("Search when unsure.")
                .with_api("query", "Web search", json!({})),
        ];

        let prompt = tools_system_roles(&manifests).unwrap().unwrap();
        assert_eq!(
            prompt,
            indoc! {r#"
                <plugins description="The plugins you can use below">
                <collection name="search">
                <collection.instructions>Search when unsure.</collection.instructions>
                <api identifier="search____query">Web search</api>
                </collection>
                </plugins>"#}
        );

        assert_eq!(tools_system_roles(&manifests[..1]).unwrap(), None);
    }

    #[test]
    fn test_files_prompt() {
        let files = vec![FileAttachment {
            id: "f1".to_string(),
            name: "report.pdf".to_string(),
            file_type: "application/pdf".to_string(),
            size: 1024,
            url: "https://files.example.com/f1".to_string(),
        }];

        let with_url = files_prompt(&files, &[], true).unwrap();
        assert!(with_url.starts_with(FILE_CONTEXT_START));
        assert!(with_url.ends_with(FILE_CONTEXT_END));
        assert!(with_url.contains(
            r#"<file id="f1" name="report.pdf" type="application/pdf" size="1024" url="https://files.example.com/f1"></file>"#
        ));
        assert!(!with_url.contains("<images>"));

        let without_url = files_prompt(&files, &[], false).unwrap();
        assert!(!without_url.contains("url="));
    }
}
