//! Reusable title templates generated from a run's collected titles.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use ai_client::{strip_code_blocks, Message, OpenAi};
use tubescout_common::NewTemplate;

const SYSTEM_PROMPT: &str = "You are a YouTube expert. Output valid JSON only.";
const TEMPERATURE: f32 = 0.7;

#[async_trait]
pub trait TitleTemplater: Send + Sync {
    async fn generate(&self, titles: &[String]) -> Result<Vec<NewTemplate>>;
}

pub struct OpenAiTemplater {
    ai: OpenAi,
}

impl OpenAiTemplater {
    pub fn new(ai: OpenAi) -> Self {
        Self { ai }
    }
}

pub fn build_prompt(titles: &[String]) -> String {
    let listing = titles
        .iter()
        .map(|t| format!("- {t}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Analyze these high-performing YouTube titles:\n{listing}\n\n\
         Generate 10 reusable title templates based on the winning patterns found in these titles.\n\
         For each template, provide 2 example applications.\n\n\
         Return the result as a raw JSON array of objects with keys: \
         \"template_text\", \"example_1\", \"example_2\".\n\
         Do not include markdown formatting."
    )
}

/// Parse the model's reply. Anything that is not a JSON array of templates
/// yields no templates.
pub fn parse_templates(response: &str) -> Vec<NewTemplate> {
    match serde_json::from_str::<Vec<NewTemplate>>(strip_code_blocks(response)) {
        Ok(templates) => templates
            .into_iter()
            .filter(|t| !t.template_text.trim().is_empty())
            .collect(),
        Err(e) => {
            warn!(error = %e, "Template response was not a JSON template array");
            Vec::new()
        }
    }
}

#[async_trait]
impl TitleTemplater for OpenAiTemplater {
    async fn generate(&self, titles: &[String]) -> Result<Vec<NewTemplate>> {
        if titles.is_empty() {
            return Ok(Vec::new());
        }

        info!(titles = titles.len(), model = self.ai.model(), "Generating title templates");
        let messages = [Message::system(SYSTEM_PROMPT), Message::user(build_prompt(titles))];
        let response = self.ai.chat(&messages, Some(TEMPERATURE)).await?;

        Ok(parse_templates(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_every_title() {
        let prompt = build_prompt(&["Alpha".to_string(), "Beta".to_string()]);
        assert!(prompt.contains("- Alpha\n- Beta"));
        assert!(prompt.contains("template_text"));
    }

    #[test]
    fn parses_fenced_array() {
        let reply = "```json\n[{\"template_text\":\"How to {X}\",\"example_1\":\"How to cook\",\"example_2\":null}]\n```";
        let templates = parse_templates(reply);
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].template_text, "How to {X}");
        assert_eq!(templates[0].example_1.as_deref(), Some("How to cook"));
        assert!(templates[0].example_2.is_none());
    }

    #[test]
    fn unparsable_reply_yields_nothing() {
        assert!(parse_templates("Sure! Here are some templates").is_empty());
        assert!(parse_templates("{\"template_text\":\"x\"}").is_empty());
    }

    #[test]
    fn blank_templates_are_dropped() {
        let reply = r#"[{"template_text":"  "},{"template_text":"Top {N} {X}"}]"#;
        assert_eq!(parse_templates(reply).len(), 1);
    }
}
