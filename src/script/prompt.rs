//! Prompt rendering for script generation.

use crate::defaults;

/// Values substituted into a prompt template.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub disease: &'a str,
    pub symptom: &'a str,
    pub additional_instructions: &'a str,
    pub chapter_count: usize,
}

/// Fill `template` with the request values.
///
/// An empty template falls back to the built-in one; empty instructions are
/// rendered as `None`. Unknown braces are left untouched.
pub fn render_prompt(template: &str, inputs: &PromptInputs<'_>) -> String {
    let template = if template.trim().is_empty() {
        defaults::PROMPT_TEMPLATE
    } else {
        template
    };

    let instructions = match inputs.additional_instructions.trim() {
        "" => "None",
        text => text,
    };

    template
        .replace("{disease}", inputs.disease.trim())
        .replace("{symptom}", inputs.symptom.trim())
        .replace("{additional_instructions}", instructions)
        .replace("{chapter_count}", &inputs.chapter_count.to_string())
}
