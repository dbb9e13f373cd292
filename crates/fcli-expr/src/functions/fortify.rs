use super::text::html_to_text;
use super::{opt_string_arg, FunctionCategory, FunctionDef};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const PREFIX: &str = "fortify";

static PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<Paragraph[^>]*>(.*?)</Paragraph>").expect("static regex"));
static ALT_PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<AltParagraph[^>]*>(.*?)</AltParagraph>").expect("static regex"));
static CONDITIONAL_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<IfDef[^>]*>.*?</IfDef>|<ConditionalText[^>]*>.*?</ConditionalText>")
        .expect("static regex")
});

pub(super) fn functions() -> Vec<FunctionDef> {
    let cat = FunctionCategory::Product;
    vec![
        FunctionDef::new(
            PREFIX,
            "cleanRuleDescription",
            cat,
            "Plain text of a Fortify rule description, keeping only alternative paragraphs",
            1,
            Some(1),
            |args| {
                let description = opt_string_arg("fortify.cleanRuleDescription", args, 0)?;
                Ok(Value::String(
                    description.map(|d| clean_rule_description(&d)).unwrap_or_default(),
                ))
            },
        ),
        FunctionDef::new(
            PREFIX,
            "cleanIssueDescription",
            cat,
            "Plain text of a Fortify issue description without alternative paragraphs",
            1,
            Some(1),
            |args| {
                let description = opt_string_arg("fortify.cleanIssueDescription", args, 0)?;
                Ok(Value::String(
                    description.map(|d| clean_issue_description(&d)).unwrap_or_default(),
                ))
            },
        ),
    ]
}

fn clean_rule_description(description: &str) -> String {
    let text = PARAGRAPH.replace_all(description, |caps: &regex::Captures| {
        let alternatives: Vec<String> = ALT_PARAGRAPH
            .captures_iter(&caps[1])
            .map(|alt| html_to_text(&alt[1]))
            .collect();
        alternatives.join("\n\n")
    });
    let text = CONDITIONAL_BLOCK.replace_all(&text, "");
    html_to_text(&text)
}

fn clean_issue_description(description: &str) -> String {
    html_to_text(&ALT_PARAGRAPH.replace_all(description, ""))
}
