//! Tool-call tag grammar.
//!
//! `[TOOL_CALL:<name>:<parameters>]` is the whole contract with the model.
//! The system prompt example and the parser are both derived from the
//! definitions in this file.

use regex::Regex;
use std::sync::LazyLock;

/// Literal keyword opening every tag (case-sensitive)
pub const TAG_KEYWORD: &str = "TOOL_CALL";

/// `<name>` has no colon, `<parameters>` has no closing bracket.
pub(crate) static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\[{}:([^:\]]+):([^\]]+)\]",
        regex::escape(TAG_KEYWORD)
    ))
    .expect("tool-call tag pattern is a valid regex")
});

/// Render one tag exactly as the parser expects to read it.
pub fn render_tag(name: &str, parameters: &str) -> String {
    format!("[{}:{}:{}]", TAG_KEYWORD, name, parameters)
}

/// Prompt section teaching the model the tag syntax.
pub fn syntax_instructions() -> String {
    format!(
        "## Tool call format\n\
         When you need a tool, write a tag in exactly this form:\n\
         `{}`\n\
         For example: `{}` or `{}` or `{}`\n\n\
         Tool results will be inserted into the conversation; continue your answer from them.\n",
        render_tag("{tool_name}", "{parameters}"),
        render_tag("search", "Rust async runtimes"),
        render_tag("memory", "recall=user preferences"),
        render_tag("calculate", r#"{"expression": "2 * (3 + 4)"}"#),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_tags_parse_back() {
        let tag = render_tag("memory", "recall=user preferences");
        let caps = TAG_PATTERN.captures(&tag).unwrap();
        assert_eq!(&caps[1], "memory");
        assert_eq!(&caps[2], "recall=user preferences");
    }

    #[test]
    fn test_every_prompt_example_is_parseable() {
        let instructions = syntax_instructions();
        // placeholder + three examples
        assert_eq!(TAG_PATTERN.find_iter(&instructions).count(), 4);
    }
}
