//! Tool-Call Extraction
//!
//! Finds `[TOOL_CALL:<name>:<parameters>]` tags in free model text.
//! Matching is left-to-right and non-overlapping; every call keeps the
//! exact span it was read from so it can be cut out of the reply later.

pub mod grammar;
pub mod params;

use serde::{Deserialize, Serialize};

use crate::tool::ToolParameter;

pub use grammar::{render_tag, syntax_instructions, TAG_KEYWORD};
pub use params::{coerce_parameters, ParameterMap};

/// One tag found in a model response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    pub tool_name: String,

    /// Parameter text as written, before decoding
    pub raw_parameters: String,

    /// Verbatim substring of the response, brackets included
    pub original_span: String,
}

impl ToolCall {
    /// Decode this call's parameters against a tool's declared schema
    pub fn parameters(&self, schema: &[ToolParameter]) -> ParameterMap {
        coerce_parameters(&self.tool_name, &self.raw_parameters, schema)
    }
}

/// Extract every tool call in order of appearance.
pub fn extract_tool_calls(text: &str) -> Vec<ToolCall> {
    grammar::TAG_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let span = caps.get(0)?;
            Some(ToolCall {
                tool_name: caps.get(1)?.as_str().trim().to_string(),
                raw_parameters: caps.get(2)?.as_str().to_string(),
                original_span: span.as_str().to_string(),
            })
        })
        .collect()
}

/// Remove each call's span from `text`, leaving the surrounding text intact.
pub fn strip_tool_calls(text: &str, calls: &[ToolCall]) -> String {
    calls.iter().fold(text.to_string(), |acc, call| {
        acc.replacen(&call.original_span, "", 1)
    })
}
