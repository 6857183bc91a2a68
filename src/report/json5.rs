//! Annotated JSON5 rendering of a failed fit.
//!
//! The input is echoed back with `// error` comments above every offending
//! line. Subtrees that fitted are collapsed, failing list items with the
//! same issues are shown once.
use std::collections::{HashMap, HashSet};

use colored::Colorize;
use serde::Deserialize;
use serde_json::Value;

use super::Formatter;
use crate::node::{Attempt, Children, Node};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Json5Formatter {
    /// Spaces per nesting level.
    pub indent: usize,
    pub colors: bool,
    /// Longer strings are cut at this many characters, `0` disables.
    pub truncate_strings_at: usize,
}

impl Default for Json5Formatter {
    fn default() -> Self {
        Self {
            indent: 4,
            colors: true,
            truncate_strings_at: 40,
        }
    }
}

impl Json5Formatter {
    pub fn plain() -> Self {
        Self {
            colors: false,
            ..Self::default()
        }
    }
}

impl Formatter for Json5Formatter {
    fn format(&self, node: &Node<'_>) -> String {
        let mut out = Output {
            style: self,
            lines: Vec::new(),
            last_depth: None,
        };
        out.node(node, 0, "", "", None);
        out.lines.join("\n")
    }
}

struct Output<'f> {
    style: &'f Json5Formatter,
    lines: Vec<String>,
    /// Depth of the last non-blank line.
    last_depth: Option<usize>,
}

impl Output<'_> {
    fn push(&mut self, depth: usize, content: String) {
        let pad = " ".repeat(self.style.indent * depth);
        self.lines.push(format!("{pad}{content}"));
        self.last_depth = Some(depth);
    }

    /// Comment block; separated by a blank line from a preceding sibling.
    fn comments(&mut self, depth: usize, comments: Vec<String>) {
        if comments.is_empty() {
            return;
        }
        if self.last_depth == Some(depth) {
            self.lines.push(String::new());
        }
        for comment in comments {
            let comment = self.error(format!("// {comment}"));
            self.push(depth, comment);
        }
    }

    fn error(&self, text: String) -> String {
        if self.style.colors {
            text.red().to_string()
        } else {
            text
        }
    }

    fn muted(&self, text: &str) -> String {
        if self.style.colors {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }

    fn node(
        &mut self,
        node: &Node<'_>,
        depth: usize,
        label: &str,
        comma: &str,
        heading: Option<String>,
    ) {
        let failed = !node.succeeded();
        let mut comments: Vec<String> = heading.into_iter().collect();
        comments.extend(node.errors().iter().map(ToString::to_string));

        // Attempts without structure are summarized in one line each, the
        // others are rendered in full below.
        let mut structured: Vec<&Attempt<'_>> = Vec::new();
        if let (true, Children::Alternatives(attempts)) = (failed, node.children()) {
            for attempt in attempts {
                match attempt.node.children() {
                    Children::None => comments.extend(
                        attempt
                            .node
                            .errors()
                            .iter()
                            .map(|issue| format!("`{}`: {issue}", attempt.label)),
                    ),
                    _ => structured.push(attempt),
                }
            }
        }
        self.comments(depth, comments);

        let Some(value) = node.value() else {
            let absent = self.muted("/* absent */");
            self.push(depth, format!("{label}{absent}{comma}"));
            return;
        };
        if !failed {
            let collapsed = self.collapsed(value);
            self.push(depth, format!("{label}{collapsed}{comma}"));
            return;
        }

        match node.children() {
            Children::Items(items) => {
                self.push(depth, format!("{label}["));
                self.items(items, depth + 1);
                self.push(depth, format!("]{comma}"));
            }
            Children::Entries(entries) => {
                self.push(depth, format!("{label}{{"));
                for (key, child) in entries {
                    let key = format!("{}: ", Value::String(key.clone()));
                    self.node(child, depth + 1, &key, ",", None);
                }
                self.push(depth, format!("}}{comma}"));
            }
            Children::Alternatives(_) if !structured.is_empty() => {
                for attempt in structured {
                    let heading = format!("as `{}`:", attempt.label);
                    self.node(&attempt.node, depth, label, comma, Some(heading));
                }
            }
            _ => {
                let collapsed = self.collapsed(value);
                self.push(depth, format!("{label}{collapsed}{comma}"));
            }
        }
    }

    fn items(&mut self, items: &[Node<'_>], depth: usize) {
        let signatures: Vec<Option<String>> = items
            .iter()
            .map(|item| (!item.succeeded()).then(|| signature(item)))
            .collect();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for signature in signatures.iter().flatten() {
            *counts.entry(signature.as_str()).or_default() += 1;
        }

        let mut shown = HashSet::new();
        let mut valid_run = 0;
        for (item, signature) in items.iter().zip(&signatures) {
            match signature {
                None => {
                    if valid_run == 0 {
                        self.node(item, depth, "", ",", None);
                    }
                    valid_run += 1;
                }
                Some(signature) => {
                    if !shown.insert(signature.as_str()) {
                        continue;
                    }
                    self.valid_run(&mut valid_run, depth);
                    self.node(item, depth, "", ",", None);
                    let more = counts.get(signature.as_str()).copied().unwrap_or(1) - 1;
                    if more > 0 {
                        let note = format!("/* {more} more item(s) with the same errors */");
                        let note = self.muted(&note);
                        self.push(depth, note);
                    }
                }
            }
        }
        self.valid_run(&mut valid_run, depth);
    }

    /// Closes a run of fitted items; only its first item was printed.
    fn valid_run(&mut self, run: &mut usize, depth: usize) {
        if *run > 1 {
            let note = format!("/* {} more valid item(s) */", *run - 1);
            let note = self.muted(&note);
            self.push(depth, note);
        }
        *run = 0;
    }

    fn collapsed(&self, value: &Value) -> String {
        match value {
            Value::String(text) => self.string(text),
            Value::Array(items) if items.is_empty() => "[]".to_string(),
            Value::Array(_) => format!("[ {} ]", self.muted("/* ... */")),
            Value::Object(entries) if entries.is_empty() => "{}".to_string(),
            Value::Object(_) => format!("{{ {} }}", self.muted("/* ... */")),
            other => other.to_string(),
        }
    }

    fn string(&self, text: &str) -> String {
        let limit = self.style.truncate_strings_at;
        if limit == 0 || text.chars().count() <= limit {
            return Value::String(text.to_string()).to_string();
        }
        let head: String = text.chars().take(limit).collect();
        let marker = self.muted("/* truncated */");
        format!("{} {marker}", Value::String(format!("{head}[...]")))
    }
}

/// Issues of a failing item, relative to the item.
fn signature(node: &Node<'_>) -> String {
    node.issues()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Describer, Fit};
    use crate::context::Context;
    use crate::descriptor::TypeDescriptor;
    use crate::error::ClassifyError;
    use crate::fitter::Fitter;
    use indoc::indoc;
    use serde_json::json;

    struct Story {
        id: i64,
        title: String,
        kids: Vec<i64>,
        by: String,
    }

    impl Fit for Story {
        fn describe(cx: &mut Describer) -> Result<TypeDescriptor, ClassifyError> {
            cx.record::<Story>("Story")
                .field("id", |s: &Story| &s.id)
                .field("title", |s: &Story| &s.title)
                .field("kids", |s: &Story| &s.kids)
                .field("by", |s: &Story| &s.by)
                .build(|v| {
                    Ok(Story {
                        id: v.take("id")?,
                        title: v.take("title")?,
                        kids: v.take("kids")?,
                        by: v.take("by")?,
                    })
                })
        }
    }

    fn render<T: Fit>(input: &Value) -> String {
        let trace = Fitter::new().trace::<T>(input, &Context::default()).unwrap();
        assert!(!trace.succeeded());
        Json5Formatter::plain().format(trace.node())
    }

    #[test]
    fn annotates_failing_fields() {
        let input = json!({"id": 1, "title": 42, "kids": [1, "x", 3]});
        let expected = indoc! {r#"
            {
                "id": 1,

                // expected string, got int
                "title": 42,
                "kids": [
                    1,

                    // expected int, got string
                    "x",
                    3,
                ],

                // missing field `by`
                "by": /* absent */,
            }"#};
        assert_eq!(render::<Story>(&input), expected);
    }

    #[test]
    fn deduplicates_repeated_item_errors() {
        let input = json!(["a", "b", 1, 2, 3, "c"]);
        let expected = indoc! {r#"
            [
                // expected int, got string
                "a",
                /* 2 more item(s) with the same errors */
                1,
                /* 2 more valid item(s) */
            ]"#};
        assert_eq!(render::<Vec<i64>>(&input), expected);
    }

    #[test]
    fn collapses_clean_subtrees_and_truncates() {
        let input = json!({
            "id": "a very long identifier that goes on and on and on",
            "title": "t",
            "kids": [],
            "by": {"name": "pg"}
        });
        let expected = indoc! {r#"
            {
                // expected int, got string
                "id": "a very long identifier that goes on and [...]" /* truncated */,
                "title": "t",
                "kids": [],

                // expected string, got mapping
                "by": { /* ... */ },
            }"#};
        assert_eq!(render::<Story>(&input), expected);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let formatter = Json5Formatter {
            truncate_strings_at: 3,
            ..Json5Formatter::plain()
        };
        let out = Output {
            style: &formatter,
            lines: Vec::new(),
            last_depth: None,
        };
        assert_eq!(out.string("héllo"), r#""hél[...]" /* truncated */"#);
        assert_eq!(out.string("hé"), r#""hé""#);
    }
}
