//! Diagnostic trace of a fit attempt.
//!
//! A [`Node`] mirrors the shape of the input: one node per visited value,
//! with children for list items, record/mapping entries, or the attempts of
//! a union. Errors sit on the node where fitting failed *directly*; a node
//! that failed only because a child did carries no error of its own.
use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use crate::descriptor::Rejection;

/// Why fitting failed at a node.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitIssue {
    /// The value's kind does not match the expected category.
    #[error("expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("missing field `{field}`")]
    MissingField { field: String },

    #[error("key `{key}` is missing from the context")]
    MissingContextKey { key: String },

    #[error("context value `{key}` does not fit: {detail}")]
    InvalidContextValue { key: String, detail: String },

    #[error("default of field `{field}` does not fit: {detail}")]
    InvalidDefault { field: String, detail: String },

    #[error("no alternative of `{union}` matched")]
    NoUnionAlternativeMatched { union: String },

    #[error("{} is not a member of `{enumeration}`, expected one of {}", .value, member_list(.valid, *.omitted))]
    InvalidEnumMember {
        enumeration: String,
        value: String,
        valid: Vec<String>,
        omitted: usize,
    },

    #[error("`{type_name}` rejected the value: {rejection}")]
    ConstructionRejected {
        type_name: String,
        rejection: Rejection,
    },

    /// Strict mode only: a key no record field reads.
    #[error("unwanted by `{owner}`")]
    UnwantedKey { owner: String },

    #[error("type `{name}` is not resolved")]
    Unresolved { name: String },

    #[error("{0}")]
    Internal(String),
}

fn member_list(valid: &[String], omitted: usize) -> String {
    let mut out = valid.join(", ");
    if omitted > 0 {
        out.push_str(&format!(" and {omitted} more"));
    }
    out
}

/// Name of the JSON-level kind of a decoded value.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

// --------------------------------- Path ---------------------------------- //

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
    /// The attempt of a union alternative, by declaration index.
    Alternative { index: usize, label: String },
}

/// Location of a node below the root, displayed as `$.items[3].title`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path(Vec<PathSegment>);

impl Path {
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.0 {
            match segment {
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
                PathSegment::Alternative { label, .. } => write!(f, "<{label}>")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocatedIssue {
    pub path: Path,
    pub issue: FitIssue,
}

impl fmt::Display for LocatedIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}: {}", self.path, self.issue)
    }
}

// --------------------------------- Node ---------------------------------- //

/// One attempted alternative of a union, fitted against the same value.
#[derive(Debug)]
pub struct Attempt<'v> {
    pub label: String,
    pub node: Node<'v>,
}

#[derive(Debug, Default)]
pub enum Children<'v> {
    #[default]
    None,
    Items(Vec<Node<'v>>),
    Entries(IndexMap<String, Node<'v>>),
    Alternatives(Vec<Attempt<'v>>),
}

#[derive(Debug)]
pub struct Node<'v> {
    value: Option<&'v Value>,
    children: Children<'v>,
    errors: Vec<FitIssue>,
    success: bool,
}

impl<'v> Node<'v> {
    pub fn new(value: &'v Value) -> Self {
        Self {
            value: Some(value),
            children: Children::None,
            errors: Vec::new(),
            success: false,
        }
    }

    /// Node for a key the input does not have.
    pub fn absent() -> Self {
        Self {
            value: None,
            children: Children::None,
            errors: Vec::new(),
            success: false,
        }
    }

    /// Raw input value, `None` when absent.
    pub fn value(&self) -> Option<&'v Value> {
        self.value
    }

    pub fn children(&self) -> &Children<'v> {
        &self.children
    }

    /// Errors attached directly to this node.
    pub fn errors(&self) -> &[FitIssue] {
        &self.errors
    }

    pub fn succeeded(&self) -> bool {
        self.success
    }

    pub(crate) fn fail(&mut self, issue: FitIssue) {
        self.errors.push(issue);
    }

    pub(crate) fn set_children(&mut self, children: Children<'v>) {
        self.children = children;
    }

    pub(crate) fn set_success(&mut self, success: bool) {
        self.success = success;
    }

    /// Whether any direct child failed.
    pub fn has_failing_child(&self) -> bool {
        match &self.children {
            Children::None => false,
            Children::Items(items) => items.iter().any(|c| !c.success),
            Children::Entries(entries) => entries.values().any(|c| !c.success),
            Children::Alternatives(attempts) => attempts.iter().any(|a| !a.node.success),
        }
    }

    /// Child at `segment`, if any.
    pub fn child(&self, segment: &PathSegment) -> Option<&Node<'v>> {
        match (&self.children, segment) {
            (Children::Items(items), PathSegment::Index(i)) => items.get(*i),
            (Children::Entries(entries), PathSegment::Key(k)) => entries.get(k),
            (Children::Alternatives(attempts), PathSegment::Alternative { index, .. }) => {
                attempts.get(*index).map(|a| &a.node)
            }
            _ => None,
        }
    }

    pub fn find(&self, path: &Path) -> Option<&Node<'v>> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Every issue of every failing node below (and including) this one.
    ///
    /// Successful nodes are skipped entirely, so rejected attempts of a union
    /// that eventually matched do not show up.
    pub fn issues(&self) -> Vec<LocatedIssue> {
        let mut out = Vec::new();
        self.collect_issues(&mut Vec::new(), &mut out);
        out
    }

    fn collect_issues(&self, path: &mut Vec<PathSegment>, out: &mut Vec<LocatedIssue>) {
        if self.success {
            return;
        }
        for issue in &self.errors {
            out.push(LocatedIssue {
                path: Path(path.clone()),
                issue: issue.clone(),
            });
        }
        match &self.children {
            Children::None => {}
            Children::Items(items) => {
                for (index, child) in items.iter().enumerate() {
                    path.push(PathSegment::Index(index));
                    child.collect_issues(path, out);
                    path.pop();
                }
            }
            Children::Entries(entries) => {
                for (key, child) in entries {
                    path.push(PathSegment::Key(key.clone()));
                    child.collect_issues(path, out);
                    path.pop();
                }
            }
            Children::Alternatives(attempts) => {
                for (index, attempt) in attempts.iter().enumerate() {
                    path.push(PathSegment::Alternative {
                        index,
                        label: attempt.label.clone(),
                    });
                    attempt.node.collect_issues(path, out);
                    path.pop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf<'v>(value: &'v Value, issue: Option<FitIssue>) -> Node<'v> {
        let mut node = Node::new(value);
        match issue {
            Some(issue) => node.fail(issue),
            None => node.set_success(true),
        }
        node
    }

    #[test]
    fn issues_carry_paths() {
        let input = json!({"kids": [1, "2"]});
        let one = json!(1);
        let two = json!("2");

        let mut kids = Node::new(&input["kids"]);
        kids.set_children(Children::Items(vec![
            leaf(&one, None),
            leaf(
                &two,
                Some(FitIssue::TypeMismatch {
                    expected: "int".into(),
                    actual: "string".into(),
                }),
            ),
        ]));

        let mut root = Node::new(&input);
        let mut entries = IndexMap::new();
        entries.insert("kids".to_string(), kids);
        root.set_children(Children::Entries(entries));

        let issues = root.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path.to_string(), "$.kids[1]");
        assert_eq!(issues[0].to_string(), "at $.kids[1]: expected int, got string");
        assert!(root.errors().is_empty());
        assert!(root.has_failing_child());

        let found = root.find(&issues[0].path).unwrap();
        assert_eq!(found.value(), Some(&two));
    }

    #[test]
    fn successful_nodes_hide_their_attempts() {
        let value = json!(1);
        let mut union = Node::new(&value);
        union.set_children(Children::Alternatives(vec![Attempt {
            label: "bool".into(),
            node: leaf(
                &value,
                Some(FitIssue::TypeMismatch {
                    expected: "bool".into(),
                    actual: "int".into(),
                }),
            ),
        }]));
        union.set_success(true);
        assert!(union.issues().is_empty());
    }

    #[test]
    fn enum_member_messages_truncate() {
        let issue = FitIssue::InvalidEnumMember {
            enumeration: "Color".into(),
            value: "9".into(),
            valid: vec!["1".into(), "2".into()],
            omitted: 3,
        };
        assert_eq!(
            issue.to_string(),
            "9 is not a member of `Color`, expected one of 1, 2 and 3 more"
        );
    }

    #[test]
    fn kinds_distinguish_ints_and_floats() {
        assert_eq!(kind_of(&json!(1)), "int");
        assert_eq!(kind_of(&json!(1.5)), "float");
        assert_eq!(kind_of(&json!(null)), "null");
        assert_eq!(kind_of(&json!({})), "mapping");
    }
}
