// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path-expression subset used for partial-lock selections, NACM data
//! rules and XPath filters.
//!
//! Covers absolute location paths with named or wildcard child steps and
//! equality predicates on child leaves: `/sys:system/user[name='fred']`.
//! Prefixes are resolved against the message's namespace context at
//! compile time, so a program can be evaluated later without the
//! original XML in hand.

use crate::value::{NodeId, ValueTree};
use crate::xmlns::NsId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XPathError {
    #[error("empty expression")]
    Empty,
    #[error("expression must be an absolute path")]
    NotAbsolute,
    #[error("unknown prefix {0}")]
    UnknownPrefix(String),
    #[error("invalid step {0:?}")]
    InvalidStep(String),
    #[error("unterminated predicate in {0:?}")]
    UnterminatedPredicate(String),
}

/// Name test for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Named { ns: Option<NsId>, name: String },
}

/// Equality predicate on a direct child leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Predicate {
    leaf: String,
    value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    test: NameTest,
    predicates: Vec<Predicate>,
}

/// A compiled path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPathProgram {
    source: String,
    steps: Vec<Step>,
}

impl XPathProgram {
    /// Compile `expr`, resolving prefixes through `resolve`.
    pub fn compile(
        expr: &str,
        resolve: &dyn Fn(&str) -> Option<NsId>,
    ) -> Result<XPathProgram, XPathError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(XPathError::Empty);
        }
        let Some(rest) = expr.strip_prefix('/') else {
            return Err(XPathError::NotAbsolute);
        };
        let mut steps = Vec::new();
        for raw in split_steps(rest) {
            if raw.is_empty() {
                return Err(XPathError::InvalidStep(expr.to_string()));
            }
            steps.push(parse_step(&raw, resolve)?);
        }
        Ok(XPathProgram { source: expr.to_string(), steps })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against a tree, returning matched nodes in document
    /// order. `root` is the synthetic datastore root; the first step
    /// matches its children.
    pub fn eval(&self, tree: &ValueTree, root: NodeId) -> Vec<NodeId> {
        let mut current = vec![root];
        for step in &self.steps {
            let mut next = Vec::new();
            for ctx in &current {
                for child in tree.children(*ctx) {
                    if self.step_matches(tree, *child, step) {
                        next.push(*child);
                    }
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }
        current
    }

    fn step_matches(&self, tree: &ValueTree, id: NodeId, step: &Step) -> bool {
        let Some(node) = tree.node(id) else { return false };
        match &step.test {
            NameTest::Any => {}
            NameTest::Named { ns, name } => {
                if node.name != *name {
                    return false;
                }
                if let Some(ns) = ns {
                    if node.ns != *ns {
                        return false;
                    }
                }
            }
        }
        step.predicates.iter().all(|p| {
            tree.find_child(id, NsId::NONE, &p.leaf)
                .and_then(|kid| tree.node(kid))
                .and_then(|n| n.leaf_value())
                .is_some_and(|v| v == p.value)
        })
    }
}

/// Split on `/` outside predicate brackets.
fn split_steps(rest: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut cur = String::new();
    for ch in rest.chars() {
        match ch {
            '[' => {
                depth += 1;
                cur.push(ch);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                cur.push(ch);
            }
            '/' if depth == 0 => {
                out.push(std::mem::take(&mut cur));
            }
            _ => cur.push(ch),
        }
    }
    out.push(cur);
    out
}

fn parse_step(raw: &str, resolve: &dyn Fn(&str) -> Option<NsId>) -> Result<Step, XPathError> {
    let (name_part, pred_part) = match raw.find('[') {
        Some(idx) => (&raw[..idx], &raw[idx..]),
        None => (raw, ""),
    };

    let test = if name_part == "*" {
        NameTest::Any
    } else if let Some((prefix, local)) = name_part.split_once(':') {
        let ns = resolve(prefix).ok_or_else(|| XPathError::UnknownPrefix(prefix.to_string()))?;
        NameTest::Named { ns: Some(ns), name: local.to_string() }
    } else if name_part.is_empty() || !valid_name(name_part) {
        return Err(XPathError::InvalidStep(raw.to_string()));
    } else {
        NameTest::Named { ns: None, name: name_part.to_string() }
    };

    let mut predicates = Vec::new();
    let mut rest = pred_part;
    while !rest.is_empty() {
        let Some(stripped) = rest.strip_prefix('[') else {
            return Err(XPathError::InvalidStep(raw.to_string()));
        };
        let Some(end) = stripped.find(']') else {
            return Err(XPathError::UnterminatedPredicate(raw.to_string()));
        };
        let body = &stripped[..end];
        predicates.push(parse_predicate(body, raw)?);
        rest = &stripped[end + 1..];
    }

    Ok(Step { test, predicates })
}

fn parse_predicate(body: &str, raw: &str) -> Result<Predicate, XPathError> {
    let Some((leaf, value)) = body.split_once('=') else {
        return Err(XPathError::InvalidStep(raw.to_string()));
    };
    let leaf = leaf.trim();
    let value = value.trim();
    let unquoted = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
        .ok_or_else(|| XPathError::InvalidStep(raw.to_string()))?;
    // the leaf side may itself be prefixed; keys are matched by local name
    let leaf = leaf.rsplit(':').next().unwrap_or(leaf);
    if !valid_name(leaf) {
        return Err(XPathError::InvalidStep(raw.to_string()));
    }
    Ok(Predicate { leaf: leaf.to_string(), value: unquoted.to_string() })
}

fn valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
#[path = "xpath_tests.rs"]
mod tests;
