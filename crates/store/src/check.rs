// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structural validation of a value tree against its schema templates.
//!
//! Used per-edit during the validate phase and for the whole-tree
//! root-check: mandatory presence, list keys, unique constraints,
//! min/max-elements, leaf type checks and choice exclusivity. All
//! violations for a pass are accumulated; nothing is mutated.

use ncs_core::error::Status;
use ncs_core::schema::{SchemaId, SchemaKind, SchemaRegistry};
use ncs_core::value::{NodeId, ValueTree};
use std::collections::HashSet;

/// One violation with the path of the offending node.
#[derive(Debug, Clone)]
pub struct CheckError {
    pub status: Status,
    pub path: String,
}

/// Validate the subtree rooted at `id` (inclusive).
pub fn check_subtree(
    tree: &ValueTree,
    id: NodeId,
    schema: &SchemaRegistry,
    errors: &mut Vec<CheckError>,
) {
    let Some(node) = tree.node(id) else { return };
    let Some(sid) = node.schema else {
        // schema-less nodes live under anyxml; nothing to check
        return;
    };
    let Some(template) = schema.node(sid) else { return };

    match &template.kind {
        SchemaKind::Leaf { ty, .. } => {
            if let Some(value) = node.leaf_value() {
                if !ty.check(value) {
                    errors.push(CheckError {
                        status: Status::InvalidValue(format!(
                            "{value:?} is not a valid {}",
                            template.name
                        )),
                        path: path_of(tree, schema, id),
                    });
                }
                if let ncs_core::schema::LeafType::Leafref(target) = ty {
                    if !leafref_resolves(tree, id, target, value) {
                        errors.push(CheckError {
                            status: Status::DataMissing,
                            path: path_of(tree, schema, id),
                        });
                    }
                }
            }
        }
        SchemaKind::LeafList { ty, .. } => {
            if let Some(value) = node.leaf_value() {
                if !ty.check(value) {
                    errors.push(CheckError {
                        status: Status::InvalidValue(format!(
                            "{value:?} is not a valid {}",
                            template.name
                        )),
                        path: path_of(tree, schema, id),
                    });
                }
            }
        }
        SchemaKind::List { keys, .. } => {
            // every key leaf must be present on the entry
            for key in keys {
                if tree.find_child(id, ncs_core::xmlns::NsId::NONE, key).is_none() {
                    errors.push(CheckError {
                        status: Status::MissingElement(key.clone()),
                        path: path_of(tree, schema, id),
                    });
                }
            }
            check_children(tree, id, sid, schema, errors);
        }
        SchemaKind::Container { .. } => {
            check_children(tree, id, sid, schema, errors);
        }
        SchemaKind::Choice { .. } | SchemaKind::AnyXml => {}
    }
}

/// Presence and cardinality checks for the children of one node.
fn check_children(
    tree: &ValueTree,
    id: NodeId,
    sid: SchemaId,
    schema: &SchemaRegistry,
    errors: &mut Vec<CheckError>,
) {
    let Some(template) = schema.node(sid) else { return };

    for child_sid in &template.children {
        let Some(child_t) = schema.node(*child_sid) else { continue };
        let instances = tree.find_children(id, child_t.ns, &child_t.name);

        match &child_t.kind {
            SchemaKind::Leaf { .. } | SchemaKind::Container { .. } => {
                // key leaves are reported by the list entry's key check
                let is_key = template.list_keys().iter().any(|k| *k == child_t.name);
                if child_t.mandatory && !is_key && instances.is_empty() {
                    errors.push(CheckError {
                        status: Status::MissingElement(child_t.name.clone()),
                        path: path_of(tree, schema, id),
                    });
                }
            }
            SchemaKind::List { keys, unique, min_elements, max_elements, .. } => {
                let count = instances.len() as u32;
                if count < *min_elements {
                    errors.push(CheckError {
                        status: Status::MissingElement(child_t.name.clone()),
                        path: path_of(tree, schema, id),
                    });
                }
                if let Some(max) = max_elements {
                    if count > *max {
                        errors.push(CheckError {
                            status: Status::InvalidValue(format!(
                                "too many {} entries",
                                child_t.name
                            )),
                            path: path_of(tree, schema, id),
                        });
                    }
                }
                check_key_uniqueness(tree, schema, &instances, keys, errors);
                for set in unique {
                    check_unique_constraint(tree, schema, &instances, set, errors);
                }
            }
            SchemaKind::LeafList { min_elements, max_elements, .. } => {
                let count = instances.len() as u32;
                if count < *min_elements {
                    errors.push(CheckError {
                        status: Status::MissingElement(child_t.name.clone()),
                        path: path_of(tree, schema, id),
                    });
                }
                if let Some(max) = max_elements {
                    if count > *max {
                        errors.push(CheckError {
                            status: Status::InvalidValue(format!(
                                "too many {} entries",
                                child_t.name
                            )),
                            path: path_of(tree, schema, id),
                        });
                    }
                }
            }
            SchemaKind::Choice { .. } => {
                check_choice(tree, id, *child_sid, schema, errors);
            }
            SchemaKind::AnyXml => {}
        }
    }

    // recurse
    for child in tree.children(id) {
        check_subtree(tree, *child, schema, errors);
    }
}

/// At most one case of a choice may have nodes present; a mandatory
/// choice needs at least one.
fn check_choice(
    tree: &ValueTree,
    parent: NodeId,
    choice_sid: SchemaId,
    schema: &SchemaRegistry,
    errors: &mut Vec<CheckError>,
) {
    let Some(choice_t) = schema.node(choice_sid) else { return };
    let mut present_cases: HashSet<&str> = HashSet::new();
    for member_sid in &choice_t.children {
        let Some(member) = schema.node(*member_sid) else { continue };
        if !tree.find_children(parent, member.ns, &member.name).is_empty() {
            if let Some(case) = member.case_name.as_deref() {
                present_cases.insert(case);
            }
        }
    }
    if present_cases.len() > 1 {
        errors.push(CheckError {
            status: Status::BadElement(choice_t.name.clone()),
            path: path_of(tree, schema, parent),
        });
    }
    if choice_t.mandatory && present_cases.is_empty() {
        errors.push(CheckError {
            status: Status::MissingChoice(choice_t.name.clone()),
            path: path_of(tree, schema, parent),
        });
    }
}

/// Key tuples across sibling list entries must be distinct.
fn check_key_uniqueness(
    tree: &ValueTree,
    schema: &SchemaRegistry,
    instances: &[NodeId],
    keys: &[String],
    errors: &mut Vec<CheckError>,
) {
    if keys.is_empty() || instances.len() < 2 {
        return;
    }
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    for entry in instances {
        let tuple: Vec<String> = keys
            .iter()
            .filter_map(|k| tree.child_leaf_value(*entry, k).map(str::to_string))
            .collect();
        if tuple.len() != keys.len() {
            continue; // missing key reported elsewhere
        }
        if !seen.insert(tuple) {
            errors.push(CheckError {
                status: Status::NotUnique,
                path: path_of(tree, schema, *entry),
            });
        }
    }
}

/// `unique` leaf sets across sibling entries must be distinct when all
/// leaves in the set are present.
fn check_unique_constraint(
    tree: &ValueTree,
    schema: &SchemaRegistry,
    instances: &[NodeId],
    set: &[String],
    errors: &mut Vec<CheckError>,
) {
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    for entry in instances {
        let tuple: Vec<String> = set
            .iter()
            .filter_map(|k| tree.child_leaf_value(*entry, k).map(str::to_string))
            .collect();
        if tuple.len() != set.len() {
            continue;
        }
        if !seen.insert(tuple) {
            errors.push(CheckError {
                status: Status::NotUnique,
                path: path_of(tree, schema, *entry),
            });
        }
    }
}

/// A leafref leaf must name an existing instance of its target leaf.
/// Paths with prefixes the checker cannot resolve are skipped rather
/// than failed.
fn leafref_resolves(tree: &ValueTree, id: NodeId, target: &str, value: &str) -> bool {
    let Ok(prog) = ncs_core::xpath::XPathProgram::compile(target, &|_| None) else {
        return true;
    };
    // evaluate from the datastore root
    let mut root = id;
    while let Some(parent) = tree.node(root).and_then(|n| n.parent) {
        root = parent;
    }
    prog.eval(tree, root)
        .into_iter()
        .any(|hit| tree.node(hit).and_then(|n| n.leaf_value()) == Some(value))
}

/// Whole-tree invariants that depend on siblings across the root:
/// top-level mandatory presence plus a full subtree pass.
pub fn root_check(
    tree: &ValueTree,
    root: NodeId,
    schema: &SchemaRegistry,
) -> Vec<CheckError> {
    let mut errors = Vec::new();
    for top_sid in schema.top_ids().collect::<Vec<_>>() {
        let Some(top) = schema.node(top_sid) else { continue };
        if top.mandatory && tree.find_child(root, top.ns, &top.name).is_none() {
            errors.push(CheckError {
                status: Status::MissingElement(top.name.clone()),
                path: "/".to_string(),
            });
        }
    }
    for child in tree.children(root) {
        check_subtree(tree, *child, schema, &mut errors);
    }
    errors
}

/// Error path with list key predicates resolved through the schema.
pub fn path_of(tree: &ValueTree, schema: &SchemaRegistry, id: NodeId) -> String {
    tree.path(id, |nid| {
        tree.node(nid)
            .and_then(|n| n.schema)
            .and_then(|sid| schema.node(sid))
            .map(|t| t.list_keys().to_vec())
            .unwrap_or_default()
    })
}

#[cfg(test)]
#[path = "check_tests.rs"]
mod tests;
