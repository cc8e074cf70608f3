//! template-bundle recombination
//!
//! The inverse of conversion: a main template plus its extracted include
//! files is reassembled into a single rule tree, then every string value is
//! run through the expression engine so `${env.*}` references pick up their
//! environment values.
//!
//! Include resolution keeps a chain of the files currently being expanded.
//! A file showing up twice in its own chain is a cycle (possible in
//! hand-edited bundles) and aborts the merge instead of recursing forever.
use crate::expression::{self, ExpressionError};
use crate::rule_tree::{Child, RuleNode, RuleTree};
use crate::value::Value;
use indexmap::IndexMap;

#[derive(thiserror::Error, Debug)]
pub enum MergeError {
    #[error("unknown include '{0}'")]
    UnknownInclude(String),

    #[error("include cycle detected at '{0}'")]
    IncludeCycle(String),

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

/// Reassemble `main` with its `templates` and substitute placeholders
/// against `context`
pub fn merge(
    main: &RuleTree,
    templates: &IndexMap<String, RuleNode>,
    context: &Value,
) -> Result<RuleTree, MergeError> {
    let mut tree = main.clone();

    let mut chain = Vec::new();
    tree.rules = resolve_includes(tree.rules, templates, &mut chain)?;

    substitute_node(&mut tree.rules, context)?;
    substitute_map(&mut tree.extra, context)?;

    Ok(tree)
}

fn resolve_includes(
    mut node: RuleNode,
    templates: &IndexMap<String, RuleNode>,
    chain: &mut Vec<String>,
) -> Result<RuleNode, MergeError> {
    let children = std::mem::take(&mut node.children);
    for child in children {
        match child {
            Child::Node(child_node) => {
                node.children
                    .push(Child::Node(resolve_includes(child_node, templates, chain)?));
            }
            Child::Include(token) => {
                let file = token
                    .strip_prefix(crate::rule_tree::INCLUDE_PREFIX)
                    .ok_or_else(|| MergeError::UnknownInclude(token.clone()))?;

                if chain.iter().any(|seen| seen == file) {
                    return Err(MergeError::IncludeCycle(file.to_string()));
                }

                let template = templates
                    .get(file)
                    .ok_or_else(|| MergeError::UnknownInclude(token.clone()))?;

                tracing::trace!(%file, "resolving include");
                chain.push(file.to_string());
                let resolved = resolve_includes(template.clone(), templates, chain)?;
                chain.pop();

                node.children.push(Child::Node(resolved));
            }
        }
    }

    Ok(node)
}

fn substitute_node(node: &mut RuleNode, context: &Value) -> Result<(), MergeError> {
    substitute_map(&mut node.options, context)?;
    substitute_map(&mut node.extra, context)?;

    for entity in node.behaviors.iter_mut().chain(node.criteria.iter_mut()) {
        substitute_map(&mut entity.options, context)?;
        substitute_map(&mut entity.extra, context)?;
    }

    for variable in &mut node.variables {
        variable.value = substitute_value(&variable.value, context)?;
    }

    for child in &mut node.children {
        if let Child::Node(child_node) = child {
            substitute_node(child_node, context)?;
        }
    }

    Ok(())
}

fn substitute_map(
    map: &mut IndexMap<String, Value>,
    context: &Value,
) -> Result<(), MergeError> {
    for value in map.values_mut() {
        *value = substitute_value(value, context)?;
    }
    Ok(())
}

fn substitute_value(value: &Value, context: &Value) -> Result<Value, MergeError> {
    let substituted = match value {
        Value::String(text) => expression::parse(text, context)?,
        Value::Array(array) => Value::Array(
            array
                .iter()
                .map(|element| substitute_value(element, context))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(object) => Value::Object(
            object
                .iter()
                .map(|(key, element)| Ok((key.clone(), substitute_value(element, context)?)))
                .collect::<Result<_, MergeError>>()?,
        ),
        other => other.clone(),
    };

    Ok(substituted)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn context(raw: &str) -> Value {
        serde_json::from_str(raw).unwrap()
    }

    fn main_tree() -> RuleTree {
        serde_json::from_str(
            r##"{
                "rules": {
                    "name": "default",
                    "behaviors": [
                        {"name": "origin", "options": {"hostname": "${env.originHostname}"}}
                    ],
                    "children": ["#include:Static.json"]
                }
            }"##,
        )
        .unwrap()
    }

    fn templates(raw: &str) -> IndexMap<String, RuleNode> {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn includes_are_inlined_and_placeholders_substituted() {
        let templates = templates(
            r#"{"Static.json": {
                "name": "Static",
                "behaviors": [{"name": "cpCode", "options": {"value": "${env.cpCode}"}}]
            }}"#,
        );
        let ctx = context(
            r#"{"env": {"originHostname": "www.example.com", "cpCode": {"id": 99}}}"#,
        );

        let merged = merge(&main_tree(), &templates, &ctx).unwrap();

        assert_eq!(
            merged.rules.behaviors[0].options.get("hostname"),
            Some(&Value::from("www.example.com"))
        );

        // the include token is gone, the child is inlined
        let Child::Node(child) = &merged.rules.children[0] else {
            panic!("include was not resolved");
        };
        assert_eq!(child.name, "Static");

        // a whole-string placeholder restores the typed value
        assert_eq!(
            child.behaviors[0].options.get("value"),
            Some(&context(r#"{"id": 99}"#))
        );
    }

    #[test]
    fn unknown_includes_abort() {
        let err = merge(&main_tree(), &IndexMap::new(), &context("{}")).unwrap_err();
        assert!(matches!(err, MergeError::UnknownInclude(token) if token.contains("Static.json")));
    }

    #[test]
    fn include_cycles_are_detected() {
        let templates = templates(
            r##"{
                "Static.json": {"name": "Static", "children": ["#include:Deeper.json"]},
                "Deeper.json": {"name": "Deeper", "children": ["#include:Static.json"]}
            }"##,
        );

        let err = merge(&main_tree(), &templates, &context("{}")).unwrap_err();
        assert!(matches!(err, MergeError::IncludeCycle(file) if file == "Static.json"));
    }

    #[test]
    fn missing_environment_values_abort() {
        let err = merge(&main_tree(), &templates(r#"{"Static.json": {"name": "Static"}}"#), &context("{}"))
            .unwrap_err();
        assert!(matches!(err, MergeError::Expression(_)));
    }
}
