//! per-product converter rule sets
//!
//! A converter document declares, per product ID, which rule-tree values are
//! product-defined variables. Each entry carries a JSON-pointer-like locator
//! into the tree (`#/rules/behaviors/3/options/testObjectUrl`), the variable
//! name to register, its type and an optional product default.
//!
//! The document is loaded once by the CLI layer and injected into
//! [crate::template::TemplateEngine] as an immutable value.
use crate::rule_tree::{Child, RuleTree};
use crate::value::Value;
use indexmap::IndexMap;
use serde::Deserialize;

/// All extraction rules, keyed by product ID
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConverterRuleSet {
    #[serde(flatten)]
    products: IndexMap<String, Vec<ConverterRule>>,
}

impl ConverterRuleSet {
    pub fn rules_for(&self, product_id: &str) -> Option<&[ConverterRule]> {
        self.products.get(product_id).map(Vec::as_slice)
    }
}

/// One declarative extraction rule
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverterRule {
    /// Pointer into the rule tree, e.g. `#/rules/behaviors/0/options/hostname`
    pub locator: String,

    pub variable_name: String,

    #[serde(rename = "type")]
    pub variable_type: String,

    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("converter locator '{locator}' does not resolve at '{segment}'")]
pub struct PathResolutionError {
    pub locator: String,
    pub segment: String,
}

/// The location a converter locator points at
///
/// `options`/`key` address the value slot; `owner` is the name of the rule
/// or entity the slot belongs to, kept for error reporting.
#[derive(Debug)]
pub struct ResolvedPath<'t> {
    pub owner: String,
    pub options: &'t mut IndexMap<String, Value>,
    pub key: String,
}

/// Resolve a `#/rules/...` locator against a rule tree
///
/// Supported forms: `#/rules(/children/<i>)*/options/<key>` and
/// `#/rules(/children/<i>)*/(behaviors|criteria)/<i>/options/<key>`.
pub fn resolve_path<'t>(
    tree: &'t mut RuleTree,
    locator: &str,
) -> Result<ResolvedPath<'t>, PathResolutionError> {
    let error = |segment: &str| PathResolutionError {
        locator: locator.to_string(),
        segment: segment.to_string(),
    };

    let rest = locator.strip_prefix("#/").ok_or_else(|| error(locator))?;
    let mut segments = rest.split('/').peekable();

    if segments.next() != Some("rules") {
        return Err(error(rest));
    }

    let mut node = &mut tree.rules;
    while segments.peek() == Some(&"children") {
        segments.next();
        let index_text = segments.next().ok_or_else(|| error("children"))?;
        let index: usize = index_text.parse().map_err(|_| error(index_text))?;

        let child = node.children.get_mut(index).ok_or_else(|| error(index_text))?;
        node = match child {
            Child::Node(child_node) => child_node,
            // children were already turned into include tokens
            Child::Include(_) => return Err(error(index_text)),
        };
    }

    let resolved = match segments.next() {
        Some("options") => {
            let key = segments.next().ok_or_else(|| error("options"))?;
            ResolvedPath {
                owner: node.name.clone(),
                options: &mut node.options,
                key: key.to_string(),
            }
        }
        Some(kind @ ("behaviors" | "criteria")) => {
            let index_text = segments.next().ok_or_else(|| error(kind))?;
            let index: usize = index_text.parse().map_err(|_| error(index_text))?;

            let list = if kind == "behaviors" {
                &mut node.behaviors
            } else {
                &mut node.criteria
            };
            let entity = list.get_mut(index).ok_or_else(|| error(index_text))?;

            if segments.next() != Some("options") {
                return Err(error(index_text));
            }
            let key = segments.next().ok_or_else(|| error("options"))?;

            ResolvedPath {
                owner: entity.name.clone(),
                options: &mut entity.options,
                key: key.to_string(),
            }
        }
        other => return Err(error(other.unwrap_or(""))),
    };

    if let Some(extra) = segments.next() {
        return Err(error(extra));
    }

    Ok(resolved)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tree() -> RuleTree {
        serde_json::from_str(
            r#"{
                "rules": {
                    "name": "default",
                    "options": {"is_secure": false},
                    "behaviors": [
                        {"name": "origin", "options": {"hostname": "origin.example.com"}}
                    ],
                    "children": [
                        {
                            "name": "Static",
                            "criteria": [
                                {"name": "fileExtension", "options": {"values": ["jpg"]}}
                            ]
                        }
                    ]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn resolves_root_rule_options() {
        let mut tree = tree();
        let resolved = resolve_path(&mut tree, "#/rules/options/is_secure").unwrap();

        assert_eq!(resolved.owner, "default");
        assert_eq!(resolved.key, "is_secure");
        assert_eq!(resolved.options.get("is_secure"), Some(&Value::Boolean(false)));
    }

    #[test]
    fn resolves_behavior_options() {
        let mut tree = tree();
        let resolved = resolve_path(&mut tree, "#/rules/behaviors/0/options/hostname").unwrap();

        assert_eq!(resolved.owner, "origin");
        assert_eq!(
            resolved.options.get("hostname"),
            Some(&Value::from("origin.example.com"))
        );
    }

    #[test]
    fn resolves_criteria_under_children() {
        let mut tree = tree();
        let resolved =
            resolve_path(&mut tree, "#/rules/children/0/criteria/0/options/values").unwrap();

        assert_eq!(resolved.owner, "fileExtension");
        assert_eq!(resolved.key, "values");
    }

    #[test]
    fn invalid_pointers_name_the_offending_segment() {
        let mut tree = tree();

        let err = resolve_path(&mut tree, "#/rules/behaviors/7/options/x").unwrap_err();
        assert_eq!(err.segment, "7");

        let err = resolve_path(&mut tree, "#/rules/nonsense/0").unwrap_err();
        assert_eq!(err.segment, "nonsense");

        let err = resolve_path(&mut tree, "no-hash").unwrap_err();
        assert_eq!(err.segment, "no-hash");
    }

    #[test]
    fn product_lookup() {
        let rules: ConverterRuleSet = serde_json::from_str(
            r##"{"prd_SPM": [{"locator": "#/rules/options/is_secure",
                             "variableName": "secure", "type": "boolean"}]}"##,
        )
        .unwrap();

        assert_eq!(rules.rules_for("prd_SPM").unwrap().len(), 1);
        assert!(rules.rules_for("prd_Other").is_none());
    }
}
