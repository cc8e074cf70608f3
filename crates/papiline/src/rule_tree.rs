//! PAPI rule-tree data model
//!
//! A rule tree is the hierarchical configuration document describing how a
//! CDN property handles requests. The document root carries a single `rules`
//! node; every node holds match conditions (`criteria`), leaf directives
//! (`behaviors`) and nested rule groups (`children`).
//!
//! After decomposition a node's `children` no longer contains nested nodes:
//! each entry is an include token of the form `#include:<file>.json`
//! referencing an extracted template. [Child] models both states.
//!
//! Vendor documents carry keys this tool does not interpret
//! (`comments`, `criteriaMustSatisfy`, `ruleFormat`, ...). Those are kept
//! verbatim in order-preserving `extra` maps so a convert/merge round trip
//! does not lose them.
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Marker prefix for include tokens inside `children` arrays
pub const INCLUDE_PREFIX: &str = "#include:";

/// A complete rule-tree document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleTree {
    pub rules: RuleNode,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// A single rule group
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleNode {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(
        rename = "templateUuid",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub template_uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<Entity>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub behaviors: Vec<Entity>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Child>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub options: IndexMap<String, Value>,

    /// Property-Manager user-variable declarations (root rule only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<PmVariable>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// A child entry: either a nested rule group or an include token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Child {
    Include(String),
    Node(RuleNode),
}

impl Child {
    /// Build an include token for `file`
    pub fn include(file: &str) -> Self {
        Child::Include(format!("{INCLUDE_PREFIX}{file}"))
    }

    /// The referenced template file name, if this child is an include token
    pub fn include_name(&self) -> Option<&str> {
        match self {
            Child::Include(token) => token.strip_prefix(INCLUDE_PREFIX),
            Child::Node(_) => None,
        }
    }
}

/// A behavior or criterion
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub options: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    #[serde(
        rename = "templateUuid",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub template_uuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// A `PMUSER_*` user-variable declaration on the root rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmVariable {
    pub name: String,
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub hidden: bool,

    #[serde(default)]
    pub sensitive: bool,
}

impl RuleNode {
    /// Drop internal bookkeeping fields that must never appear in emitted
    /// templates.
    pub fn strip_transients(&mut self) {
        self.uuid = None;
        self.template_uuid = None;

        for entity in self.behaviors.iter_mut().chain(self.criteria.iter_mut()) {
            entity.strip_transients();
        }
    }
}

impl Entity {
    pub fn strip_transients(&mut self) {
        self.uuid = None;
        self.template_uuid = None;
        self.version = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn child_round_trips_between_token_and_node() {
        let raw = r##"["#include:Some_Name.json", {"name": "inline"}]"##;
        let children: Vec<Child> = serde_json::from_str(raw).unwrap();

        assert_eq!(children[0].include_name(), Some("Some_Name.json"));
        assert_eq!(children[1].include_name(), None);

        let rendered = serde_json::to_string(&children).unwrap();
        assert_eq!(rendered, r##"["#include:Some_Name.json",{"name":"inline"}]"##);
    }

    #[test]
    fn transients_are_stripped_recursively_per_node() {
        let raw = r#"{
            "name": "default",
            "uuid": "aaa",
            "templateUuid": "bbb",
            "behaviors": [{"name": "origin", "uuid": "ccc", "version": 3}]
        }"#;
        let mut node: RuleNode = serde_json::from_str(raw).unwrap();
        node.strip_transients();

        assert_eq!(node.uuid, None);
        assert_eq!(node.template_uuid, None);
        assert_eq!(node.behaviors[0].uuid, None);
        assert_eq!(node.behaviors[0].version, None);
    }

    #[test]
    fn unknown_vendor_keys_are_preserved() {
        let raw = r#"{"name":"default","criteriaMustSatisfy":"all","comments":"hand edited"}"#;
        let node: RuleNode = serde_json::from_str(raw).unwrap();

        assert_eq!(
            node.extra.get("criteriaMustSatisfy"),
            Some(&Value::from("all"))
        );
        assert_eq!(
            serde_json::to_string(&node).unwrap(),
            r#"{"name":"default","criteriaMustSatisfy":"all","comments":"hand edited"}"#
        );
    }
}
