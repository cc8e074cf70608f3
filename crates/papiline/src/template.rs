//! rule-tree to template-bundle conversion
//!
//! see [TemplateEngine::process]
//!
//! Conversion runs in two passes over a working copy of the input tree (the
//! input itself is never mutated):
//!
//! - **variable extraction**: driven by the product's [ConverterRuleSet]
//!   entries. Each locator is resolved via [converter::resolve_path]; the
//!   value found there becomes the environment default, the slot is replaced
//!   by a `${env.<name>}` reference and `{type, default}` is registered in
//!   the definitions map. Extraction runs before decomposition so locators
//!   may still descend through `children`.
//! - **structural decomposition**: every child rule group is extracted into
//!   its own template file and replaced by a `#include:<file>.json` token.
//!   File names derive from the rule name ([sanitize_name]); collisions
//!   are resolved on the sanitized name with `_2`, `_3`, ... suffixes.
//!   Grandchildren are flattened into the same template map. Bookkeeping
//!   fields (`uuid`, `templateUuid`, `version`) are stripped from every
//!   emitted rule and entity.
//!
//! Given identical inputs the produced [TemplateBundle] is byte-identical:
//! all maps preserve insertion order and nothing time- or randomness-
//! dependent enters the output.
use crate::converter::{self, ConverterRuleSet, PathResolutionError};
use crate::json_source::{self, JsonLoadError};
use crate::rule_tree::{Child, PmVariable, RuleNode, RuleTree};
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Well-known bundle file names
pub const MAIN_FILE: &str = "main.json";
pub const VARIABLES_FILE: &str = "variables.json";
pub const ENV_VARIABLES_FILE: &str = "envVariables.json";

/// Policy controlling whether product defaults become named variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariableMode {
    /// Extract system variable definitions
    #[default]
    Default,
    /// Additionally declare `PMUSER_*` user variables on the root rule
    UserVarValue,
    /// No extraction: values stay as literals, definitions stay empty
    NoVar,
}

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub product_id: String,
    pub variable_mode: VariableMode,
    /// A new property has no prior configuration to preserve, so product
    /// defaults are applied regardless of the variable mode
    pub is_for_new_property: bool,
}

/// Immutable result of one conversion pass
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateBundle {
    /// The root template, `children` replaced by include tokens
    pub main: RuleTree,

    /// One entry per extracted child group, keyed by file name
    pub templates: IndexMap<String, RuleNode>,

    /// `{type, default}` per distinct extracted variable
    pub variable_definitions: IndexMap<String, VariableDefinition>,

    /// Environment default value per extracted variable
    pub env_variables: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDefinition {
    #[serde(rename = "type")]
    pub variable_type: String,
    pub default: Value,
}

#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("unsupported product '{0}'")]
    UnsupportedProduct(String),

    #[error("converter rule '{variable_name}': {source}")]
    PathResolution {
        variable_name: String,
        #[source]
        source: PathResolutionError,
    },
}

/// Converts rule trees into template bundles
#[derive(derive_new::new, Debug)]
pub struct TemplateEngine {
    converter: ConverterRuleSet,
}

impl TemplateEngine {
    /// Run both conversion passes and assemble the bundle
    pub fn process(
        &self,
        tree: &RuleTree,
        options: &ProcessOptions,
    ) -> Result<TemplateBundle, ConvertError> {
        let rules = self
            .converter
            .rules_for(&options.product_id)
            .ok_or_else(|| ConvertError::UnsupportedProduct(options.product_id.clone()))?;

        let mut main = tree.clone();
        let mut variable_definitions = IndexMap::new();
        let mut env_variables = IndexMap::new();

        let run_extraction =
            options.is_for_new_property || options.variable_mode != VariableMode::NoVar;

        if run_extraction {
            for rule in rules {
                let resolved = match converter::resolve_path(&mut main, &rule.locator) {
                    Ok(resolved) => resolved,
                    Err(err) if !options.is_for_new_property => {
                        // imported trees keep user authoring: an unmatched
                        // rule is skipped, not fatal
                        tracing::debug!(locator = %err.locator, "locator unmatched, skipped");
                        continue;
                    }
                    Err(err) => {
                        return Err(ConvertError::PathResolution {
                            variable_name: rule.variable_name.clone(),
                            source: err,
                        })
                    }
                };

                let env_default = match resolved.options.get(&resolved.key) {
                    Some(value) => value.clone(),
                    None if options.is_for_new_property => {
                        rule.default.clone().unwrap_or(Value::Null)
                    }
                    None => {
                        tracing::debug!(
                            owner = %resolved.owner,
                            key = %resolved.key,
                            "no value to extract, skipped"
                        );
                        continue;
                    }
                };

                tracing::trace!(
                    owner = %resolved.owner,
                    variable = %rule.variable_name,
                    "extracting variable"
                );
                resolved.options.insert(
                    resolved.key.clone(),
                    Value::String(format!("${{env.{}}}", rule.variable_name)),
                );

                variable_definitions.insert(
                    rule.variable_name.clone(),
                    VariableDefinition {
                        variable_type: rule.variable_type.clone(),
                        default: rule.default.clone().unwrap_or(Value::Null),
                    },
                );
                env_variables.insert(rule.variable_name.clone(), env_default);
            }

            if options.variable_mode == VariableMode::UserVarValue {
                for name in variable_definitions.keys() {
                    main.rules.variables.push(PmVariable {
                        name: format!("PMUSER_{name}"),
                        value: Value::String(format!("${{env.{name}}}")),
                        description: None,
                        hidden: false,
                        sensitive: false,
                    });
                }
            }
        }

        let mut templates = IndexMap::new();
        decompose(&mut main.rules, &mut templates);

        Ok(TemplateBundle {
            main,
            templates,
            variable_definitions,
            env_variables,
        })
    }
}

fn decompose(node: &mut RuleNode, templates: &mut IndexMap<String, RuleNode>) {
    node.strip_transients();

    let children = std::mem::take(&mut node.children);
    for child in children {
        match child {
            // already converted to an include reference
            Child::Include(token) => node.children.push(Child::Include(token)),
            Child::Node(mut child_node) => {
                let file = allocate_file_name(&child_node.name, templates);
                tracing::trace!(rule = %child_node.name, %file, "extracting child rule");

                // reserve the slot so grandchildren collide against it
                templates.insert(file.clone(), RuleNode::default());
                decompose(&mut child_node, templates);
                templates.insert(file.clone(), child_node);

                node.children.push(Child::include(&file));
            }
        }
    }
}

fn allocate_file_name(name: &str, templates: &IndexMap<String, RuleNode>) -> String {
    let base = sanitize_name(name);

    let mut candidate = format!("{base}.json");
    let mut suffix = 2;
    while templates.contains_key(&candidate) {
        tracing::debug!(%candidate, "template name collision");
        candidate = format!("{base}_{suffix}.json");
        suffix += 1;
    }

    candidate
}

/// File-safe form of a rule name
///
/// Runs of characters outside `[A-Za-z0-9._-]` collapse into a single `_`;
/// leading and trailing `.` are stripped. A name with nothing left becomes
/// `_`.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_gap = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            in_gap = false;
        } else if !in_gap {
            out.push('_');
            in_gap = true;
        }
    }

    let trimmed = out.trim_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VariablesDocument {
    definitions: IndexMap<String, VariableDefinition>,
}

#[derive(thiserror::Error, Debug)]
pub enum BundleIoError {
    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Load(#[from] JsonLoadError),
}

impl TemplateBundle {
    /// Serialize the bundle into `dir` as `main.json`, one sibling file per
    /// template, `variables.json` and `envVariables.json`
    pub fn write_to(&self, dir: &Path) -> Result<(), BundleIoError> {
        std::fs::create_dir_all(dir)?;

        write_json(&dir.join(MAIN_FILE), &self.main)?;
        for (file, template) in &self.templates {
            write_json(&dir.join(file), template)?;
        }
        write_json(
            &dir.join(VARIABLES_FILE),
            &VariablesDocument {
                definitions: self.variable_definitions.clone(),
            },
        )?;
        write_json(&dir.join(ENV_VARIABLES_FILE), &self.env_variables)?;

        Ok(())
    }

    /// Load a bundle previously written with [TemplateBundle::write_to]
    ///
    /// Template files are loaded in file-name order so repeated loads are
    /// deterministic regardless of directory enumeration order.
    pub fn read_from(dir: &Path) -> Result<Self, BundleIoError> {
        let main: RuleTree = json_source::load_file(&dir.join(MAIN_FILE))?;
        let variables: VariablesDocument = json_source::load_file(&dir.join(VARIABLES_FILE))?;
        let env_variables: IndexMap<String, Value> =
            json_source::load_file(&dir.join(ENV_VARIABLES_FILE))?;

        let mut template_files = Vec::new();
        for dir_entry in std::fs::read_dir(dir)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }

            let file = dir_entry.file_name().to_string_lossy().to_string();
            let reserved = matches!(file.as_str(), MAIN_FILE | VARIABLES_FILE | ENV_VARIABLES_FILE);
            if reserved || !file.ends_with(".json") {
                continue;
            }

            template_files.push(file);
        }
        template_files.sort();

        let mut templates = IndexMap::new();
        for file in template_files {
            let template: RuleNode = json_source::load_file(&dir.join(&file))?;
            templates.insert(file, template);
        }

        Ok(Self {
            main,
            templates,
            variable_definitions: variables.definitions,
            env_variables,
        })
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), BundleIoError> {
    let mut text = serde_json::to_string_pretty(value).expect("value serialization cannot fail");
    text.push('\n');

    std::fs::write(path, text)?;
    tracing::info!(path=%path.display(), "wrote bundle file");
    Ok(())
}
