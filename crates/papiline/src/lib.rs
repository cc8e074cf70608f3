//! # papiline - property pipeline templating
//!
//! For CLI usage see the repository README.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `papiline` works internally.
//!
//! ### Rule-tree terms
//!
//! Quick introduction to terms used to describe elements of PAPI rule trees.
//!
//! In rule-tree terms...
//! - a property configuration is a single JSON document with one root `rules` node
//! - every node is a `rule group`:
//!   - `criteria`: match conditions ("path matches *.jpg")
//!   - `behaviors`: leaf directives ("compress response")
//!   - `children`: nested rule groups
//!   - `options`: per-node settings such as `is_secure`
//!
//! This is a valid (tiny) rule tree:
//! ```json
//! {
//!   "rules": {
//!     "name": "default",
//!     "behaviors": [{"name": "caching", "options": {"behavior": "NO_STORE"}}],
//!     "children": [{"name": "Static Assets", "criteria": [], "behaviors": []}]
//!   }
//! }
//! ```
//!
//! ### Loading files
//!
//! All inputs are JSON and frequently hand-edited, so [json_source] wraps
//! every parse with diagnostics mapping the failure back to a file, line and
//! column.
//!
//! ### Conversion
//!
//! see [template::TemplateEngine::process]
//!
//! Conversion turns one rule tree into a [template::TemplateBundle]: each
//! child rule group becomes its own include file (named after the sanitized
//! rule name, collision-suffixed `_2`, `_3`, ...), the parent keeps an
//! ordered list of `#include:<file>.json` tokens, and product-defined values
//! are extracted into variable definitions plus per-environment defaults
//! according to the [converter::ConverterRuleSet].
//!
//! ### Merge
//!
//! see [merge::merge]
//!
//! The inverse direction: include tokens are resolved back into nested
//! nodes (with cycle detection for hand-edited bundles) and `${env.*}`
//! references are substituted through [expression], which returns typed
//! values for whole-string placeholders so numbers stay numbers.
//!
//! ### Signing
//!
//! see [edgegrid::sign_with]
//!
//! Outbound API requests are authorized with an EG1-HMAC-SHA256 header
//! derived from a canonical request form; timestamp and nonce are plain
//! inputs so the signature is reproducible in tests.
pub mod converter;
pub mod edgegrid;
pub mod expression;
pub mod json_source;
pub mod merge;
pub mod rule_tree;
pub mod template;
pub mod value;
