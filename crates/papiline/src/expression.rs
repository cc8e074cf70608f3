//! `${...}` placeholder expressions
//!
//! Configuration values reference environment-specific data through a small
//! path grammar: `${level1.level2.numDrinks}`, `${list[1]}`. Literal text
//! passes through unchanged and `\$` emits a verbatim `$` so a literal
//! `${...}` can be written as `\${...}`.
//!
//! When the whole input is exactly one placeholder the resolved value is
//! returned as-is (number, boolean, null, array, object). A placeholder
//! embedded in surrounding text is stringified via [Value::to_text].
//!
//! Lookup is delegated to the [Context] capability so callers decide what a
//! path resolves against; [Value] implements it for plain data.
use crate::value::Value;

/// Path lookup capability for placeholder resolution
///
/// `get` resolves a single path segment; an array index `[n]` is resolved
/// the same way as a `.n` step, so implementations receive the index as its
/// decimal string.
pub trait Context {
    fn get(&self, key: &str) -> Option<&Self>
    where
        Self: Sized;

    /// Terminal conversion of the resolved node into a plain value
    fn final_value(&self) -> Value;
}

impl Context for Value {
    fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Value::Object(object) => object.get(key),
            Value::Array(array) => key
                .parse::<usize>()
                .ok()
                .and_then(|index| array.get(index)),
            _ => None,
        }
    }

    fn final_value(&self) -> Value {
        self.clone()
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ExpressionError {
    /// The path references a key or index the context cannot resolve
    #[error("undefined variable '{key}' in '${{{path}}}'")]
    MissingVariable { path: String, key: String },

    #[error("invalid placeholder '${{{text}}}'")]
    InvalidPlaceholder { text: String },

    #[error("unterminated placeholder in '{text}'")]
    UnterminatedPlaceholder { text: String },
}

#[derive(Debug)]
enum Segment {
    Literal(String),
    Placeholder { body: String, steps: Vec<String> },
}

/// Substitute all placeholders in `text` against `context`
///
/// Returns the raw resolved value when `text` is exactly one placeholder,
/// otherwise the string with every placeholder stringified in place.
pub fn parse<C: Context>(text: &str, context: &C) -> Result<Value, ExpressionError> {
    let segments = scan(text)?;

    if let [Segment::Placeholder { body, steps }] = segments.as_slice() {
        return Ok(resolve(body, steps, context)?.final_value());
    }

    let mut out = String::with_capacity(text.len());
    for segment in &segments {
        match segment {
            Segment::Literal(literal) => out.push_str(literal),
            Segment::Placeholder { body, steps } => {
                out.push_str(&resolve(body, steps, context)?.final_value().to_text())
            }
        }
    }

    Ok(Value::String(out))
}

fn resolve<'c, C: Context>(
    body: &str,
    steps: &[String],
    context: &'c C,
) -> Result<&'c C, ExpressionError> {
    let mut current = context;
    for step in steps {
        current = current
            .get(step)
            .ok_or_else(|| ExpressionError::MissingVariable {
                path: body.to_string(),
                key: step.clone(),
            })?;
    }

    Ok(current)
}

fn scan(text: &str) -> Result<Vec<Segment>, ExpressionError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'$') {
            chars.next();
            literal.push('$');
            continue;
        }

        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut body = String::new();
            let mut closed = false;
            for inner in chars.by_ref() {
                if inner == '}' {
                    closed = true;
                    break;
                }
                body.push(inner);
            }

            if !closed {
                return Err(ExpressionError::UnterminatedPlaceholder {
                    text: text.to_string(),
                });
            }

            let steps = parse_path(&body)?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder { body, steps });
            continue;
        }

        literal.push(c);
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(segments)
}

/// Parse a placeholder body: `identifier ( '.' identifier | '[' integer ']' )*`
fn parse_path(body: &str) -> Result<Vec<String>, ExpressionError> {
    fn read_identifier(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
        let mut identifier = String::new();
        while let Some(&c) = chars.peek() {
            if matches!(c, '.' | '[' | ']') {
                break;
            }
            identifier.push(c);
            chars.next();
        }
        identifier
    }

    let invalid = || ExpressionError::InvalidPlaceholder {
        text: body.to_string(),
    };

    let mut chars = body.chars().peekable();
    let mut steps = Vec::new();

    let first = read_identifier(&mut chars);
    if first.is_empty() {
        return Err(invalid());
    }
    steps.push(first);

    while let Some(&c) = chars.peek() {
        match c {
            '.' => {
                chars.next();
                let identifier = read_identifier(&mut chars);
                if identifier.is_empty() {
                    return Err(invalid());
                }
                steps.push(identifier);
            }
            '[' => {
                chars.next();
                let mut digits = String::new();
                while let Some(&digit) = chars.peek() {
                    if !digit.is_ascii_digit() {
                        break;
                    }
                    digits.push(digit);
                    chars.next();
                }
                if digits.is_empty() || chars.next() != Some(']') {
                    return Err(invalid());
                }
                steps.push(digits);
            }
            _ => return Err(invalid()),
        }
    }

    Ok(steps)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn context(raw: &str) -> Value {
        serde_json::from_str(raw).expect("context must parse")
    }

    #[test]
    fn embedded_placeholder_is_stringified() {
        let ctx = context(r#"{"foo": "bar"}"#);
        assert_eq!(
            parse("blah-${foo} and then", &ctx).unwrap(),
            Value::from("blah-bar and then")
        );
    }

    #[test]
    fn whole_placeholder_returns_raw_value() {
        let ctx = context(r#"{"level1": {"level2": {"numDrinks": 5}}}"#);
        assert_eq!(
            parse("${level1.level2.numDrinks}", &ctx).unwrap(),
            Value::Integer(5)
        );
    }

    #[test]
    fn escaped_placeholder_is_emitted_verbatim() {
        let ctx = context(r#"{}"#);
        assert_eq!(
            parse("Some like \\${x} on the rocks", &ctx).unwrap(),
            Value::from("Some like ${x} on the rocks")
        );
    }

    #[test]
    fn array_index_resolves_like_a_path_step() {
        let ctx = context(r#"{"level1": {"list": ["A", "B", "C"]}}"#);
        assert_eq!(parse("${level1.list[1]}", &ctx).unwrap(), Value::from("B"));
    }

    #[test]
    fn index_out_of_range_names_the_offending_key() {
        let ctx = context(r#"{"foobar": {"blah": [1, 2, 3, 4]}}"#);
        assert_eq!(
            parse("${foobar.blah[7]}", &ctx).unwrap_err(),
            ExpressionError::MissingVariable {
                path: "foobar.blah[7]".to_string(),
                key: "7".to_string(),
            }
        );
    }

    #[test]
    fn missing_key_is_not_defaulted() {
        let ctx = context(r#"{"known": 1}"#);
        assert_eq!(
            parse("${unknown}", &ctx).unwrap_err(),
            ExpressionError::MissingVariable {
                path: "unknown".to_string(),
                key: "unknown".to_string(),
            }
        );
    }

    #[test]
    fn embedded_containers_render_as_pretty_json() {
        let ctx = context(r#"{"netStorageInfo": {"cpCode": 7}, "nothing": null}"#);
        assert_eq!(
            parse("info=${netStorageInfo} none=${nothing}", &ctx).unwrap(),
            Value::from("info={\n  \"cpCode\": 7\n} none=null")
        );
    }

    #[test]
    fn adjacent_placeholders_are_joined() {
        let ctx = context(r#"{"a": 1, "b": 2}"#);
        assert_eq!(parse("${a}${b}", &ctx).unwrap(), Value::from("12"));
    }

    #[test]
    fn malformed_paths_are_rejected() {
        let ctx = context(r#"{}"#);
        assert!(matches!(
            parse("${}", &ctx).unwrap_err(),
            ExpressionError::InvalidPlaceholder { .. }
        ));
        assert!(matches!(
            parse("${a[x]}", &ctx).unwrap_err(),
            ExpressionError::InvalidPlaceholder { .. }
        ));
        assert!(matches!(
            parse("${a.b", &ctx).unwrap_err(),
            ExpressionError::UnterminatedPlaceholder { .. }
        ));
    }
}
