//! Helper functions callable from template expressions.
//!
//! Helpers are looked up by name in a read-only [`HelperRegistry`]. Each helper
//! declares an ordered list of argument schemas; the evaluator validates the
//! positional arguments against them before invoking the helper, so helper
//! implementations can assume well-typed input.
//!
//! ```text
//! ${upper(var.name)}
//! ${join(split("a,b,c", ","), "-")}
//! ${jsonDecode(var.payload).key}
//! ```

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::value::TemplateValue;

/// Signature of a helper implementation. Arguments have already been
/// validated against the helper's schemas.
pub type HelperFn = fn(&[TemplateValue]) -> Result<TemplateValue>;

/// The type an argument must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    StringOrArray,
    /// Any non-collection value
    Primitive,
    Any,
}

impl ArgumentKind {
    #[must_use]
    pub const fn accepts(self, value: &TemplateValue) -> bool {
        match self {
            Self::String => matches!(value, TemplateValue::String(_)),
            Self::Number => matches!(value, TemplateValue::Number(_)),
            Self::Boolean => matches!(value, TemplateValue::Bool(_)),
            Self::Array => matches!(value, TemplateValue::Array(_)),
            Self::Object => matches!(value, TemplateValue::Object(_)),
            Self::StringOrArray => matches!(value, TemplateValue::String(_) | TemplateValue::Array(_)),
            Self::Primitive => value.is_primitive(),
            Self::Any => true,
        }
    }

    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::StringOrArray => "string or array",
            Self::Primitive => "primitive",
            Self::Any => "any value",
        }
    }
}

/// Schema for one positional helper argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentSchema {
    pub name: &'static str,
    pub kind: ArgumentKind,
    pub required: bool,
}

const fn required(name: &'static str, kind: ArgumentKind) -> ArgumentSchema {
    ArgumentSchema {
        name,
        kind,
        required: true,
    }
}

const fn optional(name: &'static str, kind: ArgumentKind) -> ArgumentSchema {
    ArgumentSchema {
        name,
        kind,
        required: false,
    }
}

/// A named helper function.
#[derive(Debug, Clone)]
pub struct TemplateHelper {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<ArgumentSchema>,
    pub func: HelperFn,
    /// When the helper returns a collection, only the provenance of its
    /// collection-valued arguments is carried into the result.
    pub skip_input_tracking_for_collection_values: bool,
}

impl TemplateHelper {
    fn new(
        name: &'static str,
        description: &'static str,
        arguments: Vec<ArgumentSchema>,
        func: HelperFn,
    ) -> Self {
        Self {
            name,
            description,
            arguments,
            func,
            skip_input_tracking_for_collection_values: false,
        }
    }

    /// Validate positional arguments against the declared schemas.
    ///
    /// Returns a message naming the offending argument and its index.
    pub fn validate_arguments(&self, args: &[TemplateValue]) -> std::result::Result<(), String> {
        if args.len() > self.arguments.len() {
            return Err(format!(
                "Function '{}' takes at most {} argument(s), but {} were given.",
                self.name,
                self.arguments.len(),
                args.len()
            ));
        }

        for (index, schema) in self.arguments.iter().enumerate() {
            match args.get(index) {
                None | Some(TemplateValue::Undefined) => {
                    if schema.required {
                        return Err(format!(
                            "Missing argument '{}' (at index {index}) for function '{}'.",
                            schema.name, self.name
                        ));
                    }
                }
                Some(value) if !schema.kind.accepts(value) => {
                    return Err(format!(
                        "Error validating argument '{}' (at index {index}) for function '{}': expected {}, got {}.",
                        schema.name,
                        self.name,
                        schema.kind.describe(),
                        value.type_name()
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

/// A read-only registry of helper functions.
#[derive(Debug, Clone, Default)]
pub struct HelperRegistry {
    helpers: BTreeMap<&'static str, TemplateHelper>,
}

impl HelperRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry of built-in helpers.
    #[must_use]
    pub fn builtin() -> Self {
        use ArgumentKind::{Any, Array, Number, StringOrArray};
        use ArgumentKind::String as Str;

        let mut registry = Self::new();
        let mut concat = TemplateHelper::new(
            "concat",
            "Concatenates two arrays or two strings.",
            vec![required("arg1", StringOrArray), required("arg2", StringOrArray)],
            helper_concat,
        );
        concat.skip_input_tracking_for_collection_values = true;

        for helper in [
            TemplateHelper::new("base64Decode", "Decodes a base64 string.", vec![required("string", Str)], helper_base64_decode),
            TemplateHelper::new("base64Encode", "Encodes a string as base64.", vec![required("string", Str)], helper_base64_encode),
            TemplateHelper::new("camelCase", "Converts a string to camelCase.", vec![required("string", Str)], |args| {
                Ok(camel_case(str_arg(args, 0)).into())
            }),
            concat,
            TemplateHelper::new(
                "indent",
                "Indents each line of a string with the given number of spaces.",
                vec![required("string", Str), required("spaces", Number)],
                helper_indent,
            ),
            TemplateHelper::new("isEmpty", "Returns true if the value is empty.", vec![required("value", Any)], helper_is_empty),
            TemplateHelper::new(
                "join",
                "Joins an array of values with a separator.",
                vec![required("input", Array), required("separator", Str)],
                helper_join,
            ),
            TemplateHelper::new("jsonDecode", "Decodes a JSON string.", vec![required("string", Str)], helper_json_decode),
            TemplateHelper::new(
                "jsonEncode",
                "Encodes a value as JSON.",
                vec![required("value", Any), optional("indentSpaces", Number)],
                helper_json_encode,
            ),
            TemplateHelper::new("kebabCase", "Converts a string to kebab-case.", vec![required("string", Str)], |args| {
                Ok(join_words(str_arg(args, 0), "-").into())
            }),
            TemplateHelper::new("lower", "Converts a string to lowercase.", vec![required("string", Str)], |args| {
                Ok(str_arg(args, 0).to_lowercase().into())
            }),
            TemplateHelper::new(
                "replace",
                "Replaces every occurrence of a substring.",
                vec![required("string", Str), required("substring", Str), required("replacement", Str)],
                |args| Ok(str_arg(args, 0).replace(str_arg(args, 1), str_arg(args, 2)).into()),
            ),
            TemplateHelper::new("sha256", "Creates a SHA256 hash of a string.", vec![required("string", Str)], |args| {
                Ok(hex::encode(Sha256::digest(str_arg(args, 0).as_bytes())).into())
            }),
            TemplateHelper::new(
                "slice",
                "Slices a string or array between two indices.",
                vec![required("input", StringOrArray), required("start", Number), optional("end", Number)],
                helper_slice,
            ),
            TemplateHelper::new("snakeCase", "Converts a string to snake_case.", vec![required("string", Str)], |args| {
                Ok(join_words(str_arg(args, 0), "_").into())
            }),
            TemplateHelper::new(
                "split",
                "Splits a string by a separator.",
                vec![required("string", Str), required("separator", Str)],
                helper_split,
            ),
            TemplateHelper::new("string", "Converts a value to a string.", vec![required("value", Any)], |args| {
                Ok(args[0].to_template_string().into())
            }),
            TemplateHelper::new(
                "trim",
                "Trims whitespace, or the given characters, from both ends of a string.",
                vec![required("string", Str), optional("characters", Str)],
                helper_trim,
            ),
            TemplateHelper::new("upper", "Converts a string to uppercase.", vec![required("string", Str)], |args| {
                Ok(str_arg(args, 0).to_uppercase().into())
            }),
            TemplateHelper::new("uuidv4", "Generates a random v4 UUID.", vec![], |_| {
                Ok(uuid::Uuid::new_v4().to_string().into())
            }),
            TemplateHelper::new("yamlDecode", "Decodes a YAML string.", vec![required("string", Str)], helper_yaml_decode),
            TemplateHelper::new("yamlEncode", "Encodes a value as YAML.", vec![required("value", Any)], helper_yaml_encode),
        ] {
            registry.register(helper);
        }

        registry
    }

    /// Add a helper, replacing any existing helper with the same name.
    pub fn register(&mut self, helper: TemplateHelper) {
        self.helpers.insert(helper.name, helper);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TemplateHelper> {
        self.helpers.get(name)
    }

    /// All registered helper names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.helpers.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}

static BUILTIN_HELPERS: LazyLock<HelperRegistry> = LazyLock::new(HelperRegistry::builtin);

/// The shared built-in helper registry.
#[must_use]
pub fn builtin_helpers() -> &'static HelperRegistry {
    &BUILTIN_HELPERS
}

fn str_arg(args: &[TemplateValue], index: usize) -> &str {
    args.get(index).and_then(TemplateValue::as_str).unwrap_or_default()
}

fn helper_base64_decode(args: &[TemplateValue]) -> Result<TemplateValue> {
    let bytes = BASE64.decode(str_arg(args, 0)).context("input is not valid base64")?;
    let decoded = String::from_utf8(bytes).context("decoded base64 is not valid UTF-8")?;
    Ok(decoded.into())
}

fn helper_base64_encode(args: &[TemplateValue]) -> Result<TemplateValue> {
    Ok(BASE64.encode(str_arg(args, 0)).into())
}

fn helper_concat(args: &[TemplateValue]) -> Result<TemplateValue> {
    match (&args[0], &args[1]) {
        (TemplateValue::Array(a), TemplateValue::Array(b)) => {
            Ok(TemplateValue::Array(a.iter().chain(b.iter()).cloned().collect()))
        }
        (TemplateValue::String(a), TemplateValue::String(b)) => Ok(format!("{a}{b}").into()),
        (a, b) => bail!(
            "both arguments must be arrays or both must be strings, got {} and {}",
            a.type_name(),
            b.type_name()
        ),
    }
}

/// Largest indentation `indent` accepts.
pub const MAX_INDENT: u16 = 1024;

/// `JSON.stringify` clamps its indentation to this many spaces.
const MAX_JSON_INDENT: f64 = 10.0;

fn helper_indent(args: &[TemplateValue]) -> Result<TemplateValue> {
    let spaces = args[1].as_number().unwrap_or_default();
    if spaces < 0.0 || spaces.fract() != 0.0 {
        bail!("spaces must be a non-negative integer, got {spaces}");
    }
    if spaces > f64::from(MAX_INDENT) {
        bail!("spaces must be at most {MAX_INDENT}, got {spaces}");
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let prefix = " ".repeat(spaces as usize);
    let indented: Vec<String> = str_arg(args, 0).split('\n').map(|line| format!("{prefix}{line}")).collect();
    Ok(indented.join("\n").into())
}

fn helper_is_empty(args: &[TemplateValue]) -> Result<TemplateValue> {
    let empty = match &args[0] {
        TemplateValue::String(s) => s.is_empty(),
        TemplateValue::Array(items) => items.is_empty(),
        TemplateValue::Object(map) => map.is_empty(),
        TemplateValue::Undefined
        | TemplateValue::Null
        | TemplateValue::Bool(_)
        | TemplateValue::Number(_) => true,
    };
    Ok(empty.into())
}

fn helper_join(args: &[TemplateValue]) -> Result<TemplateValue> {
    let TemplateValue::Array(items) = &args[0] else {
        bail!("input must be an array");
    };
    if let Some(item) = items.iter().find(|item| item.is_collection()) {
        bail!("array items must be primitives, found {}", item.type_name());
    }
    let parts: Vec<String> = items.iter().map(TemplateValue::to_template_string).collect();
    Ok(parts.join(str_arg(args, 1)).into())
}

fn helper_json_decode(args: &[TemplateValue]) -> Result<TemplateValue> {
    let value: serde_json::Value =
        serde_json::from_str(str_arg(args, 0)).context("input is not valid JSON")?;
    Ok(value.into())
}

fn helper_json_encode(args: &[TemplateValue]) -> Result<TemplateValue> {
    let json = args[0].to_json();
    let encoded = match args.get(1).and_then(TemplateValue::as_number) {
        Some(indent) if indent >= 1.0 => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let indent = " ".repeat(indent.min(MAX_JSON_INDENT) as usize);
            let mut out = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
            serde::Serialize::serialize(&json, &mut serializer)?;
            String::from_utf8(out)?
        }
        _ => serde_json::to_string(&json)?,
    };
    Ok(encoded.into())
}

/// Resolve a JS-style slice index (negative counts from the end) into bounds.
fn slice_index(index: f64, len: usize) -> usize {
    #[allow(clippy::cast_precision_loss)]
    let len_f = len as f64;
    let resolved = if index < 0.0 { (len_f + index.trunc()).max(0.0) } else { index.trunc().min(len_f) };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        resolved as usize
    }
}

fn helper_slice(args: &[TemplateValue]) -> Result<TemplateValue> {
    let start = args[1].as_number().unwrap_or_default();
    let end = args.get(2).and_then(TemplateValue::as_number);

    match &args[0] {
        TemplateValue::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let from = slice_index(start, chars.len());
            let to = end.map_or(chars.len(), |e| slice_index(e, chars.len()));
            Ok(chars.get(from..to.max(from)).unwrap_or_default().iter().collect::<String>().into())
        }
        TemplateValue::Array(items) => {
            let from = slice_index(start, items.len());
            let to = end.map_or(items.len(), |e| slice_index(e, items.len()));
            Ok(TemplateValue::Array(items.get(from..to.max(from)).unwrap_or_default().to_vec()))
        }
        other => Err(anyhow!("input must be a string or array, got {}", other.type_name())),
    }
}

fn helper_split(args: &[TemplateValue]) -> Result<TemplateValue> {
    let input = str_arg(args, 0);
    let separator = str_arg(args, 1);
    let parts: Vec<TemplateValue> = if separator.is_empty() {
        input.chars().map(|c| TemplateValue::String(c.to_string())).collect()
    } else {
        input.split(separator).map(TemplateValue::from).collect()
    };
    Ok(TemplateValue::Array(parts))
}

fn helper_trim(args: &[TemplateValue]) -> Result<TemplateValue> {
    let input = str_arg(args, 0);
    let trimmed = match args.get(1).and_then(TemplateValue::as_str) {
        Some(characters) => input.trim_matches(|c: char| characters.contains(c)),
        None => input.trim(),
    };
    Ok(trimmed.into())
}

fn helper_yaml_decode(args: &[TemplateValue]) -> Result<TemplateValue> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(str_arg(args, 0)).context("input is not valid YAML")?;
    Ok(value.into())
}

fn helper_yaml_encode(args: &[TemplateValue]) -> Result<TemplateValue> {
    Ok(serde_yaml::to_string(&args[0])?.into())
}

/// Split a string into lowercase words on separators and case boundaries.
fn words(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn join_words(input: &str, separator: &str) -> String {
    words(input).join(separator)
}

fn camel_case(input: &str) -> String {
    words(input)
        .iter()
        .enumerate()
        .map(|(i, word)| {
            if i == 0 {
                word.clone()
            } else {
                let mut chars = word.chars();
                chars.next().map_or_else(String::new, |first| first.to_uppercase().chain(chars).collect())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: Vec<TemplateValue>) -> Result<TemplateValue> {
        let helper = builtin_helpers().get(name).unwrap();
        helper.validate_arguments(&args).map_err(|e| anyhow!(e))?;
        (helper.func)(&args)
    }

    #[test]
    fn test_case_conversions() {
        assert_eq!(call("camelCase", vec!["Foo Bar-baz".into()]).unwrap(), "fooBarBaz".into());
        assert_eq!(call("kebabCase", vec!["fooBarBaz".into()]).unwrap(), "foo-bar-baz".into());
        assert_eq!(call("snakeCase", vec!["XMLHttpRequest".into()]).unwrap(), "xml_http_request".into());
    }

    #[test]
    fn test_missing_required_argument_names_argument_and_index() {
        let helper = builtin_helpers().get("replace").unwrap();
        let err = helper.validate_arguments(&["abc".into(), "b".into()]).unwrap_err();
        assert!(err.contains("Missing argument 'replacement' (at index 2)"), "{err}");
    }

    #[test]
    fn test_wrong_argument_type() {
        let helper = builtin_helpers().get("upper").unwrap();
        let err = helper.validate_arguments(&[1i64.into()]).unwrap_err();
        assert!(err.contains("expected string, got number"), "{err}");
    }

    #[test]
    fn test_base64_round_trip_and_sha256() {
        let encoded = call("base64Encode", vec!["hello".into()]).unwrap();
        assert_eq!(encoded, "aGVsbG8=".into());
        assert_eq!(call("base64Decode", vec![encoded]).unwrap(), "hello".into());
        assert_eq!(
            call("sha256", vec!["abc".into()]).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".into()
        );
    }

    #[test]
    fn test_slice_supports_negative_indices() {
        assert_eq!(call("slice", vec!["abcdef".into(), (-3i64).into()]).unwrap(), "def".into());
        assert_eq!(
            call("slice", vec![vec![1i64, 2, 3, 4].into(), 1i64.into(), 3i64.into()]).unwrap(),
            vec![2i64, 3].into()
        );
        assert_eq!(call("slice", vec!["abc".into(), 2i64.into(), 1i64.into()]).unwrap(), "".into());
    }

    #[test]
    fn test_concat_requires_matching_types() {
        assert_eq!(
            call("concat", vec![vec![1i64].into(), vec![2i64].into()]).unwrap(),
            vec![1i64, 2].into()
        );
        assert!(call("concat", vec![vec![1i64].into(), "x".into()]).is_err());
    }

    #[test]
    fn test_json_and_yaml_helpers() {
        let decoded = call("jsonDecode", vec![r#"{"a": [1, 2]}"#.into()]).unwrap();
        assert_eq!(decoded.to_json(), json!({"a": [1, 2]}));
        assert_eq!(call("jsonEncode", vec![decoded.clone()]).unwrap(), r#"{"a":[1,2]}"#.into());
        assert!(call("jsonDecode", vec!["{nope".into()]).is_err());
        let yaml = call("yamlEncode", vec![decoded]).unwrap();
        assert_eq!(call("yamlDecode", vec![yaml]).unwrap().to_json(), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_split_join_trim_indent() {
        let parts = call("split", vec!["a,b,c".into(), ",".into()]).unwrap();
        assert_eq!(call("join", vec![parts, "-".into()]).unwrap(), "a-b-c".into());
        assert_eq!(call("trim", vec!["--x--".into(), "-".into()]).unwrap(), "x".into());
        assert_eq!(call("indent", vec!["a\nb".into(), 2i64.into()]).unwrap(), "  a\n  b".into());
    }

    #[test]
    fn test_indentation_widths_are_bounded() {
        let err = call("indent", vec!["a".into(), TemplateValue::Number(1e17)]).unwrap_err();
        assert!(err.to_string().contains("spaces must be at most 1024"), "{err}");
        assert!(call("indent", vec!["a".into(), TemplateValue::Number(f64::INFINITY)]).is_err());
        assert!(call("indent", vec!["a".into(), TemplateValue::Number(1024.0)]).is_ok());

        // Like JSON.stringify, widths above ten are clamped.
        let value: TemplateValue = json!({ "a": 1 }).into();
        let encoded = call("jsonEncode", vec![value.clone(), TemplateValue::Number(1e17)]).unwrap();
        assert_eq!(encoded, format!("{{\n{}\"a\": 1\n}}", " ".repeat(10)).into());
        assert_eq!(call("jsonEncode", vec![value, 2i64.into()]).unwrap(), "{\n  \"a\": 1\n}".into());
    }

    #[test]
    fn test_is_empty() {
        assert_eq!(call("isEmpty", vec![TemplateValue::Array(vec![])]).unwrap(), true.into());
        assert_eq!(call("isEmpty", vec!["x".into()]).unwrap(), false.into());
    }

    #[test]
    fn test_registry_lists_names_sorted() {
        let names: Vec<&str> = builtin_helpers().names().collect();
        assert_eq!(names.first(), Some(&"base64Decode"));
        assert!(names.contains(&"yamlEncode"));
        assert!(names.windows(2).all(|w| w[0] < w[1]));
    }
}
