use std::collections::HashSet;
use std::path::Path;

use anyhow::Context as _;

use crate::foundation::error::{FrameloopError, FrameloopResult};
use crate::foundation::fsutil::{read_json_opt, write_json_atomic};
use crate::schema::lexer::{Token, TokenKind, lex};
use crate::schema::model::{FieldDescriptor, FieldKind, Schema, SelectOption};
use crate::schema::parser::{Arg, Bindings, Parser, Value};

/// Module name field constructors are called through (`schema.Text(...)`).
pub const SCHEMA_MODULE: &str = "schema";

/// Constructors with native support, mapped to their field kind.
pub const SUPPORTED_CONSTRUCTORS: [&str; 6] =
    ["Location", "Text", "Toggle", "Dropdown", "Color", "DateTime"];

/// Constructors that are recognized but only configurable through a raw text fallback.
pub const UNSUPPORTED_CONSTRUCTORS: [&str; 5] =
    ["LocationBased", "Typeahead", "OAuth2", "PhotoSelect", "Generated"];

/// Positional parameter order shared by every field constructor.
const POSITIONAL: [&str; 4] = ["id", "name", "desc", "icon"];

const DEFAULT_VERSION: &str = "1";

/// A constructor call that was recognized but could not become a field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedField {
    /// Constructor name.
    pub constructor: String,
    /// Byte offset of the call in the source.
    pub offset: usize,
    /// Why it was skipped.
    pub reason: String,
}

/// Extraction result plus the calls that degraded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaReport {
    /// Extracted schema.
    pub schema: Schema,
    /// Recognized calls left out of `schema`.
    pub skipped: Vec<SkippedField>,
}

/// Field kind for a constructor name, `None` when it does not declare a field.
pub fn classify_constructor(name: &str) -> Option<FieldKind> {
    let kind = match name {
        "Location" => FieldKind::Location,
        "Text" => FieldKind::Text,
        "Toggle" => FieldKind::Boolean,
        "Dropdown" => FieldKind::SingleSelect,
        "Color" => FieldKind::Color,
        "DateTime" => FieldKind::DateTime,
        other if UNSUPPORTED_CONSTRUCTORS.contains(&other) => FieldKind::unsupported(other),
        _ => return None,
    };
    Some(kind)
}

/// Extract the configuration schema from app source without executing it.
///
/// Never fails: when the source cannot be tokenized at all the result is an empty schema and the
/// error is logged. Individual fields that cannot be resolved are skipped.
pub fn extract_schema(source: &str) -> Schema {
    match try_extract_schema(source) {
        Ok(report) => {
            for s in &report.skipped {
                tracing::debug!(
                    constructor = %s.constructor,
                    offset = s.offset,
                    reason = %s.reason,
                    "schema field skipped"
                );
            }
            report.schema
        }
        Err(err) => {
            tracing::warn!(error = %err, "schema extraction failed; using empty schema");
            Schema {
                version: DEFAULT_VERSION.to_owned(),
                fields: Vec::new(),
            }
        }
    }
}

/// Like [`extract_schema`] but reports total failure as [`FrameloopError::SchemaParse`] and
/// returns the skipped calls.
pub fn try_extract_schema(source: &str) -> FrameloopResult<SchemaReport> {
    let tokens = lex(source).map_err(|e| FrameloopError::schema_parse(e.to_string()))?;
    let bindings = Bindings::collect(&tokens);

    let mut report = SchemaReport {
        schema: Schema {
            version: DEFAULT_VERSION.to_owned(),
            fields: Vec::new(),
        },
        skipped: Vec::new(),
    };
    let mut seen = HashSet::<String>::new();
    let mut version_set = false;

    for i in 0..tokens.len() {
        let Some(ctor) = constructor_at(&tokens, i) else {
            continue;
        };
        let offset = tokens[i].span.start;
        let mut parser = Parser::at(&tokens, i + 4);
        let args = parser.parse_call_args();
        let call = Call {
            args: &args,
            bindings: &bindings,
            at: i,
        };

        if ctor == "Schema" {
            if !version_set && let Some(v) = call.scalar("version", None) {
                report.schema.version = v;
                version_set = true;
            }
            continue;
        }

        let Some(kind) = classify_constructor(ctor) else {
            continue;
        };
        match build_field(&call, kind) {
            Ok(field) => {
                if seen.insert(field.key.clone()) {
                    report.schema.fields.push(field);
                } else {
                    report.skipped.push(SkippedField {
                        constructor: ctor.to_owned(),
                        offset,
                        reason: format!("duplicate key '{}'", field.key),
                    });
                }
            }
            Err(reason) => report.skipped.push(SkippedField {
                constructor: ctor.to_owned(),
                offset,
                reason,
            }),
        }
    }

    Ok(report)
}

/// Read `source_path` and extract its schema.
pub fn extract_schema_from_file(source_path: &Path) -> FrameloopResult<Schema> {
    let source = std::fs::read_to_string(source_path)
        .with_context(|| format!("read app source '{}'", source_path.display()))?;
    Ok(extract_schema(&source))
}

/// Schema for `source_path`, reusing `schema_path` unless the source is newer.
///
/// A fresh extraction is written back atomically.
pub fn load_or_extract(source_path: &Path, schema_path: &Path) -> FrameloopResult<Schema> {
    if is_fresh(source_path, schema_path)
        && let Some(schema) = read_json_opt::<Schema>(schema_path)?
    {
        return Ok(schema);
    }
    let schema = extract_schema_from_file(source_path)?;
    write_json_atomic(schema_path, &schema)?;
    tracing::debug!(
        schema = %schema_path.display(),
        fields = schema.fields.len(),
        "schema regenerated"
    );
    Ok(schema)
}

fn is_fresh(source_path: &Path, schema_path: &Path) -> bool {
    let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(source_path), modified(schema_path)) {
        (Some(src), Some(cached)) => cached >= src,
        _ => false,
    }
}

/// `schema . Ctor (` at `i`, not itself the tail of a longer dotted name.
fn constructor_at(tokens: &[Token], i: usize) -> Option<&str> {
    if !matches!(&tokens[i].kind, TokenKind::Ident(m) if m == SCHEMA_MODULE) {
        return None;
    }
    if i > 0 && tokens[i - 1].kind == TokenKind::Dot {
        return None;
    }
    match (
        &tokens.get(i + 1)?.kind,
        &tokens.get(i + 2)?.kind,
        &tokens.get(i + 3)?.kind,
    ) {
        (TokenKind::Dot, TokenKind::Ident(ctor), TokenKind::LParen) => Some(ctor.as_str()),
        _ => None,
    }
}

/// Arguments of one constructor call, resolved as seen from the call site.
struct Call<'a> {
    args: &'a [Arg],
    bindings: &'a Bindings,
    at: usize,
}

impl Call<'_> {
    fn raw(&self, name: &str, position: Option<usize>) -> Option<&Value> {
        if let Some(arg) = self.args.iter().find(|a| a.name.as_deref() == Some(name)) {
            return Some(&arg.value);
        }
        let position = position?;
        self.args
            .iter()
            .take_while(|a| a.name.is_none())
            .nth(position)
            .map(|a| &a.value)
    }

    fn value(&self, name: &str, position: Option<usize>) -> Option<Value> {
        self.raw(name, position)
            .map(|v| self.bindings.resolve(v, self.at))
    }

    fn scalar(&self, name: &str, position: Option<usize>) -> Option<String> {
        match self.value(name, position)? {
            call @ Value::Call { .. } if is_option_call(&call) => self.option_of(&call).map(|o| o.value),
            v => v.as_scalar(),
        }
    }

    fn field_arg(&self, name: &str) -> Option<String> {
        let position = POSITIONAL.iter().position(|p| *p == name);
        self.scalar(name, position)
    }

    fn option_of(&self, call: &Value) -> Option<SelectOption> {
        let Value::Call { args, .. } = call else {
            return None;
        };
        let inner = Call {
            args,
            bindings: self.bindings,
            at: self.at,
        };
        let value = inner.scalar("value", Some(1))?;
        let display = inner.scalar("display", Some(0)).unwrap_or_else(|| value.clone());
        Some(SelectOption { display, value })
    }
}

fn is_option_call(v: &Value) -> bool {
    matches!(v, Value::Call { callee, .. } if callee.last().is_some_and(|c| c == "Option"))
}

fn build_field(call: &Call<'_>, kind: FieldKind) -> Result<FieldDescriptor, String> {
    let key = call
        .field_arg("id")
        .filter(|k| !k.is_empty())
        .ok_or_else(|| "field id is missing or not a static string".to_owned())?;
    let label = call.field_arg("name").unwrap_or_else(|| key.clone());

    let options = match kind {
        FieldKind::SingleSelect => select_options(call)?,
        FieldKind::Color => palette(call),
        _ => Vec::new(),
    };

    Ok(FieldDescriptor {
        default: call.scalar("default", None),
        description: call.field_arg("desc"),
        icon: call.field_arg("icon"),
        key,
        kind,
        label,
        options,
    })
}

fn select_options(call: &Call<'_>) -> Result<Vec<SelectOption>, String> {
    let Some(Value::List(items)) = call.value("options", None) else {
        return Err("dropdown options are not a static list".to_owned());
    };
    let options = items
        .iter()
        .filter(|item| is_option_call(item))
        .filter_map(|item| call.option_of(item))
        .collect::<Vec<_>>();
    if options.is_empty() {
        return Err("dropdown has no resolvable options".to_owned());
    }
    Ok(options)
}

fn palette(call: &Call<'_>) -> Vec<SelectOption> {
    let Some(Value::List(items)) = call.value("palette", None) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::Str(s) => Some(SelectOption {
                display: s.clone(),
                value: s.clone(),
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/schema/extract.rs"]
mod tests;
