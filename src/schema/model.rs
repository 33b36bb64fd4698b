/// One selectable value of a dropdown or color palette.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SelectOption {
    /// Human-readable label.
    pub display: String,
    /// Value passed to the renderer.
    pub value: String,
}

/// Free-text entry offered in place of a field kind the runtime cannot drive natively.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextFallback {
    /// Hint shown next to the raw text input.
    pub hint: String,
}

/// Closed set of field kinds recognized in app source.
///
/// Adding a kind means adding a variant here and an entry in the extractor's constructor table.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Geographic location (JSON-encoded lat/lng/timezone value).
    Location,
    /// Free text.
    Text,
    /// On/off toggle, values `"true"`/`"false"`.
    Boolean,
    /// One value out of `FieldDescriptor::options`.
    SingleSelect,
    /// `#RRGGBB` color; palette entries appear as options.
    Color,
    /// RFC 3339 timestamp.
    DateTime,
    /// Recognized constructor without native support (auth flows, pickers, generated fields).
    Unsupported {
        /// Constructor name as written in the source.
        constructor: String,
        /// Raw text entry the user can fill in instead.
        fallback: TextFallback,
    },
}

impl FieldKind {
    /// Unsupported kind for `constructor` with its text fallback.
    pub fn unsupported(constructor: impl Into<String>) -> Self {
        let constructor = constructor.into();
        let hint = format!("{constructor} is not supported here; enter the raw value as text");
        FieldKind::Unsupported {
            constructor,
            fallback: TextFallback { hint },
        }
    }

    /// `true` for [`FieldKind::Unsupported`].
    pub fn is_unsupported(&self) -> bool {
        matches!(self, FieldKind::Unsupported { .. })
    }
}

/// Typed description of one configuration option.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldDescriptor {
    /// Config key, unique within a schema.
    pub key: String,
    /// Field kind.
    pub kind: FieldKind,
    /// Human label.
    pub label: String,
    /// Longer description, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Icon name, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Default value, when it could be resolved statically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Allowed values (select options or color palette).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
}

/// Ordered configuration fields of one app. Replaced wholesale, never edited in place.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Schema {
    /// Schema version declared by the app (`"1"` when absent).
    pub version: String,
    /// Fields in source order.
    pub fields: Vec<FieldDescriptor>,
}

impl Schema {
    /// Look up a field by key.
    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// `true` when there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Reject values the renderer could not interpret: a select value outside its options or a
    /// non-boolean toggle. Keys the schema does not know are allowed.
    pub fn check_config(&self, config: &crate::AppConfig) -> crate::FrameloopResult<()> {
        for (key, value) in config.iter() {
            let Some(field) = self.field(key) else {
                continue;
            };
            match field.kind {
                FieldKind::SingleSelect
                    if !field.options.is_empty()
                        && !field.options.iter().any(|o| o.value == value) =>
                {
                    return Err(crate::FrameloopError::validation(format!(
                        "'{value}' is not an option of '{key}'"
                    )));
                }
                FieldKind::Boolean if value != "true" && value != "false" => {
                    return Err(crate::FrameloopError::validation(format!(
                        "'{key}' must be true or false, got '{value}'"
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Defaults of every field that declares one.
    pub fn defaults(&self) -> crate::AppConfig {
        let mut out = crate::AppConfig::new();
        for f in &self.fields {
            if let Some(d) = &f.default {
                out.set(f.key.clone(), d.clone());
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schema/model.rs"]
mod tests;
