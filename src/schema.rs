//! The declarative form document.
//!
//! A [`SchemaDocument`] is `{ "type": "object", "properties": { ... } }` where each
//! property maps a field name to a [`FieldDescriptor`]. Property order is
//! insertion order and is the order fields are rendered in.
//!
//! Descriptor keys follow the common schema-form dialect (`x-component`,
//! `x-component-props`, `enum`, `x-reactions`, ...) so exported files stay
//! readable by other tools. Keys this crate does not understand are kept in
//! [`FieldDescriptor::extra`] and written back unchanged.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::catalog;

fn default_field_type() -> String {
    "string".to_string()
}

/// `"default": null` is kept as an explicit null default, not dropped.
fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// One `{label, value}` entry of a choice field.
///
/// Documents may also list bare values (`"enum": ["red", "green"]`); each
/// is read as an entry labelled with its own text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawOption")]
pub struct OptionItem {
    pub label: String,
    pub value: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOption {
    Item { label: Value, value: Value },
    Bare(Value),
}

fn label_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<RawOption> for OptionItem {
    fn from(raw: RawOption) -> Self {
        match raw {
            RawOption::Item { label, value } => Self {
                label: label_of(&label),
                value,
            },
            RawOption::Bare(value) => Self {
                label: label_of(&value),
                value,
            },
        }
    }
}

impl OptionItem {
    pub fn new(label: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Which piece of a dependency field a reaction reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepProperty {
    /// The field's current value.
    Value,
    /// `true` while the field has no validation errors.
    Valid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub field: String,
    pub property: DepProperty,
}

impl Dependency {
    pub fn value(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            property: DepProperty::Value,
        }
    }

    pub fn valid(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            property: DepProperty::Valid,
        }
    }
}

/// How a reaction derives one target property from its dependency values.
///
/// Indices refer to positions in [`Reaction::dependencies`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Derivation {
    /// The dependency value itself.
    Dep(usize),
    /// `true` when every listed dependency is truthy.
    All(Vec<usize>),
    /// `true` when any listed dependency is truthy.
    Any(Vec<usize>),
    /// Negated truthiness of a dependency.
    Not(usize),
    /// A constant.
    Literal(Value),
}

impl Derivation {
    pub fn eval(&self, deps: &[Value]) -> Value {
        let dep = |i: &usize| deps.get(*i).cloned().unwrap_or(Value::Null);
        match self {
            Derivation::Dep(i) => dep(i),
            Derivation::All(idx) => Value::Bool(idx.iter().all(|i| is_truthy(&dep(i)))),
            Derivation::Any(idx) => Value::Bool(idx.iter().any(|i| is_truthy(&dep(i)))),
            Derivation::Not(i) => Value::Bool(!is_truthy(&dep(i))),
            Derivation::Literal(v) => v.clone(),
        }
    }
}

/// JavaScript-style truthiness, which is what schema authors expect.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Declarative rule attached to a field: when its dependencies change, the
/// `fulfill` entries are recomputed and written onto the owning field.
///
/// Keys `value`, `visible` and `disabled` address control state; any other
/// key is written into the control's component props.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub dependencies: Vec<Dependency>,
    pub fulfill: IndexMap<String, Derivation>,
}

impl Reaction {
    pub fn new(dependencies: Vec<Dependency>) -> Self {
        Self {
            dependencies,
            fulfill: IndexMap::new(),
        }
    }

    pub fn set(mut self, key: impl Into<String>, derivation: Derivation) -> Self {
        self.fulfill.insert(key.into(), derivation);
        self
    }

    pub fn compute(&self, deps: &[Value]) -> Map<String, Value> {
        self.fulfill
            .iter()
            .map(|(key, derivation)| (key.clone(), derivation.eval(deps)))
            .collect()
    }
}

/// Per-field configuration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,
    #[serde(rename = "x-decorator", default, skip_serializing_if = "Option::is_none")]
    pub decorator: Option<String>,
    #[serde(rename = "x-component", default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(
        rename = "x-component-props",
        default,
        skip_serializing_if = "Map::is_empty"
    )]
    pub component_props: Map<String, Value>,
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionItem>,
    #[serde(rename = "x-validator", default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    #[serde(rename = "x-reactions", default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FieldDescriptor {
    /// A bare descriptor of `field_type` with no component assigned.
    pub fn new(field_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            title: title.into(),
            required: false,
            description: None,
            default: None,
            decorator: None,
            component: None,
            component_props: Map::new(),
            options: Vec::new(),
            validator: None,
            reactions: Vec::new(),
            extra: Map::new(),
        }
    }

    /// A `FormItem`-decorated descriptor using the catalog's component and
    /// default props for `field_type`, when the catalog knows it.
    pub fn of_type(field_type: &str, title: impl Into<String>) -> Self {
        let mut descriptor = Self::new(field_type, title).decorator("FormItem");
        if let Some(ft) = catalog::lookup(field_type) {
            descriptor.component = Some(ft.component.to_string());
            descriptor.component_props = ft.default_props();
        }
        descriptor
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn decorator(mut self, decorator: impl Into<String>) -> Self {
        self.decorator = Some(decorator.into());
        self
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.component_props.insert(key.into(), value.into());
        self
    }

    pub fn options(mut self, options: Vec<OptionItem>) -> Self {
        self.options = options;
        self
    }

    pub fn validator(mut self, validator: impl Into<String>) -> Self {
        self.validator = Some(validator.into());
        self
    }

    pub fn reaction(mut self, reaction: Reaction) -> Self {
        self.reactions.push(reaction);
        self
    }

    /// Label to show for this field, falling back to its name.
    pub fn display_title<'a>(&'a self, name: &'a str) -> &'a str {
        if self.title.is_empty() { name } else { &self.title }
    }

    /// Component id used to render this field.
    ///
    /// An explicit `x-component` wins; otherwise the catalog entry for the
    /// field type, otherwise a plain text input.
    pub fn component_id(&self) -> &str {
        if let Some(component) = &self.component {
            return component;
        }
        catalog::lookup(&self.field_type)
            .map(|ft| ft.component)
            .unwrap_or("Input")
    }

    /// Shallow merge: every `Some` in `patch` replaces the current value.
    pub fn apply(&mut self, patch: FieldPatch) {
        let FieldPatch {
            field_type,
            title,
            required,
            description,
            default,
            decorator,
            component,
            component_props,
            options,
            validator,
            reactions,
        } = patch;
        if let Some(v) = field_type {
            self.field_type = v;
        }
        if let Some(v) = title {
            self.title = v;
        }
        if let Some(v) = required {
            self.required = v;
        }
        if let Some(v) = description {
            self.description = Some(v);
        }
        if let Some(v) = default {
            self.default = Some(v);
        }
        if let Some(v) = decorator {
            self.decorator = Some(v);
        }
        if let Some(v) = component {
            self.component = Some(v);
        }
        if let Some(v) = component_props {
            self.component_props = v;
        }
        if let Some(v) = options {
            self.options = v;
        }
        if let Some(v) = validator {
            self.validator = Some(v);
        }
        if let Some(v) = reactions {
            self.reactions = v;
        }
    }
}

/// Partial descriptor for [`crate::editor::update_field`].
///
/// Deserializes from the same keys a descriptor uses, so a JSON object sent by
/// the UI can be applied directly.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FieldPatch {
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    pub title: Option<String>,
    pub required: Option<bool>,
    pub description: Option<String>,
    pub default: Option<Value>,
    #[serde(rename = "x-decorator")]
    pub decorator: Option<String>,
    #[serde(rename = "x-component")]
    pub component: Option<String>,
    #[serde(rename = "x-component-props")]
    pub component_props: Option<Map<String, Value>>,
    #[serde(rename = "enum")]
    pub options: Option<Vec<OptionItem>>,
    #[serde(rename = "x-validator")]
    pub validator: Option<String>,
    #[serde(rename = "x-reactions")]
    pub reactions: Option<Vec<Reaction>>,
}

impl FieldPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn required(required: bool) -> Self {
        Self {
            required: Some(required),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
enum RootKind {
    #[default]
    #[serde(rename = "object")]
    Object,
}

/// A whole form: an ordered, uniquely named set of field descriptors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(rename = "type")]
    kind: RootKind,
    #[serde(default)]
    properties: IndexMap<String, FieldDescriptor>,
}

impl SchemaDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends (or replaces in place) a field. Used to build fixed documents.
    pub fn with_field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.properties.insert(name.into(), descriptor);
        self
    }

    pub fn properties(&self) -> &IndexMap<String, FieldDescriptor> {
        &self.properties
    }

    pub(crate) fn properties_mut(&mut self) -> &mut IndexMap<String, FieldDescriptor> {
        &mut self.properties
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.properties.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptor_uses_schema_keys() {
        let descriptor = FieldDescriptor::of_type("select", "Role")
            .required()
            .options(vec![OptionItem::new("User", "user")]);
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "select",
                "title": "Role",
                "required": true,
                "x-decorator": "FormItem",
                "x-component": "Select",
                "x-component-props": { "placeholder": "Please select" },
                "enum": [{ "label": "User", "value": "user" }]
            })
        );
    }

    #[test]
    fn unknown_keys_are_kept() {
        let descriptor: FieldDescriptor = serde_json::from_value(json!({
            "type": "string",
            "x-index": 3,
            "x-pattern": "readPretty"
        }))
        .unwrap();
        assert_eq!(descriptor.extra["x-index"], 3);
        let back = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(back["x-pattern"], "readPretty");
    }

    #[test]
    fn bare_enum_values_become_options() {
        let descriptor: FieldDescriptor = serde_json::from_value(json!({
            "type": "select",
            "enum": ["red", 2, { "label": "Blue", "value": "blue" }]
        }))
        .unwrap();
        assert_eq!(
            descriptor.options,
            [
                OptionItem::new("red", "red"),
                OptionItem::new("2", 2),
                OptionItem::new("Blue", "blue"),
            ]
        );
        let back = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(back["enum"][0], json!({ "label": "red", "value": "red" }));
    }

    #[test]
    fn null_default_is_kept() {
        let descriptor = FieldDescriptor::of_type("string", "Note").default_value(Value::Null);
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(json.contains(r#""default":null"#));
        let back: FieldDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptor);

        let absent: FieldDescriptor = serde_json::from_value(json!({ "type": "string" })).unwrap();
        assert_eq!(absent.default, None);
    }

    #[test]
    fn missing_type_defaults_to_string() {
        let descriptor: FieldDescriptor =
            serde_json::from_value(json!({ "title": "Name" })).unwrap();
        assert_eq!(descriptor.field_type, "string");
        assert_eq!(descriptor.component_id(), "Input");
    }

    #[test]
    fn root_must_be_object() {
        let err = serde_json::from_value::<SchemaDocument>(json!({
            "type": "array",
            "properties": {}
        }));
        assert!(err.is_err());

        let doc: SchemaDocument = serde_json::from_value(json!({ "type": "object" })).unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn properties_keep_insertion_order() {
        let doc: SchemaDocument = serde_json::from_str(
            r#"{"type": "object", "properties": {
                "z": {"type": "string"},
                "a": {"type": "string"},
                "m": {"type": "string"}
            }}"#,
        )
        .unwrap();
        assert_eq!(doc.names().collect::<Vec<_>>(), ["z", "a", "m"]);
    }

    #[test]
    fn derivations() {
        let deps = [json!("13800000000"), json!(true), json!("")];
        assert_eq!(Derivation::Dep(0).eval(&deps), json!("13800000000"));
        assert_eq!(Derivation::All(vec![0, 1]).eval(&deps), json!(true));
        assert_eq!(Derivation::All(vec![0, 2]).eval(&deps), json!(false));
        assert_eq!(Derivation::Any(vec![2, 1]).eval(&deps), json!(true));
        assert_eq!(Derivation::Not(2).eval(&deps), json!(true));
        assert_eq!(Derivation::Dep(7).eval(&deps), Value::Null);
    }

    #[test]
    fn reaction_serializes_typed_rules() {
        let reaction = Reaction::new(vec![Dependency::value("phone"), Dependency::valid("phone")])
            .set("readyPost", Derivation::All(vec![0, 1]))
            .set("phoneNumber", Derivation::Dep(0));
        assert_eq!(
            serde_json::to_value(&reaction).unwrap(),
            json!({
                "dependencies": [
                    { "field": "phone", "property": "value" },
                    { "field": "phone", "property": "valid" }
                ],
                "fulfill": { "readyPost": { "all": [0, 1] }, "phoneNumber": { "dep": 0 } }
            })
        );
    }

    #[test]
    fn patch_merges_shallowly() {
        let mut descriptor = FieldDescriptor::of_type("string", "Name").prop("maxLength", 10);
        let patch: FieldPatch = serde_json::from_value(json!({
            "title": "Full name",
            "x-component-props": { "placeholder": "Your name" }
        }))
        .unwrap();
        descriptor.apply(patch);
        assert_eq!(descriptor.title, "Full name");
        assert_eq!(descriptor.field_type, "string");
        assert_eq!(descriptor.component_props.len(), 1);
        assert_eq!(descriptor.component_props["placeholder"], "Your name");
    }
}
