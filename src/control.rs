//! Bindable controls and the component registry.
//!
//! A descriptor names its renderer by component id (`"Input"`, `"Select"`,
//! `"VerifyCode"`, ...). The [`ComponentRegistry`] resolves that id to a
//! [`ControlKind`], and the resulting [`Control`] carries everything a form
//! session needs to bind a value to it.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::schema::{FieldDescriptor, OptionItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlKind {
    Text,
    Password,
    TextArea,
    Number,
    Select,
    Radio,
    CheckboxGroup,
    Switch,
    Date,
    VerifyCode,
}

impl ControlKind {
    /// Brings an incoming value into the shape this kind stores.
    ///
    /// Browsers send most things as strings; numbers, booleans and option
    /// values are recovered here.
    fn coerce(self, value: Value, options: &[OptionItem]) -> Result<Value, &'static str> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            ControlKind::Text
            | ControlKind::Password
            | ControlKind::TextArea
            | ControlKind::Date
            | ControlKind::VerifyCode => match value {
                Value::String(_) => Ok(value),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                _ => Err("must be text"),
            },
            ControlKind::Number => match value {
                Value::Number(n) if n.is_f64() => n
                    .as_f64()
                    .and_then(number_value)
                    .ok_or("must be a number"),
                Value::Number(_) => Ok(value),
                Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
                Value::String(s) => {
                    let s = s.trim();
                    match s.parse::<i64>() {
                        Ok(n) => Ok(Value::from(n)),
                        Err(_) => s
                            .parse::<f64>()
                            .ok()
                            .and_then(number_value)
                            .ok_or("must be a number"),
                    }
                }
                _ => Err("must be a number"),
            },
            ControlKind::Switch => match value {
                Value::Bool(_) => Ok(value),
                Value::String(s) if s == "true" => Ok(Value::Bool(true)),
                Value::String(s) if s == "false" => Ok(Value::Bool(false)),
                _ => Err("must be on or off"),
            },
            ControlKind::Select | ControlKind::Radio => match value {
                Value::Array(_) | Value::Object(_) => Err("must be a single choice"),
                scalar => Ok(match_option(scalar, options)),
            },
            ControlKind::CheckboxGroup => match value {
                Value::Array(items) => Ok(Value::Array(
                    items.into_iter().map(|v| match_option(v, options)).collect(),
                )),
                Value::Object(_) => Err("must be a list of choices"),
                scalar => Ok(Value::Array(vec![match_option(scalar, options)])),
            },
        }
    }
}

/// Whole numbers become integers so `3` is not reported as `3.0`.
///
/// `None` for NaN and infinities.
pub(crate) fn number_value(f: f64) -> Option<Value> {
    const EXACT: f64 = 9_007_199_254_740_992.0;
    if f.fract() == 0.0 && f.abs() < EXACT {
        Some(Value::from(f as i64))
    } else {
        serde_json::Number::from_f64(f).map(Value::Number)
    }
}

/// Maps `"3"` onto an option whose value is the number `3`.
fn match_option(value: Value, options: &[OptionItem]) -> Value {
    if let Value::String(s) = &value
        && let Some(option) = options.iter().find(|o| match &o.value {
            Value::String(_) => false,
            other => other.to_string() == *s,
        })
    {
        return option.value.clone();
    }
    value
}

/// The "bindable value control" capability a form session drives.
pub trait Bindable {
    fn value(&self) -> &Value;

    /// Stores a new value, coercing it to the control's shape.
    ///
    /// Returns whether the stored value changed.
    fn set_value(&mut self, value: Value) -> Result<bool, &'static str>;

    /// Merges props into the control. Returns whether anything changed.
    fn set_props(&mut self, patch: &Map<String, Value>) -> bool;
}

/// One live input bound to a schema field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Control {
    pub name: String,
    pub kind: ControlKind,
    pub component: String,
    pub label: String,
    pub required: bool,
    value: Value,
    pub props: Map<String, Value>,
    pub options: Vec<OptionItem>,
    pub visible: bool,
    pub disabled: bool,
}

impl Control {
    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// Sets `visible` / `disabled`. Returns whether it changed.
    pub(crate) fn set_flag(&mut self, key: &str, on: bool) -> bool {
        let slot = match key {
            "visible" => &mut self.visible,
            "disabled" => &mut self.disabled,
            _ => return false,
        };
        let changed = *slot != on;
        *slot = on;
        changed
    }
}

impl Bindable for Control {
    fn value(&self) -> &Value {
        &self.value
    }

    fn set_value(&mut self, value: Value) -> Result<bool, &'static str> {
        let value = self.kind.coerce(value, &self.options)?;
        let changed = self.value != value;
        self.value = value;
        Ok(changed)
    }

    fn set_props(&mut self, patch: &Map<String, Value>) -> bool {
        let mut changed = false;
        for (key, value) in patch {
            if self.props.get(key) != Some(value) {
                self.props.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }
}

/// Component id → control kind.
#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    kinds: HashMap<String, ControlKind>,
}

impl ComponentRegistry {
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    pub fn register(&mut self, component: impl Into<String>, kind: ControlKind) -> &mut Self {
        self.kinds.insert(component.into(), kind);
        self
    }

    pub fn resolve(&self, component: &str) -> Option<ControlKind> {
        self.kinds.get(component).copied()
    }

    /// Builds the control for a field. Unknown components render as text.
    pub fn build(&self, name: &str, descriptor: &FieldDescriptor) -> Control {
        let component = descriptor.component_id();
        let kind = self.resolve(component).unwrap_or_else(|| {
            warn!(field = name, component, "unknown component, falling back to text input");
            ControlKind::Text
        });
        Control {
            name: name.to_string(),
            kind,
            component: component.to_string(),
            label: descriptor.display_title(name).to_string(),
            required: descriptor.required,
            value: Value::Null,
            props: descriptor.component_props.clone(),
            options: descriptor.options.clone(),
            visible: true,
            disabled: false,
        }
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register("Input", ControlKind::Text)
            .register("Input.Password", ControlKind::Password)
            .register("Password", ControlKind::Password)
            .register("InputTextArea", ControlKind::TextArea)
            .register("Input.TextArea", ControlKind::TextArea)
            .register("NumberPicker", ControlKind::Number)
            .register("InputNumber", ControlKind::Number)
            .register("Select", ControlKind::Select)
            .register("RadioGroup", ControlKind::Radio)
            .register("Radio.Group", ControlKind::Radio)
            .register("CheckboxGroup", ControlKind::CheckboxGroup)
            .register("Checkbox.Group", ControlKind::CheckboxGroup)
            .register("Switch", ControlKind::Switch)
            .register("DatePicker", ControlKind::Date)
            .register("VerifyCode", ControlKind::VerifyCode);
        registry
    }
}
