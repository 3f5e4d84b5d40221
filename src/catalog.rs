//! Field type catalog.
//!
//! A fixed, ordered table mapping a field type id (`"string"`, `"select"`, ...)
//! to the component that renders it and the component props a freshly typed
//! field starts with. There is no mutation API.

use serde_json::{Map, Value};

/// A default component prop value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropDefault {
    Str(&'static str),
    Int(i64),
}

impl PropDefault {
    fn to_value(self) -> Value {
        match self {
            PropDefault::Str(s) => Value::from(s),
            PropDefault::Int(n) => Value::from(n),
        }
    }
}

/// One supported field type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldType {
    /// Identifier stored in a descriptor's `type` key.
    pub type_id: &'static str,
    /// Human readable name shown in the type picker.
    pub label: &'static str,
    /// Component id stored in a descriptor's `x-component` key.
    pub component: &'static str,
    defaults: &'static [(&'static str, PropDefault)],
}

impl FieldType {
    /// Fresh copy of the default component props.
    pub fn default_props(&self) -> Map<String, Value> {
        self.defaults
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.to_value()))
            .collect()
    }

    pub fn is_choice(&self) -> bool {
        is_choice_component(self.component)
    }
}

const FIELD_TYPES: &[FieldType] = &[
    FieldType {
        type_id: "string",
        label: "Text input",
        component: "Input",
        defaults: &[("placeholder", PropDefault::Str("Please enter"))],
    },
    FieldType {
        type_id: "number",
        label: "Number input",
        component: "NumberPicker",
        defaults: &[("placeholder", PropDefault::Str("Please enter a number"))],
    },
    FieldType {
        type_id: "select",
        label: "Dropdown",
        component: "Select",
        defaults: &[("placeholder", PropDefault::Str("Please select"))],
    },
    FieldType {
        type_id: "radio",
        label: "Single choice",
        component: "RadioGroup",
        defaults: &[("optionType", PropDefault::Str("button"))],
    },
    FieldType {
        type_id: "checkbox",
        label: "Multiple choice",
        component: "CheckboxGroup",
        defaults: &[],
    },
    FieldType {
        type_id: "switch",
        label: "Switch",
        component: "Switch",
        defaults: &[],
    },
    FieldType {
        type_id: "date",
        label: "Date",
        component: "DatePicker",
        defaults: &[("placeholder", PropDefault::Str("Please select a date"))],
    },
    FieldType {
        type_id: "textarea",
        label: "Multiline text",
        component: "InputTextArea",
        defaults: &[
            ("placeholder", PropDefault::Str("Please enter")),
            ("rows", PropDefault::Int(4)),
        ],
    },
    FieldType {
        type_id: "password",
        label: "Password",
        component: "Input.Password",
        defaults: &[("placeholder", PropDefault::Str("Please enter a password"))],
    },
];

/// All supported field types, in picker order.
pub fn all() -> &'static [FieldType] {
    FIELD_TYPES
}

/// Looks up a field type by id.
pub fn lookup(type_id: &str) -> Option<&'static FieldType> {
    FIELD_TYPES.iter().find(|ft| ft.type_id == type_id)
}

/// Whether a component renders an enumerated option list.
pub fn is_choice_component(component: &str) -> bool {
    matches!(component, "Select" | "RadioGroup" | "CheckboxGroup")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_order_is_stable() {
        let ids: Vec<_> = all().iter().map(|ft| ft.type_id).collect();
        assert_eq!(
            ids,
            [
                "string", "number", "select", "radio", "checkbox", "switch", "date", "textarea",
                "password"
            ]
        );
    }

    #[test]
    fn lookup_returns_defaults() {
        let textarea = lookup("textarea").unwrap();
        assert_eq!(textarea.component, "InputTextArea");
        let props = textarea.default_props();
        assert_eq!(props["placeholder"], "Please enter");
        assert_eq!(props["rows"], 4);

        assert!(lookup("checkbox").unwrap().default_props().is_empty());
        assert!(lookup("boolean").is_none());
    }

    #[test]
    fn choice_components() {
        assert!(lookup("select").unwrap().is_choice());
        assert!(lookup("radio").unwrap().is_choice());
        assert!(!lookup("switch").unwrap().is_choice());
    }
}
