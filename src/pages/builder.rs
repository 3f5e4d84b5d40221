//! The form builder page.
//!
//! [`FormBuilder`] holds the active document and its live preview session.
//! Every edit goes through [`crate::editor`] and re-derives the session,
//! carrying over values of fields that survive the edit.

use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info};

use crate::catalog;
use crate::editor;
use crate::error::{Error, ParseError, Result, TransferError, ValidationError};
use crate::runtime::{FormRuntime, FormSession, Settlement};
use crate::schema::{FieldPatch, OptionItem, SchemaDocument};
use crate::templates;
use crate::transfer::{self, Clipboard, EXPORT_FILE_NAME};
use crate::ui::{AppState, InputType, Notice, RouterConfig, SelectMode, UiElement};

use super::{Page, PageView, control_element};

pub struct FormBuilder {
    runtime: FormRuntime,
    session: FormSession,
    selected_template: Option<String>,
    submitted: Option<IndexMap<String, Value>>,
}

impl FormBuilder {
    /// Starts on the default two-field document.
    pub fn new(runtime: FormRuntime) -> Self {
        let session = runtime.load(templates::default_schema());
        Self {
            runtime,
            session,
            selected_template: None,
            submitted: None,
        }
    }

    pub fn document(&self) -> &SchemaDocument {
        self.session.document()
    }

    pub fn session(&self) -> &FormSession {
        &self.session
    }

    pub fn selected_template(&self) -> Option<&str> {
        self.selected_template.as_deref()
    }

    /// Values from the last successful submit.
    pub fn submitted(&self) -> Option<&IndexMap<String, Value>> {
        self.submitted.as_ref()
    }

    fn replace_document(&mut self, doc: SchemaDocument) {
        self.session = self.runtime.load(doc);
        self.submitted = None;
    }

    /// Applies a document edit. Returns false when it changed nothing.
    fn edit(&mut self, op: &str, f: impl FnOnce(&SchemaDocument) -> SchemaDocument) -> bool {
        let next = f(self.session.document());
        if &next == self.session.document() {
            debug!(op, "edit left the document unchanged");
            return false;
        }
        self.session = self.runtime.reload(&self.session, next);
        true
    }

    pub fn select_template(&mut self, id: &str) -> Result<&'static str> {
        let template = templates::find(id).ok_or_else(|| Error::UnknownTemplate(id.to_string()))?;
        info!(template = template.id, "template selected");
        self.replace_document(template.schema);
        self.selected_template = Some(template.id.to_string());
        Ok(template.name)
    }

    /// Appends a new field and returns its name.
    pub fn add_field(&mut self) -> String {
        let name = editor::next_field_name(self.document());
        self.edit("add_field", editor::add_field);
        name
    }

    pub fn remove_field(&mut self, name: &str) -> bool {
        self.edit("remove_field", |doc| editor::remove_field(doc, name))
    }

    pub fn update_field(&mut self, name: &str, patch: FieldPatch) -> bool {
        self.edit("update_field", |doc| editor::update_field(doc, name, patch))
    }

    pub fn rename_field(&mut self, from: &str, to: &str) -> bool {
        self.edit("rename_field", |doc| editor::rename_field(doc, from, to.trim()))
    }

    pub fn change_field_type(&mut self, name: &str, field_type: &str) -> bool {
        self.edit("change_field_type", |doc| editor::change_field_type(doc, name, field_type))
    }

    pub fn set_options(&mut self, name: &str, options: Vec<OptionItem>) -> bool {
        self.edit("set_options", |doc| editor::set_options(doc, name, options))
    }

    fn edit_options(
        &mut self,
        name: &str,
        f: impl FnOnce(&[OptionItem]) -> Vec<OptionItem>,
    ) -> bool {
        let Some(descriptor) = self.document().get(name) else {
            return false;
        };
        let options = f(&descriptor.options);
        self.set_options(name, options)
    }

    pub fn add_option(&mut self, name: &str) -> bool {
        self.edit_options(name, editor::add_option)
    }

    pub fn remove_option(&mut self, name: &str, index: usize) -> bool {
        self.edit_options(name, |options| editor::remove_option(options, index))
    }

    pub fn set_option_label(&mut self, name: &str, index: usize, label: &str) -> bool {
        self.edit_options(name, |options| editor::set_option_label(options, index, label))
    }

    pub fn set_option_value(&mut self, name: &str, index: usize, value: &str) -> bool {
        self.edit_options(name, |options| editor::set_option_value(options, index, value))
    }

    pub fn set_value(&mut self, name: &str, value: Value) -> Result<Settlement> {
        self.session.set_field_value(name, value)
    }

    pub fn submit(&mut self) -> std::result::Result<&IndexMap<String, Value>, ValidationError> {
        let values = self.session.submit()?;
        info!(fields = values.len(), "form submitted");
        Ok(self.submitted.insert(values))
    }

    /// Clears entered values and the submit result, keeping the document.
    pub fn reset_form(&mut self) {
        self.session.reset();
        self.submitted = None;
    }

    /// Back to the default document.
    pub fn reset(&mut self) {
        self.replace_document(templates::default_schema());
        self.selected_template = None;
    }

    pub fn schema_json(&self) -> String {
        transfer::serialize(self.document())
    }

    pub fn export_to_file(&self, path: impl AsRef<Path>) -> std::result::Result<(), TransferError> {
        transfer::export_to_file(self.document(), path)
    }

    /// Replaces the document with a parsed one. On error nothing changes.
    pub fn import_json(&mut self, text: &str) -> std::result::Result<(), ParseError> {
        let doc = transfer::deserialize(text)?;
        info!(fields = doc.len(), "schema imported");
        self.replace_document(doc);
        self.selected_template = None;
        Ok(())
    }

    pub fn import_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let doc = transfer::import_from_file(path)?;
        self.replace_document(doc);
        self.selected_template = None;
        Ok(())
    }

    pub fn copy(&self, clipboard: &dyn Clipboard) -> std::result::Result<(), TransferError> {
        transfer::copy_to_clipboard(self.document(), clipboard)
    }
}

impl Default for FormBuilder {
    fn default() -> Self {
        Self::new(FormRuntime::new())
    }
}

fn button(
    id: impl Into<String>,
    text: impl Into<String>,
    on_click: crate::ui::ClickCallback,
) -> UiElement {
    UiElement::Button {
        id: id.into(),
        text: text.into(),
        disabled: false,
        active: false,
        on_click,
    }
}

fn settlement_notice(settlement: Result<Settlement>) -> Option<Notice> {
    match settlement {
        Ok(Settlement::Settled { .. }) => None,
        Ok(Settlement::Unresolved { reactions }) => Some(Notice::error(format!(
            "Field rules did not settle: {}",
            reactions.join(", ")
        ))),
        Err(err) => Some(Notice::error(err.to_string())),
    }
}

impl FormBuilder {
    fn render_templates(&self, page: &Page<Self>) -> UiElement {
        let children = templates::catalog()
            .into_iter()
            .map(|template| {
                let id = template.id;
                UiElement::Button {
                    id: format!("template-{id}"),
                    text: template.name.to_string(),
                    disabled: false,
                    active: self.selected_template() == Some(id),
                    on_click: page.on_click(move |b| match b.select_template(id) {
                        Ok(name) => Some(Notice::info(format!("Template \"{name}\" loaded"))),
                        Err(err) => Some(Notice::error(err.to_string())),
                    }),
                }
            })
            .collect();
        UiElement::Group {
            id: "templates".to_string(),
            title: Some("Templates".to_string()),
            children,
        }
    }

    fn render_field_editor(&self, page: &Page<Self>) -> UiElement {
        let type_options: Vec<OptionItem> = catalog::all()
            .iter()
            .map(|t| OptionItem::new(t.label, t.type_id))
            .collect();

        let mut children = Vec::new();
        for (name, descriptor) in self.document().iter() {
            let field = name.to_string();
            let mut row = vec![
                UiElement::Input {
                    id: format!("name-{name}"),
                    label: Some("Name".to_string()),
                    value: field.clone(),
                    input_type: InputType::Text,
                    placeholder: None,
                    error: None,
                    disabled: false,
                    lazy: true,
                    on_input: page.on_input({
                        let field = field.clone();
                        move |b, to| {
                            (!b.rename_field(&field, to)).then(|| {
                                Notice::error(format!("Cannot rename {field} to \"{to}\""))
                            })
                        }
                    }),
                },
                UiElement::Input {
                    id: format!("title-{name}"),
                    label: Some("Title".to_string()),
                    value: descriptor.title.clone(),
                    input_type: InputType::Text,
                    placeholder: None,
                    error: None,
                    disabled: false,
                    lazy: false,
                    on_input: page.on_input({
                        let field = field.clone();
                        move |b, title| {
                            b.update_field(&field, FieldPatch::title(title));
                            None
                        }
                    }),
                },
                UiElement::Select {
                    id: format!("type-{name}"),
                    label: Some("Type".to_string()),
                    value: Value::String(descriptor.field_type.clone()),
                    options: type_options.clone(),
                    mode: SelectMode::Dropdown,
                    error: None,
                    disabled: false,
                    on_change: page.on_value({
                        let field = field.clone();
                        move |b, v| {
                            let new_type = v.as_str().unwrap_or_default();
                            (!b.change_field_type(&field, new_type))
                                .then(|| Notice::info(format!("{field} is already {new_type}")))
                        }
                    }),
                },
                UiElement::Checkbox {
                    id: format!("required-{name}"),
                    label: Some("Required".to_string()),
                    checked: descriptor.required,
                    toggle: false,
                    error: None,
                    disabled: false,
                    on_change: page.on_toggle({
                        let field = field.clone();
                        move |b, on| {
                            b.update_field(&field, FieldPatch::required(on));
                            None
                        }
                    }),
                },
                button(
                    format!("remove-{name}"),
                    "Remove",
                    page.on_click({
                        let field = field.clone();
                        move |b| {
                            b.remove_field(&field);
                            Some(Notice::success(format!("Removed {field}")))
                        }
                    }),
                ),
            ];

            if catalog::is_choice_component(descriptor.component_id()) {
                row.push(self.render_options(page, &field, &descriptor.options));
            }

            children.push(UiElement::Group {
                id: format!("field-{name}"),
                title: Some(descriptor.display_title(name).to_string()),
                children: row,
            });
        }

        children.push(button(
            "add-field",
            "Add field",
            page.on_click(|b| {
                let name = b.add_field();
                Some(Notice::success(format!("Added {name}")))
            }),
        ));

        UiElement::Group {
            id: "fields".to_string(),
            title: Some("Fields".to_string()),
            children,
        }
    }

    fn render_options(&self, page: &Page<Self>, field: &str, options: &[OptionItem]) -> UiElement {
        let mut children = Vec::new();
        for (i, option) in options.iter().enumerate() {
            let label_field = field.to_string();
            let value_field = field.to_string();
            let remove_field = field.to_string();
            children.push(UiElement::Group {
                id: format!("option-{field}-{i}"),
                title: None,
                children: vec![
                    UiElement::Input {
                        id: format!("option-label-{field}-{i}"),
                        label: None,
                        value: option.label.clone(),
                        input_type: InputType::Text,
                        placeholder: Some("Label".to_string()),
                        error: None,
                        disabled: false,
                        lazy: false,
                        on_input: page.on_input(move |b, label| {
                            b.set_option_label(&label_field, i, label);
                            None
                        }),
                    },
                    UiElement::Input {
                        id: format!("option-value-{field}-{i}"),
                        label: None,
                        value: match &option.value {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        },
                        input_type: InputType::Text,
                        placeholder: Some("Value".to_string()),
                        error: None,
                        disabled: false,
                        lazy: true,
                        on_input: page.on_input(move |b, value| {
                            b.set_option_value(&value_field, i, value);
                            None
                        }),
                    },
                    button(
                        format!("option-remove-{field}-{i}"),
                        "Remove",
                        page.on_click(move |b| {
                            b.remove_option(&remove_field, i);
                            None
                        }),
                    ),
                ],
            });
        }
        let add_field = field.to_string();
        children.push(button(
            format!("option-add-{field}"),
            "Add option",
            page.on_click(move |b| {
                b.add_option(&add_field);
                None
            }),
        ));
        UiElement::Group {
            id: format!("options-{field}"),
            title: Some("Options".to_string()),
            children,
        }
    }

    fn render_preview(&self, page: &Page<Self>) -> UiElement {
        let mut children: Vec<UiElement> = self
            .session
            .controls()
            .filter(|c| c.visible)
            .map(|control| {
                control_element(
                    page,
                    format!("value-{}", control.name),
                    control,
                    self.session.errors(&control.name),
                    |b: &mut Self, name, value| settlement_notice(b.set_value(name, value)),
                )
            })
            .collect();

        children.push(button(
            "submit",
            "Submit",
            page.on_click(|b| match b.submit() {
                Ok(_) => Some(Notice::success("Form submitted")),
                Err(err) => Some(Notice::error(err.to_string())),
            }),
        ));
        children.push(button(
            "reset-form",
            "Reset",
            page.on_click(|b| {
                b.reset_form();
                Some(Notice::info("Form reset"))
            }),
        ));

        UiElement::Group {
            id: "preview".to_string(),
            title: Some("Preview".to_string()),
            children,
        }
    }

    fn render_schema(&self, page: &Page<Self>) -> UiElement {
        let state = page.state().clone();
        let export = button(
            "export",
            "Export",
            page.on_click(move |b| {
                state.download(EXPORT_FILE_NAME, b.schema_json());
                info!(file = EXPORT_FILE_NAME, "schema exported");
                Some(Notice::success("Schema exported"))
            }),
        );

        let state = page.state().clone();
        let copy = button(
            "copy",
            "Copy",
            page.on_click(move |b| match b.copy(&state) {
                // The browser reports the outcome.
                Ok(()) => None,
                Err(err) => Some(Notice::error(err.to_string())),
            }),
        );

        let import = UiElement::Upload {
            id: "import".to_string(),
            text: "Import".to_string(),
            accept: ".json,application/json".to_string(),
            on_upload: page.on_upload(|b, name, content| match b.import_json(content) {
                Ok(()) => Some(Notice::success(format!("Imported {name}"))),
                Err(err) => Some(Notice::error(format!("{err}; schema unchanged"))),
            }),
        };

        let reset = button(
            "reset",
            "Reset builder",
            page.on_click(|b| {
                b.reset();
                Some(Notice::info("Builder reset"))
            }),
        );

        UiElement::Group {
            id: "schema".to_string(),
            title: Some("Schema".to_string()),
            children: vec![
                UiElement::Code {
                    id: "schema-json".to_string(),
                    text: self.schema_json(),
                },
                export,
                copy,
                import,
                reset,
            ],
        }
    }
}

impl PageView for FormBuilder {
    fn render(&self, page: &Page<Self>) -> Vec<UiElement> {
        let mut elements = vec![
            self.render_templates(page),
            self.render_field_editor(page),
            self.render_preview(page),
        ];
        if let Some(values) = &self.submitted {
            elements.push(UiElement::Group {
                id: "result".to_string(),
                title: Some("Submitted values".to_string()),
                children: vec![UiElement::Code {
                    id: "submitted".to_string(),
                    text: serde_json::to_string_pretty(values).unwrap_or_default(),
                }],
            });
        }
        elements.push(self.render_schema(page));
        elements
    }
}

/// Mounts a builder into `state`.
pub fn mount(state: AppState, builder: FormBuilder) -> Page<FormBuilder> {
    Page::mount(state, builder)
}

pub fn router_config(state: AppState) -> RouterConfig {
    RouterConfig::new(state).title("Form builder")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::ServerMessage;
    use serde_json::json;

    #[test]
    fn import_failure_keeps_document() {
        let mut builder = FormBuilder::default();
        builder.select_template("survey").unwrap();
        let before = builder.document().clone();

        let err = builder.import_json("{ \"type\": \"object\", ").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(builder.document(), &before);
        assert_eq!(builder.selected_template(), Some("survey"));
    }

    #[test]
    fn import_replaces_document_and_clears_template() {
        let mut builder = FormBuilder::default();
        builder.select_template("product-info").unwrap();
        let text = transfer::serialize(&templates::phone_login_schema());
        builder.import_json(&text).unwrap();
        assert_eq!(builder.document(), &templates::phone_login_schema());
        assert_eq!(builder.selected_template(), None);
    }

    #[test]
    fn unknown_template_is_rejected() {
        let mut builder = FormBuilder::default();
        assert!(matches!(builder.select_template("nope"), Err(Error::UnknownTemplate(_))));
        assert_eq!(builder.document(), &templates::default_schema());
    }

    #[test]
    fn edits_keep_entered_values() {
        let mut builder = FormBuilder::default();
        builder.set_value("username", json!("bob")).unwrap();
        assert_eq!(builder.add_field(), "field_3");
        assert!(builder.update_field("field_3", FieldPatch::title("Nickname")));
        assert!(builder.change_field_type("field_3", "select"));
        assert!(builder.add_option("field_3"));
        assert!(builder.add_option("field_3"));
        assert!(builder.set_option_label("field_3", 1, "Second"));

        let options = &builder.document().get("field_3").unwrap().options;
        assert_eq!(options[1], OptionItem::new("Second", "option-2"));
        assert_eq!(builder.session().value("username"), Some(&json!("bob")));
        assert!(!builder.remove_field("missing"));
    }

    #[test]
    fn options_only_on_choice_fields() {
        let mut builder = FormBuilder::default();
        assert!(!builder.add_option("username"));
    }

    #[test]
    fn submit_stores_values_until_reset() {
        let mut builder = FormBuilder::default();
        assert_eq!(builder.submit().unwrap_err().fields, ["username", "email"]);
        builder.set_value("username", json!("bob")).unwrap();
        builder.set_value("email", json!("a@b.com")).unwrap();
        builder.submit().unwrap();
        assert_eq!(
            serde_json::to_value(builder.submitted().unwrap()).unwrap(),
            json!({ "username": "bob", "email": "a@b.com" })
        );
        builder.reset_form();
        assert!(builder.submitted().is_none());
        assert_eq!(builder.session().value("username"), Some(&Value::Null));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EXPORT_FILE_NAME);
        let mut builder = FormBuilder::default();
        builder.select_template("user-register").unwrap();
        builder.export_to_file(&path).unwrap();

        let mut other = FormBuilder::default();
        other.import_file(&path).unwrap();
        assert_eq!(other.document(), builder.document());
    }

    #[test]
    fn clicks_drive_the_page() {
        let state = AppState::new();
        let page = mount(state.clone(), FormBuilder::default());
        let mut rx = state.subscribe();

        state.handle_click("add-field");
        assert!(state.find_element("field-field_3").is_some());
        assert!(page.with(|b| b.document().contains("field_3")));

        state.handle_input("value-username", "bob");
        state.handle_click("submit");
        let mut notices = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let ServerMessage::Notify(notice) = message {
                notices.push(notice);
            }
        }
        assert_eq!(notices.first(), Some(&Notice::success("Added field_3")));
        // email is still empty
        assert_eq!(notices.last(), Some(&Notice::error("invalid fields: email")));
    }

    #[test]
    fn number_preview_keeps_whole_numbers() {
        let state = AppState::new();
        let page = mount(state.clone(), FormBuilder::default());
        state.handle_click("add-field");
        state.handle_change("type-field_3", json!("number"));

        state.handle_change("value-field_3", json!("3"));
        assert_eq!(
            page.with(|b| b.session().value("field_3").cloned()),
            Some(json!(3))
        );
        state.handle_change("value-field_3", json!(2.5));
        assert_eq!(
            page.with(|b| b.session().value("field_3").cloned()),
            Some(json!(2.5))
        );
    }

    #[test]
    fn upload_with_bad_json_reports_error() {
        let state = AppState::new();
        let page = mount(state.clone(), FormBuilder::default());
        let mut rx = state.subscribe();

        state.handle_upload("import", "broken.json", "not json");
        assert_eq!(page.with(|b| b.document().clone()), templates::default_schema());
        let notice = std::iter::from_fn(|| rx.try_recv().ok())
            .find_map(|m| match m {
                ServerMessage::Notify(n) => Some(n),
                _ => None,
            })
            .unwrap();
        assert_eq!(notice.level, crate::ui::NoticeLevel::Error);
        assert!(notice.message.ends_with("schema unchanged"));
    }
}
