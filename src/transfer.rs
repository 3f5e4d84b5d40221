//! Moving documents in and out: JSON text, files and the clipboard.

use std::path::Path;

use tracing::info;

use crate::error::{ParseError, TransferError};
use crate::schema::SchemaDocument;

/// File name offered when a document is exported.
pub const EXPORT_FILE_NAME: &str = "form-schema.json";

/// Pretty JSON with two-space indentation, properties in insertion order.
pub fn serialize(doc: &SchemaDocument) -> String {
    // A document only holds strings, bools and JSON values, none of which can
    // fail to serialize.
    serde_json::to_string_pretty(doc).unwrap_or_default()
}

pub fn deserialize(text: &str) -> Result<SchemaDocument, ParseError> {
    serde_json::from_str(text).map_err(ParseError::from)
}

pub fn export_to_file(doc: &SchemaDocument, path: impl AsRef<Path>) -> Result<(), TransferError> {
    let path = path.as_ref();
    std::fs::write(path, serialize(doc)).map_err(|source| TransferError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), fields = doc.len(), "schema exported");
    Ok(())
}

/// Reads and parses a schema file.
///
/// I/O failures come back as [`crate::Error::Transfer`], bad JSON as
/// [`crate::Error::Parse`].
pub fn import_from_file(path: impl AsRef<Path>) -> crate::Result<SchemaDocument> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| TransferError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc = deserialize(&text)?;
    info!(path = %path.display(), fields = doc.len(), "schema imported");
    Ok(doc)
}

/// Somewhere plain text can be copied to.
pub trait Clipboard {
    fn write_text(&self, text: &str) -> Result<(), TransferError>;
}

/// Best-effort copy of the serialized document.
pub fn copy_to_clipboard(
    doc: &SchemaDocument,
    clipboard: &dyn Clipboard,
) -> Result<(), TransferError> {
    clipboard.write_text(&serialize(doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor;
    use crate::schema::{Dependency, Derivation, OptionItem, Reaction};
    use crate::templates;
    use proptest::prelude::*;
    use serde_json::Value;
    use std::cell::RefCell;

    #[test]
    fn serialize_is_pretty_and_ordered() {
        let text = serialize(&templates::default_schema());
        assert!(text.starts_with(
            "{\n  \"type\": \"object\",\n  \"properties\": {\n    \"username\""
        ));
        let username = text.find("\"username\"").unwrap();
        let email = text.find("\"email\"").unwrap();
        assert!(username < email);
    }

    #[test]
    fn round_trip_templates() {
        for template in templates::catalog() {
            let text = serialize(&template.schema);
            assert_eq!(deserialize(&text).unwrap(), template.schema, "{}", template.id);
        }
        let phone = templates::phone_login_schema();
        assert_eq!(deserialize(&serialize(&phone)).unwrap(), phone);
    }

    #[test]
    fn import_accepts_bare_enum_values() {
        let doc = deserialize(
            r#"{"type": "object", "properties": {
                "color": {"type": "select", "x-component": "Select", "enum": ["red", "green"]}
            }}"#,
        )
        .unwrap();
        assert_eq!(
            doc.get("color").unwrap().options,
            [OptionItem::new("red", "red"), OptionItem::new("green", "green")]
        );
        assert_eq!(deserialize(&serialize(&doc)).unwrap(), doc);
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        let err = deserialize("{ \"type\": \"object\", ").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(deserialize("[1, 2]").is_err());
        assert!(deserialize("{\"type\": \"object\", \"properties\": 3}").is_err());
    }

    #[test]
    fn file_export_then_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EXPORT_FILE_NAME);
        let doc = editor::add_field(&templates::default_schema());
        export_to_file(&doc, &path).unwrap();
        assert_eq!(import_from_file(&path).unwrap(), doc);
    }

    #[test]
    fn import_missing_file_is_transfer_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = import_from_file(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, crate::Error::Transfer(TransferError::Io { .. })));
    }

    #[test]
    fn import_bad_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(import_from_file(&path), Err(crate::Error::Parse(_))));
    }

    struct Recording(RefCell<Vec<String>>);

    impl Clipboard for Recording {
        fn write_text(&self, text: &str) -> Result<(), TransferError> {
            self.0.borrow_mut().push(text.to_string());
            Ok(())
        }
    }

    struct Denied;

    impl Clipboard for Denied {
        fn write_text(&self, _text: &str) -> Result<(), TransferError> {
            Err(TransferError::Clipboard("permission denied".to_string()))
        }
    }

    #[test]
    fn clipboard_copy() {
        let doc = templates::default_schema();
        let clipboard = Recording(RefCell::new(Vec::new()));
        copy_to_clipboard(&doc, &clipboard).unwrap();
        assert_eq!(clipboard.0.borrow().as_slice(), [serialize(&doc)]);

        let err = copy_to_clipboard(&doc, &Denied).unwrap_err();
        assert_eq!(err.to_string(), "clipboard unavailable: permission denied");
    }

    fn json_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z ]{0,8}".prop_map(Value::from),
            prop::collection::vec("[a-z]{1,4}", 0..3).prop_map(Value::from),
        ]
    }

    fn derivation() -> impl Strategy<Value = Derivation> {
        prop_oneof![
            (0usize..3).prop_map(Derivation::Dep),
            prop::collection::vec(0usize..3, 0..3).prop_map(Derivation::All),
            prop::collection::vec(0usize..3, 0..3).prop_map(Derivation::Any),
            (0usize..3).prop_map(Derivation::Not),
            json_value().prop_map(Derivation::Literal),
        ]
    }

    fn reaction() -> impl Strategy<Value = Reaction> {
        let key = prop::sample::select(vec!["value", "visible", "disabled", "readyPost"]);
        (
            prop::collection::vec(("[a-z]{1,6}", any::<bool>()), 0..3),
            prop::collection::vec((key, derivation()), 0..3),
        )
            .prop_map(|(deps, fulfill)| {
                let deps = deps
                    .into_iter()
                    .map(|(field, valid)| {
                        if valid {
                            Dependency::valid(field)
                        } else {
                            Dependency::value(field)
                        }
                    })
                    .collect();
                fulfill
                    .into_iter()
                    .fold(Reaction::new(deps), |r, (key, d)| r.set(key, d))
            })
    }

    proptest! {
        #[test]
        fn round_trip_after_edits(
            adds in 0usize..6,
            title in "[a-zA-Z ]{0,12}",
            required in any::<bool>(),
            new_type in prop::sample::select(
                vec!["string", "select", "textarea", "switch", "date"]
            ),
            description in prop::option::of("[a-zA-Z ]{0,16}"),
            default in prop::option::of(json_value()),
            validator in prop::option::of(prop::sample::select(vec!["phone", "email", "url"])),
            reactions in prop::collection::vec(reaction(), 0..3),
            extra in prop::collection::btree_map("x-note-[a-z]{1,6}", json_value(), 0..3),
        ) {
            let mut doc = templates::default_schema();
            for _ in 0..adds {
                doc = editor::add_field(&doc);
            }
            let last = doc.names().last().unwrap().to_string();
            doc = editor::update_field(&doc, &last, crate::FieldPatch {
                title: Some(title),
                required: Some(required),
                ..Default::default()
            });
            doc = editor::change_field_type(&doc, &last, new_type);
            let options = editor::add_option(&editor::add_option(&[]));
            doc = editor::set_options(&doc, &last, options);

            let mut descriptor = doc.get(&last).unwrap().clone();
            descriptor.description = description;
            descriptor.default = default;
            descriptor.validator = validator.map(str::to_string);
            descriptor.reactions = reactions;
            descriptor.extra = extra.into_iter().collect();
            doc = doc.with_field(last, descriptor);

            prop_assert_eq!(deserialize(&serialize(&doc)).unwrap(), doc);
        }
    }
}
