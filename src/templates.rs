//! Built-in documents: the builder's starting form, its template gallery and
//! the two login forms.

use serde::Serialize;
use serde_json::json;

use crate::schema::{Dependency, Derivation, FieldDescriptor, OptionItem, Reaction, SchemaDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateCategory {
    User,
    Product,
    Survey,
    Custom,
}

/// A read-only example document. Selecting one copies its schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: TemplateCategory,
    pub schema: SchemaDocument,
}

fn text(title: &str, placeholder: &str) -> FieldDescriptor {
    FieldDescriptor::of_type("string", title).prop("placeholder", placeholder)
}

/// The two-field form the builder starts from and resets to.
pub fn default_schema() -> SchemaDocument {
    SchemaDocument::new()
        .with_field("username", text("Username", "Please enter a username").required())
        .with_field("email", text("Email", "Please enter an email").required())
}

fn user_register() -> SchemaDocument {
    SchemaDocument::new()
        .with_field("username", text("Username", "Please enter a username").required())
        .with_field("email", text("Email", "Please enter an email").required())
        .with_field(
            "password",
            FieldDescriptor::new("string", "Password")
                .decorator("FormItem")
                .component("Input.Password")
                .prop("placeholder", "Please enter a password")
                .required(),
        )
        .with_field(
            "role",
            FieldDescriptor::new("string", "Role")
                .decorator("FormItem")
                .component("Select")
                .prop("placeholder", "Please select a role")
                .options(vec![
                    OptionItem::new("Regular user", "user"),
                    OptionItem::new("Administrator", "admin"),
                ])
                .required(),
        )
}

fn product_info() -> SchemaDocument {
    SchemaDocument::new()
        .with_field("name", text("Product name", "Please enter a product name").required())
        .with_field(
            "price",
            FieldDescriptor::new("number", "Price")
                .decorator("FormItem")
                .component("NumberPicker")
                .prop("placeholder", "Please enter a price")
                .prop("min", 0)
                .prop("precision", 2)
                .prop("addonBefore", "¥")
                .required(),
        )
        .with_field(
            "category",
            FieldDescriptor::new("string", "Category")
                .decorator("FormItem")
                .component("Select")
                .prop("placeholder", "Please select a category")
                .options(vec![
                    OptionItem::new("Electronics", "electronics"),
                    OptionItem::new("Clothing", "clothing"),
                    OptionItem::new("Food", "food"),
                ])
                .required(),
        )
        .with_field(
            "inStock",
            FieldDescriptor::new("boolean", "In stock")
                .decorator("FormItem")
                .component("Switch"),
        )
}

fn satisfaction_survey() -> SchemaDocument {
    let stars = (1..=5)
        .map(|n| OptionItem::new("⭐".repeat(n), json!(n)))
        .collect();
    SchemaDocument::new()
        .with_field(
            "overallRating",
            FieldDescriptor::new("number", "Overall rating")
                .decorator("FormItem")
                .component("Select")
                .prop("placeholder", "Please pick a rating")
                .options(stars)
                .required(),
        )
        .with_field(
            "recommend",
            FieldDescriptor::new("string", "Would you recommend us?")
                .decorator("FormItem")
                .component("RadioGroup")
                .prop("optionType", "button")
                .options(vec![
                    OptionItem::new("Very likely", "very-likely"),
                    OptionItem::new("Likely", "likely"),
                    OptionItem::new("Neutral", "neutral"),
                    OptionItem::new("Unlikely", "unlikely"),
                ])
                .required(),
        )
        .with_field(
            "feedback",
            FieldDescriptor::new("string", "Feedback")
                .decorator("FormItem")
                .component("InputTextArea")
                .prop("placeholder", "Tell us what we could do better")
                .prop("rows", 4),
        )
}

/// The template gallery, in display order.
pub fn catalog() -> Vec<FormTemplate> {
    vec![
        FormTemplate {
            id: "user-register",
            name: "User registration",
            description: "A basic sign-up form",
            category: TemplateCategory::User,
            schema: user_register(),
        },
        FormTemplate {
            id: "product-info",
            name: "Product details",
            description: "Basic product information",
            category: TemplateCategory::Product,
            schema: product_info(),
        },
        FormTemplate {
            id: "survey",
            name: "Satisfaction survey",
            description: "Customer satisfaction questionnaire",
            category: TemplateCategory::Survey,
            schema: satisfaction_survey(),
        },
    ]
}

pub fn find(id: &str) -> Option<FormTemplate> {
    catalog().into_iter().find(|t| t.id == id)
}

/// Username and password login form.
pub fn password_login_schema() -> SchemaDocument {
    SchemaDocument::new()
        .with_field(
            "username",
            FieldDescriptor::new("string", "Username")
                .decorator("FormItem")
                .component("Input")
                .prop("prefix", "user")
                .required(),
        )
        .with_field(
            "password",
            FieldDescriptor::new("string", "Password")
                .decorator("FormItem")
                .component("Password")
                .prop("prefix", "lock")
                .required(),
        )
}

/// Phone number and verification code login form.
///
/// The code field's send button becomes ready once `phone` holds a value that
/// passes its `phone` format check.
pub fn phone_login_schema() -> SchemaDocument {
    SchemaDocument::new()
        .with_field(
            "phone",
            FieldDescriptor::new("string", "Phone number")
                .decorator("FormItem")
                .component("Input")
                .prop("prefix", "phone")
                .validator("phone")
                .required(),
        )
        .with_field(
            "verifyCode",
            FieldDescriptor::new("string", "Verification code")
                .decorator("FormItem")
                .component("VerifyCode")
                .prop("prefix", "lock")
                .reaction(
                    Reaction::new(vec![Dependency::value("phone"), Dependency::valid("phone")])
                        .set("readyPost", Derivation::All(vec![0, 1]))
                        .set("phoneNumber", Derivation::Dep(0)),
                )
                .required(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_unique() {
        let templates = catalog();
        let ids: Vec<_> = templates.iter().map(|t| t.id).collect();
        assert_eq!(ids, ["user-register", "product-info", "survey"]);
        assert_eq!(find("survey").unwrap().category, TemplateCategory::Survey);
        assert!(find("missing").is_none());
    }

    #[test]
    fn survey_ratings_are_numeric() {
        let survey = find("survey").unwrap().schema;
        let rating = survey.get("overallRating").unwrap();
        assert_eq!(rating.options.len(), 5);
        assert_eq!(rating.options[2].value, json!(3));
    }

    #[test]
    fn default_schema_has_two_required_strings() {
        let doc = default_schema();
        assert_eq!(doc.names().collect::<Vec<_>>(), ["username", "email"]);
        assert!(doc.iter().all(|(_, d)| d.required && d.field_type == "string"));
    }
}
