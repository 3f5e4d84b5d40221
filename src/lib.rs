//! schemaform - schema-driven dynamic forms served over WebUI
//!
//! A form is described by a JSON schema document: an ordered set of named
//! fields, each with a type, a title, a rendering component and optional
//! reaction rules. The crate edits such documents, binds them to live form
//! sessions, and serves two pages built on them: a form builder and a login
//! page with a verification-code resend timer.
//!
//! # Architecture
//!
//! - **Documents**: [`SchemaDocument`] and [`FieldDescriptor`] map one to one
//!   onto the schema JSON. [`editor`] holds pure edit operations, [`templates`]
//!   the built-in documents, [`transfer`] JSON/file/clipboard I/O.
//! - **Runtime**: [`FormRuntime`] turns a document into a [`FormSession`]
//!   with one control per field, validation, and reaction propagation.
//! - **Timer**: [`ResendTimer`] and its async driver [`ResendGate`].
//! - **UI layer**: [`ui`] defines elements in Rust, renders them with custom
//!   HTML elements, and connects both over a JSON protocol on a WebSocket.
//!   [`pages`] binds the builder and login controllers into it.
//!
//! # Example
//!
//! ```no_run
//! use schemaform::pages::{self, FormBuilder};
//! use schemaform::ui::{AppState, start_server};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let state = AppState::new();
//!     pages::builder::mount(state.clone(), FormBuilder::default());
//!     start_server(pages::builder::router_config(state), "127.0.0.1:3000").await
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod control;
pub mod editor;
pub mod error;
pub mod pages;
pub mod runtime;
pub mod schema;
pub mod templates;
pub mod timer;
pub mod transfer;
pub mod ui;
pub mod validate;

pub use config::Settings;
pub use error::{Error, ParseError, Result, SendActionError, TransferError, ValidationError};
pub use runtime::{FormRuntime, FormSession, Settlement, SubmissionState};
pub use schema::{FieldDescriptor, FieldPatch, OptionItem, SchemaDocument};
pub use timer::{CodeSender, ResendGate, ResendState, ResendTimer};
