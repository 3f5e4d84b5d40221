//! The WebUI layer: elements defined in Rust, rendered by custom HTML
//! elements, connected by a JSON protocol over a WebSocket.
//!
//! Elements carry ids, content and event handlers but no geometry or styling.
//! Pages render their whole element tree with [`AppState::replace_elements`];
//! clients receive only the top-level elements whose content changed.
//!
//! # Protocol
//!
//! Client to server, tagged by `type`:
//!
//! ```json
//! {"type": "click", "id": "add-field"}
//! {"type": "input", "id": "value-username", "value": "bob"}
//! {"type": "change", "id": "required-email", "value": true}
//! {"type": "upload", "id": "import", "name": "form-schema.json", "content": "{...}"}
//! {"type": "clipboard", "ok": false, "error": "permission denied"}
//! ```
//!
//! Server to client: `init`, `update`, `notify`, `download`, `clipboard`.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{Html, IntoResponse},
    routing::get,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};

use crate::error::TransferError;
use crate::schema::OptionItem;
use crate::transfer::Clipboard;

/// JSON Protocol: Messages from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Click { id: String },
    Input { id: String, value: String },
    Change { id: String, value: Value },
    Upload { id: String, name: String, content: String },
    Clipboard { ok: bool, error: Option<String> },
}

/// JSON Protocol: Messages from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Init { elements: Vec<UiElement> },
    Update { id: String, element: UiElement },
    Notify(Notice),
    Download { filename: String, content: String },
    Clipboard { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// A transient message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

pub type ClickCallback = Option<Arc<Box<dyn Fn() + Send + Sync + 'static>>>;
pub type InputCallback = Option<Arc<Box<dyn Fn(&str) + Send + Sync + 'static>>>;
pub type BoolCallback = Option<Arc<Box<dyn Fn(bool) + Send + Sync + 'static>>>;
pub type NumberCallback = Option<Arc<Box<dyn Fn(Option<f64>) + Send + Sync + 'static>>>;
pub type ValueCallback = Option<Arc<Box<dyn Fn(Value) + Send + Sync + 'static>>>;
pub type UploadCallback = Option<Arc<Box<dyn Fn(&str, &str) + Send + Sync + 'static>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    #[default]
    Text,
    Password,
    TextArea,
    Date,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectMode {
    #[default]
    Dropdown,
    Radio,
    Multiple,
}

/// UI Element types that can be created in Rust and rendered in HTML.
///
/// Each element has an `id` for identification and element-specific properties.
/// Handlers are not serialized.
#[derive(Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UiElement {
    /// Renders as `<ui-button>`. `active` marks the selected entry of a
    /// button row (tabs, templates).
    Button {
        id: String,
        text: String,
        disabled: bool,
        active: bool,
        #[serde(skip)]
        on_click: ClickCallback,
    },

    /// Read-only text, `<ui-text>`.
    Text { id: String, text: String },

    /// Preformatted block, `<ui-code>`.
    Code { id: String, text: String },

    /// Text-like input, `<ui-input>`. Sends `input` events on every
    /// keystroke, or once editing finishes when `lazy` is set.
    Input {
        id: String,
        label: Option<String>,
        value: String,
        input_type: InputType,
        placeholder: Option<String>,
        error: Option<String>,
        disabled: bool,
        lazy: bool,
        #[serde(skip)]
        on_input: InputCallback,
    },

    /// Checkbox or toggle switch, `<ui-checkbox>`. Sends `change` with a bool.
    Checkbox {
        id: String,
        label: Option<String>,
        checked: bool,
        toggle: bool,
        error: Option<String>,
        disabled: bool,
        #[serde(skip)]
        on_change: BoolCallback,
    },

    /// Number input, `<ui-number>`. Sends `change` with a number or null.
    #[serde(rename = "number")]
    NumberInput {
        id: String,
        label: Option<String>,
        value: Option<f64>,
        placeholder: Option<String>,
        error: Option<String>,
        disabled: bool,
        #[serde(skip)]
        on_change: NumberCallback,
    },

    /// Choice input, `<ui-select>`: dropdown, radio row or checkbox group.
    /// Sends `change` with the chosen value (an array in `multiple` mode).
    Select {
        id: String,
        label: Option<String>,
        value: Value,
        options: Vec<OptionItem>,
        mode: SelectMode,
        error: Option<String>,
        disabled: bool,
        #[serde(skip)]
        on_change: ValueCallback,
    },

    /// File picker, `<ui-upload>`. Sends `upload` with the file's text.
    Upload {
        id: String,
        text: String,
        accept: String,
        #[serde(skip)]
        on_upload: UploadCallback,
    },

    /// Container, `<ui-group>`.
    Group {
        id: String,
        title: Option<String>,
        children: Vec<UiElement>,
    },
}

impl UiElement {
    pub fn id(&self) -> &str {
        match self {
            UiElement::Button { id, .. }
            | UiElement::Text { id, .. }
            | UiElement::Code { id, .. }
            | UiElement::Input { id, .. }
            | UiElement::Checkbox { id, .. }
            | UiElement::NumberInput { id, .. }
            | UiElement::Select { id, .. }
            | UiElement::Upload { id, .. }
            | UiElement::Group { id, .. } => id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            UiElement::Button { .. } => "Button",
            UiElement::Text { .. } => "Text",
            UiElement::Code { .. } => "Code",
            UiElement::Input { .. } => "Input",
            UiElement::Checkbox { .. } => "Checkbox",
            UiElement::NumberInput { .. } => "NumberInput",
            UiElement::Select { .. } => "Select",
            UiElement::Upload { .. } => "Upload",
            UiElement::Group { .. } => "Group",
        }
    }

    /// Depth-first search through groups.
    pub fn find(&self, id: &str) -> Option<&UiElement> {
        if self.id() == id {
            return Some(self);
        }
        match self {
            UiElement::Group { children, .. } => children.iter().find_map(|c| c.find(id)),
            _ => None,
        }
    }

    /// Same rendered content, handlers ignored.
    fn same_content(&self, other: &UiElement) -> bool {
        match (serde_json::to_value(self), serde_json::to_value(other)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Debug for UiElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiElement::Group { id, title, children } => f
                .debug_struct("Group")
                .field("id", id)
                .field("title", title)
                .field("children", children)
                .finish(),
            other => f
                .debug_struct(other.kind())
                .field("id", &other.id())
                .field("content", &serde_json::to_value(other).unwrap_or(Value::Null))
                .finish(),
        }
    }
}

/// Application state managing UI elements and event handlers.
///
/// Stores the top-level elements in render order and broadcasts changes to
/// every connected WebSocket client. Cheap to clone; all mutation goes
/// through internal locks, which are never held while a handler runs.
#[derive(Clone)]
pub struct AppState {
    elements: Arc<Mutex<IndexMap<String, UiElement>>>,
    update_tx: broadcast::Sender<ServerMessage>,
}

impl AppState {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self {
            elements: Arc::new(Mutex::new(IndexMap::new())),
            update_tx: tx,
        }
    }

    /// Replaces the element tree.
    ///
    /// When the top-level ids are unchanged only the differing elements are
    /// sent as `update`s; otherwise clients get a fresh `init`.
    pub fn replace_elements(&self, elements: Vec<UiElement>) {
        let mut current = self.elements.lock().unwrap();
        let same_layout = current.len() == elements.len()
            && current.keys().zip(&elements).all(|(id, e)| id == e.id());

        if same_layout {
            for element in &elements {
                if current.get(element.id()).is_some_and(|old| old.same_content(element)) {
                    continue;
                }
                let _ = self.update_tx.send(ServerMessage::Update {
                    id: element.id().to_string(),
                    element: element.clone(),
                });
            }
            *current = elements.into_iter().map(|e| (e.id().to_string(), e)).collect();
        } else {
            *current = elements.into_iter().map(|e| (e.id().to_string(), e)).collect();
            let _ = self.update_tx.send(ServerMessage::Init {
                elements: current.values().cloned().collect(),
            });
        }
    }

    /// Gets all top-level elements in render order.
    pub fn get_all_elements(&self) -> Vec<UiElement> {
        self.elements.lock().unwrap().values().cloned().collect()
    }

    /// Finds an element anywhere in the tree.
    pub fn find_element(&self, id: &str) -> Option<UiElement> {
        let elements = self.elements.lock().unwrap();
        elements.values().find_map(|e| e.find(id)).cloned()
    }

    pub fn notify(&self, notice: Notice) {
        debug!(level = ?notice.level, message = %notice.message, "notify");
        let _ = self.update_tx.send(ServerMessage::Notify(notice));
    }

    /// Offers `content` to connected browsers as a file download.
    pub fn download(&self, filename: impl Into<String>, content: impl Into<String>) {
        let _ = self.update_tx.send(ServerMessage::Download {
            filename: filename.into(),
            content: content.into(),
        });
    }

    /// Asks connected browsers to put `text` on the clipboard.
    ///
    /// Returns false when no client is connected. The browser reports the
    /// outcome with a `clipboard` message.
    pub fn write_clipboard(&self, text: impl Into<String>) -> bool {
        self.update_tx.send(ServerMessage::Clipboard { text: text.into() }).is_ok()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.update_tx.subscribe()
    }

    pub(crate) fn handle_message(&self, message: ClientMessage) {
        match message {
            ClientMessage::Click { id } => self.handle_click(&id),
            ClientMessage::Input { id, value } => self.handle_input(&id, &value),
            ClientMessage::Change { id, value } => self.handle_change(&id, value),
            ClientMessage::Upload { id, name, content } => self.handle_upload(&id, &name, &content),
            ClientMessage::Clipboard { ok: true, .. } => {
                self.notify(Notice::success("Copied to clipboard"))
            }
            ClientMessage::Clipboard { ok: false, error } => {
                let reason = error.unwrap_or_else(|| "unknown error".to_string());
                warn!(%reason, "clipboard write failed");
                self.notify(Notice::error(format!("Copy failed: {reason}")));
            }
        }
    }

    fn lookup<T>(&self, id: &str, pick: impl FnOnce(&UiElement) -> Option<T>) -> Option<T> {
        let elements = self.elements.lock().unwrap();
        let found = elements.values().find_map(|e| e.find(id));
        if found.is_none() {
            debug!(id, "event for unknown element");
        }
        found.and_then(pick)
    }

    pub(crate) fn handle_click(&self, id: &str) {
        let handler = self.lookup(id, |e| match e {
            UiElement::Button {
                on_click: Some(handler),
                disabled: false,
                ..
            } => Some(handler.clone()),
            _ => None,
        });
        if let Some(handler) = handler {
            handler();
        }
    }

    pub(crate) fn handle_input(&self, id: &str, value: &str) {
        let handler = self.lookup(id, |e| match e {
            UiElement::Input { on_input: Some(handler), .. } => Some(handler.clone()),
            _ => None,
        });
        if let Some(handler) = handler {
            handler(value);
        }
    }

    pub(crate) fn handle_change(&self, id: &str, value: Value) {
        enum HandlerCall {
            Bool(Arc<Box<dyn Fn(bool) + Send + Sync + 'static>>, bool),
            Number(Arc<Box<dyn Fn(Option<f64>) + Send + Sync + 'static>>, Option<f64>),
            Value(Arc<Box<dyn Fn(Value) + Send + Sync + 'static>>, Value),
        }

        let handler_call = self.lookup(id, |e| match e {
            UiElement::Checkbox { on_change: Some(handler), .. } => {
                value.as_bool().map(|checked| HandlerCall::Bool(handler.clone(), checked))
            }
            UiElement::NumberInput { on_change: Some(handler), .. } => {
                let number = match &value {
                    Value::Null => Some(None),
                    Value::String(s) if s.trim().is_empty() => Some(None),
                    Value::String(s) => s.trim().parse().ok().map(Some),
                    other => other.as_f64().map(Some),
                };
                number.map(|n| HandlerCall::Number(handler.clone(), n))
            }
            UiElement::Select { on_change: Some(handler), .. } => {
                Some(HandlerCall::Value(handler.clone(), value.clone()))
            }
            _ => None,
        });

        match handler_call {
            Some(HandlerCall::Bool(handler, value)) => handler(value),
            Some(HandlerCall::Number(handler, value)) => handler(value),
            Some(HandlerCall::Value(handler, value)) => handler(value),
            None => {}
        }
    }

    pub(crate) fn handle_upload(&self, id: &str, name: &str, content: &str) {
        let handler = self.lookup(id, |e| match e {
            UiElement::Upload { on_upload: Some(handler), .. } => Some(handler.clone()),
            _ => None,
        });
        if let Some(handler) = handler {
            handler(name, content);
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies through the connected browsers.
impl Clipboard for AppState {
    fn write_text(&self, text: &str) -> Result<(), TransferError> {
        if self.write_clipboard(text) {
            Ok(())
        } else {
            Err(TransferError::Clipboard("no browser connected".to_string()))
        }
    }
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(err) => {
            warn!(error = %err, "failed to encode server message");
            None
        }
    }
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| websocket(socket, state))
}

async fn websocket(stream: WebSocket, state: AppState) {
    use futures_util::sink::SinkExt;
    use futures_util::stream::StreamExt;

    let (mut sender, mut receiver) = stream.split();

    // Subscribe first so nothing is missed between init and the first update
    let mut update_rx = state.subscribe();
    let init = ServerMessage::Init {
        elements: state.get_all_elements(),
    };
    let Some(init) = encode(&init) else { return };
    if sender.send(init).await.is_err() {
        return;
    }
    debug!("client connected");

    let send_state = state.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let message = match update_rx.recv().await {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "client lagged, resending full state");
                    ServerMessage::Init {
                        elements: send_state.get_all_elements(),
                    }
                }
                Err(RecvError::Closed) => break,
            };
            if let Some(message) = encode(&message)
                && sender.send(message).await.is_err()
            {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(client_msg) => state.handle_message(client_msg),
                    Err(err) => debug!(error = %err, "ignoring malformed client message"),
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }
    debug!("client disconnected");
}

// Default HTML template - wraps page content
fn generate_html(title: &str, body_content: &str) -> String {
    format!(r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <link rel="stylesheet" href="/static/webui.css">
</head>
<body>
{body_content}
    <ui-notices></ui-notices>
    <script src="/static/webui.js"></script>
</body>
</html>"#)
}

/// Configuration for creating a WebUI router
pub struct RouterConfig {
    pub state: AppState,
    /// Path to static files directory
    pub static_dir: String,
    pub title: String,
    /// HTML body content; `<ui-root>` renders the whole element tree
    pub body_html: String,
}

impl RouterConfig {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            static_dir: "static".to_string(),
            title: "schemaform".to_string(),
            body_html: r#"<main><ui-root></ui-root></main>"#.to_string(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn static_dir(mut self, dir: impl Into<String>) -> Self {
        self.static_dir = dir.into();
        self
    }

    pub fn body_html(mut self, html: impl Into<String>) -> Self {
        self.body_html = html.into();
        self
    }
}

/// Creates the axum router:
///
/// - `/` - the page HTML
/// - `/ws` - WebSocket endpoint for UI communication
/// - `/static` - webui.js, webui.css
pub fn create_router(config: RouterConfig) -> Router {
    let html_content = generate_html(&config.title, &config.body_html);

    Router::new()
        .route("/", get(move || async move { Html(html_content) }))
        .route("/ws", get(websocket_handler))
        .nest_service("/static", ServeDir::new(config.static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(config.state)
}

/// Binds `addr` and serves `config` until the process stops.
pub async fn start_server(
    config: RouterConfig,
    addr: impl AsRef<str>,
) -> Result<(), std::io::Error> {
    let app = create_router(config);

    let listener = tokio::net::TcpListener::bind(addr.as_ref()).await?;
    info!("Server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(id: &str, text: &str) -> UiElement {
        UiElement::Text {
            id: id.to_string(),
            text: text.to_string(),
        }
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    #[test]
    fn replace_sends_only_changed_elements() {
        let state = AppState::new();
        let mut rx = state.subscribe();

        state.replace_elements(vec![text("a", "1"), text("b", "2")]);
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::Init { elements }] if elements.len() == 2
        ));

        state.replace_elements(vec![text("a", "1"), text("b", "3")]);
        let messages = drain(&mut rx);
        assert!(matches!(messages.as_slice(), [ServerMessage::Update { id, .. }] if id == "b"));

        state.replace_elements(vec![text("b", "3")]);
        assert!(matches!(drain(&mut rx).as_slice(), [ServerMessage::Init { .. }]));
    }

    #[test]
    fn nested_click_reaches_handler() {
        let state = AppState::new();
        let clicked = Arc::new(Mutex::new(0));
        let counter = clicked.clone();
        state.replace_elements(vec![UiElement::Group {
            id: "toolbar".to_string(),
            title: None,
            children: vec![UiElement::Button {
                id: "go".to_string(),
                text: "Go".to_string(),
                disabled: false,
                active: false,
                on_click: Some(Arc::new(Box::new(move || *counter.lock().unwrap() += 1))),
            }],
        }]);

        state.handle_message(ClientMessage::Click {
            id: "go".to_string(),
        });
        state.handle_message(ClientMessage::Click {
            id: "missing".to_string(),
        });
        assert_eq!(*clicked.lock().unwrap(), 1);
    }

    #[test]
    fn disabled_button_ignores_clicks() {
        let state = AppState::new();
        let clicked = Arc::new(Mutex::new(false));
        let flag = clicked.clone();
        state.replace_elements(vec![UiElement::Button {
            id: "send".to_string(),
            text: "Send".to_string(),
            disabled: true,
            active: false,
            on_click: Some(Arc::new(Box::new(move || *flag.lock().unwrap() = true))),
        }]);
        state.handle_click("send");
        assert!(!*clicked.lock().unwrap());
    }

    #[test]
    fn number_change_parses_strings() {
        let state = AppState::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        state.replace_elements(vec![UiElement::NumberInput {
            id: "price".to_string(),
            label: None,
            value: None,
            placeholder: None,
            error: None,
            disabled: false,
            on_change: Some(Arc::new(Box::new(move |v: Option<f64>| sink.lock().unwrap().push(v)))),
        }]);
        state.handle_change("price", json!("4.5"));
        state.handle_change("price", json!(""));
        state.handle_change("price", json!(7));
        state.handle_change("price", json!("abc"));
        assert_eq!(*seen.lock().unwrap(), [Some(4.5), None, Some(7.0)]);
    }

    #[test]
    fn clipboard_report_becomes_notice() {
        let state = AppState::new();
        let mut rx = state.subscribe();
        state.handle_message(ClientMessage::Clipboard {
            ok: false,
            error: Some("denied".to_string()),
        });
        match drain(&mut rx).as_slice() {
            [ServerMessage::Notify(notice)] => {
                assert_eq!(notice, &Notice::error("Copy failed: denied"));
            }
            other => panic!("unexpected messages: {other:?}"),
        }
    }

    #[test]
    fn protocol_shapes() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type": "upload", "id": "import", "name": "a.json", "content": "{}"}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::Upload { ref name, .. } if name == "a.json"));

        let out = serde_json::to_value(ServerMessage::Notify(Notice::success("Saved"))).unwrap();
        assert_eq!(out, json!({ "type": "notify", "level": "success", "message": "Saved" }));

        let out = serde_json::to_value(ServerMessage::Update {
            id: "t".to_string(),
            element: text("t", "hi"),
        })
        .unwrap();
        assert_eq!(
            out,
            json!({
                "type": "update",
                "id": "t",
                "element": { "kind": "text", "id": "t", "text": "hi" }
            })
        );
    }

    #[test]
    fn clipboard_needs_a_client() {
        let state = AppState::new();
        assert!(!state.write_clipboard("x"));
        let _rx = state.subscribe();
        assert!(state.write_clipboard("x"));
    }
}
