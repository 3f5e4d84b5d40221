//! The login page: username/password and phone/verification-code tabs.
//!
//! The code field's send button is enabled by two things: the `readyPost`
//! prop its reaction derives from the phone field, and the [`ResendGate`]
//! countdown. Sends run on a spawned task so no page lock is held while the
//! [`CodeSender`] works.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info};

use crate::error::{Result, SendActionError, ValidationError};
use crate::runtime::{FormRuntime, FormSession, Settlement};
use crate::schema::is_truthy;
use crate::templates;
use crate::timer::{CodeSender, ResendGate, ResendState, SendOutcome};
use crate::ui::{AppState, Notice, RouterConfig, UiElement};

use super::{Page, PageView, control_element};

/// Field carrying the send button.
pub const VERIFY_CODE_FIELD: &str = "verifyCode";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginTab {
    Password,
    Phone,
}

impl LoginTab {
    fn key(self) -> &'static str {
        match self {
            LoginTab::Password => "password",
            LoginTab::Phone => "phone",
        }
    }

    fn label(self) -> &'static str {
        match self {
            LoginTab::Password => "Account & password",
            LoginTab::Phone => "Phone number",
        }
    }
}

pub struct LoginPage {
    tab: LoginTab,
    password: FormSession,
    phone: FormSession,
    gate: Arc<ResendGate>,
    signed_in: Option<IndexMap<String, Value>>,
    /// Stops the countdown refresh task when the page is dropped.
    refresh_task: Option<DropGuard>,
}

impl LoginPage {
    pub fn new(runtime: &FormRuntime, gate: Arc<ResendGate>) -> Self {
        Self {
            tab: LoginTab::Password,
            password: runtime.load(templates::password_login_schema()),
            phone: runtime.load(templates::phone_login_schema()),
            gate,
            signed_in: None,
            refresh_task: None,
        }
    }

    pub fn tab(&self) -> LoginTab {
        self.tab
    }

    pub fn select_tab(&mut self, tab: LoginTab) {
        self.tab = tab;
    }

    pub fn session(&self, tab: LoginTab) -> &FormSession {
        match tab {
            LoginTab::Password => &self.password,
            LoginTab::Phone => &self.phone,
        }
    }

    fn session_mut(&mut self, tab: LoginTab) -> &mut FormSession {
        match tab {
            LoginTab::Password => &mut self.password,
            LoginTab::Phone => &mut self.phone,
        }
    }

    pub fn gate(&self) -> Arc<ResendGate> {
        self.gate.clone()
    }

    /// Values of the last successful login.
    pub fn signed_in(&self) -> Option<&IndexMap<String, Value>> {
        self.signed_in.as_ref()
    }

    pub fn set_value(&mut self, tab: LoginTab, name: &str, value: Value) -> Result<Settlement> {
        self.session_mut(tab).set_field_value(name, value)
    }

    /// Destination and readiness as derived onto the code field.
    pub fn code_request(&self) -> (String, bool) {
        let Some(control) = self.phone.control(VERIFY_CODE_FIELD) else {
            return (String::new(), false);
        };
        let destination = control
            .prop("phoneNumber")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let ready = control.prop("readyPost").is_some_and(is_truthy);
        (destination, ready)
    }

    pub fn can_send_code(&self) -> bool {
        let (_, ready) = self.code_request();
        self.gate.state().is_available(ready)
    }

    pub fn submit(
        &mut self,
        tab: LoginTab,
    ) -> std::result::Result<&IndexMap<String, Value>, ValidationError> {
        let values = self.session_mut(tab).submit()?;
        info!(tab = tab.key(), "login submitted");
        Ok(self.signed_in.insert(values))
    }

    /// Clears a tab. Resetting the phone tab also stops the countdown.
    pub fn reset(&mut self, tab: LoginTab) {
        self.session_mut(tab).reset();
        if tab == LoginTab::Phone {
            self.gate.reset();
        }
    }
}

/// Reads the destination under the page lock, then sends without it.
pub async fn request_code(
    page: &Page<LoginPage>,
) -> std::result::Result<SendOutcome, SendActionError> {
    let (gate, (destination, ready)) = page.with(|p| (p.gate(), p.code_request()));
    gate.request(&destination, ready).await
}

fn send_button_text(state: ResendState) -> String {
    if state.sending {
        "Sending...".to_string()
    } else if state.remaining_seconds > 0 {
        format!("Resend in {}s", state.remaining_seconds)
    } else {
        "Send code".to_string()
    }
}

impl LoginPage {
    fn render_form(&self, page: &Page<Self>, tab: LoginTab) -> UiElement {
        let session = self.session(tab);
        let prefix = tab.key();
        let mut children = Vec::new();
        for control in session.controls().filter(|c| c.visible) {
            let input = control_element(
                page,
                format!("{prefix}-{}", control.name),
                control,
                session.errors(&control.name),
                move |p: &mut Self, name, value| match p.set_value(tab, name, value) {
                    Ok(Settlement::Unresolved { reactions }) => Some(Notice::error(format!(
                        "Field rules did not settle: {}",
                        reactions.join(", ")
                    ))),
                    Ok(Settlement::Settled { .. }) => None,
                    Err(err) => Some(Notice::error(err.to_string())),
                },
            );
            if control.name == VERIFY_CODE_FIELD {
                children.push(UiElement::Group {
                    id: format!("{prefix}-{}-row", control.name),
                    title: None,
                    children: vec![input, self.render_send_button(page)],
                });
            } else {
                children.push(input);
            }
        }

        children.push(UiElement::Button {
            id: format!("{prefix}-submit"),
            text: "Log in".to_string(),
            disabled: false,
            active: false,
            on_click: page.on_click(move |p| match p.submit(tab) {
                Ok(values) => {
                    let who = values
                        .values()
                        .next()
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    Some(Notice::success(format!("Logged in as {who}")))
                }
                Err(err) => Some(Notice::error(err.to_string())),
            }),
        });
        children.push(UiElement::Button {
            id: format!("{prefix}-reset"),
            text: "Reset".to_string(),
            disabled: false,
            active: false,
            on_click: page.on_click(move |p| {
                p.reset(tab);
                None
            }),
        });

        UiElement::Group {
            id: format!("{prefix}-form"),
            title: Some(tab.label().to_string()),
            children,
        }
    }

    fn render_send_button(&self, page: &Page<Self>) -> UiElement {
        let handle = page.clone();
        UiElement::Button {
            id: "send-code".to_string(),
            text: send_button_text(self.gate.state()),
            disabled: !self.can_send_code(),
            active: false,
            on_click: Some(Arc::new(Box::new(move || {
                let page = handle.clone();
                tokio::spawn(async move {
                    let notice = match request_code(&page).await {
                        Ok(SendOutcome::Sent) => Notice::success("Verification code sent"),
                        Ok(SendOutcome::Rejected(rejection)) => Notice::info(rejection.to_string()),
                        Ok(SendOutcome::Discarded) => Notice::info("Code request cancelled"),
                        Err(err) => Notice::error(err.to_string()),
                    };
                    page.refresh();
                    page.state().notify(notice);
                });
            }))),
        }
    }
}

impl PageView for LoginPage {
    fn render(&self, page: &Page<Self>) -> Vec<UiElement> {
        let tabs = [LoginTab::Password, LoginTab::Phone]
            .into_iter()
            .map(|tab| UiElement::Button {
                id: format!("tab-{}", tab.key()),
                text: tab.label().to_string(),
                disabled: false,
                active: self.tab == tab,
                on_click: page.on_click(move |p| {
                    p.select_tab(tab);
                    None
                }),
            })
            .collect();

        let mut elements = vec![
            UiElement::Group {
                id: "tabs".to_string(),
                title: None,
                children: tabs,
            },
            self.render_form(page, self.tab),
        ];
        if let Some(values) = self.signed_in() {
            let fields: Vec<&str> = values.keys().map(String::as_str).collect();
            elements.push(UiElement::Text {
                id: "signed-in".to_string(),
                text: format!("Signed in with {}", fields.join(" and ")),
            });
        }
        elements
    }
}

/// Stand-in for an SMS gateway: waits, logs, succeeds.
pub struct SimulatedSender {
    delay: Duration,
}

impl SimulatedSender {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedSender {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl CodeSender for SimulatedSender {
    async fn send_code(&self, destination: &str) -> std::result::Result<(), SendActionError> {
        tokio::time::sleep(self.delay).await;
        info!(destination, "verification code delivered");
        Ok(())
    }
}

/// Mounts a login page whose send button re-renders on every countdown tick.
///
/// Must be called inside a tokio runtime: re-renders triggered by the gate
/// run on their own task, so the gate may be reset while the page is locked.
/// That task ends when the page is dropped (see [`Page::unmount`]), which in
/// turn drops the gate and cancels its countdown.
pub fn mount(
    state: AppState,
    runtime: &FormRuntime,
    sender: Arc<dyn CodeSender>,
    countdown: u32,
) -> Page<LoginPage> {
    let wake = Arc::new(Notify::new());
    let gate = ResendGate::with_countdown(sender, countdown).observe({
        let wake = wake.clone();
        Arc::new(move |_| wake.notify_one())
    });
    let page = Page::mount(state, LoginPage::new(runtime, Arc::new(gate)));

    let token = CancellationToken::new();
    page.with(|p| p.refresh_task = Some(token.clone().drop_guard()));
    let weak = page.downgrade();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = wake.notified() => {
                    let Some(page) = weak.upgrade() else { break };
                    page.refresh();
                }
            }
        }
        debug!("login refresh task stopped");
    });
    page
}

pub fn router_config(state: AppState) -> RouterConfig {
    RouterConfig::new(state).title("Login")
}
