//! Page controllers bound into an [`AppState`].
//!
//! A controller owns its page state (documents, sessions, timers) and knows
//! how to render itself. [`Page`] wraps it for sharing with element handlers:
//! every handler locks the controller, applies one operation, releases the
//! lock, then re-renders and surfaces the operation's notice.

pub mod builder;
pub mod login;

use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use crate::control::{Bindable, Control, ControlKind};
use crate::control::number_value;
use crate::ui::{
    AppState, BoolCallback, ClickCallback, InputCallback, InputType, Notice, NumberCallback,
    SelectMode, UiElement, UploadCallback, ValueCallback,
};

pub use builder::FormBuilder;
pub use login::LoginPage;

/// A controller that can draw itself.
pub trait PageView: Send + Sized + 'static {
    fn render(&self, page: &Page<Self>) -> Vec<UiElement>;
}

pub struct Page<C> {
    controller: Arc<Mutex<C>>,
    state: AppState,
}

impl<C> Clone for Page<C> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            state: self.state.clone(),
        }
    }
}

/// A page handle that does not keep the controller alive.
pub struct WeakPage<C> {
    controller: Weak<Mutex<C>>,
    state: AppState,
}

impl<C> WeakPage<C> {
    pub fn upgrade(&self) -> Option<Page<C>> {
        Some(Page {
            controller: self.controller.upgrade()?,
            state: self.state.clone(),
        })
    }
}

impl<C: PageView> Page<C> {
    /// Renders `controller` into `state` and keeps it there.
    pub fn mount(state: AppState, controller: C) -> Self {
        let page = Self {
            controller: Arc::new(Mutex::new(controller)),
            state,
        };
        page.refresh();
        page
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn downgrade(&self) -> WeakPage<C> {
        WeakPage {
            controller: Arc::downgrade(&self.controller),
            state: self.state.clone(),
        }
    }

    /// Removes the page's elements, and with them the handlers that hold it.
    ///
    /// The controller is dropped once the remaining `Page` handles are.
    pub fn unmount(&self) {
        self.state.replace_elements(Vec::new());
    }

    /// Runs `f` against the controller without re-rendering.
    pub fn with<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut self.controller.lock().unwrap())
    }

    pub fn refresh(&self) {
        let elements = {
            let controller = self.controller.lock().unwrap();
            controller.render(self)
        };
        self.state.replace_elements(elements);
    }

    /// Applies one operation, re-renders, then shows its notice if any.
    pub fn apply(&self, f: impl FnOnce(&mut C) -> Option<Notice>) {
        let notice = self.with(f);
        self.refresh();
        if let Some(notice) = notice {
            self.state.notify(notice);
        }
    }

    pub fn on_click<F>(&self, f: F) -> ClickCallback
    where
        F: Fn(&mut C) -> Option<Notice> + Send + Sync + 'static,
    {
        let page = self.clone();
        Some(Arc::new(Box::new(move || page.apply(&f))))
    }

    pub fn on_input<F>(&self, f: F) -> InputCallback
    where
        F: Fn(&mut C, &str) -> Option<Notice> + Send + Sync + 'static,
    {
        let page = self.clone();
        Some(Arc::new(Box::new(move |value: &str| page.apply(|c| f(c, value)))))
    }

    pub fn on_toggle<F>(&self, f: F) -> BoolCallback
    where
        F: Fn(&mut C, bool) -> Option<Notice> + Send + Sync + 'static,
    {
        let page = self.clone();
        Some(Arc::new(Box::new(move |on: bool| page.apply(|c| f(c, on)))))
    }

    pub fn on_number<F>(&self, f: F) -> NumberCallback
    where
        F: Fn(&mut C, Option<f64>) -> Option<Notice> + Send + Sync + 'static,
    {
        let page = self.clone();
        Some(Arc::new(Box::new(move |n: Option<f64>| page.apply(|c| f(c, n)))))
    }

    pub fn on_value<F>(&self, f: F) -> ValueCallback
    where
        F: Fn(&mut C, Value) -> Option<Notice> + Send + Sync + 'static,
    {
        let page = self.clone();
        Some(Arc::new(Box::new(move |v: Value| page.apply(|c| f(c, v)))))
    }

    pub fn on_upload<F>(&self, f: F) -> UploadCallback
    where
        F: Fn(&mut C, &str, &str) -> Option<Notice> + Send + Sync + 'static,
    {
        let page = self.clone();
        Some(Arc::new(Box::new(move |name: &str, content: &str| {
            page.apply(|c| f(c, name, content))
        })))
    }
}

/// Renders one live form control as the element that edits it.
///
/// `set` receives the control name and the value the browser sent.
pub(crate) fn control_element<C, S>(
    page: &Page<C>,
    id: String,
    control: &Control,
    errors: &[String],
    set: S,
) -> UiElement
where
    C: PageView,
    S: Fn(&mut C, &str, Value) -> Option<Notice> + Send + Sync + 'static,
{
    let name = control.name.clone();
    let label = Some(if control.required {
        format!("{} *", control.label)
    } else {
        control.label.clone()
    });
    let error = (!errors.is_empty()).then(|| errors.join("; "));
    let placeholder = control
        .prop("placeholder")
        .and_then(Value::as_str)
        .map(str::to_string);
    let disabled = control.disabled;

    let input_type = match control.kind {
        ControlKind::Text | ControlKind::VerifyCode => Some(InputType::Text),
        ControlKind::Password => Some(InputType::Password),
        ControlKind::TextArea => Some(InputType::TextArea),
        ControlKind::Date => Some(InputType::Date),
        _ => None,
    };
    if let Some(input_type) = input_type {
        return UiElement::Input {
            id,
            label,
            value: match control.value() {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            },
            input_type,
            placeholder,
            error,
            disabled,
            lazy: false,
            on_input: page.on_input(move |c, v| set(c, &name, Value::String(v.to_string()))),
        };
    }

    let mode = match control.kind {
        ControlKind::Select => Some(SelectMode::Dropdown),
        ControlKind::Radio => Some(SelectMode::Radio),
        ControlKind::CheckboxGroup => Some(SelectMode::Multiple),
        _ => None,
    };
    if let Some(mode) = mode {
        return UiElement::Select {
            id,
            label,
            value: control.value().clone(),
            options: control.options.clone(),
            mode,
            error,
            disabled,
            on_change: page.on_value(move |c, v| set(c, &name, v)),
        };
    }

    if control.kind == ControlKind::Switch {
        return UiElement::Checkbox {
            id,
            label,
            checked: control.value().as_bool().unwrap_or(false),
            toggle: true,
            error,
            disabled,
            on_change: page.on_toggle(move |c, on| set(c, &name, Value::Bool(on))),
        };
    }

    UiElement::NumberInput {
        id,
        label,
        value: control.value().as_f64(),
        placeholder,
        error,
        disabled,
        on_change: page.on_number(move |c, n| {
            let value = n.and_then(number_value).unwrap_or(Value::Null);
            set(c, &name, value)
        }),
    }
}
