//! Live form sessions.
//!
//! [`FormRuntime::load`] binds a [`SchemaDocument`] to a [`FormSession`]: one
//! [`Control`] per property, per-field validity, and the document's reactions
//! compiled into plain functions. Every value change re-validates the field
//! and propagates reactions until nothing changes any more, bounded by a pass
//! limit so a cyclic rule set reports instead of spinning.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::control::{Bindable, ComponentRegistry, Control};
use crate::error::{Error, Result, ValidationError};
use crate::schema::{DepProperty, Dependency, SchemaDocument, is_truthy};
use crate::validate;

/// Default bound on reaction propagation passes per edit.
pub const DEFAULT_MAX_PASSES: usize = 16;

/// Computes a patch for the target field from dependency values.
pub type ComputeFn = Arc<dyn Fn(&[Value]) -> Map<String, Value> + Send + Sync>;

#[derive(Clone)]
struct CompiledReaction {
    label: String,
    target: String,
    dependencies: Vec<Dependency>,
    compute: ComputeFn,
}

impl CompiledReaction {
    fn reads_any(&self, dirty: &HashSet<String>) -> bool {
        self.dependencies.iter().any(|d| dirty.contains(&d.field))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionState {
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

/// Outcome of propagating reactions after an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// A fixed point was reached after `passes` rounds.
    Settled { passes: usize },
    /// The pass limit was hit; these reactions were still producing changes.
    Unresolved { reactions: Vec<String> },
}

impl Settlement {
    pub fn is_settled(&self) -> bool {
        matches!(self, Settlement::Settled { .. })
    }
}

/// Builds form sessions from documents.
#[derive(Clone)]
pub struct FormRuntime {
    registry: Arc<ComponentRegistry>,
    max_passes: usize,
    reactions: Vec<CompiledReaction>,
}

impl FormRuntime {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ComponentRegistry::default()),
            max_passes: DEFAULT_MAX_PASSES,
            reactions: Vec::new(),
        }
    }

    pub fn with_registry(mut self, registry: ComponentRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    /// Adds a reaction that is not part of any document.
    ///
    /// It applies to every session this runtime loads whose document has a
    /// field named `target`.
    pub fn with_reaction<F>(
        mut self,
        target: impl Into<String>,
        dependencies: Vec<Dependency>,
        compute: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> Map<String, Value> + Send + Sync + 'static,
    {
        let target = target.into();
        self.reactions.push(CompiledReaction {
            label: format!("{target}#runtime{}", self.reactions.len()),
            target,
            dependencies,
            compute: Arc::new(compute),
        });
        self
    }

    /// Starts a session: defaults applied, reactions settled.
    pub fn load(&self, doc: SchemaDocument) -> FormSession {
        let mut session = self.instantiate(Arc::new(doc));
        session.settle_all();
        session
    }

    /// Re-derives `session` for an edited document, keeping the values of
    /// fields that still exist.
    pub fn reload(&self, session: &FormSession, doc: SchemaDocument) -> FormSession {
        let mut next = self.instantiate(Arc::new(doc));
        for (name, old) in &session.controls {
            if let Some(control) = next.controls.get_mut(name)
                && let Err(reason) = control.set_value(old.value().clone())
            {
                debug!(field = %name, reason, "value dropped on reload");
            }
        }
        next.settle_all();
        next
    }

    fn instantiate(&self, doc: Arc<SchemaDocument>) -> FormSession {
        let mut reactions: Vec<CompiledReaction> = self
            .reactions
            .iter()
            .filter(|r| doc.contains(&r.target))
            .cloned()
            .collect();
        for (name, descriptor) in doc.iter() {
            for (i, reaction) in descriptor.reactions.iter().enumerate() {
                let rule = reaction.clone();
                reactions.push(CompiledReaction {
                    label: format!("{name}#{i}"),
                    target: name.to_string(),
                    dependencies: reaction.dependencies.clone(),
                    compute: Arc::new(move |deps| rule.compute(deps)),
                });
            }
        }

        let mut session = FormSession {
            doc,
            registry: self.registry.clone(),
            reactions: reactions.into(),
            max_passes: self.max_passes,
            controls: IndexMap::new(),
            errors: IndexMap::new(),
            submission: SubmissionState::Idle,
            unresolved: Vec::new(),
        };
        session.build_controls();
        session
    }
}

impl Default for FormRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// A document bound to live values.
#[derive(Clone)]
pub struct FormSession {
    doc: Arc<SchemaDocument>,
    registry: Arc<ComponentRegistry>,
    reactions: Arc<[CompiledReaction]>,
    max_passes: usize,
    controls: IndexMap<String, Control>,
    errors: IndexMap<String, Vec<String>>,
    submission: SubmissionState,
    unresolved: Vec<String>,
}

impl std::fmt::Debug for FormSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormSession")
            .field("fields", &self.controls.keys().collect::<Vec<_>>())
            .field("reactions", &self.reactions.len())
            .field("submission", &self.submission)
            .field("unresolved", &self.unresolved)
            .finish()
    }
}

impl FormSession {
    pub fn document(&self) -> &SchemaDocument {
        &self.doc
    }

    pub fn controls(&self) -> impl Iterator<Item = &Control> {
        self.controls.values()
    }

    pub fn control(&self, name: &str) -> Option<&Control> {
        self.controls.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.controls.get(name).map(Bindable::value)
    }

    pub fn errors(&self, name: &str) -> &[String] {
        self.errors.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_valid(&self, name: &str) -> bool {
        self.errors(name).is_empty()
    }

    pub fn submission(&self) -> SubmissionState {
        self.submission
    }

    /// Reactions left unresolved by the last propagation.
    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    /// Current values of visible fields, skipping unset ones.
    pub fn values(&self) -> IndexMap<String, Value> {
        self.controls
            .iter()
            .filter(|(_, c)| c.visible && !c.value().is_null())
            .map(|(name, c)| (name.clone(), c.value().clone()))
            .collect()
    }

    /// Sets a field, validates it and settles dependent reactions.
    ///
    /// A value that cannot be coerced to the control's shape leaves the old
    /// value in place and marks the field invalid.
    pub fn set_field_value(&mut self, name: &str, value: Value) -> Result<Settlement> {
        let Some(control) = self.controls.get_mut(name) else {
            return Err(Error::UnknownField(name.to_string()));
        };
        if matches!(self.submission, SubmissionState::Succeeded | SubmissionState::Failed) {
            self.submission = SubmissionState::Idle;
        }

        let was_valid = self.errors.get(name).is_none_or(Vec::is_empty);
        let changed = match control.set_value(value) {
            Ok(changed) => {
                self.validate_field(name);
                changed
            }
            Err(reason) => {
                let label = control.label.clone();
                self.errors.insert(name.to_string(), vec![format!("{label} {reason}")]);
                false
            }
        };

        if changed || was_valid != self.is_valid(name) {
            Ok(self.propagate(HashSet::from([name.to_string()])))
        } else {
            Ok(Settlement::Settled { passes: 0 })
        }
    }

    /// Validates every visible field.
    ///
    /// On success returns the value map; on failure lists the invalid fields
    /// in document order. Entered values are kept either way.
    pub fn submit(&mut self) -> std::result::Result<IndexMap<String, Value>, ValidationError> {
        self.submission = SubmissionState::Submitting;

        let names: Vec<String> = self.controls.keys().cloned().collect();
        let mut flipped = HashSet::new();
        for name in &names {
            let was_valid = self.is_valid(name);
            self.validate_field(name);
            if was_valid != self.is_valid(name) {
                flipped.insert(name.clone());
            }
        }
        if !flipped.is_empty() {
            self.propagate(flipped);
        }

        let fields: Vec<String> = names
            .into_iter()
            .filter(|name| {
                self.controls.get(name).is_some_and(|c| c.visible) && !self.is_valid(name)
            })
            .collect();
        if fields.is_empty() {
            self.submission = SubmissionState::Succeeded;
            Ok(self.values())
        } else {
            debug!(?fields, "submission blocked");
            self.submission = SubmissionState::Failed;
            Err(ValidationError { fields })
        }
    }

    /// Back to freshly loaded state for the same document.
    pub fn reset(&mut self) {
        self.errors.clear();
        self.submission = SubmissionState::Idle;
        self.build_controls();
        self.settle_all();
    }

    fn build_controls(&mut self) {
        self.controls = self
            .doc
            .iter()
            .map(|(name, descriptor)| {
                let mut control = self.registry.build(name, descriptor);
                if let Some(default) = &descriptor.default
                    && let Err(reason) = control.set_value(default.clone())
                {
                    warn!(field = name, reason, "default value ignored");
                }
                (name.to_string(), control)
            })
            .collect();
    }

    fn settle_all(&mut self) {
        let all = self.controls.keys().cloned().collect();
        self.propagate(all);
    }

    fn validate_field(&mut self, name: &str) {
        let (Some(descriptor), Some(control)) = (self.doc.get(name), self.controls.get(name)) else {
            return;
        };
        let errors = if control.visible {
            validate::check(name, descriptor, control.value())
        } else {
            Vec::new()
        };
        self.errors.insert(name.to_string(), errors);
    }

    fn read(&self, dependency: &Dependency) -> Value {
        match dependency.property {
            DepProperty::Value => self
                .controls
                .get(&dependency.field)
                .map(|c| c.value().clone())
                .unwrap_or(Value::Null),
            DepProperty::Valid => Value::Bool(
                self.controls.contains_key(&dependency.field) && self.is_valid(&dependency.field),
            ),
        }
    }

    /// Writes a reaction patch onto `target`.
    ///
    /// Returns whether anything a dependency can observe (value or validity)
    /// changed.
    fn apply_patch(&mut self, target: &str, patch: Map<String, Value>) -> bool {
        let Some(control) = self.controls.get_mut(target) else {
            debug!(field = target, "reaction target missing");
            return false;
        };
        let mut value_changed = false;
        let mut visibility_changed = false;
        let mut props = Map::new();
        for (key, value) in patch {
            match key.as_str() {
                "value" => match control.set_value(value) {
                    Ok(changed) => value_changed |= changed,
                    Err(reason) => {
                        warn!(field = target, reason, "reaction produced an unusable value")
                    }
                },
                "visible" => visibility_changed |= control.set_flag("visible", is_truthy(&value)),
                "disabled" => {
                    control.set_flag("disabled", is_truthy(&value));
                }
                _ => {
                    props.insert(key, value);
                }
            }
        }
        control.set_props(&props);

        if value_changed || visibility_changed {
            let was_valid = self.is_valid(target);
            self.validate_field(target);
            return value_changed || was_valid != self.is_valid(target);
        }
        false
    }

    fn propagate(&mut self, mut dirty: HashSet<String>) -> Settlement {
        let reactions = self.reactions.clone();
        let mut passes = 0;
        loop {
            let pending: Vec<&CompiledReaction> =
                reactions.iter().filter(|r| r.reads_any(&dirty)).collect();
            if pending.is_empty() {
                break;
            }
            if passes == self.max_passes {
                let stuck: Vec<String> = pending.iter().map(|r| r.label.clone()).collect();
                warn!(passes, reactions = ?stuck, "reactions did not converge");
                self.unresolved = stuck.clone();
                return Settlement::Unresolved { reactions: stuck };
            }
            passes += 1;

            let mut next = HashSet::new();
            for reaction in pending {
                let deps: Vec<Value> = reaction.dependencies.iter().map(|d| self.read(d)).collect();
                let patch = (reaction.compute)(&deps);
                if self.apply_patch(&reaction.target, patch) {
                    next.insert(reaction.target.clone());
                }
            }
            dirty = next;
        }
        debug!(passes, "reactions settled");
        self.unresolved.clear();
        Settlement::Settled { passes }
    }
}
