use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, error, info, warn};

use super::control::{Control, ControlError, ControlSource, extract_values, field_names};
use super::display::{ErrorDisplay, ErrorNodes};
use super::equality::{deep_equal_opt, trees_equal};
use super::events::{EventBus, EventDetail, FormEvent, FormEventKind, ListenerId};
use super::options::FormOptions;
use super::path::{FieldName, PathError};
use super::transport::{FormPayload, FormTransport, SubmitResponse, TransportError};
use super::validation::{RuleEntry, RuleVerdict};
use super::value::{ToValueTree, ValueTree};
use crate::i18n::MessageCatalog;

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

/// Field to message. A missing key means the field is valid.
pub type ValidationErrors = BTreeMap<FieldName, String>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldActivity {
    Input,
    Change,
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("form submit is already in progress")]
    AlreadySubmitting,
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("invalid form options: {0}")]
    Options(String),
    #[error("failed to encode payload: {0}")]
    Payload(String),
    #[error(transparent)]
    Control(#[from] ControlError),
}

pub type FormResult<T> = Result<T, FormError>;

/// Owned copy of the form state at one point in time.
#[derive(Clone, Debug, PartialEq)]
pub struct FormSnapshot {
    pub form_id: FormId,
    pub values: ValueTree,
    pub errors: ValidationErrors,
    pub is_dirty: bool,
    pub is_valid: bool,
    pub is_submitting: bool,
    pub can_submit: bool,
    pub submit_count: u32,
    pub validating: BTreeSet<FieldName>,
    /// First invalid field in document order.
    pub first_error: Option<FieldName>,
}

impl FormSnapshot {
    pub fn error(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// Validation failed; the transport was not called.
    Rejected(ValidationErrors),
    /// Valid, but transmission is left to the host.
    Delegated(FormPayload),
    Succeeded(SubmitResponse),
    Failed(TransportError),
}

pub(super) struct FormState {
    pub(super) id: FormId,
    pub(super) initial: ValueTree,
    pub(super) values: ValueTree,
    pub(super) errors: ValidationErrors,
    pub(super) is_submitting: bool,
    pub(super) pending_submit: bool,
    pub(super) submit_count: u32,
    pub(super) validating: BTreeSet<FieldName>,
    pub(super) tickets: BTreeMap<FieldName, ValidationTicket>,
    pub(super) last_ticket: u64,
    /// Last applied verdict of each field's async rule.
    pub(super) async_verdicts: BTreeMap<FieldName, RuleVerdict>,
    pub(super) field_order: Vec<FieldName>,
}

impl FormState {
    fn new(values: ValueTree, field_order: Vec<FieldName>) -> Self {
        Self {
            id: FormId::next(),
            initial: values.clone(),
            values,
            errors: ValidationErrors::new(),
            is_submitting: false,
            pending_submit: false,
            submit_count: 0,
            validating: BTreeSet::new(),
            tickets: BTreeMap::new(),
            last_ticket: 0,
            async_verdicts: BTreeMap::new(),
            field_order,
        }
    }

    pub(super) fn next_ticket(&mut self, field: &FieldName) -> ValidationTicket {
        self.last_ticket += 1;
        let ticket = ValidationTicket(self.last_ticket);
        self.tickets.insert(field.clone(), ticket);
        ticket
    }

    pub(super) fn set_error(&mut self, field: &FieldName, message: Option<String>) {
        match message {
            Some(message) => {
                self.errors.insert(field.clone(), message);
            }
            None => {
                self.errors.remove(field);
            }
        }
    }

    pub(super) fn field_is_dirty(&self, field: &str) -> bool {
        !deep_equal_opt(self.initial.get(field), self.values.get(field))
    }

    fn first_error(&self) -> Option<FieldName> {
        self.field_order
            .iter()
            .find(|field| self.errors.contains_key(*field))
            .or_else(|| self.errors.keys().next())
            .cloned()
    }
}

/// Clears the submit flags however `submit` leaves.
struct SubmitGuard {
    state: Arc<RwLock<FormState>>,
}

impl Drop for SubmitGuard {
    fn drop(&mut self) {
        match self.state.write() {
            Ok(mut state) => {
                state.pending_submit = false;
                state.is_submitting = false;
            }
            Err(poisoned) => {
                let mut state = poisoned.into_inner();
                state.pending_submit = false;
                state.is_submitting = false;
            }
        }
    }
}

/// Owns the state of one form attached to a live control set.
pub struct FormController<S, D = ErrorNodes>
where
    S: ControlSource,
    D: ErrorDisplay,
{
    pub(super) options: Arc<RwLock<FormOptions>>,
    pub(super) state: Arc<RwLock<FormState>>,
    pub(super) controls: Arc<RwLock<S>>,
    pub(super) display: Arc<RwLock<D>>,
    pub(super) rules: Arc<RwLock<BTreeMap<FieldName, RuleEntry>>>,
    pub(super) transport: Arc<RwLock<Option<Arc<dyn FormTransport>>>>,
    pub(super) events: Arc<EventBus>,
    pub(super) catalog: Arc<MessageCatalog>,
}

impl<S, D> Clone for FormController<S, D>
where
    S: ControlSource,
    D: ErrorDisplay,
{
    fn clone(&self) -> Self {
        Self {
            options: self.options.clone(),
            state: self.state.clone(),
            controls: self.controls.clone(),
            display: self.display.clone(),
            rules: self.rules.clone(),
            transport: self.transport.clone(),
            events: self.events.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

impl<S> FormController<S, ErrorNodes>
where
    S: ControlSource,
{
    pub fn new(controls: S, options: FormOptions) -> FormResult<Self> {
        Self::attach(controls, ErrorNodes::default(), options)
    }
}

impl<S, D> FormController<S, D>
where
    S: ControlSource,
    D: ErrorDisplay,
{
    /// Attaches to `controls` and captures their values as the initial state.
    pub fn attach(controls: S, display: D, options: FormOptions) -> FormResult<Self> {
        let snapshot = controls.controls();
        let values = extract_values(&snapshot)?;
        let controller = Self {
            options: Arc::new(RwLock::new(options)),
            state: Arc::new(RwLock::new(FormState::new(values, field_names(&snapshot)))),
            controls: Arc::new(RwLock::new(controls)),
            display: Arc::new(RwLock::new(display)),
            rules: Arc::new(RwLock::new(BTreeMap::new())),
            transport: Arc::new(RwLock::new(None)),
            events: Arc::new(EventBus::default()),
            catalog: Arc::new(MessageCatalog::load()),
        };
        debug!(form = controller.form_id()?.0, "form attached");
        Ok(controller)
    }

    pub fn with_catalog(mut self, catalog: MessageCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn form_id(&self) -> FormResult<FormId> {
        Ok(read_lock(&self.state, "reading form id")?.id)
    }

    /// Recaptures the initial values from the live controls and clears all state.
    pub fn initialize(&self) -> FormResult<FormSnapshot> {
        let controls = self.read_controls()?;
        let values = extract_values(&controls)?;
        {
            let mut state = write_lock(&self.state, "initializing form")?;
            state.initial = values.clone();
            state.values = values;
            state.field_order = field_names(&controls);
            state.errors.clear();
            state.validating.clear();
            state.tickets.clear();
            state.async_verdicts.clear();
            state.is_submitting = false;
        }
        write_lock(&self.display, "clearing error display")?.clear_all();
        self.snapshot()
    }

    pub fn options(&self) -> FormResult<FormOptions> {
        Ok(read_lock(&self.options, "reading form options")?.clone())
    }

    pub fn set_options(&self, options: FormOptions) -> FormResult<()> {
        *write_lock(&self.options, "replacing form options")? = options;
        Ok(())
    }

    pub fn set_transport(&self, transport: impl FormTransport + 'static) -> FormResult<()> {
        *write_lock(&self.transport, "installing transport")? = Some(Arc::new(transport));
        Ok(())
    }

    pub fn clear_transport(&self) -> FormResult<()> {
        *write_lock(&self.transport, "removing transport")? = None;
        Ok(())
    }

    pub fn on(
        &self,
        kind: FormEventKind,
        listener: impl Fn(&FormEvent) + Send + Sync + 'static,
    ) -> FormResult<ListenerId> {
        self.events.on(Some(kind), Arc::new(listener))
    }

    pub fn on_any(
        &self,
        listener: impl Fn(&FormEvent) + Send + Sync + 'static,
    ) -> FormResult<ListenerId> {
        self.events.on(None, Arc::new(listener))
    }

    pub fn off(&self, id: ListenerId) -> FormResult<bool> {
        self.events.off(id)
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        let disable_on_error = read_lock(&self.options, "reading submit options")?
            .disable_submit_on_error;
        let state = read_lock(&self.state, "creating form snapshot")?;
        let is_valid = state.errors.is_empty();
        let busy = state.is_submitting || state.pending_submit;
        Ok(FormSnapshot {
            form_id: state.id,
            values: state.values.clone(),
            errors: state.errors.clone(),
            is_dirty: !trees_equal(&state.initial, &state.values),
            is_valid,
            is_submitting: state.is_submitting,
            can_submit: !busy && (is_valid || !disable_on_error),
            submit_count: state.submit_count,
            validating: state.validating.clone(),
            first_error: state.first_error(),
        })
    }

    /// Handles input or change on `field`: rebuilds values and, when the
    /// validation mode asks for it, validates that field.
    pub fn field_activity(
        &self,
        field: &FieldName,
        activity: FieldActivity,
    ) -> FormResult<FormSnapshot> {
        self.rebuild_values()?;
        if self.validates_on(activity)? {
            self.validate_field(field)?;
        }
        let kind = match activity {
            FieldActivity::Input => FormEventKind::Input,
            FieldActivity::Change => FormEventKind::Change,
        };
        self.emit(kind, EventDetail::Field(field.clone()))?;
        self.emit(FormEventKind::StateChange, EventDetail::Field(field.clone()))
    }

    /// Like [`Self::field_activity`], then awaits the field's async rule.
    pub async fn field_activity_async(
        &self,
        field: &FieldName,
        activity: FieldActivity,
    ) -> FormResult<FormSnapshot> {
        let snapshot = self.field_activity(field, activity)?;
        if self.validates_on(activity)? && self.has_async_rule(field)? {
            self.validate_field_async(field).await?;
            return self.snapshot();
        }
        Ok(snapshot)
    }

    /// Validates every field, then settles submission through the transport.
    pub async fn submit(&self) -> FormResult<SubmitOutcome> {
        let guard = {
            let mut state = write_lock(&self.state, "preparing submit")?;
            if state.is_submitting || state.pending_submit {
                return Err(FormError::AlreadySubmitting);
            }
            state.pending_submit = true;
            state.submit_count = state.submit_count.saturating_add(1);
            SubmitGuard {
                state: self.state.clone(),
            }
        };

        self.validate_all_async().await?;
        let (errors, values) = {
            let state = read_lock(&self.state, "reading submit validation result")?;
            (state.errors.clone(), state.values.clone())
        };

        if !errors.is_empty() {
            drop(guard);
            debug!(invalid = errors.len(), "submit rejected");
            self.emit(
                FormEventKind::Rejected,
                EventDetail::Rejected {
                    errors: errors.clone(),
                },
            )?;
            return Ok(SubmitOutcome::Rejected(errors));
        }

        let payload = FormPayload::from_values(values);
        self.emit(
            FormEventKind::Submit,
            EventDetail::Submitted {
                payload: payload.clone(),
            },
        )?;

        let default_submit = self.options()?.default_submit;
        let transport = read_lock(&self.transport, "reading transport")?.clone();
        let Some(transport) = transport.filter(|_| default_submit) else {
            drop(guard);
            return Ok(SubmitOutcome::Delegated(payload));
        };

        write_lock(&self.state, "marking form as submitting")?.is_submitting = true;
        info!(fields = payload.fields.len(), "form submission started");
        self.emit(
            FormEventKind::RequestStart,
            EventDetail::Submitted {
                payload: payload.clone(),
            },
        )?;

        let result = transport.send(payload).await;
        drop(guard);

        match result {
            Ok(response) => {
                info!(status = ?response.status, "form submission succeeded");
                self.emit(
                    FormEventKind::RequestSuccess,
                    EventDetail::Response(response.clone()),
                )?;
                if self.options()?.reset_after_success {
                    self.reset()?;
                } else {
                    self.emit(FormEventKind::StateChange, EventDetail::None)?;
                }
                Ok(SubmitOutcome::Succeeded(response))
            }
            Err(failure) => {
                error!(%failure, "form submission failed");
                self.emit(
                    FormEventKind::RequestError,
                    EventDetail::Failure(failure.clone()),
                )?;
                self.emit(FormEventKind::StateChange, EventDetail::None)?;
                Ok(SubmitOutcome::Failed(failure))
            }
        }
    }

    /// Restores the initial values into the controls and clears every error.
    pub fn reset(&self) -> FormResult<FormSnapshot> {
        let initial = read_lock(&self.state, "reading initial values")?
            .initial
            .clone();
        let initial_fields = initial.flatten();
        {
            let mut controls = write_lock(&self.controls, "restoring initial values")?;
            let enabled = controls
                .controls()
                .into_iter()
                .filter(|control| !control.is_disabled())
                .collect::<Vec<_>>();
            for field in field_names(&enabled) {
                let value = initial_fields.get(field.as_str());
                match controls.write_value(&field, value) {
                    Ok(()) | Err(ControlError::UnknownField(_)) => {}
                    Err(error) => return Err(error.into()),
                }
            }
        }

        {
            let mut state = write_lock(&self.state, "resetting form")?;
            state.values = initial;
            state.errors.clear();
            state.validating.clear();
            state.tickets.clear();
            state.async_verdicts.clear();
            state.is_submitting = false;
        }
        write_lock(&self.display, "clearing error display")?.clear_all();
        debug!("form reset");

        self.emit(FormEventKind::Reset, EventDetail::None)?;
        self.emit(FormEventKind::StateChange, EventDetail::None)
    }

    /// Pushes `values` into the controls, rebuilds and revalidates. Every
    /// writable field is written; the first write failure is returned after
    /// the state has been rebuilt.
    pub fn set_values(&self, values: &ValueTree) -> FormResult<FormSnapshot> {
        let mut failure = None;
        {
            let mut controls = write_lock(&self.controls, "writing values into controls")?;
            for (name, value) in values.flatten() {
                let field = FieldName::from(name);
                if let Err(error) = controls.write_value(&field, Some(&value)) {
                    warn!(%field, %error, "value not written into controls");
                    failure.get_or_insert(error);
                }
            }
        }
        self.run_validate_all()?;
        let snapshot = self.emit(FormEventKind::StateChange, EventDetail::None)?;
        match failure {
            Some(error) => Err(error.into()),
            None => Ok(snapshot),
        }
    }

    pub fn set_values_from<T>(&self, source: &T) -> FormResult<FormSnapshot>
    where
        T: ToValueTree + ?Sized,
    {
        self.set_values(&source.to_value_tree())
    }

    /// Mutates the live control set, as a host would on user input.
    pub fn update_controls<R>(&self, f: impl FnOnce(&mut S) -> R) -> FormResult<R> {
        let mut controls = write_lock(&self.controls, "updating controls")?;
        Ok(f(&mut controls))
    }

    pub fn inspect_display<R>(&self, f: impl FnOnce(&D) -> R) -> FormResult<R> {
        let display = read_lock(&self.display, "reading error display")?;
        Ok(f(&display))
    }

    pub(super) fn read_controls(&self) -> FormResult<Vec<Control>> {
        Ok(read_lock(&self.controls, "reading controls")?.controls())
    }

    /// Re-extracts values from the live controls.
    pub(super) fn rebuild_values(&self) -> FormResult<Vec<Control>> {
        let controls = self.read_controls()?;
        let values = extract_values(&controls)?;
        let mut state = write_lock(&self.state, "rebuilding values")?;
        state.values = values;
        state.field_order = field_names(&controls);
        debug!(fields = state.field_order.len(), "values rebuilt");
        drop(state);
        Ok(controls)
    }

    pub(super) fn render_error(&self, field: &FieldName, message: Option<&str>) -> FormResult<()> {
        let shown = write_lock(&self.display, "rendering field error")?.render(field, message);
        if !shown && message.is_some() {
            debug!(%field, "no error node for field; error kept in state only");
        }
        Ok(())
    }

    pub(super) fn emit(&self, kind: FormEventKind, detail: EventDetail) -> FormResult<FormSnapshot> {
        let snapshot = self.snapshot()?;
        let event = FormEvent {
            kind,
            form_id: snapshot.form_id,
            snapshot: snapshot.clone(),
            detail,
        };
        self.events.emit(&event)?;
        Ok(snapshot)
    }

    fn validates_on(&self, activity: FieldActivity) -> FormResult<bool> {
        let mode = read_lock(&self.options, "reading validation mode")?.validate_mode;
        Ok(match activity {
            FieldActivity::Input => mode.validates_on_input(),
            FieldActivity::Change => mode.validates_on_change(),
        })
    }
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
