use std::collections::BTreeMap;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_timer::Delay;
use serde::Deserialize;
use tracing::{debug, warn};

use super::constraint::ConstraintKind;
use super::control::{self, Control, ControlSource, extract_values, field_names};
use super::controller::{
    FormController, FormResult, FormSnapshot, ValidationErrors, ValidationTicket, read_lock,
    write_lock,
};
use super::display::ErrorDisplay;
use super::events::{EventDetail, FormEventKind};
use super::options::{AsyncResultPolicy, FormOptions};
use super::path::FieldName;
use super::value::{Value, ValueTree};
use crate::i18n::{Locale, MessageCatalog};

/// Attribute- or config-declared replacement messages for one field.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct MessageOverrides {
    #[serde(default)]
    default: Option<String>,
    #[serde(flatten)]
    by_constraint: BTreeMap<String, String>,
}

impl MessageOverrides {
    pub fn set(&mut self, kind: ConstraintKind, message: impl Into<String>) {
        self.by_constraint
            .insert(kind.key().to_string(), message.into());
    }

    pub fn set_default(&mut self, message: impl Into<String>) {
        self.default = Some(message.into());
    }

    pub fn for_constraint(&self, kind: ConstraintKind) -> Option<&str> {
        self.by_constraint
            .iter()
            .find(|(key, _)| ConstraintKind::from_key(key) == Some(kind))
            .map(|(_, message)| message.as_str())
    }

    pub fn default_message(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_constraint.is_empty()
    }
}

/// Raised by a custom rule that could not reach a verdict.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("validation rule failed: {0}")]
pub struct RuleFault(pub String);

/// `Ok(Some(message))` marks the field invalid; `Ok(None)` or an empty message passes.
pub type RuleVerdict = Result<Option<String>, RuleFault>;

pub trait ValidationRule: Send + Sync {
    fn check(&self, value: Option<&Value>, values: &ValueTree) -> Option<String>;
}

impl<F> ValidationRule for F
where
    F: for<'a> Fn(Option<&'a Value>, &'a ValueTree) -> Option<String> + Send + Sync,
{
    fn check(&self, value: Option<&Value>, values: &ValueTree) -> Option<String> {
        (self)(value, values)
    }
}

pub type BoxedRuleFuture = Pin<Box<dyn Future<Output = RuleVerdict> + Send + 'static>>;

pub trait AsyncValidationRule: Send + Sync {
    fn check(&self, value: Option<Value>, values: ValueTree) -> BoxedRuleFuture;
}

impl<F> AsyncValidationRule for F
where
    F: Fn(Option<Value>, ValueTree) -> BoxedRuleFuture + Send + Sync,
{
    fn check(&self, value: Option<Value>, values: ValueTree) -> BoxedRuleFuture {
        (self)(value, values)
    }
}

#[derive(Clone)]
pub(super) enum RuleEntry {
    Sync(Arc<dyn ValidationRule>),
    Async {
        debounce: Option<Duration>,
        rule: Arc<dyn AsyncValidationRule>,
    },
}

impl RuleEntry {
    pub(super) fn as_sync(&self) -> Option<&dyn ValidationRule> {
        match self {
            RuleEntry::Sync(rule) => Some(rule.as_ref()),
            RuleEntry::Async { .. } => None,
        }
    }
}

/// Everything needed to resolve one field's message.
pub(super) struct FieldContext<'a> {
    pub(super) field: &'a FieldName,
    pub(super) controls: &'a [Control],
    pub(super) values: &'a ValueTree,
    pub(super) configured: Option<&'a MessageOverrides>,
    pub(super) catalog: &'a MessageCatalog,
    pub(super) locale: &'a Locale,
}

impl FieldContext<'_> {
    pub(super) fn value(&self) -> Option<&Value> {
        self.values.get(self.field.as_str())
    }

    /// First failing native constraint among the field's controls, with its message.
    pub(super) fn native_message(&self) -> Option<String> {
        let group = control::group(self.controls, self.field);
        group.iter().find_map(|control| {
            let kind = control.validity(&group).first_failure()?;
            Some(self.native_text(kind, control))
        })
    }

    fn native_text(&self, kind: ConstraintKind, control: &Control) -> String {
        let configured = self.configured;
        control
            .messages()
            .for_constraint(kind)
            .or_else(|| configured.and_then(|messages| messages.for_constraint(kind)))
            .or_else(|| control.messages().default_message())
            .or_else(|| configured.and_then(MessageOverrides::default_message))
            .map(str::to_string)
            .or_else(|| control.native_message().map(str::to_string))
            .unwrap_or_else(|| self.catalog.constraint_message(self.locale, kind, control))
    }

    pub(super) fn fault_message(&self) -> String {
        self.catalog.fault_message(self.locale)
    }
}

/// Resolves a field with its synchronous rule, if any. A rule message wins
/// over a native failure; a panicking rule fails closed.
pub(super) fn resolve(ctx: &FieldContext<'_>, rule: Option<&dyn ValidationRule>) -> Option<String> {
    let native = ctx.native_message();
    let Some(rule) = rule else {
        return native;
    };
    let verdict = catch_unwind(AssertUnwindSafe(|| rule.check(ctx.value(), ctx.values)))
        .map_err(|_| RuleFault("rule panicked".to_string()));
    combine(ctx, native, verdict)
}

pub(super) fn combine(ctx: &FieldContext<'_>, native: Option<String>, verdict: RuleVerdict) -> Option<String> {
    match verdict {
        Ok(Some(message)) if !message.is_empty() => {
            debug!(field = %ctx.field, "custom rule rejected value");
            Some(message)
        }
        Ok(_) => native,
        Err(fault) => {
            warn!(field = %ctx.field, %fault, "custom rule failed; marking field invalid");
            Some(ctx.fault_message())
        }
    }
}

/// Resolves a field for the synchronous paths. A field with an async rule
/// keeps the rule's last applied verdict until a newer one lands.
pub(super) fn resolve_with_carried(
    ctx: &FieldContext<'_>,
    rule: Option<&RuleEntry>,
    carried: Option<&RuleVerdict>,
) -> Option<String> {
    match rule {
        Some(RuleEntry::Async { .. }) => {
            let native = ctx.native_message();
            match carried {
                Some(verdict) => combine(ctx, native, verdict.clone()),
                None => native,
            }
        }
        rule => resolve(ctx, rule.and_then(RuleEntry::as_sync)),
    }
}

impl<S, D> FormController<S, D>
where
    S: ControlSource,
    D: ErrorDisplay,
{
    /// Installs the rule for `field`, replacing any earlier one.
    pub fn register_rule(
        &self,
        field: impl Into<FieldName>,
        rule: impl ValidationRule + 'static,
    ) -> FormResult<()> {
        self.install_rule(field.into(), RuleEntry::Sync(Arc::new(rule)))
    }

    pub fn register_async_rule(
        &self,
        field: impl Into<FieldName>,
        rule: impl AsyncValidationRule + 'static,
    ) -> FormResult<()> {
        self.install_rule(
            field.into(),
            RuleEntry::Async {
                debounce: None,
                rule: Arc::new(rule),
            },
        )
    }

    pub fn register_async_rule_with_debounce(
        &self,
        field: impl Into<FieldName>,
        debounce_ms: u64,
        rule: impl AsyncValidationRule + 'static,
    ) -> FormResult<()> {
        self.install_rule(
            field.into(),
            RuleEntry::Async {
                debounce: Some(Duration::from_millis(debounce_ms)),
                rule: Arc::new(rule),
            },
        )
    }

    pub fn unregister_rule(&self, field: &FieldName) -> FormResult<bool> {
        let removed = write_lock(&self.rules, "unregistering rule")?
            .remove(field)
            .is_some();
        write_lock(&self.state, "dropping async verdict")?
            .async_verdicts
            .remove(field);
        Ok(removed)
    }

    pub fn has_async_rule(&self, field: &FieldName) -> FormResult<bool> {
        Ok(matches!(
            read_lock(&self.rules, "reading rules")?.get(field),
            Some(RuleEntry::Async { .. })
        ))
    }

    /// Resolves one field against the current values. An async rule is not
    /// run here; its last applied verdict still counts.
    pub fn validate_field(&self, field: &FieldName) -> FormResult<Option<String>> {
        let controls = self.read_controls()?;
        let (values, carried) = {
            let state = read_lock(&self.state, "reading values for field validation")?;
            (state.values.clone(), state.async_verdicts.get(field).cloned())
        };
        let options = self.options()?;
        let rule = read_lock(&self.rules, "reading field rule")?.get(field).cloned();

        let ctx = self.field_context(field, &controls, &values, &options);
        let message = resolve_with_carried(&ctx, rule.as_ref(), carried.as_ref());
        debug!(%field, invalid = message.is_some(), "field validated");

        write_lock(&self.state, "writing field validation result")?
            .set_error(field, message.clone());
        self.render_error(field, message.as_deref())?;
        Ok(message)
    }

    /// Validates every named field and notifies observers.
    pub fn validate_all(&self) -> FormResult<FormSnapshot> {
        self.run_validate_all()?;
        self.emit(FormEventKind::StateChange, EventDetail::None)
    }

    /// Runs sync validation for every field, then awaits async rules in
    /// document order.
    pub async fn validate_all_async(&self) -> FormResult<FormSnapshot> {
        self.run_validate_all()?;
        let fields = read_lock(&self.state, "reading field order")?
            .field_order
            .clone();
        for field in fields {
            if self.has_async_rule(&field)? {
                self.validate_field_async(&field).await?;
            }
        }
        self.emit(FormEventKind::StateChange, EventDetail::None)
    }

    /// Awaits the async rule for `field`. Returns `None` when the field has
    /// no async rule, after validating it synchronously.
    pub async fn validate_field_async(
        &self,
        field: &FieldName,
    ) -> FormResult<Option<ValidationTicket>> {
        let entry = read_lock(&self.rules, "reading async rule")?.get(field).cloned();
        let Some(RuleEntry::Async { debounce, rule }) = entry else {
            self.validate_field(field)?;
            return Ok(None);
        };

        let options = self.options()?;
        let controls = self.read_controls()?;
        let (ticket, values) = {
            let mut state = write_lock(&self.state, "starting async validation")?;
            let ticket = state.next_ticket(field);
            state.validating.insert(field.clone());
            (ticket, state.values.clone())
        };
        let ctx = self.field_context(field, &controls, &values, &options);
        let native = ctx.native_message();

        if let Some(delay) = debounce.or_else(|| options.debounce()) {
            Delay::new(delay).await;
            if options.async_results == AsyncResultPolicy::LatestStarted
                && !self.is_latest_ticket(field, ticket)?
            {
                debug!(%field, ticket = ticket.0, "async validation superseded during debounce");
                return Ok(Some(ticket));
            }
        }

        let value = ctx.value().cloned();
        let verdict = match catch_unwind(AssertUnwindSafe(|| rule.check(value, values.clone()))) {
            Ok(pending) => pending.await,
            Err(_) => Err(RuleFault("rule panicked".to_string())),
        };
        let message = combine(&ctx, native, verdict.clone());

        let applied = {
            let mut state = write_lock(&self.state, "finishing async validation")?;
            let latest = state.tickets.get(field) == Some(&ticket);
            if latest {
                state.validating.remove(field);
            }
            let apply = latest || options.async_results == AsyncResultPolicy::LastResolved;
            if apply {
                state.set_error(field, message.clone());
                state.async_verdicts.insert(field.clone(), verdict);
            }
            apply
        };
        if !applied {
            warn!(%field, ticket = ticket.0, "discarding stale async validation result");
            return Ok(Some(ticket));
        }

        self.render_error(field, message.as_deref())?;
        self.emit(FormEventKind::StateChange, EventDetail::Field(field.clone()))?;
        Ok(Some(ticket))
    }

    /// Rebuilds values and replaces the whole error map. Fields with an async
    /// rule keep their last applied verdict.
    pub(super) fn run_validate_all(&self) -> FormResult<ValidationErrors> {
        let controls = self.read_controls()?;
        let values = extract_values(&controls)?;
        let fields = field_names(&controls);
        let options = self.options()?;
        let rules = read_lock(&self.rules, "reading rules for form validation")?.clone();
        let carried = read_lock(&self.state, "reading async verdicts")?
            .async_verdicts
            .clone();

        let mut errors = ValidationErrors::new();
        for field in &fields {
            let ctx = self.field_context(field, &controls, &values, &options);
            if let Some(message) = resolve_with_carried(&ctx, rules.get(field), carried.get(field)) {
                errors.insert(field.clone(), message);
            }
        }

        let stale = {
            let mut state = write_lock(&self.state, "applying form validation result")?;
            let stale = state
                .errors
                .keys()
                .filter(|field| !fields.contains(*field))
                .cloned()
                .collect::<Vec<_>>();
            state.values = values;
            state.field_order = fields.clone();
            state.errors = errors.clone();
            stale
        };

        for field in stale {
            self.render_error(&field, None)?;
        }
        for field in &fields {
            self.render_error(field, errors.get(field).map(String::as_str))?;
        }
        debug!(invalid = errors.len(), "form validated");
        Ok(errors)
    }

    fn install_rule(&self, field: FieldName, entry: RuleEntry) -> FormResult<()> {
        let replaced = write_lock(&self.rules, "registering rule")?
            .insert(field.clone(), entry)
            .is_some();
        if replaced {
            debug!(%field, "replaced validation rule");
        }
        write_lock(&self.state, "dropping async verdict")?
            .async_verdicts
            .remove(&field);
        Ok(())
    }

    fn is_latest_ticket(&self, field: &FieldName, ticket: ValidationTicket) -> FormResult<bool> {
        Ok(read_lock(&self.state, "checking latest validation ticket")?
            .tickets
            .get(field)
            .copied()
            == Some(ticket))
    }

    fn field_context<'a>(
        &'a self,
        field: &'a FieldName,
        controls: &'a [Control],
        values: &'a ValueTree,
        options: &'a FormOptions,
    ) -> FieldContext<'a> {
        FieldContext {
            field,
            controls,
            values,
            configured: options.messages_for(field),
            catalog: &self.catalog,
            locale: &options.locale,
        }
    }
}
