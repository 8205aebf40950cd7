use std::collections::BTreeSet;

use rust_decimal::Decimal;

use super::constraint::{self, ConstraintKind, Constraints, Step, Validity};
use super::path::{FieldName, PathError};
use super::validation::MessageOverrides;
use super::value::{Blob, Value, ValueTree};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ControlKind {
    Text,
    Search,
    Email,
    Url,
    Tel,
    Password,
    Number,
    Range,
    Hidden,
    Checkbox,
    Radio,
    File,
    Select,
    SelectMultiple,
    TextArea,
    Submit,
    Reset,
    Button,
}

impl ControlKind {
    /// Maps an `<input type>` attribute. Unknown types behave as text.
    pub fn from_type_attr(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "search" => Self::Search,
            "email" => Self::Email,
            "url" => Self::Url,
            "tel" => Self::Tel,
            "password" => Self::Password,
            "number" => Self::Number,
            "range" => Self::Range,
            "hidden" => Self::Hidden,
            "checkbox" => Self::Checkbox,
            "radio" => Self::Radio,
            "file" => Self::File,
            "submit" | "image" => Self::Submit,
            "reset" => Self::Reset,
            "button" => Self::Button,
            _ => Self::Text,
        }
    }

    pub const fn is_button(self) -> bool {
        matches!(self, Self::Submit | Self::Reset | Self::Button)
    }

    pub const fn participates(self) -> bool {
        !self.is_button() && !matches!(self, Self::Hidden)
    }

    pub const fn is_checkable(self) -> bool {
        matches!(self, Self::Checkbox | Self::Radio)
    }

    pub(crate) const fn is_text_entry(self) -> bool {
        matches!(
            self,
            Self::Text
                | Self::Search
                | Self::Email
                | Self::Url
                | Self::Tel
                | Self::Password
                | Self::TextArea
        )
    }
}

/// One form control as reported by the host.
#[derive(Clone, Debug)]
pub struct Control {
    name: FieldName,
    kind: ControlKind,
    value: String,
    checked: bool,
    selected: Vec<String>,
    files: Vec<Blob>,
    disabled: bool,
    constraints: Constraints,
    messages: MessageOverrides,
    reported: Option<Validity>,
    native_message: Option<String>,
}

impl Control {
    pub fn new(name: impl Into<FieldName>, kind: ControlKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value: String::new(),
            checked: false,
            selected: Vec::new(),
            files: Vec::new(),
            disabled: false,
            constraints: Constraints::default(),
            messages: MessageOverrides::default(),
            reported: None,
            native_message: None,
        }
    }

    pub fn text(name: impl Into<FieldName>) -> Self {
        Self::new(name, ControlKind::Text)
    }

    pub fn checkbox(name: impl Into<FieldName>, value: impl Into<String>) -> Self {
        Self::new(name, ControlKind::Checkbox).value(value)
    }

    pub fn radio(name: impl Into<FieldName>, value: impl Into<String>) -> Self {
        Self::new(name, ControlKind::Radio).value(value)
    }

    pub fn file(name: impl Into<FieldName>) -> Self {
        Self::new(name, ControlKind::File)
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn checked(mut self, value: bool) -> Self {
        self.checked = value;
        self
    }

    pub fn selected(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.selected = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = Blob>) -> Self {
        self.files = files.into_iter().collect();
        self
    }

    pub fn disabled(mut self, value: bool) -> Self {
        self.disabled = value;
        self
    }

    pub fn required(mut self, value: bool) -> Self {
        self.constraints.required = value;
        self
    }

    pub fn pattern(mut self, value: impl Into<String>) -> Self {
        self.constraints.pattern = Some(value.into());
        self
    }

    pub fn min_length(mut self, value: usize) -> Self {
        self.constraints.min_length = Some(value);
        self
    }

    pub fn max_length(mut self, value: usize) -> Self {
        self.constraints.max_length = Some(value);
        self
    }

    pub fn min(mut self, value: Decimal) -> Self {
        self.constraints.min = Some(value);
        self
    }

    pub fn max(mut self, value: Decimal) -> Self {
        self.constraints.max = Some(value);
        self
    }

    pub fn step(mut self, value: Step) -> Self {
        self.constraints.step = value;
        self
    }

    pub fn multiple(mut self, value: bool) -> Self {
        self.constraints.multiple = value;
        self
    }

    pub fn custom_error(mut self, message: impl Into<String>) -> Self {
        self.constraints.custom_error = Some(message.into());
        self
    }

    /// Override message for one failing constraint.
    pub fn message(mut self, kind: ConstraintKind, message: impl Into<String>) -> Self {
        self.messages.set(kind, message);
        self
    }

    /// Override message used for any failing constraint without its own.
    pub fn default_message(mut self, message: impl Into<String>) -> Self {
        self.messages.set_default(message);
        self
    }

    /// Validity computed by the host, bypassing headless evaluation.
    pub fn reported_validity(mut self, validity: Validity, message: Option<String>) -> Self {
        self.reported = Some(validity);
        self.native_message = message;
        self
    }

    pub fn name(&self) -> &FieldName {
        &self.name
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    pub fn raw_value(&self) -> &str {
        &self.value
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    pub fn selected_values(&self) -> &[String] {
        &self.selected
    }

    pub fn files(&self) -> &[Blob] {
        &self.files
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn constraints_mut(&mut self) -> &mut Constraints {
        &mut self.constraints
    }

    pub fn messages(&self) -> &MessageOverrides {
        &self.messages
    }

    pub fn native_message(&self) -> Option<&str> {
        self.native_message.as_deref()
    }

    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }

    /// Host-reported validity, or the headless evaluation against `group`.
    pub fn validity(&self, group: &[&Control]) -> Validity {
        self.reported
            .unwrap_or_else(|| constraint::evaluate(self, group))
    }

    /// Values this control contributes to a submission, in order.
    pub fn entries(&self) -> Vec<Value> {
        if self.disabled || !self.is_named() || self.kind.is_button() {
            return Vec::new();
        }
        match self.kind {
            ControlKind::Checkbox | ControlKind::Radio => {
                if !self.checked {
                    return Vec::new();
                }
                let value = if self.value.is_empty() {
                    "on".to_string()
                } else {
                    self.value.clone()
                };
                vec![Value::Text(value)]
            }
            ControlKind::File => self.files.iter().cloned().map(Value::Blob).collect(),
            ControlKind::SelectMultiple => self
                .selected
                .iter()
                .cloned()
                .map(Value::Text)
                .collect(),
            _ => vec![Value::Text(self.value.clone())],
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ControlError {
    #[error("no control is named `{0}`")]
    UnknownField(FieldName),
    #[error("`{field}` cannot hold {found}")]
    Unsupported { field: FieldName, found: &'static str },
}

/// Live control set owned by the host.
pub trait ControlSource: Send + Sync + 'static {
    /// Every control in document order.
    fn controls(&self) -> Vec<Control>;

    /// Pushes `value` into the controls named `name`; `None` clears them.
    fn write_value(&mut self, name: &FieldName, value: Option<&Value>)
    -> Result<(), ControlError>;
}

/// Builds the current values from controls in document order.
pub fn extract_values(controls: &[Control]) -> Result<ValueTree, PathError> {
    ValueTree::from_entries(controls.iter().flat_map(|control| {
        control
            .entries()
            .into_iter()
            .map(move |value| (control.name().as_str(), value))
    }))
}

/// Distinct named, non-button fields in first-seen order.
pub fn field_names(controls: &[Control]) -> Vec<FieldName> {
    let mut seen = BTreeSet::new();
    controls
        .iter()
        .filter(|control| control.is_named() && !control.kind().is_button())
        .filter(|control| seen.insert(control.name().clone()))
        .map(|control| control.name().clone())
        .collect()
}

pub(crate) fn group<'a>(controls: &'a [Control], name: &FieldName) -> Vec<&'a Control> {
    controls
        .iter()
        .filter(|control| control.name() == name)
        .collect()
}

/// In-memory control set for headless hosts and tests.
#[derive(Clone, Debug, Default)]
pub struct ControlSet {
    controls: Vec<Control>,
}

impl ControlSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, control: Control) -> Self {
        self.controls.push(control);
        self
    }

    pub fn push(&mut self, control: Control) {
        self.controls.push(control);
    }

    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.controls.len();
        self.controls.retain(|control| control.name().as_str() != name);
        before - self.controls.len()
    }

    pub fn control(&self, name: &str) -> Option<&Control> {
        self.controls
            .iter()
            .find(|control| control.name().as_str() == name)
    }

    pub fn control_mut(&mut self, name: &str) -> Option<&mut Control> {
        self.controls
            .iter_mut()
            .find(|control| control.name().as_str() == name)
    }

    /// Types into the first control named `name`.
    pub fn set_text(&mut self, name: &str, value: impl Into<String>) -> Result<(), ControlError> {
        let control = self
            .control_mut(name)
            .ok_or_else(|| ControlError::UnknownField(FieldName::from(name)))?;
        control.value = value.into();
        Ok(())
    }

    /// Toggles the checkbox or radio named `name` whose value is `value`.
    pub fn set_checked(&mut self, name: &str, value: &str, checked: bool) -> Result<(), ControlError> {
        let mut found = false;
        for control in self
            .controls
            .iter_mut()
            .filter(|control| control.name().as_str() == name && control.kind.is_checkable())
        {
            if control.value == value {
                control.checked = checked;
                found = true;
            } else if checked && control.kind == ControlKind::Radio {
                control.checked = false;
            }
        }
        if found {
            Ok(())
        } else {
            Err(ControlError::UnknownField(FieldName::from(name)))
        }
    }

    pub fn set_files(&mut self, name: &str, files: Vec<Blob>) -> Result<(), ControlError> {
        let control = self
            .controls
            .iter_mut()
            .find(|control| control.name().as_str() == name && control.kind == ControlKind::File)
            .ok_or_else(|| ControlError::UnknownField(FieldName::from(name)))?;
        control.files = files;
        Ok(())
    }

    pub fn set_custom_error(&mut self, name: &str, message: Option<String>) -> Result<(), ControlError> {
        let control = self
            .control_mut(name)
            .ok_or_else(|| ControlError::UnknownField(FieldName::from(name)))?;
        control.constraints.custom_error = message;
        Ok(())
    }
}

impl ControlSource for ControlSet {
    fn controls(&self) -> Vec<Control> {
        self.controls.clone()
    }

    fn write_value(&mut self, name: &FieldName, value: Option<&Value>) -> Result<(), ControlError> {
        if matches!(value, Some(Value::Tree(_))) {
            return Err(ControlError::Unsupported {
                field: name.clone(),
                found: "a group of values",
            });
        }

        let items: Vec<&Value> = match value {
            None => Vec::new(),
            Some(Value::List(items)) => items.iter().collect(),
            Some(single) => vec![single],
        };
        let texts: Vec<String> = items.iter().filter_map(|item| item.to_text()).collect();

        let mut matched = false;
        let mut text_slot = 0;
        for control in self
            .controls
            .iter_mut()
            .filter(|control| control.name() == name && !control.kind.is_button())
        {
            matched = true;
            match control.kind {
                ControlKind::Checkbox | ControlKind::Radio => {
                    let own = if control.value.is_empty() { "on" } else { control.value.as_str() };
                    control.checked = items.iter().any(|item| match item {
                        Value::Bool(flag) => *flag,
                        other => other.as_text() == Some(own),
                    });
                }
                ControlKind::SelectMultiple => control.selected = texts.clone(),
                ControlKind::File => {
                    control.files = items
                        .iter()
                        .filter_map(|item| item.as_blob().cloned())
                        .collect();
                }
                _ => {
                    control.value = texts.get(text_slot).cloned().unwrap_or_default();
                    text_slot += 1;
                }
            }
        }

        if matched {
            Ok(())
        } else {
            Err(ControlError::UnknownField(name.clone()))
        }
    }
}
