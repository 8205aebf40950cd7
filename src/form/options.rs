use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use super::controller::{FormError, FormResult};
use super::path::FieldName;
use super::validation::MessageOverrides;
use crate::i18n::Locale;

/// When field activity triggers validation of that field.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationMode {
    #[default]
    OnInput,
    OnChange,
    OnSubmit,
}

impl ValidationMode {
    pub const fn validates_on_input(self) -> bool {
        matches!(self, ValidationMode::OnInput)
    }

    pub const fn validates_on_change(self) -> bool {
        matches!(self, ValidationMode::OnInput | ValidationMode::OnChange)
    }
}

/// How overlapping async validations of one field settle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AsyncResultPolicy {
    /// Only the most recently started validation may write its result.
    #[default]
    LatestStarted,
    /// Whichever validation resolves last wins, even if it started earlier.
    LastResolved,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct FormOptions {
    pub validate_mode: ValidationMode,
    pub default_submit: bool,
    pub disable_submit_on_error: bool,
    pub reset_after_success: bool,
    pub async_results: AsyncResultPolicy,
    pub debounce_ms: u64,
    pub locale: Locale,
    pub messages: BTreeMap<FieldName, MessageOverrides>,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validate_mode: ValidationMode::OnInput,
            default_submit: true,
            disable_submit_on_error: false,
            reset_after_success: false,
            async_results: AsyncResultPolicy::LatestStarted,
            debounce_ms: 0,
            locale: Locale::System,
            messages: BTreeMap::new(),
        }
    }
}

impl FormOptions {
    pub fn from_toml_str(source: &str) -> FormResult<Self> {
        toml::from_str(source).map_err(|error| FormError::Options(error.to_string()))
    }

    pub fn messages_for(&self, field: &FieldName) -> Option<&MessageOverrides> {
        self.messages.get(field)
    }

    pub fn with_message(
        mut self,
        field: impl Into<FieldName>,
        kind: super::ConstraintKind,
        message: impl Into<String>,
    ) -> Self {
        self.messages
            .entry(field.into())
            .or_default()
            .set(kind, message);
        self
    }

    pub(super) fn debounce(&self) -> Option<Duration> {
        (self.debounce_ms > 0).then(|| Duration::from_millis(self.debounce_ms))
    }
}
