use super::control::ControlSource;
use super::controller::{FieldActivity, FormController, FormResult, FormSnapshot, read_lock};
use super::display::ErrorDisplay;
use super::path::FieldName;

/// Raw notifications from the host's control set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HostEvent {
    Input(FieldName),
    Change(FieldName),
    Submit,
    Reset,
}

/// Per-field markers a host reflects onto the control (aria-invalid and friends).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FieldMarkers {
    pub invalid: bool,
    pub dirty: bool,
    pub validating: bool,
}

impl<S, D> FormController<S, D>
where
    S: ControlSource,
    D: ErrorDisplay,
{
    /// Routes one host event. Submission outcomes are reported through the
    /// `submit`, `rejected` and `request-*` notifications.
    pub async fn dispatch(&self, event: HostEvent) -> FormResult<FormSnapshot> {
        match event {
            HostEvent::Input(field) => {
                self.field_activity_async(&field, FieldActivity::Input)
                    .await
            }
            HostEvent::Change(field) => {
                self.field_activity_async(&field, FieldActivity::Change)
                    .await
            }
            HostEvent::Submit => {
                self.submit().await?;
                self.snapshot()
            }
            HostEvent::Reset => self.reset(),
        }
    }

    pub fn field_error(&self, field: &str) -> FormResult<Option<String>> {
        Ok(read_lock(&self.state, "reading field error")?
            .errors
            .get(field)
            .cloned())
    }

    pub fn field_markers(&self, field: &str) -> FormResult<FieldMarkers> {
        let state = read_lock(&self.state, "reading field markers")?;
        Ok(FieldMarkers {
            invalid: state.errors.contains_key(field),
            dirty: state.field_is_dirty(field),
            validating: state.validating.contains(field),
        })
    }
}
