mod binding;
mod constraint;
mod control;
mod controller;
mod display;
mod equality;
mod events;
mod options;
pub mod path;
mod transport;
mod validation;
mod value;


pub use binding::{FieldMarkers, HostEvent};
pub use calmform_derive::FormValues;
pub use constraint::{ConstraintKind, Constraints, Step, Validity, evaluate};
pub use control::{
    Control, ControlError, ControlKind, ControlSet, ControlSource, extract_values, field_names,
};
pub use controller::{
    FieldActivity, FormController, FormError, FormId, FormResult, FormSnapshot, SubmitOutcome,
    ValidationErrors, ValidationTicket,
};
pub use display::{ErrorDisplay, ErrorNode, ErrorNodes};
pub use equality::{deep_equal, deep_equal_opt, trees_equal};
pub use events::{EventDetail, FormEvent, FormEventKind, FormListener, ListenerId};
pub use options::{AsyncResultPolicy, FormOptions, ValidationMode};
pub use path::{FieldName, PathError};
pub use transport::{
    BoxedSubmitFuture, FormPayload, FormTransport, SubmitResponse, TransportError,
};
pub use validation::{
    AsyncValidationRule, BoxedRuleFuture, MessageOverrides, RuleFault, RuleVerdict,
    ValidationRule,
};
pub use value::{Blob, ToFormValue, ToValueTree, Value, ValueTree};
