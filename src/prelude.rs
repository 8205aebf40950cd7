pub use crate::form::{
    AsyncResultPolicy, AsyncValidationRule, Blob, BoxedRuleFuture, BoxedSubmitFuture,
    ConstraintKind, Control, ControlKind, ControlSet, ControlSource, ErrorDisplay, ErrorNodes,
    EventDetail, FieldActivity, FieldName, FormController, FormError, FormEvent, FormEventKind,
    FormOptions, FormPayload, FormResult, FormSnapshot, FormTransport, FormValues, HostEvent,
    RuleFault, Step, SubmitOutcome, SubmitResponse, ToFormValue, ToValueTree, TransportError,
    ValidationMode, ValidationRule, Value, ValueTree,
};
pub use crate::i18n::{Locale, MessageCatalog};
