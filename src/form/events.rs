use std::fmt::{Display, Formatter};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::error;

use super::controller::{FormId, FormResult, FormSnapshot, ValidationErrors, read_lock, write_lock};
use super::path::FieldName;
use super::transport::{FormPayload, SubmitResponse, TransportError};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FormEventKind {
    Input,
    Change,
    Submit,
    Rejected,
    Reset,
    RequestStart,
    RequestSuccess,
    RequestError,
    StateChange,
}

impl FormEventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            FormEventKind::Input => "input",
            FormEventKind::Change => "change",
            FormEventKind::Submit => "submit",
            FormEventKind::Rejected => "rejected",
            FormEventKind::Reset => "reset",
            FormEventKind::RequestStart => "request-start",
            FormEventKind::RequestSuccess => "request-success",
            FormEventKind::RequestError => "request-error",
            FormEventKind::StateChange => "state-change",
        }
    }
}

impl Display for FormEventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventDetail {
    None,
    Field(FieldName),
    Rejected { errors: ValidationErrors },
    Submitted { payload: FormPayload },
    Response(SubmitResponse),
    Failure(TransportError),
}

/// One notification. `snapshot` is taken after the state change it reports.
#[derive(Clone, Debug, PartialEq)]
pub struct FormEvent {
    pub kind: FormEventKind,
    pub form_id: FormId,
    pub snapshot: FormSnapshot,
    pub detail: EventDetail,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ListenerId(pub u64);

pub type FormListener = Arc<dyn Fn(&FormEvent) + Send + Sync>;

#[derive(Clone)]
struct Registration {
    id: ListenerId,
    kind: Option<FormEventKind>,
    listener: FormListener,
}

/// Listener registry. Dispatch follows registration order and a panicking
/// listener does not stop the rest.
#[derive(Default)]
pub(super) struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<Vec<Registration>>,
}

impl EventBus {
    pub(super) fn on(&self, kind: Option<FormEventKind>, listener: FormListener) -> FormResult<ListenerId> {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        write_lock(&self.listeners, "registering form listener")?.push(Registration {
            id,
            kind,
            listener,
        });
        Ok(id)
    }

    pub(super) fn off(&self, id: ListenerId) -> FormResult<bool> {
        let mut listeners = write_lock(&self.listeners, "removing form listener")?;
        let before = listeners.len();
        listeners.retain(|registration| registration.id != id);
        Ok(listeners.len() != before)
    }

    /// Delivers `event` and returns how many listeners completed.
    pub(super) fn emit(&self, event: &FormEvent) -> FormResult<usize> {
        let targets = read_lock(&self.listeners, "reading form listeners")?
            .iter()
            .filter(|registration| registration.kind.is_none_or(|kind| kind == event.kind))
            .cloned()
            .collect::<Vec<_>>();

        let mut delivered = 0;
        for registration in targets {
            match catch_unwind(AssertUnwindSafe(|| (registration.listener)(event))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(
                    event = %event.kind,
                    listener = registration.id.0,
                    "form listener panicked"
                ),
            }
        }
        Ok(delivered)
    }
}
