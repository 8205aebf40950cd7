use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use super::controller::{FormError, FormResult};
use super::value::{Value, ValueTree};

/// Values handed to the submission collaborator.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FormPayload {
    pub values: ValueTree,
    /// Flat dotted names; sequences and files stay whole.
    pub fields: BTreeMap<String, Value>,
}

impl FormPayload {
    pub fn from_values(values: ValueTree) -> Self {
        let fields = values.flatten();
        Self { values, fields }
    }

    pub fn to_json(&self) -> FormResult<String> {
        serde_json::to_string(self).map_err(|error| FormError::Payload(error.to_string()))
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SubmitResponse {
    pub status: Option<u16>,
    pub body: Option<String>,
}

impl SubmitResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: Some(200),
            body: Some(body.into()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("server responded with status {status}")]
    Status { status: u16, body: Option<String> },
    #[error("network failure: {0}")]
    Network(String),
}

pub type BoxedSubmitFuture =
    Pin<Box<dyn Future<Output = Result<SubmitResponse, TransportError>> + Send + 'static>>;

/// Submission collaborator. Method, headers and endpoint belong to the host.
pub trait FormTransport: Send + Sync {
    fn send(&self, payload: FormPayload) -> BoxedSubmitFuture;
}

impl<F> FormTransport for F
where
    F: Fn(FormPayload) -> BoxedSubmitFuture + Send + Sync,
{
    fn send(&self, payload: FormPayload) -> BoxedSubmitFuture {
        (self)(payload)
    }
}
