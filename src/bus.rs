use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::{mpsc, oneshot};

/// Action
///
/// The closed set of operations a database worker can perform. The wire
/// names travel in the message's action header, mirroring the symbolic
/// action names the HTTP tier and database tier agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    DeleteById,
    HideById,
    FindById,
    FindAll,
    Update,
    Count,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::DeleteById => "DELETE_BY_ID",
            Action::HideById => "HIDE_BY_ID",
            Action::FindById => "FIND_BY_ID",
            Action::FindAll => "FIND_ALL",
            Action::Update => "UPDATE",
            Action::Count => "COUNT",
        }
    }
}

impl FromStr for Action {
    type Err = ();

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "CREATE" => Ok(Action::Create),
            "DELETE_BY_ID" => Ok(Action::DeleteById),
            "HIDE_BY_ID" => Ok(Action::HideById),
            "FIND_BY_ID" => Ok(Action::FindById),
            "FIND_ALL" => Ok(Action::FindAll),
            "UPDATE" => Ok(Action::Update),
            "COUNT" => Ok(Action::Count),
            _ => Err(()),
        }
    }
}

/// GatewayError
///
/// Fatal message failures, each carrying a stable numeric code alongside the
/// message text. These surface at the HTTP tier as a generic error response;
/// the application-level "element not found" signal is *not* one of these
/// (see [`DbReply::Warning`]).
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("No action header specified")]
    NoActionSpecified,
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Database error: {0}")]
    Db(String),
    #[error("No database worker registered at address `{0}`")]
    UnknownAddress(String),
    #[error("Database worker at address `{0}` is gone")]
    WorkerGone(String),
}

impl GatewayError {
    pub fn code(&self) -> u16 {
        match self {
            GatewayError::NoActionSpecified => 0,
            GatewayError::Db(_) => 1,
            GatewayError::UnknownAction(_) => 2,
            GatewayError::UnknownAddress(_) => 3,
            GatewayError::WorkerGone(_) => 4,
        }
    }
}

/// DbReply
///
/// A structurally successful reply from the database tier. `Warning` is the
/// tagged header convention: an application-level error signal (such as
/// "Element not found") piggy-backed on an otherwise-successful reply, which
/// the HTTP tier renders as a warning rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub enum DbReply {
    Ok(Value),
    Warning(String),
}

pub type DbResult = Result<DbReply, GatewayError>;

/// Envelope
///
/// One request message on the bus: the action header (optional, so the
/// missing-header failure path stays a first-class contract), the JSON body,
/// and the oneshot channel the worker replies on.
#[derive(Debug)]
pub struct Envelope {
    pub action: Option<String>,
    pub body: Value,
    pub reply_tx: oneshot::Sender<DbResult>,
}

/// EntityBus
///
/// The registry of per-entity message channels, built once at startup and
/// read-only afterwards. An explicitly constructed value shared through the
/// application state; there is no process-wide singleton.
#[derive(Default)]
pub struct EntityBus {
    senders: HashMap<String, mpsc::Sender<Envelope>>,
}

impl EntityBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a database worker under its entity address.
    pub fn register(&mut self, address: impl Into<String>, sender: mpsc::Sender<Envelope>) {
        self.senders.insert(address.into(), sender);
    }

    /// send
    ///
    /// Sends an action message to the worker at `address` and awaits its
    /// reply. A missing registration or a worker whose channel has closed
    /// yields a fatal error instead of hanging the caller.
    pub async fn send(&self, address: &str, action: Action, body: Value) -> DbResult {
        self.deliver(address, Some(action.as_str().to_string()), body)
            .await
    }

    /// Raw delivery with an arbitrary (possibly absent) action header. The
    /// typed [`send`](Self::send) front-end is what handlers use; this keeps
    /// the header-level dispatch contract exercisable end to end.
    pub async fn deliver(&self, address: &str, action: Option<String>, body: Value) -> DbResult {
        let sender = self
            .senders
            .get(address)
            .ok_or_else(|| GatewayError::UnknownAddress(address.to_string()))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(Envelope {
                action,
                body,
                reply_tx,
            })
            .await
            .map_err(|_| GatewayError::WorkerGone(address.to_string()))?;
        reply_rx
            .await
            .map_err(|_| GatewayError::WorkerGone(address.to_string()))?
    }
}
