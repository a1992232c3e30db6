//! Transport contract
//!
//! The CoAP stack is an external collaborator. It sends a request to a client
//! and returns the raw response, or fails. For observed exchanges it keeps
//! calling back through [`ExchangeObserver`] until the exchange ends.

use std::fmt;
use std::sync::Arc;

use crate::coap_types::RawResponse;
use crate::error::{Lwm2mError, Result};
use crate::request::DownlinkRequest;
use crate::resolver::ResponseResolver;
use crate::response::Lwm2mResponse;

/// A registered LWM2M client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Client {
    /// Registration identifier assigned by the server
    pub registration_id: String,
    /// Endpoint name announced by the client
    pub endpoint: String,
}

impl Client {
    pub fn new(registration_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            registration_id: registration_id.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.endpoint)
    }
}

/// Handle of a transport exchange (request plus its responses)
///
/// Owned by the transport; the LWM2M layer only refers to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(pub u64);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reason an exchange ended without a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    Timeout,
    /// The peer answered with a CoAP reset
    Reset,
    /// The exchange was cancelled locally
    Cancelled,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::Reset => write!(f, "request was reset by the peer"),
            Self::Cancelled => write!(f, "request was cancelled"),
        }
    }
}

/// Later event on an exchange the transport still tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// A notification carrying a new response
    Notification(RawResponse),
    Reset,
    Timeout,
}

/// Callback the transport invokes for events on tracked exchanges
pub trait ExchangeObserver: Send + Sync {
    fn on_event(&self, exchange: ExchangeId, event: ExchangeEvent);
}

/// Send half of the transport contract
pub trait Transport {
    /// Send `request` to `client` and wait for its first response
    fn send(
        &self,
        client: &Client,
        request: &DownlinkRequest,
    ) -> std::result::Result<(ExchangeId, RawResponse), TransportFailure>;
}

/// Sends requests over a [`Transport`] and resolves the answers
pub struct RequestSender<T: Transport> {
    transport: T,
    resolver: Arc<ResponseResolver>,
}

impl<T: Transport> RequestSender<T> {
    pub fn new(transport: T, resolver: Arc<ResponseResolver>) -> Self {
        Self {
            transport,
            resolver,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn resolver(&self) -> &Arc<ResponseResolver> {
        &self.resolver
    }

    /// Send a request and resolve its response
    ///
    /// `Ok(None)` means the answer was an observe notification, not a response
    /// to this request.
    pub fn send(&self, client: &Client, request: &DownlinkRequest) -> Result<Option<Lwm2mResponse>> {
        let (exchange, raw) = self
            .transport
            .send(client, request)
            .map_err(Lwm2mError::Transport)?;
        self.resolver.resolve(client, request, exchange, &raw)
    }
}
