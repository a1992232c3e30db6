//! Response resolution
//!
//! Turns the raw response to a [`DownlinkRequest`] into a typed
//! [`Lwm2mResponse`]. Dispatch is on the request kind first and on the raw
//! code second; a code not listed for a kind is an
//! [`Lwm2mError::UnexpectedResponseCode`]. The only side effect is registering
//! an observation when an Observe request is accepted.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::codec::NodeCodec;
use crate::coap_types::{CoapCode, ContentFormat, RawResponse, ResponseCode};
use crate::error::{Lwm2mError, Result};
use crate::link::{self, LinkObject};
use crate::model::Lwm2mModel;
use crate::node::Lwm2mNode;
use crate::observation::{Observation, ObservationRegistry};
use crate::path::Lwm2mPath;
use crate::request::DownlinkRequest;
use crate::response::Lwm2mResponse;
use crate::transport::{Client, ExchangeEvent, ExchangeId, ExchangeObserver};

/// Exchanges remembered as ended before their first response was resolved
const ENDED_EXCHANGES: usize = 64;

/// Resolves raw responses and tracks the observations they establish
///
/// Holds no per-client state; one resolver serves every client concurrently.
#[derive(Debug)]
pub struct ResponseResolver {
    codec: NodeCodec,
    registry: Arc<ObservationRegistry>,
    /// Reset or timed-out exchanges with no observation yet
    ended: Mutex<VecDeque<ExchangeId>>,
}

impl Default for ResponseResolver {
    fn default() -> Self {
        Self::new(
            NodeCodec::new(Lwm2mModel::core()),
            Arc::new(ObservationRegistry::new()),
        )
    }
}

impl ResponseResolver {
    pub fn new(codec: NodeCodec, registry: Arc<ObservationRegistry>) -> Self {
        Self {
            codec,
            registry,
            ended: Mutex::new(VecDeque::new()),
        }
    }

    pub fn codec(&self) -> &NodeCodec {
        &self.codec
    }

    pub fn registry(&self) -> &Arc<ObservationRegistry> {
        &self.registry
    }

    /// Resolve the response `raw` received on `exchange` for `request`
    ///
    /// Returns `Ok(None)` for an Observe answered with CHANGED: that answer is
    /// a notification on the exchange, not the response to the request.
    pub fn resolve(
        &self,
        client: &Client,
        request: &DownlinkRequest,
        exchange: ExchangeId,
        raw: &RawResponse,
    ) -> Result<Option<Lwm2mResponse>> {
        let path = request.path();

        let response = match request {
            DownlinkRequest::Read { .. } => match raw.code {
                CoapCode::CONTENT => Lwm2mResponse::Read {
                    code: ResponseCode::Content,
                    content: Some(self.decode_content(client, path, raw)?),
                },
                CoapCode::UNAUTHORIZED | CoapCode::NOT_FOUND | CoapCode::METHOD_NOT_ALLOWED => {
                    self.status(client, request, raw)?
                }
                _ => return Err(self.unexpected(client, request, raw)),
            },

            DownlinkRequest::Discover { .. } => match raw.code {
                CoapCode::CONTENT => Lwm2mResponse::Discover {
                    code: ResponseCode::Content,
                    links: self.parse_links(client, path, raw)?,
                },
                CoapCode::NOT_FOUND | CoapCode::UNAUTHORIZED | CoapCode::METHOD_NOT_ALLOWED => {
                    self.status(client, request, raw)?
                }
                _ => return Err(self.unexpected(client, request, raw)),
            },

            DownlinkRequest::Write { .. }
            | DownlinkRequest::WriteAttributes { .. }
            | DownlinkRequest::Execute { .. } => match raw.code {
                CoapCode::CHANGED
                | CoapCode::BAD_REQUEST
                | CoapCode::UNAUTHORIZED
                | CoapCode::NOT_FOUND
                | CoapCode::METHOD_NOT_ALLOWED => self.status(client, request, raw)?,
                _ => return Err(self.unexpected(client, request, raw)),
            },

            DownlinkRequest::Delete { .. } => match raw.code {
                CoapCode::DELETED
                | CoapCode::UNAUTHORIZED
                | CoapCode::NOT_FOUND
                | CoapCode::METHOD_NOT_ALLOWED => self.status(client, request, raw)?,
                _ => return Err(self.unexpected(client, request, raw)),
            },

            DownlinkRequest::Create { .. } => match raw.code {
                CoapCode::CREATED => Lwm2mResponse::Create {
                    code: ResponseCode::Created,
                    location: raw.options.location_path.clone(),
                },
                CoapCode::BAD_REQUEST
                | CoapCode::UNAUTHORIZED
                | CoapCode::NOT_FOUND
                | CoapCode::METHOD_NOT_ALLOWED => self.status(client, request, raw)?,
                _ => return Err(self.unexpected(client, request, raw)),
            },

            DownlinkRequest::Observe { .. } => match raw.code {
                CoapCode::CHANGED => {
                    trace!(
                        "Ignoring CHANGED answer to {} from [{}], probably a notification",
                        request,
                        client
                    );
                    return Ok(None);
                }
                CoapCode::CONTENT => {
                    let content = self.decode_content(client, path, raw)?;
                    if raw.options.observe.is_some() {
                        self.register(client, path, exchange);
                    }
                    Lwm2mResponse::Observe {
                        code: ResponseCode::Content,
                        content: Some(content),
                    }
                }
                CoapCode::NOT_FOUND | CoapCode::METHOD_NOT_ALLOWED => {
                    self.status(client, request, raw)?
                }
                _ => return Err(self.unexpected(client, request, raw)),
            },
        };

        Ok(Some(response))
    }

    /// Register an observation unless its exchange already ended
    fn register(&self, client: &Client, path: &Lwm2mPath, exchange: ExchangeId) {
        let mut ended = self.ended.lock();
        if let Some(index) = ended.iter().position(|e| *e == exchange) {
            ended.remove(index);
            debug!(
                "Exchange {} ended before its response, not observing {} for [{}]",
                exchange, path, client
            );
            return;
        }
        self.registry.add(Observation::new(
            client.registration_id.clone(),
            *path,
            exchange,
        ));
    }

    fn status(
        &self,
        client: &Client,
        request: &DownlinkRequest,
        raw: &RawResponse,
    ) -> Result<Lwm2mResponse> {
        let code =
            ResponseCode::from_coap(raw.code).ok_or_else(|| self.unexpected(client, request, raw))?;
        Ok(Lwm2mResponse::status(request.kind(), code))
    }

    fn unexpected(&self, client: &Client, request: &DownlinkRequest, raw: &RawResponse) -> Lwm2mError {
        debug!(
            "Client [{}] returned unexpected response code [{}] to {}",
            client, raw.code, request
        );
        Lwm2mError::UnexpectedResponseCode {
            client: client.endpoint.clone(),
            target: request.path().to_string(),
            code: raw.code,
        }
    }

    /// Decode a content payload as the node at `path`
    ///
    /// Without a content-format option, resources are read as plain text and
    /// larger nodes as TLV.
    fn decode_node(&self, path: &Lwm2mPath, raw: &RawResponse) -> Result<Lwm2mNode> {
        let format = raw.options.content_format.unwrap_or_else(|| {
            if path.is_resource() {
                ContentFormat::Text.as_u16()
            } else {
                ContentFormat::Tlv.as_u16()
            }
        });
        self.codec.decode_raw(&raw.payload, format, path)
    }

    fn decode_content(&self, client: &Client, path: &Lwm2mPath, raw: &RawResponse) -> Result<Lwm2mNode> {
        self.decode_node(path, raw)
            .map_err(|e| Lwm2mError::InvalidContent {
                client: client.endpoint.clone(),
                path: path.to_string(),
                source: Box::new(e),
            })
    }

    fn parse_links(&self, client: &Client, path: &Lwm2mPath, raw: &RawResponse) -> Result<Vec<LinkObject>> {
        if raw.options.content_format != Some(ContentFormat::Link.as_u16()) {
            debug!(
                "Expected client [{}] to return {} content but got [{:?}]",
                client,
                ContentFormat::Link,
                raw.options.content_format
            );
            return Ok(Vec::new());
        }

        link::parse(&raw.payload).map_err(|e| Lwm2mError::InvalidContent {
            client: client.endpoint.clone(),
            path: path.to_string(),
            source: Box::new(e),
        })
    }
}

impl ExchangeObserver for ResponseResolver {
    fn on_event(&self, exchange: ExchangeId, event: ExchangeEvent) {
        let observation = {
            let mut ended = self.ended.lock();
            let observation = self.registry.get_by_exchange(exchange);
            if observation.is_none() && matches!(event, ExchangeEvent::Reset | ExchangeEvent::Timeout) {
                if ended.len() == ENDED_EXCHANGES {
                    ended.pop_front();
                }
                ended.push_back(exchange);
            }
            observation
        };
        let Some(observation) = observation else {
            debug!("Ignoring {:?} on exchange {} with no observation", event, exchange);
            return;
        };

        match &event {
            ExchangeEvent::Notification(raw) if raw.code.is_error() => {
                debug!(
                    "Observation {} ended by error notification [{}]",
                    observation, raw.code
                );
                self.registry.remove(&observation);
            }
            ExchangeEvent::Notification(raw)
                if matches!(raw.code, CoapCode::CONTENT | CoapCode::CHANGED) =>
            {
                match self.decode_node(&observation.path, raw) {
                    Ok(node) => self.registry.notify_new_value(&observation, &node),
                    Err(e) => warn!("Unable to decode notification for {}: {}", observation, e),
                }
            }
            ExchangeEvent::Notification(raw) => {
                debug!(
                    "Ignoring notification [{}] for {}",
                    raw.code, observation
                );
            }
            ExchangeEvent::Reset | ExchangeEvent::Timeout => {
                debug!("Observation {} ended by {:?}", observation, event);
                self.registry.remove(&observation);
            }
        }
    }
}
