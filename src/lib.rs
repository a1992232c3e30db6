//! rust-lwm2m - Rust implementation of the LWM2M protocol core
//!
//! This library resolves raw CoAP responses into typed LWM2M responses, encodes
//! and decodes resource-tree payloads (TLV, JSON, plain text, CBOR, opaque),
//! tracks Observe subscriptions and serves a device-side resource tree. The
//! CoAP transport itself is left to the caller.
//!
//! # Example
//!
//! ```no_run
//! use rust_lwm2m::coap_types::{ContentFormat, RawResponse};
//! use rust_lwm2m::{Client, DownlinkRequest, ExchangeId, ResponseResolver};
//!
//! // Resolver with the core object model and a fresh observation registry
//! let resolver = ResponseResolver::default();
//!
//! // Request sent by your CoAP stack
//! let client = Client::new("reg-1", "urn:imei:4711");
//! let request = DownlinkRequest::read("/3/0/9").unwrap();
//!
//! // Raw response handed back by your CoAP stack
//! let raw = RawResponse::content(b"87".to_vec(), ContentFormat::Text);
//! let response = resolver.resolve(&client, &request, ExchangeId(1), &raw).unwrap();
//! ```

pub mod bootstrap;
pub mod coap_types;
pub mod codec;
mod error;
pub mod handler;
pub mod link;
pub mod model;
pub mod node;
pub mod observation;
mod path;
pub mod request;
mod resolver;
pub mod response;
pub mod transport;
pub mod tree;

pub use bootstrap::BootstrapConfig;
pub use codec::NodeCodec;
pub use error::{Lwm2mError, Result};
pub use handler::RequestHandler;
pub use model::Lwm2mModel;
pub use node::Lwm2mNode;
pub use observation::{Observation, ObservationRegistry};
pub use path::{Lwm2mPath, PathTier};
pub use request::DownlinkRequest;
pub use resolver::ResponseResolver;
pub use response::Lwm2mResponse;
pub use transport::{Client, ExchangeId, RequestSender};
pub use tree::ObjectTree;
