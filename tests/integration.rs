//! Integration tests for rust-lwm2m
//!
//! A loopback transport wires the server side (sender, resolver, registry)
//! to a device-side request handler serving a small object tree.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use rust_lwm2m::coap_types::{CoapCode, ContentFormat, RawResponse, ResponseCode};
use rust_lwm2m::handler::{ExecutableResource, StoredResource};
use rust_lwm2m::node::{ObjectInstance, Resource, Value};
use rust_lwm2m::observation::ObservationListener;
use rust_lwm2m::request::AttributeSet;
use rust_lwm2m::transport::{ExchangeEvent, ExchangeObserver, Transport, TransportFailure};
use rust_lwm2m::*;

const CUSTOM_MODEL: &str = r#"[
  {
    "id": 3303,
    "name": "Temperature",
    "instancetype": "multiple",
    "resourcedefs": [
      { "id": 5700, "name": "Sensor Value", "operations": "R", "type": "float", "mandatory": true },
      { "id": 5701, "name": "Sensor Units", "operations": "R", "type": "string" }
    ]
  }
]"#;

/// Transport that hands every request straight to an in-process handler
struct Loopback {
    handler: Mutex<RequestHandler>,
    next_exchange: AtomicU64,
}

impl Loopback {
    fn new(handler: RequestHandler) -> Self {
        Self {
            handler: Mutex::new(handler),
            next_exchange: AtomicU64::new(1),
        }
    }
}

impl Transport for Loopback {
    fn send(
        &self,
        _client: &Client,
        request: &DownlinkRequest,
    ) -> std::result::Result<(ExchangeId, RawResponse), TransportFailure> {
        let exchange = ExchangeId(self.next_exchange.fetch_add(1, Ordering::SeqCst));
        let raw = self.handler.lock().handle(request);
        Ok((exchange, raw))
    }
}

#[derive(Default)]
struct Recorder {
    values: Mutex<Vec<(String, Lwm2mNode)>>,
    cancelled: Mutex<Vec<String>>,
}

impl ObservationListener for Recorder {
    fn new_value(&self, observation: &Observation, value: &Lwm2mNode) {
        self.values
            .lock()
            .push((observation.path.to_string(), value.clone()));
    }

    fn cancelled(&self, observation: &Observation) {
        self.cancelled.lock().push(observation.path.to_string());
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn device_tree() -> ObjectTree {
    let mut tree = ObjectTree::new();
    tree.add_instance(
        3,
        0,
        [
            (0, StoredResource::read_only("Open Mobile Alliance").boxed()),
            (1, StoredResource::read_only("Acme Corp").boxed()),
            (4, ExecutableResource::new(|_| Ok(())).boxed()),
            (9, StoredResource::read_only(87i64).boxed()),
            (14, StoredResource::read_write("+01").boxed()),
        ],
    )
    .unwrap();
    tree.add_object(2);
    tree
}

fn setup() -> (RequestSender<Loopback>, Client) {
    init_tracing();
    let codec = NodeCodec::new(Lwm2mModel::core());
    let handler = RequestHandler::new(device_tree(), codec.clone());
    let resolver = Arc::new(ResponseResolver::new(
        codec,
        Arc::new(ObservationRegistry::new()),
    ));
    let sender = RequestSender::new(Loopback::new(handler), resolver);
    (sender, Client::new("reg-7", "urn:dev:acme-0001"))
}

fn send(sender: &RequestSender<Loopback>, client: &Client, request: DownlinkRequest) -> Lwm2mResponse {
    sender
        .send(client, &request)
        .unwrap()
        .expect("request should produce a response")
}

#[test]
fn test_read_manufacturer() {
    let (sender, client) = setup();

    let response = send(&sender, &client, DownlinkRequest::read("/3/0/1").unwrap());

    assert_eq!(response.code(), ResponseCode::Content);
    assert_eq!(
        response.content(),
        Some(&Resource::single(1, "Acme Corp").into())
    );
}

#[test]
fn test_read_instance_skips_executable() {
    let (sender, client) = setup();

    let response = send(&sender, &client, DownlinkRequest::read("/3/0").unwrap());
    let Some(Lwm2mNode::Instance(instance)) = response.content() else {
        panic!("expected an instance, got {:?}", response.content());
    };

    assert_eq!(instance.id, 0);
    assert!(instance.resources.contains_key(&1));
    assert!(!instance.resources.contains_key(&4));
}

#[test]
fn test_read_missing_instance() {
    let (sender, client) = setup();

    let response = send(&sender, &client, DownlinkRequest::read("/3/1").unwrap());

    assert_eq!(response.code(), ResponseCode::NotFound);
    assert!(response.content().is_none());
}

#[test]
fn test_read_as_json() {
    init_tracing();
    let codec = NodeCodec::new(Lwm2mModel::core());
    let handler =
        RequestHandler::new(device_tree(), codec.clone()).with_format(ContentFormat::Json);
    let resolver = Arc::new(ResponseResolver::new(codec, Arc::default()));
    let sender = RequestSender::new(Loopback::new(handler), resolver);
    let client = Client::new("reg-json", "urn:dev:json");

    let response = send(&sender, &client, DownlinkRequest::read("/3/0/9").unwrap());

    assert_eq!(
        response.content(),
        Some(&Resource::single(9, 87i64).into())
    );
}

#[test]
fn test_observe_then_changed() {
    let (sender, client) = setup();
    let request = DownlinkRequest::observe("/3/0/9").unwrap();

    let response = send(&sender, &client, request.clone());
    assert_eq!(response.code(), ResponseCode::Content);
    assert_eq!(response.content(), Some(&Resource::single(9, 87i64).into()));

    let registry = sender.resolver().registry();
    let path: Lwm2mPath = "/3/0/9".parse().unwrap();
    let observation = registry.get("reg-7", &path).unwrap();
    assert_eq!(registry.len(), 1);

    // A later CHANGED delivery on the same exchange is not a response
    let changed = RawResponse::new(CoapCode::CHANGED)
        .with_payload(b"88".to_vec(), ContentFormat::Text)
        .with_observe(2);
    let resolved = sender
        .resolver()
        .resolve(&client, &request, observation.exchange, &changed)
        .unwrap();

    assert!(resolved.is_none());
    assert_eq!(registry.get("reg-7", &path), Some(observation));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_observation_lifecycle() {
    let (sender, client) = setup();
    let recorder = Arc::new(Recorder::default());
    let resolver = Arc::clone(sender.resolver());
    resolver.registry().add_listener(recorder.clone());

    send(&sender, &client, DownlinkRequest::observe("/3/0/9").unwrap());
    let observation = resolver
        .registry()
        .get("reg-7", &"/3/0/9".parse().unwrap())
        .unwrap();

    // Notification on the observed exchange reaches the listener
    let notification = RawResponse::content(b"42".to_vec(), ContentFormat::Text).with_observe(3);
    resolver.on_event(observation.exchange, ExchangeEvent::Notification(notification));

    {
        let values = recorder.values.lock();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].0, "/3/0/9");
        assert_eq!(values[0].1, Resource::single(9, 42i64).into());
    }

    // Events on unknown exchanges are ignored
    resolver.on_event(ExchangeId(999), ExchangeEvent::Timeout);
    assert_eq!(resolver.registry().len(), 1);

    // Reset ends the observation
    resolver.on_event(observation.exchange, ExchangeEvent::Reset);
    assert!(resolver.registry().is_empty());
    assert_eq!(*recorder.cancelled.lock(), vec!["/3/0/9".to_string()]);
}

#[test]
fn test_error_notification_ends_observation() {
    let (sender, client) = setup();
    let resolver = Arc::clone(sender.resolver());

    send(&sender, &client, DownlinkRequest::observe("/3/0/1").unwrap());
    let observation = resolver
        .registry()
        .get("reg-7", &"/3/0/1".parse().unwrap())
        .unwrap();

    resolver.on_event(
        observation.exchange,
        ExchangeEvent::Notification(RawResponse::new(CoapCode::NOT_FOUND)),
    );

    assert!(resolver.registry().is_empty());
}

#[test]
fn test_deregistration_cancels_all() {
    let (sender, client) = setup();
    let other = Client::new("reg-8", "urn:dev:acme-0002");

    send(&sender, &client, DownlinkRequest::observe("/3/0/9").unwrap());
    send(&sender, &client, DownlinkRequest::observe("/3/0/1").unwrap());
    send(&sender, &other, DownlinkRequest::observe("/3/0/9").unwrap());

    let registry = sender.resolver().registry();
    assert_eq!(registry.list_by_client("reg-7").len(), 2);

    let cancelled = registry.cancel_all("reg-7");
    let paths: Vec<String> = cancelled.iter().map(|o| o.path.to_string()).collect();

    assert_eq!(paths, vec!["/3/0/1", "/3/0/9"]);
    assert!(registry.list_by_client("reg-7").is_empty());
    assert_eq!(registry.list_by_client("reg-8").len(), 1);
}

#[test]
fn test_create_discover_delete() {
    let (sender, client) = setup();
    let instance = ObjectInstance::new(
        1,
        [
            Resource::single(0, Value::Integer(3)),
            Resource::single(1, Value::String("rw".into())),
        ],
    );

    let created = send(&sender, &client, DownlinkRequest::create("/2", instance.clone()).unwrap());
    assert_eq!(created.code(), ResponseCode::Created);
    assert_eq!(created.location(), Some("2/1"));

    // Same id again is refused
    let duplicate = send(&sender, &client, DownlinkRequest::create("/2", instance).unwrap());
    assert_eq!(duplicate.code(), ResponseCode::BadRequest);

    let discovered = send(&sender, &client, DownlinkRequest::discover("/2").unwrap());
    let urls: Vec<&str> = discovered.links().iter().map(|l| l.url.as_str()).collect();
    assert_eq!(urls, vec!["/2", "/2/1", "/2/1/0", "/2/1/1"]);

    let deleted = send(&sender, &client, DownlinkRequest::delete("/2/1").unwrap());
    assert_eq!(deleted.code(), ResponseCode::Deleted);

    let discovered = send(&sender, &client, DownlinkRequest::discover("/2").unwrap());
    let urls: Vec<&str> = discovered.links().iter().map(|l| l.url.as_str()).collect();
    assert_eq!(urls, vec!["/2"]);

    let missing = send(&sender, &client, DownlinkRequest::delete("/2/1").unwrap());
    assert_eq!(missing.code(), ResponseCode::NotFound);
}

#[test]
fn test_write_and_read_back() {
    let (sender, client) = setup();

    let written = send(
        &sender,
        &client,
        DownlinkRequest::write("/3/0/14", Resource::single(14, "+02")).unwrap(),
    );
    assert_eq!(written.code(), ResponseCode::Changed);

    let read = send(&sender, &client, DownlinkRequest::read("/3/0/14").unwrap());
    assert_eq!(read.content(), Some(&Resource::single(14, "+02").into()));

    // Manufacturer is read-only
    let refused = send(
        &sender,
        &client,
        DownlinkRequest::write("/3/0/1", Resource::single(1, "Evil Corp")).unwrap(),
    );
    assert_eq!(refused.code(), ResponseCode::MethodNotAllowed);
}

#[test]
fn test_write_attributes_show_in_discover() {
    let (sender, client) = setup();
    let attributes = AttributeSet::new().with_pmin(10).with_pmax(60);

    let response = send(
        &sender,
        &client,
        DownlinkRequest::write_attributes("/3/0/9", attributes).unwrap(),
    );
    assert_eq!(response.code(), ResponseCode::Changed);

    let discovered = send(&sender, &client, DownlinkRequest::discover("/3/0/9").unwrap());
    let link = &discovered.links()[0];
    assert_eq!(link.url, "/3/0/9");
    assert!(link.attribute("pmin").is_some());
    assert!(link.attribute("pmax").is_some());
}

#[test]
fn test_execute() {
    let (sender, client) = setup();

    let response = send(&sender, &client, DownlinkRequest::execute("/3/0/4", None).unwrap());
    assert_eq!(response.code(), ResponseCode::Changed);

    let refused = send(&sender, &client, DownlinkRequest::execute("/3/0/9", None).unwrap());
    assert_eq!(refused.code(), ResponseCode::MethodNotAllowed);
}

#[test]
fn test_transport_failure() {
    struct TimingOut;

    impl Transport for TimingOut {
        fn send(
            &self,
            _client: &Client,
            _request: &DownlinkRequest,
        ) -> std::result::Result<(ExchangeId, RawResponse), TransportFailure> {
            Err(TransportFailure::Timeout)
        }
    }

    let sender = RequestSender::new(TimingOut, Arc::new(ResponseResolver::default()));
    let client = Client::new("reg-1", "urn:dev:gone");

    let result = sender.send(&client, &DownlinkRequest::observe("/3/0/9").unwrap());

    assert!(matches!(
        result,
        Err(Lwm2mError::Transport(TransportFailure::Timeout))
    ));
    assert!(sender.resolver().registry().is_empty());
}

#[test]
fn test_custom_model_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("objects.json");
    std::fs::write(&path, CUSTOM_MODEL).unwrap();

    let model = Lwm2mModel::core().merge(Lwm2mModel::from_file(&path).unwrap());
    let codec = NodeCodec::new(model);

    let node = codec
        .decode(b"21.5", ContentFormat::Text, &"/3303/0/5700".parse().unwrap())
        .unwrap();
    assert_eq!(node, Resource::single(5700, 21.5).into());

    // Device object is still known
    let node = codec
        .decode(b"87", ContentFormat::Text, &"/3/0/9".parse().unwrap())
        .unwrap();
    assert_eq!(node, Resource::single(9, 87i64).into());
}

#[test]
fn test_bootstrap_config_provisions_tree() {
    let config: BootstrapConfig = r#"{
        "servers": {
            "0": { "short_id": 101, "lifetime": 300, "binding": "UQ" }
        },
        "security": {
            "1": {
                "uri": "coaps://lwm2m.example.org:5684",
                "security_mode": "PSK",
                "public_key_or_id": "aWRlbnRpdHk=",
                "secret_key": "c2VjcmV0",
                "server_id": 101
            }
        }
    }"#
    .parse()
    .unwrap();

    let mut tree = ObjectTree::new();
    for (id, server) in &config.servers {
        let instance = server.to_instance(*id);
        let resources = instance
            .resources
            .values()
            .map(|r| (r.id, StoredResource::new(r.value.clone(), true).boxed()));
        tree.add_instance(1, *id, resources).unwrap();
    }

    let codec = NodeCodec::new(Lwm2mModel::core());
    let mut handler = RequestHandler::new(tree, codec.clone());
    let raw = handler.handle(&DownlinkRequest::read("/1/0/1").unwrap());
    let node = codec
        .decode(&raw.payload, raw.content_format().unwrap(), &"/1/0/1".parse().unwrap())
        .unwrap();

    assert_eq!(node, Resource::single(1, 300i64).into());
}

/// Convert a coap-lite response packet into the raw form the resolver takes
fn from_packet(packet: &coap_lite::Packet) -> RawResponse {
    use coap_lite::{CoapOption, MessageClass, ResponseType};

    let code = match packet.header.code {
        MessageClass::Response(ResponseType::Created) => CoapCode::CREATED,
        MessageClass::Response(ResponseType::Deleted) => CoapCode::DELETED,
        MessageClass::Response(ResponseType::Changed) => CoapCode::CHANGED,
        MessageClass::Response(ResponseType::Content) => CoapCode::CONTENT,
        MessageClass::Response(ResponseType::BadRequest) => CoapCode::BAD_REQUEST,
        MessageClass::Response(ResponseType::NotFound) => CoapCode::NOT_FOUND,
        MessageClass::Response(ResponseType::MethodNotAllowed) => CoapCode::METHOD_NOT_ALLOWED,
        _ => CoapCode::INTERNAL_SERVER_ERROR,
    };

    let mut raw = RawResponse::new(code);
    raw.payload = packet.payload.clone();
    raw.options.content_format = packet
        .get_first_option(CoapOption::ContentFormat)
        .map(|bytes| bytes.iter().fold(0u16, |acc, b| (acc << 8) | u16::from(*b)));
    raw.options.observe = packet
        .get_first_option(CoapOption::Observe)
        .map(|bytes| bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)));
    raw
}

#[test]
fn test_resolve_coap_lite_packet() {
    use coap_lite::{CoapOption, MessageClass, Packet, ResponseType};

    let mut packet = Packet::new();
    packet.header.code = MessageClass::Response(ResponseType::Content);
    packet.add_option(CoapOption::ContentFormat, vec![0x06, 0x06]);
    packet.add_option(CoapOption::Observe, vec![0x01]);
    packet.payload = hex::decode("c8010941636d6520436f7270").unwrap();

    let raw = from_packet(&packet);
    assert_eq!(raw.content_format(), Some(ContentFormat::Tlv));

    let resolver = ResponseResolver::default();
    let client = Client::new("reg-9", "urn:dev:lite");
    let request = DownlinkRequest::observe("/3/0/1").unwrap();

    let response = resolver
        .resolve(&client, &request, ExchangeId(17), &raw)
        .unwrap()
        .unwrap();

    assert_eq!(response.content(), Some(&Resource::single(1, "Acme Corp").into()));
    let observation = resolver.registry().get_by_exchange(ExchangeId(17)).unwrap();
    assert_eq!(observation.registration_id, "reg-9");
}
