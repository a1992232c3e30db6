//! CoAP-level types consumed by the LWM2M layer
//!
//! The transport is a black box; it hands back a [`RawResponse`] made of a code,
//! a few options and a payload. These abstractions allow the library to work
//! with any CoAP implementation.

use std::fmt;

/// CoAP Content-Format identifiers used by LWM2M
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ContentFormat {
    /// text/plain
    Text = 0,
    /// application/link-format
    Link = 40,
    /// application/octet-stream
    Opaque = 42,
    /// application/cbor
    Cbor = 60,
    /// application/vnd.oma.lwm2m+tlv
    Tlv = 1542,
    /// application/vnd.oma.lwm2m+json
    Json = 1543,
}

impl ContentFormat {
    /// Convert from raw content-format ID
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Text),
            40 => Some(Self::Link),
            42 => Some(Self::Opaque),
            60 => Some(Self::Cbor),
            1542 => Some(Self::Tlv),
            1543 => Some(Self::Json),
            _ => None,
        }
    }

    /// Get the raw content-format ID
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn media_type(self) -> &'static str {
        match self {
            Self::Text => "text/plain",
            Self::Link => "application/link-format",
            Self::Opaque => "application/octet-stream",
            Self::Cbor => "application/cbor",
            Self::Tlv => "application/vnd.oma.lwm2m+tlv",
            Self::Json => "application/vnd.oma.lwm2m+json",
        }
    }
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.media_type(), self.as_u16())
    }
}

/// Raw CoAP code byte as carried on the wire (`class << 5 | detail`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoapCode(pub u8);

impl CoapCode {
    pub const CREATED: Self = Self::new(2, 1);
    pub const DELETED: Self = Self::new(2, 2);
    pub const VALID: Self = Self::new(2, 3);
    pub const CHANGED: Self = Self::new(2, 4);
    pub const CONTENT: Self = Self::new(2, 5);
    pub const BAD_REQUEST: Self = Self::new(4, 0);
    pub const UNAUTHORIZED: Self = Self::new(4, 1);
    pub const BAD_OPTION: Self = Self::new(4, 2);
    pub const FORBIDDEN: Self = Self::new(4, 3);
    pub const NOT_FOUND: Self = Self::new(4, 4);
    pub const METHOD_NOT_ALLOWED: Self = Self::new(4, 5);
    pub const NOT_ACCEPTABLE: Self = Self::new(4, 6);
    /// 4.09, raw value 137
    pub const CONFLICT: Self = Self::new(4, 9);
    pub const UNSUPPORTED_CONTENT_FORMAT: Self = Self::new(4, 15);
    pub const INTERNAL_SERVER_ERROR: Self = Self::new(5, 0);

    pub const fn new(class: u8, detail: u8) -> Self {
        Self((class << 5) | (detail & 0x1f))
    }

    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(self) -> u8 {
        self.0 & 0x1f
    }

    pub fn is_success(self) -> bool {
        self.class() == 2
    }

    pub fn is_error(self) -> bool {
        matches!(self.class(), 4 | 5)
    }
}

impl fmt::Display for CoapCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

impl From<u8> for CoapCode {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

/// LWM2M response codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    // Success codes
    /// 2.01 Created
    Created,
    /// 2.02 Deleted
    Deleted,
    /// 2.04 Changed
    Changed,
    /// 2.05 Content
    Content,

    // Client error codes
    /// 4.00 Bad Request
    BadRequest,
    /// 4.01 Unauthorized
    Unauthorized,
    /// 4.04 Not Found
    NotFound,
    /// 4.05 Method Not Allowed
    MethodNotAllowed,
    /// 4.09 Conflict
    Conflict,
}

impl ResponseCode {
    /// Map a raw CoAP code to its LWM2M meaning; `None` for codes LWM2M does not use
    pub fn from_coap(code: CoapCode) -> Option<Self> {
        match code {
            CoapCode::CREATED => Some(Self::Created),
            CoapCode::DELETED => Some(Self::Deleted),
            CoapCode::CHANGED => Some(Self::Changed),
            CoapCode::CONTENT => Some(Self::Content),
            CoapCode::BAD_REQUEST => Some(Self::BadRequest),
            CoapCode::UNAUTHORIZED => Some(Self::Unauthorized),
            CoapCode::NOT_FOUND => Some(Self::NotFound),
            CoapCode::METHOD_NOT_ALLOWED => Some(Self::MethodNotAllowed),
            CoapCode::CONFLICT => Some(Self::Conflict),
            _ => None,
        }
    }

    pub fn to_coap(self) -> CoapCode {
        match self {
            Self::Created => CoapCode::CREATED,
            Self::Deleted => CoapCode::DELETED,
            Self::Changed => CoapCode::CHANGED,
            Self::Content => CoapCode::CONTENT,
            Self::BadRequest => CoapCode::BAD_REQUEST,
            Self::Unauthorized => CoapCode::UNAUTHORIZED,
            Self::NotFound => CoapCode::NOT_FOUND,
            Self::MethodNotAllowed => CoapCode::METHOD_NOT_ALLOWED,
            Self::Conflict => CoapCode::CONFLICT,
        }
    }

    /// Check if this is a success code
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Self::Created | Self::Deleted | Self::Changed | Self::Content
        )
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::Deleted => "DELETED",
            Self::Changed => "CHANGED",
            Self::Content => "CONTENT",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound => "NOT_FOUND",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::Conflict => "CONFLICT",
        };
        write!(f, "{} {}", self.to_coap(), name)
    }
}

/// The response options LWM2M looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOptions {
    /// Content-Format option
    pub content_format: Option<u16>,
    /// Observe option; present when the server accepted an observation
    pub observe: Option<u32>,
    /// Location-Path segments joined with `/`
    pub location_path: Option<String>,
}

/// A CoAP response as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub code: CoapCode,
    pub options: RawOptions,
    pub payload: Vec<u8>,
}

impl RawResponse {
    /// Create a response with no options and no payload
    pub fn new(code: CoapCode) -> Self {
        Self {
            code,
            options: RawOptions::default(),
            payload: Vec::new(),
        }
    }

    /// Create a 2.05 Content response
    pub fn content(payload: Vec<u8>, format: ContentFormat) -> Self {
        Self::new(CoapCode::CONTENT).with_payload(payload, format)
    }

    /// Set the payload and its content format
    pub fn with_payload(mut self, payload: Vec<u8>, format: ContentFormat) -> Self {
        self.payload = payload;
        self.options.content_format = Some(format.as_u16());
        self
    }

    /// Mark the response as an accepted observation
    pub fn with_observe(mut self, sequence: u32) -> Self {
        self.options.observe = Some(sequence);
        self
    }

    pub fn with_location_path(mut self, location: impl Into<String>) -> Self {
        self.options.location_path = Some(location.into());
        self
    }

    /// Content format option, if it names a known format
    pub fn content_format(&self) -> Option<ContentFormat> {
        self.options.content_format.and_then(ContentFormat::from_u16)
    }
}
