//! Bootstrap configuration
//!
//! Server (object 1) and security (object 0) instances pushed to a device
//! during provisioning, keyed by the instance id the device will expose.
//! Stored as JSON; byte buffers are base64 strings.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Lwm2mError, Result};
use crate::node::{ObjectInstance, Resource, Value};

/// Transport bindings a server may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BindingMode {
    /// UDP
    #[default]
    U,
    /// UDP with queue mode
    UQ,
    /// SMS
    S,
    /// SMS with queue mode
    SQ,
    /// UDP and SMS
    US,
    /// UDP with queue mode and SMS
    UQS,
}

impl BindingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::U => "U",
            Self::UQ => "UQ",
            Self::S => "S",
            Self::SQ => "SQ",
            Self::US => "US",
            Self::UQS => "UQS",
        }
    }
}

impl fmt::Display for BindingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BindingMode {
    type Err = Lwm2mError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "U" => Ok(Self::U),
            "UQ" => Ok(Self::UQ),
            "S" => Ok(Self::S),
            "SQ" => Ok(Self::SQ),
            "US" => Ok(Self::US),
            "UQS" => Ok(Self::UQS),
            _ => Err(Lwm2mError::invalid_value(
                format!("unknown binding mode '{}'", s),
                "binding",
            )),
        }
    }
}

/// Security mode of a server account (resource 0/x/2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityMode {
    Psk,
    Rpk,
    X509,
    NoSec,
}

impl SecurityMode {
    pub fn code(self) -> i64 {
        match self {
            Self::Psk => 0,
            Self::Rpk => 1,
            Self::X509 => 2,
            Self::NoSec => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Psk),
            1 => Some(Self::Rpk),
            2 => Some(Self::X509),
            3 => Some(Self::NoSec),
            _ => None,
        }
    }
}

/// SMS security mode (resource 0/x/6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SmsSecurityMode {
    DtlsDeviceKey,
    SecurePacket,
    #[default]
    NoSec,
    Proprietary,
}

impl SmsSecurityMode {
    pub fn code(self) -> i64 {
        match self {
            Self::DtlsDeviceKey => 1,
            Self::SecurePacket => 2,
            Self::NoSec => 3,
            Self::Proprietary => 255,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::DtlsDeviceKey),
            2 => Some(Self::SecurePacket),
            3 => Some(Self::NoSec),
            255 => Some(Self::Proprietary),
            _ => None,
        }
    }
}

/// Server account (object 1)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub short_id: u16,
    /// Registration lifetime in seconds
    pub lifetime: u32,
    pub default_min_period: u32,
    pub default_max_period: Option<u32>,
    pub disable_timeout: Option<u32>,
    /// Store notifications while disabled or offline
    pub notif_if_disabled: bool,
    pub binding: BindingMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            short_id: 0,
            lifetime: 86400,
            default_min_period: 1,
            default_max_period: None,
            disable_timeout: None,
            notif_if_disabled: true,
            binding: BindingMode::U,
        }
    }
}

impl ServerConfig {
    /// Server object instance to write to the device
    pub fn to_instance(&self, instance_id: u16) -> ObjectInstance {
        let mut resources = vec![
            Resource::single(0, i64::from(self.short_id)),
            Resource::single(1, i64::from(self.lifetime)),
            Resource::single(2, i64::from(self.default_min_period)),
        ];
        if let Some(max) = self.default_max_period {
            resources.push(Resource::single(3, i64::from(max)));
        }
        if let Some(timeout) = self.disable_timeout {
            resources.push(Resource::single(5, i64::from(timeout)));
        }
        resources.push(Resource::single(6, self.notif_if_disabled));
        resources.push(Resource::single(7, self.binding.as_str()));
        ObjectInstance::new(instance_id, resources)
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ServerConfig [short_id={}, lifetime={}, default_min_period={}, default_max_period={:?}, disable_timeout={:?}, notif_if_disabled={}, binding={}]",
            self.short_id,
            self.lifetime,
            self.default_min_period,
            self.default_max_period,
            self.disable_timeout,
            self.notif_if_disabled,
            self.binding
        )
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded)
            .map_err(|e| de::Error::custom(format!("base64 decode: {}", e)))
    }
}

/// Security account (object 0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSecurity {
    pub uri: String,
    pub bootstrap_server: bool,
    /// Unset until provisioned
    pub security_mode: Option<SecurityMode>,
    #[serde(with = "base64_bytes")]
    pub public_key_or_id: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub server_public_key_or_id: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub secret_key: Vec<u8>,
    pub sms_security_mode: SmsSecurityMode,
    #[serde(with = "base64_bytes")]
    pub sms_binding_key_param: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub sms_binding_key_secret: Vec<u8>,
    pub server_sms_number: String,
    /// Short id of the server this account belongs to
    pub server_id: Option<u16>,
    pub client_hold_off_time: u32,
}

impl Default for ServerSecurity {
    fn default() -> Self {
        Self {
            uri: String::new(),
            bootstrap_server: false,
            security_mode: None,
            public_key_or_id: Vec::new(),
            server_public_key_or_id: Vec::new(),
            secret_key: Vec::new(),
            sms_security_mode: SmsSecurityMode::NoSec,
            sms_binding_key_param: Vec::new(),
            sms_binding_key_secret: Vec::new(),
            server_sms_number: String::new(),
            server_id: None,
            client_hold_off_time: 1,
        }
    }
}

impl ServerSecurity {
    /// Security object instance to write to the device
    pub fn to_instance(&self, instance_id: u16) -> ObjectInstance {
        let mut resources = vec![
            Resource::single(0, self.uri.as_str()),
            Resource::single(1, self.bootstrap_server),
        ];
        if let Some(mode) = self.security_mode {
            resources.push(Resource::single(2, mode.code()));
        }
        resources.extend([
            Resource::single(3, Value::Opaque(self.public_key_or_id.clone())),
            Resource::single(4, Value::Opaque(self.server_public_key_or_id.clone())),
            Resource::single(5, Value::Opaque(self.secret_key.clone())),
            Resource::single(6, self.sms_security_mode.code()),
            Resource::single(7, Value::Opaque(self.sms_binding_key_param.clone())),
            Resource::single(8, Value::Opaque(self.sms_binding_key_secret.clone())),
            Resource::single(9, self.server_sms_number.as_str()),
        ]);
        if let Some(server_id) = self.server_id {
            resources.push(Resource::single(10, i64::from(server_id)));
        }
        resources.push(Resource::single(11, i64::from(self.client_hold_off_time)));
        ObjectInstance::new(instance_id, resources)
    }
}

impl fmt::Display for ServerSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // key material is summarized by length
        write!(
            f,
            "ServerSecurity [uri={}, bootstrap_server={}, security_mode={:?}, public_key_or_id={} bytes, server_public_key_or_id={} bytes, secret_key={} bytes, sms_security_mode={:?}, sms_binding_key_param={} bytes, sms_binding_key_secret={} bytes, server_sms_number={}, server_id={:?}, client_hold_off_time={}]",
            self.uri,
            self.bootstrap_server,
            self.security_mode,
            self.public_key_or_id.len(),
            self.server_public_key_or_id.len(),
            self.secret_key.len(),
            self.sms_security_mode,
            self.sms_binding_key_param.len(),
            self.sms_binding_key_secret.len(),
            self.server_sms_number,
            self.server_id,
            self.client_hold_off_time
        )
    }
}

/// Configuration pushed to a device during bootstrap
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Server object instances by instance id
    pub servers: BTreeMap<u16, ServerConfig>,
    /// Security object instances by instance id
    pub security: BTreeMap<u16, ServerSecurity>,
}

impl BootstrapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), self.to_json_string()?)?;
        Ok(())
    }
}

impl FromStr for BootstrapConfig {
    type Err = Lwm2mError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json_str(s)
    }
}

impl fmt::Display for BootstrapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BootstrapConfig [servers={{")?;
        for (i, (id, server)) in self.servers.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", id, server)?;
        }
        write!(f, "}}, security={{")?;
        for (i, (id, security)) in self.security.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", id, security)?;
        }
        write!(f, "}}]")
    }
}
