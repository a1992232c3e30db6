//! Downlink requests
//!
//! Operations a server issues against a client's resource tree. Constructors
//! parse the target path and check that it has the tier the operation needs.

use std::fmt;

use crate::coap_types::ContentFormat;
use crate::error::{Lwm2mError, Result};
use crate::link::LinkAttributeValue;
use crate::node::{Lwm2mNode, ObjectInstance};
use crate::path::{Lwm2mPath, PathTier};

/// Operation kind of a [`DownlinkRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Read,
    Write,
    WriteAttributes,
    Execute,
    Create,
    Delete,
    Discover,
    Observe,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::WriteAttributes => "WRITE_ATTRIBUTES",
            Self::Execute => "EXECUTE",
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::Discover => "DISCOVER",
            Self::Observe => "OBSERVE",
        };
        f.write_str(name)
    }
}

/// Notification attributes set with Write-Attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    /// Minimum period between notifications, in seconds
    pub pmin: Option<u32>,
    /// Maximum period between notifications, in seconds
    pub pmax: Option<u32>,
    /// Greater-than threshold
    pub gt: Option<f64>,
    /// Less-than threshold
    pub lt: Option<f64>,
    /// Minimum change between notifications
    pub st: Option<f64>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pmin(mut self, seconds: u32) -> Self {
        self.pmin = Some(seconds);
        self
    }

    pub fn with_pmax(mut self, seconds: u32) -> Self {
        self.pmax = Some(seconds);
        self
    }

    pub fn with_gt(mut self, value: f64) -> Self {
        self.gt = Some(value);
        self
    }

    pub fn with_lt(mut self, value: f64) -> Self {
        self.lt = Some(value);
        self
    }

    pub fn with_st(mut self, value: f64) -> Self {
        self.st = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check the attribute combination is consistent
    pub fn validate(&self) -> Result<()> {
        if let (Some(pmin), Some(pmax)) = (self.pmin, self.pmax)
            && pmin > pmax
        {
            return Err(Lwm2mError::invalid_value(
                format!("pmin {} is greater than pmax {}", pmin, pmax),
                "attributes",
            ));
        }
        if let (Some(lt), Some(gt)) = (self.lt, self.gt)
            && lt >= gt
        {
            return Err(Lwm2mError::invalid_value(
                format!("lt {} must be lower than gt {}", lt, gt),
                "attributes",
            ));
        }
        Ok(())
    }

    /// Overlay the attributes set in `other`
    pub fn merge(&mut self, other: &AttributeSet) {
        self.pmin = other.pmin.or(self.pmin);
        self.pmax = other.pmax.or(self.pmax);
        self.gt = other.gt.or(self.gt);
        self.lt = other.lt.or(self.lt);
        self.st = other.st.or(self.st);
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = Vec::new();
        if let Some(v) = self.pmin {
            entries.push(("pmin", v.to_string()));
        }
        if let Some(v) = self.pmax {
            entries.push(("pmax", v.to_string()));
        }
        if let Some(v) = self.gt {
            entries.push(("gt", v.to_string()));
        }
        if let Some(v) = self.lt {
            entries.push(("lt", v.to_string()));
        }
        if let Some(v) = self.st {
            entries.push(("st", v.to_string()));
        }
        entries
    }

    /// URI query form, e.g. `pmin=10&pmax=60`
    pub fn to_query(&self) -> String {
        self.entries()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Parse a URI query; unknown parameters are rejected
    pub fn from_query(query: &str) -> Result<Self> {
        let mut attributes = Self::new();
        for param in query.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = param.split_once('=').ok_or_else(|| {
                Lwm2mError::invalid_value(format!("attribute '{}' has no value", param), "attributes")
            })?;
            let invalid = || {
                Lwm2mError::invalid_value(format!("invalid value for '{}': {}", name, value), "attributes")
            };
            match name {
                "pmin" => attributes.pmin = Some(value.parse().map_err(|_| invalid())?),
                "pmax" => attributes.pmax = Some(value.parse().map_err(|_| invalid())?),
                "gt" => attributes.gt = Some(value.parse().map_err(|_| invalid())?),
                "lt" => attributes.lt = Some(value.parse().map_err(|_| invalid())?),
                "st" => attributes.st = Some(value.parse().map_err(|_| invalid())?),
                _ => {
                    return Err(Lwm2mError::invalid_value(
                        format!("unknown attribute '{}'", name),
                        "attributes",
                    ));
                }
            }
        }
        Ok(attributes)
    }

    /// Attributes as link-format parameters, for discovery documents
    pub fn to_link_attributes(&self) -> Vec<(String, LinkAttributeValue)> {
        self.entries()
            .into_iter()
            .map(|(k, v)| {
                let value = match v.parse::<i64>() {
                    Ok(n) => LinkAttributeValue::Integer(n),
                    Err(_) => LinkAttributeValue::Token(v),
                };
                (k.to_string(), value)
            })
            .collect()
    }
}

/// A request sent by the server to a client
#[derive(Debug, Clone, PartialEq)]
pub enum DownlinkRequest {
    Read {
        path: Lwm2mPath,
    },
    /// Write a node; `replace` selects replace rather than partial update
    Write {
        path: Lwm2mPath,
        node: Lwm2mNode,
        replace: bool,
        format: ContentFormat,
    },
    WriteAttributes {
        path: Lwm2mPath,
        attributes: AttributeSet,
    },
    Execute {
        path: Lwm2mPath,
        arguments: Option<String>,
    },
    /// Create an object instance under an object
    Create {
        path: Lwm2mPath,
        instance: ObjectInstance,
        format: ContentFormat,
    },
    Delete {
        path: Lwm2mPath,
    },
    Discover {
        path: Lwm2mPath,
    },
    Observe {
        path: Lwm2mPath,
    },
}

fn target(path: &str, allowed: &[PathTier], kind: RequestKind) -> Result<Lwm2mPath> {
    let path: Lwm2mPath = path.parse()?;
    if !allowed.contains(&path.tier()) {
        return Err(Lwm2mError::MalformedPath(format!(
            "{} cannot target {:?} path {}",
            kind,
            path.tier(),
            path
        )));
    }
    Ok(path)
}

const ANY_NODE: &[PathTier] = &[PathTier::Object, PathTier::Instance, PathTier::Resource];

impl DownlinkRequest {
    pub fn read(path: &str) -> Result<Self> {
        Ok(Self::Read {
            path: target(path, ANY_NODE, RequestKind::Read)?,
        })
    }

    pub fn observe(path: &str) -> Result<Self> {
        Ok(Self::Observe {
            path: target(path, ANY_NODE, RequestKind::Observe)?,
        })
    }

    pub fn discover(path: &str) -> Result<Self> {
        Ok(Self::Discover {
            path: target(path, ANY_NODE, RequestKind::Discover)?,
        })
    }

    /// Replace the instance or resource at `path` with `node`, sent as TLV
    pub fn write(path: &str, node: impl Into<Lwm2mNode>) -> Result<Self> {
        Self::build_write(path, node.into(), true)
    }

    /// Update only the resources carried by `node`
    pub fn write_update(path: &str, node: impl Into<Lwm2mNode>) -> Result<Self> {
        Self::build_write(path, node.into(), false)
    }

    fn build_write(path: &str, node: Lwm2mNode, replace: bool) -> Result<Self> {
        let path = target(
            path,
            &[PathTier::Instance, PathTier::Resource],
            RequestKind::Write,
        )?;
        if !node.matches_tier(&path) {
            return Err(Lwm2mError::invalid_value(
                format!("{:?} node cannot be written here", node.kind()),
                path,
            ));
        }
        Ok(Self::Write {
            path,
            node,
            replace,
            format: ContentFormat::Tlv,
        })
    }

    pub fn write_attributes(path: &str, attributes: AttributeSet) -> Result<Self> {
        attributes.validate()?;
        Ok(Self::WriteAttributes {
            path: target(path, ANY_NODE, RequestKind::WriteAttributes)?,
            attributes,
        })
    }

    pub fn execute(path: &str, arguments: Option<&str>) -> Result<Self> {
        Ok(Self::Execute {
            path: target(path, &[PathTier::Resource], RequestKind::Execute)?,
            arguments: arguments.map(str::to_string),
        })
    }

    pub fn create(path: &str, instance: ObjectInstance) -> Result<Self> {
        Ok(Self::Create {
            path: target(path, &[PathTier::Object], RequestKind::Create)?,
            instance,
            format: ContentFormat::Tlv,
        })
    }

    pub fn delete(path: &str) -> Result<Self> {
        Ok(Self::Delete {
            path: target(path, &[PathTier::Instance], RequestKind::Delete)?,
        })
    }

    /// Use another payload format for Write or Create
    pub fn with_format(mut self, new_format: ContentFormat) -> Self {
        if let Self::Write { format, .. } | Self::Create { format, .. } = &mut self {
            *format = new_format;
        }
        self
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Read { .. } => RequestKind::Read,
            Self::Write { .. } => RequestKind::Write,
            Self::WriteAttributes { .. } => RequestKind::WriteAttributes,
            Self::Execute { .. } => RequestKind::Execute,
            Self::Create { .. } => RequestKind::Create,
            Self::Delete { .. } => RequestKind::Delete,
            Self::Discover { .. } => RequestKind::Discover,
            Self::Observe { .. } => RequestKind::Observe,
        }
    }

    /// Target path
    pub fn path(&self) -> &Lwm2mPath {
        match self {
            Self::Read { path }
            | Self::Write { path, .. }
            | Self::WriteAttributes { path, .. }
            | Self::Execute { path, .. }
            | Self::Create { path, .. }
            | Self::Delete { path }
            | Self::Discover { path }
            | Self::Observe { path } => path,
        }
    }
}

impl fmt::Display for DownlinkRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Resource;

    #[test]
    fn test_target_tiers() {
        assert!(DownlinkRequest::read("/3/0/1").is_ok());
        assert!(DownlinkRequest::read("/").is_err());
        assert!(DownlinkRequest::execute("/3/0/4", None).is_ok());
        assert!(DownlinkRequest::execute("/3/0", None).is_err());
        assert!(DownlinkRequest::create("/2", ObjectInstance::default()).is_ok());
        assert!(DownlinkRequest::create("/2/0", ObjectInstance::default()).is_err());
        assert!(DownlinkRequest::delete("/2/0").is_ok());
        assert!(matches!(
            DownlinkRequest::delete("/2"),
            Err(Lwm2mError::MalformedPath(_))
        ));
    }

    #[test]
    fn test_write_checks_node_shape() {
        assert!(DownlinkRequest::write("/3/0/14", Resource::single(14, "+02")).is_ok());
        assert!(matches!(
            DownlinkRequest::write("/3/0", Resource::single(14, "+02")),
            Err(Lwm2mError::InvalidValue { .. })
        ));

        let request = DownlinkRequest::write_update("/3/0", ObjectInstance::new(0, []))
            .unwrap()
            .with_format(ContentFormat::Json);
        assert!(matches!(
            request,
            DownlinkRequest::Write {
                replace: false,
                format: ContentFormat::Json,
                ..
            }
        ));
    }

    #[test]
    fn test_kind_and_display() {
        let request = DownlinkRequest::observe("/3/0/9").unwrap();
        assert_eq!(request.kind(), RequestKind::Observe);
        assert_eq!(request.path(), &Lwm2mPath::resource(3, 0, 9));
        assert_eq!(request.to_string(), "OBSERVE /3/0/9");
    }

    #[test]
    fn test_attribute_query() {
        let attributes = AttributeSet::new().with_pmin(10).with_pmax(60).with_gt(20.5);
        assert_eq!(attributes.to_query(), "pmin=10&pmax=60&gt=20.5");
        assert_eq!(AttributeSet::from_query("pmin=10&pmax=60&gt=20.5").unwrap(), attributes);
        assert!(AttributeSet::from_query("foo=1").is_err());
        assert!(AttributeSet::from_query("pmin=x").is_err());
    }

    #[test]
    fn test_attribute_validation() {
        assert!(AttributeSet::new().with_pmin(60).with_pmax(10).validate().is_err());
        assert!(AttributeSet::new().with_lt(30.0).with_gt(20.0).validate().is_err());
        assert!(DownlinkRequest::write_attributes("/3/0/9", AttributeSet::new().with_pmin(5)).is_ok());
    }

    #[test]
    fn test_attribute_merge() {
        let mut stored = AttributeSet::new().with_pmin(10).with_pmax(60);
        stored.merge(&AttributeSet::new().with_pmax(120));
        assert_eq!(stored, AttributeSet::new().with_pmin(10).with_pmax(120));
        assert!(AttributeSet::new().is_empty());
    }

    #[test]
    fn test_link_attributes() {
        let links = AttributeSet::new().with_pmin(10).with_st(0.5).to_link_attributes();
        assert_eq!(
            links,
            vec![
                ("pmin".to_string(), LinkAttributeValue::Integer(10)),
                ("st".to_string(), LinkAttributeValue::Token("0.5".into())),
            ]
        );
    }
}
