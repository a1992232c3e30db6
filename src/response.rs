//! Typed responses, one case per request kind

use std::fmt;

use crate::coap_types::ResponseCode;
use crate::link::LinkObject;
use crate::node::Lwm2mNode;
use crate::request::RequestKind;

/// Response to a [`DownlinkRequest`](crate::request::DownlinkRequest)
#[derive(Debug, Clone, PartialEq)]
pub enum Lwm2mResponse {
    /// `content` is set for CONTENT responses only
    Read {
        code: ResponseCode,
        content: Option<Lwm2mNode>,
    },
    Observe {
        code: ResponseCode,
        content: Option<Lwm2mNode>,
    },
    Discover {
        code: ResponseCode,
        links: Vec<LinkObject>,
    },
    /// `location` is the path of the created instance, e.g. `2/1`
    Create {
        code: ResponseCode,
        location: Option<String>,
    },
    Write {
        code: ResponseCode,
    },
    WriteAttributes {
        code: ResponseCode,
    },
    Execute {
        code: ResponseCode,
    },
    Delete {
        code: ResponseCode,
    },
}

impl Lwm2mResponse {
    /// Status-only response for the given request kind
    pub fn status(kind: RequestKind, code: ResponseCode) -> Self {
        match kind {
            RequestKind::Read => Self::Read { code, content: None },
            RequestKind::Observe => Self::Observe { code, content: None },
            RequestKind::Discover => Self::Discover {
                code,
                links: Vec::new(),
            },
            RequestKind::Create => Self::Create {
                code,
                location: None,
            },
            RequestKind::Write => Self::Write { code },
            RequestKind::WriteAttributes => Self::WriteAttributes { code },
            RequestKind::Execute => Self::Execute { code },
            RequestKind::Delete => Self::Delete { code },
        }
    }

    pub fn code(&self) -> ResponseCode {
        match self {
            Self::Read { code, .. }
            | Self::Observe { code, .. }
            | Self::Discover { code, .. }
            | Self::Create { code, .. }
            | Self::Write { code }
            | Self::WriteAttributes { code }
            | Self::Execute { code }
            | Self::Delete { code } => *code,
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Read { .. } => RequestKind::Read,
            Self::Observe { .. } => RequestKind::Observe,
            Self::Discover { .. } => RequestKind::Discover,
            Self::Create { .. } => RequestKind::Create,
            Self::Write { .. } => RequestKind::Write,
            Self::WriteAttributes { .. } => RequestKind::WriteAttributes,
            Self::Execute { .. } => RequestKind::Execute,
            Self::Delete { .. } => RequestKind::Delete,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code().is_success()
    }

    /// Decoded node of a Read or Observe response
    pub fn content(&self) -> Option<&Lwm2mNode> {
        match self {
            Self::Read { content, .. } | Self::Observe { content, .. } => content.as_ref(),
            _ => None,
        }
    }

    pub fn links(&self) -> &[LinkObject] {
        match self {
            Self::Discover { links, .. } => links,
            _ => &[],
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Create { location, .. } => location.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Lwm2mResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.code())?;
        match self {
            Self::Read { content: Some(node), .. } | Self::Observe { content: Some(node), .. } => {
                write!(f, " {:?} #{}", node.kind(), node.id())
            }
            Self::Discover { links, .. } if !links.is_empty() => write!(f, " {} links", links.len()),
            Self::Create { location: Some(location), .. } => write!(f, " at {}", location),
            _ => Ok(()),
        }
    }
}
