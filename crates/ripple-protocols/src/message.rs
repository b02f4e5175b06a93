//! Line-delimited JSON messages.
//!
//! Every message is a single JSON object on its own line:
//!
//! ```text
//! {"src":"c1","dest":"n1","body":{"type":"broadcast","msg_id":3,"message":42}}
//! ```
//!
//! Field names and `type` strings are fixed by the harness and must not change.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{BroadcastValue, NodeId, TopologyMap};

/// Per-node message identifier used for request/reply correlation.
pub type MsgId = u64;

/// A message addressed from `src` to `dest`.
///
/// The body type defaults to a decoded [`Body`]; `Envelope<serde_json::Value>`
/// is used to read the addressing of a message before its body is validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<B = Body> {
    pub src: NodeId,
    pub dest: NodeId,
    pub body: B,
}

impl<B> Envelope<B> {
    pub fn new(src: impl Into<NodeId>, dest: impl Into<NodeId>, body: B) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            body,
        }
    }
}

impl Envelope {
    /// Encode as a single line of JSON (without the trailing newline).
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Message body: correlation ids plus the typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<MsgId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<MsgId>,

    #[serde(flatten)]
    pub payload: Payload,
}

impl Body {
    pub fn new(payload: Payload) -> Self {
        Self {
            msg_id: None,
            in_reply_to: None,
            payload,
        }
    }

    #[must_use]
    pub fn with_msg_id(mut self, msg_id: MsgId) -> Self {
        self.msg_id = Some(msg_id);
        self
    }

    #[must_use]
    pub fn in_reply_to(mut self, msg_id: Option<MsgId>) -> Self {
        self.in_reply_to = msg_id;
        self
    }

    /// Decode a raw JSON body.
    ///
    /// Unknown `type` values are reported as [`Error::NotSupported`] so the
    /// caller can answer with the right code; anything else that fails to
    /// decode is [`Error::Malformed`].
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let kind = match value.get("type").and_then(serde_json::Value::as_str) {
            Some(kind) => kind.to_string(),
            None => return Err(Error::Malformed("body has no string `type`".into())),
        };

        if !Payload::KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(Error::NotSupported(kind));
        }

        serde_json::from_value(value).map_err(|e| Error::Malformed(format!("{}: {}", kind, e)))
    }
}

/// Typed message payload, tagged by the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Init {
        node_id: NodeId,
        node_ids: Vec<NodeId>,
    },
    InitOk,
    Broadcast {
        message: BroadcastValue,
    },
    BroadcastOk,
    Read,
    ReadOk {
        messages: Vec<BroadcastValue>,
    },
    Topology {
        topology: TopologyMap,
    },
    TopologyOk,
    Generate,
    GenerateOk {
        id: String,
    },
    Error {
        code: u32,
        text: String,
    },
}

impl Payload {
    /// Every `type` string this node can decode.
    pub const KNOWN_TYPES: [&'static str; 11] = [
        "init",
        "init_ok",
        "broadcast",
        "broadcast_ok",
        "read",
        "read_ok",
        "topology",
        "topology_ok",
        "generate",
        "generate_ok",
        "error",
    ];

    /// The `type` string of this payload.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::InitOk => "init_ok",
            Self::Broadcast { .. } => "broadcast",
            Self::BroadcastOk => "broadcast_ok",
            Self::Read => "read",
            Self::ReadOk { .. } => "read_ok",
            Self::Topology { .. } => "topology",
            Self::TopologyOk => "topology_ok",
            Self::Generate => "generate",
            Self::GenerateOk { .. } => "generate_ok",
            Self::Error { .. } => "error",
        }
    }

    /// Build an `error` payload from a local error.
    pub fn from_error(err: &Error) -> Self {
        Self::Error {
            code: err.code().as_u32(),
            text: err.to_string(),
        }
    }
}
