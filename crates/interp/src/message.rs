//! The message envelope
//!
//! One envelope shape serves events, requests, and responses across every
//! destination the renderer channel knows about. The scheduler only
//! processes events in this revision; the other types are routed but their
//! receipt is a logic error.

use hvml_variant::Variant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Event,
    Request,
    Response,
    Void,
}

/// Which destination the envelope addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgTarget {
    Session,
    Workspace,
    PlainWindow,
    Widget,
    Dom,
    User,
    Coroutine,
    Broadcast,
}

/// How `element_value` identifies the observed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Id,
    Handle,
    Css,
    Variant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Void,
    Json,
    Text,
}

/// Event combination policy when queues coalesce bursts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOpt {
    Keep,
    Overwrite,
    Ignore,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub msg_type: MsgType,
    pub target: MsgTarget,
    pub target_value: u64,
    pub reduce_opt: ReduceOpt,
    pub source_uri: Option<Variant>,
    pub element_type: ElementType,
    pub element_value: Option<Variant>,
    pub event_name: Option<Variant>,
    pub data_type: DataType,
    pub data: Option<Variant>,
}

impl Message {
    /// An event envelope addressed to one coroutine.
    pub fn event(
        target: MsgTarget,
        target_value: u64,
        observed: Option<Variant>,
        event_name: &str,
        data: Option<Variant>,
    ) -> Message {
        Message {
            msg_type: MsgType::Event,
            target,
            target_value,
            reduce_opt: ReduceOpt::Keep,
            source_uri: None,
            element_type: ElementType::Variant,
            element_value: observed,
            event_name: Some(Variant::string(event_name)),
            data_type: if data.is_some() {
                DataType::Json
            } else {
                DataType::Void
            },
            data,
        }
    }

    /// Attach a JSON text payload, parsed into a variant.
    pub fn with_json_data(mut self, json: &str) -> Result<Message, serde_json::Error> {
        self.data = Some(hvml_variant::serialize::from_json_str(json)?);
        self.data_type = DataType::Json;
        Ok(self)
    }

    /// Clone the envelope for a different coroutine (broadcast fan-out).
    pub fn clone_retargeted(&self, target_value: u64) -> Message {
        let mut clone = self.clone();
        clone.target = MsgTarget::Coroutine;
        clone.target_value = target_value;
        clone
    }

    pub fn event_name_str(&self) -> Option<&str> {
        self.event_name.as_ref().and_then(|v| v.as_str())
    }
}

/// Split `"type[:subtype]"` into its parts.
pub fn parse_event_name(name: &str) -> (&str, Option<&str>) {
    match name.split_once(':') {
        Some((ty, sub)) => (ty, Some(sub)),
        None => (name, None),
    }
}
