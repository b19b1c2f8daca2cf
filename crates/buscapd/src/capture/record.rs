//! Normalised metadata for one observed bus message.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::monitor::{BusMessage, FieldError};

/// Class of an observed bus message, serialised as its wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Method call (`1`).
    MethodCall,
    /// Method return (`2`).
    MethodReturn,
    /// Error reply (`3`).
    Error,
    /// Signal emission (`4`).
    Signal,
}

impl MessageKind {
    /// Wire code used by the D-Bus header.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::MethodCall => 1,
            Self::MethodReturn => 2,
            Self::Error => 3,
            Self::Signal => 4,
        }
    }

    /// Maps a wire code back to its kind.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::MethodCall),
            2 => Some(Self::MethodReturn),
            3 => Some(Self::Error),
            4 => Some(Self::Signal),
            _ => None,
        }
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| de::Error::custom(format!("unknown message type code {code}")))
    }
}

/// One captured message.
///
/// Optional fields are omitted from the serialised form when the bus
/// reported no value, so "absent" never collapses into an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cookie: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_cookie: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    member: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
    timestamp: u64,
}

impl CaptureRecord {
    /// Reads every header field of `message` into a record.
    ///
    /// Fields the message does not carry stay absent. A failing accessor
    /// means the message is malformed; the whole conversion fails so the
    /// caller can skip it instead of persisting a partial record.
    pub fn observe<M>(message: &M, timestamp: u64) -> Result<Self, FieldError>
    where
        M: BusMessage + ?Sized,
    {
        Ok(Self {
            kind: message.kind()?,
            cookie: message.cookie()?,
            reply_cookie: message.reply_cookie()?,
            path: message.path()?,
            interface: message.interface()?,
            sender: message.sender()?,
            destination: message.destination()?,
            member: message.member()?,
            signature: message.signature()?,
            timestamp,
        })
    }

    /// Message class.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Serial number of the message.
    #[must_use]
    pub const fn cookie(&self) -> Option<u64> {
        self.cookie
    }

    /// Serial of the call this message answers.
    #[must_use]
    pub const fn reply_cookie(&self) -> Option<u64> {
        self.reply_cookie
    }

    /// Object path.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Interface name.
    #[must_use]
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Unique name of the sender.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Destination bus name.
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Method or signal name.
    #[must_use]
    pub fn member(&self) -> Option<&str> {
        self.member.as_deref()
    }

    /// Body type signature.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Capture time in seconds since the Unix epoch.
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Seconds since the Unix epoch by the local wall clock.
///
/// A clock set before 1970 yields `0` rather than failing the capture.
#[must_use]
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}
