// Data carried through the relay: the closed platform set, the inbound payload
// shape and the normalized message that is serialized into ring slots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownPlatform;

/// Chat platforms the relay accepts. Each one gets its own producer worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    Twitch,
    YouTube,
    Kick,
    Facebook,
    TikTok,
    Discord,
    Bilibili,
    X,
    Trovo,
}

impl Platform {
    pub const ALL: [Platform; 9] = [
        Platform::Twitch,
        Platform::YouTube,
        Platform::Kick,
        Platform::Facebook,
        Platform::TikTok,
        Platform::Discord,
        Platform::Bilibili,
        Platform::X,
        Platform::Trovo,
    ];

    /// Canonical name, as it appears in serialized messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Twitch => "Twitch",
            Platform::YouTube => "YouTube",
            Platform::Kick => "Kick",
            Platform::Facebook => "Facebook",
            Platform::TikTok => "TikTok",
            Platform::Discord => "Discord",
            Platform::Bilibili => "Bilibili",
            Platform::X => "X",
            Platform::Trovo => "Trovo",
        }
    }

    /// Lowercase route tag, e.g. `youtube`.
    pub fn route(self) -> String {
        self.as_str().to_ascii_lowercase()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive, so both route tags and canonical names parse.
impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(tag))
            .ok_or_else(|| UnknownPlatform(s.to_owned()))
    }
}

/// Raw body of an inbound chat event, before validation.
///
/// The platform is not part of the body; it comes from the route the payload
/// arrived on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundPayload {
    #[serde(default)]
    pub streamer_id: Option<String>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_vip: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_sub: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_mod: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A normalized chat message, the unit of work flowing through the queue.
///
/// Built once by the producer and only ever copied by value afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Opaque unique identifier, a UUID v4 string when assigned by the producer.
    pub id: String,
    pub streamer_id: String,
    pub user: String,
    pub text: String,
    pub platform: Platform,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_vip: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_sub: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_mod: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Message {
    /// Broadcast room for this message: `streamer:{streamerId}`.
    pub fn room(&self) -> String {
        crate::Relay::collaborators::room_name(&self.streamer_id)
    }
}
