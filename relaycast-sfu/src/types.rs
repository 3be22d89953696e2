//! Wire-level types for the SFU control plane
//!
//! These mirror the parameter blobs exchanged during transport and
//! producer/consumer negotiation. The SFU never interprets SDP or media
//! bytes; it only needs enough structure for the codec compatibility
//! check and for describing transports to clients.

use relaycast_core::Error;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Media kind of a producer or consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl FromStr for MediaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(Error::InvalidInput(format!(
                "unknown media kind \"{other}\", expected \"audio\" or \"video\""
            ))),
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One codec a capability set or parameter set can handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpCodecCapability {
    /// e.g. "video/VP8", "audio/opus"
    pub mime_type: String,
    pub clock_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_payload_type: Option<u8>,
}

/// Set of codecs a router or client can handle
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RtpCapabilities {
    pub codecs: Vec<RtpCodecCapability>,
}

impl RtpCapabilities {
    /// Capabilities every router starts with: VP8 video and opus audio.
    #[must_use]
    pub fn router_default() -> Self {
        Self {
            codecs: vec![
                RtpCodecCapability {
                    mime_type: "video/VP8".to_string(),
                    clock_rate: 90000,
                    channels: None,
                    preferred_payload_type: Some(101),
                },
                RtpCodecCapability {
                    mime_type: "audio/opus".to_string(),
                    clock_rate: 48000,
                    channels: Some(2),
                    preferred_payload_type: Some(96),
                },
            ],
        }
    }
}

/// Codec parameters a producer was created with
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RtpParameters {
    pub codecs: Vec<RtpCodecCapability>,
}

/// Whether a capability set can consume a producer's media.
///
/// True iff the capabilities contain a codec matching one of the
/// producer's codecs on mime type (case-insensitive), clock rate, and
/// channel count.
#[must_use]
pub fn can_consume(capabilities: &RtpCapabilities, producer_params: &RtpParameters) -> bool {
    producer_params.codecs.iter().any(|produced| {
        capabilities.codecs.iter().any(|offered| {
            offered.mime_type.eq_ignore_ascii_case(&produced.mime_type)
                && offered.clock_rate == produced.clock_rate
                && offered.channels == produced.channels
        })
    })
}

/// DTLS certificate fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtlsFingerprint {
    pub algorithm: String,
    pub value: String,
}

/// DTLS handshake parameters for one side of a transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtlsParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub fingerprints: Vec<DtlsFingerprint>,
}

/// ICE credentials for a transport (the SFU side is ICE-lite)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceParameters {
    pub username_fragment: String,
    pub password: String,
    pub ice_lite: bool,
}

/// One ICE candidate the SFU listens on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub foundation: String,
    pub priority: u32,
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    #[serde(rename = "type")]
    pub candidate_type: String,
}

/// Direction of a transport relative to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    Send,
    Recv,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp8_producer() -> RtpParameters {
        RtpParameters {
            codecs: vec![RtpCodecCapability {
                mime_type: "video/vp8".to_string(),
                clock_rate: 90000,
                channels: None,
                preferred_payload_type: None,
            }],
        }
    }

    #[test]
    fn test_media_kind_parse() {
        assert_eq!("video".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert_eq!("AUDIO".parse::<MediaKind>().unwrap(), MediaKind::Audio);
        assert!("subtitles".parse::<MediaKind>().is_err());
    }

    #[test]
    fn test_can_consume_matches_case_insensitively() {
        // Router advertises "video/VP8", producer used "video/vp8"
        assert!(can_consume(&RtpCapabilities::router_default(), &vp8_producer()));
    }

    #[test]
    fn test_can_consume_rejects_clock_rate_mismatch() {
        let mut producer = vp8_producer();
        producer.codecs[0].clock_rate = 48000;
        assert!(!can_consume(&RtpCapabilities::router_default(), &producer));
    }

    #[test]
    fn test_can_consume_rejects_channel_mismatch() {
        let producer = RtpParameters {
            codecs: vec![RtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48000,
                channels: Some(1),
                preferred_payload_type: None,
            }],
        };
        assert!(!can_consume(&RtpCapabilities::router_default(), &producer));
    }

    #[test]
    fn test_can_consume_rejects_unknown_codec() {
        let producer = RtpParameters {
            codecs: vec![RtpCodecCapability {
                mime_type: "video/H264".to_string(),
                clock_rate: 90000,
                channels: None,
                preferred_payload_type: None,
            }],
        };
        assert!(!can_consume(&RtpCapabilities::router_default(), &producer));
    }

    #[test]
    fn test_ice_candidate_type_field_name() {
        let candidate = IceCandidate {
            foundation: "udpcandidate".to_string(),
            priority: 1_076_302_079,
            ip: "127.0.0.1".to_string(),
            port: 40000,
            protocol: "udp".to_string(),
            candidate_type: "host".to_string(),
        };

        let json = serde_json::to_value(&candidate).unwrap();
        assert_eq!(json["type"], "host");
    }
}
