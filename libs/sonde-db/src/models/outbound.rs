use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Closed set of outbound protocol discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundType {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    Socks,
    Hysteria,
    Hysteria2,
    Tuic,
    Wireguard,
    Anytls,
    Direct,
    Block,
    Selector,
    Urltest,
    Dns,
}

impl OutboundType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vmess" => Some(Self::Vmess),
            "vless" => Some(Self::Vless),
            "trojan" => Some(Self::Trojan),
            "shadowsocks" => Some(Self::Shadowsocks),
            "socks" => Some(Self::Socks),
            "hysteria" => Some(Self::Hysteria),
            "hysteria2" => Some(Self::Hysteria2),
            "tuic" => Some(Self::Tuic),
            "wireguard" => Some(Self::Wireguard),
            "anytls" => Some(Self::Anytls),
            "direct" => Some(Self::Direct),
            "block" => Some(Self::Block),
            "selector" => Some(Self::Selector),
            "urltest" => Some(Self::Urltest),
            "dns" => Some(Self::Dns),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vmess => "vmess",
            Self::Vless => "vless",
            Self::Trojan => "trojan",
            Self::Shadowsocks => "shadowsocks",
            Self::Socks => "socks",
            Self::Hysteria => "hysteria",
            Self::Hysteria2 => "hysteria2",
            Self::Tuic => "tuic",
            Self::Wireguard => "wireguard",
            Self::Anytls => "anytls",
            Self::Direct => "direct",
            Self::Block => "block",
            Self::Selector => "selector",
            Self::Urltest => "urltest",
            Self::Dns => "dns",
        }
    }

    /// Synthetic outbounds never terminate traffic at a proxy server and are
    /// never probed.
    pub fn is_synthetic(&self) -> bool {
        matches!(
            self,
            Self::Direct | Self::Block | Self::Selector | Self::Urltest | Self::Dns
        )
    }

    /// UDP-only transports have no TCP listener on `server:server_port`, so a
    /// TCP reachability handshake would always fail.
    pub fn is_udp_only(&self) -> bool {
        matches!(
            self,
            Self::Hysteria | Self::Hysteria2 | Self::Tuic | Self::Wireguard
        )
    }
}

impl std::fmt::Display for OutboundType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown outbound type {0:?}")]
pub struct UnknownTypeError(String);

impl FromStr for OutboundType {
    type Err = UnknownTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownTypeError(s.to_string()))
    }
}

/// A named outbound configuration plus the probe-derived fields the engine
/// maintains. `config` is the protocol-specific JSON dictionary, stored
/// opaquely and parsed on demand via [`Outbound::endpoint`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outbound {
    pub id: i64,
    pub tag: String,
    #[serde(rename = "type")]
    pub kind: OutboundType,
    pub config: String,

    #[serde(rename = "landingIP", default)]
    pub landing_ip: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub isp: String,
    #[serde(rename = "ipType", default)]
    pub ip_type: String,
    #[serde(rename = "fraudScore", default)]
    pub fraud_score: i32,
    #[serde(default)]
    pub available: bool,
    #[serde(rename = "lastTestTime", default)]
    pub last_test_time: i64,
    #[serde(default)]
    pub latency: i32,
    #[serde(rename = "realLatency", default)]
    pub real_latency: i32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Outbound {
    /// Parse the opaque config into the endpoint fields the probing engine
    /// needs. Everything else rides along in `extra`.
    pub fn endpoint(&self) -> Result<EndpointConfig> {
        let ep: EndpointConfig = serde_json::from_str(&self.config)
            .with_context(|| format!("invalid config for outbound {}", self.tag))?;
        if ep.server.trim().is_empty() || ep.server_port == 0 {
            bail!("outbound {} is missing server or server_port", self.tag);
        }
        Ok(ep)
    }
}

/// Typed view over the protocol-specific config dictionary. Only the fields
/// the prober consumes are named; unknown keys are preserved in `extra` so a
/// decode-reencode round trip does not lose them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub server_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
