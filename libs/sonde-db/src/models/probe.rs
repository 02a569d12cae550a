use serde::{Deserialize, Serialize};

/// Coarse classification of a landing IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpType {
    Hosting,
    #[serde(rename = "ISP")]
    Isp,
    Business,
}

impl IpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hosting => "Hosting",
            Self::Isp => "ISP",
            Self::Business => "Business",
        }
    }
}

impl std::fmt::Display for IpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory record built per probe run. Field names on the wire match the
/// persisted outbound shape consumed by the panel UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub tag: String,
    pub server: String,
    pub port: u16,
    #[serde(rename = "landingIP")]
    pub landing_ip: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub isp: String,
    pub ip_type: String,
    pub fraud_score: i32,
    pub available: bool,
    pub last_test_time: i64,
    pub latency: i32,
    pub real_latency: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn new(tag: &str, server: &str, port: u16) -> Self {
        Self {
            tag: tag.to_string(),
            server: server.to_string(),
            port,
            ..Default::default()
        }
    }

    pub fn set_error(&mut self, err: impl ToString) {
        self.error = Some(err.to_string());
    }
}
