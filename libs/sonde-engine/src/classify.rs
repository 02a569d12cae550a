//! Landing-IP classification: keyword-rule IP typing plus the scamalytics
//! fraud-score scrape.

use crate::dial::Dialer;
use crate::error::GeoError;
use crate::httping::{self, HttpProbe, LARGE_BUF};
use once_cell::sync::Lazy;
use regex::Regex;
use sonde_db::models::IpType;
use std::sync::Arc;

const HOSTING_HOSTNAME_HINTS: &[&str] = &[
    "ec2",
    "compute",
    "cloud",
    "vps",
    "server",
    "hosting",
    "datacenter",
    "colocation",
    "azure",
    "googleusercontent",
    "amazonaws",
    "linode",
    "vultr",
    "digitalocean",
    "oracle",
    "alibaba",
    "tencent",
    "kamatera",
    "hetzner",
    "ovh",
    "choopa",
    "leaseweb",
    "m247",
    "fly.io",
    "cloudflare",
    "fastly",
    "akamai",
    "cdn",
];

const HOSTING_ISP_HINTS: &[&str] = &[
    "cloud",
    "vps",
    "data",
    "hosting",
    "server",
    "solution",
    "tech",
    "network",
    "amazon",
    "google",
    "microsoft",
    "oracle",
    "aliyun",
    "tencent",
    "digitalocean",
    "vultr",
    "linode",
    "hetzner",
    "ovh",
    "leaseweb",
    "choopa",
    "m247",
    "fly.io",
    "cloudflare",
    "fastly",
    "akamai",
    "cdn",
];

const ISP_HINTS: &[&str] = &[
    "telecom",
    "mobile",
    "cable",
    "broadband",
    "internet",
    "comcast",
    "verizon",
    "spectrum",
    "t-mobile",
    "vodafone",
    "att",
    "orange",
    "deutsche telekom",
    "telefonica",
    "bt",
    "virgin",
    "sky",
    "charter",
    "cox",
    "century",
];

/// Infer the IP class from ISP and reverse-hostname keywords. Hostname rules
/// take precedence over ISP rules; first match wins within a group. Returns
/// `None` only when both inputs are empty.
pub fn infer_ip_type(isp: &str, hostname: &str) -> Option<IpType> {
    let isp = isp.trim().to_ascii_lowercase();
    let hostname = hostname.trim().to_ascii_lowercase();

    if isp.is_empty() && hostname.is_empty() {
        return None;
    }
    if !hostname.is_empty() && HOSTING_HOSTNAME_HINTS.iter().any(|h| hostname.contains(h)) {
        return Some(IpType::Hosting);
    }
    if HOSTING_ISP_HINTS.iter().any(|h| isp.contains(h)) {
        return Some(IpType::Hosting);
    }
    if ISP_HINTS.iter().any(|h| isp.contains(h)) {
        return Some(IpType::Isp);
    }
    Some(IpType::Business)
}

static FRAUD_SCORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Fraud Score:\s*(\d+)").expect("fraud score pattern must compile"));

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Extract a fraud score from scamalytics markup. Falls back to the risk
/// banner when the score label is missing; `None` means the page carried
/// neither.
pub fn parse_fraud_score(html: &str) -> Option<i32> {
    if let Some(caps) = FRAUD_SCORE_RE.captures(html) {
        if let Ok(score) = caps[1].parse::<i32>() {
            return Some(score.min(100));
        }
    }
    if html.contains("High Risk") {
        return Some(75);
    }
    if html.contains("Medium Risk") {
        return Some(50);
    }
    if html.contains("Low Risk") {
        return Some(15);
    }
    None
}

/// Fetches the scamalytics report for a landing IP through the outbound
/// route. Failures are the caller's to swallow; a missing score is 0.
#[derive(Clone)]
pub struct FraudChecker {
    host: String,
}

impl Default for FraudChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl FraudChecker {
    pub fn new() -> Self {
        Self {
            host: "scamalytics.com".to_string(),
        }
    }

    pub fn with_host(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub async fn score(&self, dialer: &Arc<dyn Dialer>, landing_ip: &str) -> Result<i32, GeoError> {
        let conn = dialer.dial(&format!("{}:443", self.host)).await?;
        let mut conn = httping::wrap_tls(conn, &self.host).await?;

        let path = format!("/ip/{landing_ip}");
        let probe = HttpProbe {
            method: "GET",
            path: &path,
            host: &self.host,
            extra_headers: &[("User-Agent", BROWSER_UA)],
        };
        let resp = httping::send_probe(conn.as_mut(), &probe, LARGE_BUF).await?;
        let text = String::from_utf8_lossy(&resp.body);
        Ok(parse_fraud_score(&text).unwrap_or(0))
    }
}
