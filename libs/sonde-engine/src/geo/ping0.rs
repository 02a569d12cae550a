use super::{GeoInfo, GeoProbe, GeoProvider, fetch};
use crate::dial::Dialer;
use crate::error::GeoError;
use crate::httping::{HttpProbe, LARGE_BUF};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;

/// ping0.cc answers plain text when asked with a curl user agent:
///
/// ```text
/// 203.0.113.9 (static.example.net)
/// United States California Los Angeles — 示例运营商
/// ...
/// Example Carrier Inc.
/// ```
///
/// Line 1 is `IP (hostname)` or a bare IP, line 2 is location plus the
/// Chinese ISP name, line 4 (when present) is the English ISP name. The
/// markup shifts occasionally, so parsing is strict on the IP and lenient on
/// everything after it.
pub struct Ping0;

const ENDPOINT: &str = "104.21.16.196:80";
const HOST: &str = "ping0.cc";
const PATH: &str = "/geo";

fn parse(text: &str) -> Result<GeoInfo, GeoError> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let first = lines
        .first()
        .copied()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| GeoError::Parse("empty ping0 response".to_string()))?;

    let (ip, hostname) = match first.split_once(" (") {
        Some((ip, rest)) => (ip.trim(), rest.trim_end_matches(')').trim()),
        None => (first, ""),
    };
    if ip.parse::<IpAddr>().is_err() {
        return Err(GeoError::Parse(format!("ping0 first line {first:?} has no IP")));
    }

    let mut info = GeoInfo {
        ip: ip.to_string(),
        hostname: hostname.to_string(),
        ..Default::default()
    };

    if let Some(line) = lines.get(1).filter(|l| !l.is_empty()) {
        let (location, isp_zh) = match line.split_once('—') {
            Some((left, right)) => (left.trim(), right.trim()),
            None => (*line, ""),
        };
        let mut parts = location.split_whitespace();
        info.country = parts.next().unwrap_or_default().to_string();
        info.region = parts.next().unwrap_or_default().to_string();
        info.city = parts.collect::<Vec<_>>().join(" ");
        info.isp = isp_zh.to_string();
    }

    // English ISP name wins over the Chinese one when present.
    if let Some(line) = lines.get(3).filter(|l| !l.is_empty()) {
        info.isp = line.to_string();
    }

    Ok(info)
}

#[async_trait]
impl GeoProvider for Ping0 {
    fn name(&self) -> &'static str {
        "ping0"
    }

    async fn lookup(&self, dialer: Arc<dyn Dialer>) -> Result<GeoProbe, GeoError> {
        let probe = HttpProbe {
            method: "GET",
            path: PATH,
            host: HOST,
            extra_headers: &[("User-Agent", "curl/7.68.0")],
        };
        let resp = fetch(&dialer, ENDPOINT, &probe, LARGE_BUF).await?;
        let info = parse(&String::from_utf8_lossy(&resp.body))?;
        Ok(GeoProbe {
            info,
            elapsed_ms: resp.elapsed_ms,
        })
    }
}
