use super::{GeoInfo, GeoProbe, GeoProvider, fetch};
use crate::dial::Dialer;
use crate::error::GeoError;
use crate::httping::{DEFAULT_BUF, HttpProbe};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub struct IpInfo;

const ENDPOINT: &str = "34.117.59.81:80";
const HOST: &str = "ipinfo.io";
const PATH: &str = "/json";

#[derive(Deserialize)]
struct Payload {
    #[serde(default)]
    ip: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    org: String,
    #[serde(default)]
    hostname: String,
}

fn parse(body: &[u8]) -> Result<GeoInfo, GeoError> {
    let payload: Payload =
        serde_json::from_slice(body).map_err(|e| GeoError::Parse(e.to_string()))?;
    Ok(GeoInfo {
        ip: payload.ip,
        country: payload.country,
        region: payload.region,
        city: payload.city,
        isp: payload.org,
        hostname: payload.hostname,
    })
}

#[async_trait]
impl GeoProvider for IpInfo {
    fn name(&self) -> &'static str {
        "ipinfo"
    }

    async fn lookup(&self, dialer: Arc<dyn Dialer>) -> Result<GeoProbe, GeoError> {
        let probe = HttpProbe {
            method: "GET",
            path: PATH,
            host: HOST,
            extra_headers: &[],
        };
        let resp = fetch(&dialer, ENDPOINT, &probe, DEFAULT_BUF).await?;
        let info = parse(&resp.body)?;
        Ok(GeoProbe {
            info,
            elapsed_ms: resp.elapsed_ms,
        })
    }
}
