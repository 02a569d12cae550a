use super::{GeoInfo, GeoProbe, GeoProvider, fetch};
use crate::dial::Dialer;
use crate::error::GeoError;
use crate::httping::{DEFAULT_BUF, HttpProbe};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// ip-api.com, pinned to its anycast IP so the lookup never depends on the
/// outbound route's DNS posture.
pub struct IpApi;

const ENDPOINT: &str = "208.95.112.1:80";
const HOST: &str = "ip-api.com";
const PATH: &str = "/json/?fields=status,message,country,regionName,city,isp,query,reverse";

#[derive(Deserialize)]
struct Payload {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    country: String,
    #[serde(default, rename = "regionName")]
    region_name: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    isp: String,
    #[serde(default)]
    query: String,
    #[serde(default)]
    reverse: String,
}

fn parse(body: &[u8]) -> Result<GeoInfo, GeoError> {
    let payload: Payload =
        serde_json::from_slice(body).map_err(|e| GeoError::Parse(e.to_string()))?;
    if payload.status != "success" {
        return Err(GeoError::Parse(format!(
            "ip-api status {:?}: {}",
            payload.status, payload.message
        )));
    }
    Ok(GeoInfo {
        ip: payload.query,
        country: payload.country,
        region: payload.region_name,
        city: payload.city,
        isp: payload.isp,
        hostname: payload.reverse,
    })
}

#[async_trait]
impl GeoProvider for IpApi {
    fn name(&self) -> &'static str {
        "ip-api"
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
