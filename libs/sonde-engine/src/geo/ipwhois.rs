use super::{GeoInfo, GeoProbe, GeoProvider, fetch};
use crate::dial::Dialer;
use crate::error::GeoError;
use crate::httping::{DEFAULT_BUF, HttpProbe};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub struct IpWhois;

const ENDPOINT: &str = "104.21.14.178:80";
const HOST: &str = "ipwhois.app";
const PATH: &str = "/json/";

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
    isp: String,
}

fn parse(body: &[u8]) -> Result<GeoInfo, GeoError> {
    let payload: Payload =
        serde_json::from_slice(body).map_err(|e| GeoError::Parse(e.to_string()))?;
    Ok(GeoInfo {
        ip: payload.ip,
        country: payload.country,
        region: payload.region,
        city: payload.city,
        isp: payload.isp,
        hostname: String::new(),
    })
}

#[async_trait]
impl GeoProvider for IpWhois {
    fn name(&self) -> &'static str {
        "ipwhois"
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
