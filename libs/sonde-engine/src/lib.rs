pub mod classify;
pub mod dial;
pub mod error;
pub mod geo;
pub mod httping;
pub mod prober;
pub mod scheduler;
pub mod socks5;

pub use dial::{BoxedConn, DialProvider, Dialer, OutboundAdapter, OutboundRegistry, ProxyConnection};
pub use error::{DialError, GeoError, ProbeError};
pub use prober::Prober;
pub use scheduler::{DEFAULT_ENRICH_CONCURRENCY, DEFAULT_PROBE_CONCURRENCY};
pub use sonde_db::models::{Outbound, OutboundType, ProbeResult};
