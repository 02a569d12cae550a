pub mod outbound;
pub mod probe;

pub use outbound::{EndpointConfig, Outbound, OutboundType};
pub use probe::{IpType, ProbeResult};
