pub mod outbound_repo;

pub use outbound_repo::{OutboundRepository, OutboundStore};
