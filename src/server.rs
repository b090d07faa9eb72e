pub mod direct;
pub mod filter;
pub mod listener;
pub mod proxy;

pub use filter::{FilterDecision, PathFilter};
pub use listener::serve;
pub use proxy::Forwarder;
