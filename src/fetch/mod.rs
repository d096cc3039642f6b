//! Upstream access: the fetch capability, its HTTP implementation, retry
//! policy, and the single-flight coordinator that fills the entry cache.

pub mod coordinator;
pub mod http;
pub mod retry;
pub mod source;

pub use coordinator::FetchCoordinator;
pub use http::HttpSource;
pub use retry::RetryConfig;
pub use source::EntitySource;
