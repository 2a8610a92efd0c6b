//! Per-request inputs to hit counting: client IP, session cookie and the
//! resolved visitor identity.

pub mod ip_extractor;
pub mod session;
pub mod visit;

pub use ip_extractor::extract_client_ip;
pub use session::SessionSigner;
pub use visit::Visit;
