pub mod auth;
pub mod tls;

pub use auth::{AuthProvider, MemoryAuthProvider};
pub use tls::TlsConfig;
