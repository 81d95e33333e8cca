// doorman-api: Async Rust clients for remote firewall providers (Vercel + Cloudflare)

pub mod cloudflare;
pub mod error;
pub mod rate_limit;
pub mod transport;
pub mod vercel;

pub use cloudflare::{CloudflareClient, Scope};
pub use error::Error;
pub use rate_limit::RateLimitInfo;
pub use transport::{ApiClient, ApiRequest, RetryPolicy, TransportConfig};
pub use vercel::VercelClient;
