// Cloudflare WAF client.
//
// Custom rules live in the `http_request_firewall_custom` phase ruleset of a
// zone or account; IP blocking uses the IP Access Rules API. Every response
// is wrapped in the `{ success, errors, messages, result }` envelope.

pub mod client;
pub mod types;

pub use client::{CloudflareClient, Scope};
