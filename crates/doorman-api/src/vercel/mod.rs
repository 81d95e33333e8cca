// Vercel Firewall API client.
//
// Endpoints live under /v1/security/firewall/config and are scoped by the
// `projectId` / `teamId` query parameters. Auth: `Authorization: Bearer`.

pub mod client;
pub mod types;

pub use client::VercelClient;
