//! Authorization server metadata consumed by sessions.
//!
//! [`ProviderDescriptor`] carries the issuer used for ID-token checks, the HTTPS endpoints for
//! authorization, token exchange, and logout, and the client authentication preference.

pub mod descriptor;

pub use descriptor::*;
