//! # auth-adapters
//!
//! Everything that decides who a caller is and whether they may act:
//! address-based identity resolution and the HTTP clients for the remote
//! IP-reputation and CAPTCHA services.

pub mod identity;
#[cfg(feature = "remote-http")]
pub mod remote;

pub use identity::AddressIdentityResolver;
#[cfg(feature = "remote-http")]
pub use remote::{HttpCaptchaVerifier, HttpReputationChecker};
