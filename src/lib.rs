//! janua — authentication and session lifecycle service.
//!
//! Issues and redeems single-use email-verification and password-reset
//! tokens, establishes and validates cookie sessions, and keeps the local
//! user-profile store reconciled with the external identity provider.

pub mod api;
pub mod cli;
pub mod idp;
pub mod mailer;
