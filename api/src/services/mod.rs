pub mod access;
pub mod billing;
pub mod cookies;
pub mod error;
pub mod google;
pub mod ingest;
pub mod mailer;
pub mod ordering;
pub mod session;
pub mod stripe;
pub mod twitter;
