//! Security utilities.
//!
//! Signed upload URLs authorise writes to a bucket on their own, so they are
//! scrubbed before being logged or displayed.

pub mod credential_scrubber;

pub use credential_scrubber::{safe_error_message, scrub_signed_url};
