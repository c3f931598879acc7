pub mod money;
pub mod response;
pub mod sentry;
