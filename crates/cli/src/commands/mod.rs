//! CLI command implementations.

pub mod migrate;
pub mod quote;
pub mod seed;
pub mod webhook;

use secrecy::SecretString;

/// Storefront database URL from the environment (`.env` honoured).
pub(crate) fn database_url() -> Option<SecretString> {
    dotenvy::dotenv().ok();
    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
        .map(SecretString::from)
}
