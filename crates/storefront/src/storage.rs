//! Object storage URL rewriting.
//!
//! Product rows store image *keys*. Anything shown to a customer or sent to
//! the payment gateway needs an absolute URL instead.

use url::Url;

/// Converts storage keys into public URLs.
pub trait ObjectStorage: Send + Sync {
    /// Public URL for `key`. Keys that are already absolute URLs pass through.
    fn public_url(&self, key: &str) -> String;
}

/// A bucket served from a fixed public base URL.
#[derive(Debug, Clone)]
pub struct PublicBucket {
    base: Url,
}

impl PublicBucket {
    /// Create a bucket rooted at `base`.
    ///
    /// A missing trailing slash is added so keys resolve beneath the base
    /// path instead of replacing its last segment.
    #[must_use]
    pub fn new(mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { base }
    }
}

impl ObjectStorage for PublicBucket {
    fn public_url(&self, key: &str) -> String {
        if key.starts_with("https://") || key.starts_with("http://") {
            return key.to_string();
        }
        self.base
            .join(key.trim_start_matches('/'))
            .map_or_else(|_| format!("{}{key}", self.base), String::from)
    }
}
