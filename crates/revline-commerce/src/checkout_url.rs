//! Checkout URL canonicalisation.

use url::Url;

/// Rewrite `raw` so it points at the canonical checkout host, preserving
/// path, query, and port.
///
/// An absolute URL keeps everything but its hostname. Anything that does not
/// parse as an absolute URL is treated as a path relative to the canonical
/// host. Parse failures are recovered here — they are never surfaced to the
/// user, who at worst lands on the checkout root.
pub fn rewrite_checkout_url(raw: &str, canonical_base: &Url) -> Url {
  if let Ok(mut url) = Url::parse(raw) {
    if let Some(host) = canonical_base.host_str() {
      if url.set_host(Some(host)).is_ok() {
        return url;
      }
    }
  }
  canonical_base
    .join(raw)
    .unwrap_or_else(|_| canonical_base.clone())
}
