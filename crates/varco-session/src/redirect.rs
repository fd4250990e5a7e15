//! Post-login redirect safety

use tracing::warn;
use url::Url;

use varco_core::RedirectSettings;

/// Validates post-login destinations against the configured domain
/// whitelist before any redirect is emitted. Anything that fails
/// validation silently falls back; this component never errors toward
/// its caller.
pub struct SecureRedirectDispatcher {
    site_base: String,
    whitelist: Vec<String>,
}

impl SecureRedirectDispatcher {
    pub fn new(site_base: impl Into<String>, settings: &RedirectSettings) -> Self {
        let whitelist = settings
            .domain_whitelist
            .iter()
            .filter_map(|entry| normalize_domain(entry))
            .collect();

        Self {
            site_base: site_base.into().trim_end_matches('/').to_string(),
            whitelist,
        }
    }

    /// Resolve a destination to a safe URL, or the fallback route.
    ///
    /// A destination starting with a single `/` is internal and resolved
    /// against the site base. Absolute URLs pass only when their host is
    /// a whitelisted domain or one of its subdomains.
    pub fn resolve(&self, destination: &str, fallback_route: &str) -> String {
        let destination = destination.trim();
        if destination.is_empty() {
            return self.internal(fallback_route);
        }

        if destination.starts_with('/') && !destination.starts_with("//") {
            return self.internal(destination);
        }

        match Url::parse(destination) {
            Ok(parsed) => {
                let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
                if self.host_allowed(&host) {
                    destination.to_string()
                } else {
                    warn!(destination = %destination, "Untrusted redirect destination, using fallback");
                    self.internal(fallback_route)
                }
            }
            Err(_) => {
                warn!(destination = %destination, "Malformed redirect destination, using fallback");
                self.internal(fallback_route)
            }
        }
    }

    fn host_allowed(&self, host: &str) -> bool {
        if host.is_empty() {
            return false;
        }
        self.whitelist
            .iter()
            .any(|entry| host == entry || host.ends_with(&format!(".{entry}")))
    }

    fn internal(&self, route: &str) -> String {
        format!("{}/{}", self.site_base, route.trim_start_matches('/'))
    }
}

/// Strip scheme and path from a whitelist entry, keep the bare host
fn normalize_domain(entry: &str) -> Option<String> {
    let entry = entry.trim().to_ascii_lowercase();
    if entry.is_empty() {
        return None;
    }

    let without_scheme = entry
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(&entry);
    let host = without_scheme
        .split(['/', ':'])
        .next()
        .unwrap_or_default()
        .trim_matches('.');

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> SecureRedirectDispatcher {
        SecureRedirectDispatcher::new(
            "https://portal.comune.test",
            &RedirectSettings {
                domain_whitelist: vec![
                    "trusted.org".to_string(),
                    "https://servizi.comune.test/path".to_string(),
                ],
            },
        )
    }

    #[test]
    fn test_empty_destination_falls_back() {
        let d = dispatcher();
        assert_eq!(d.resolve("", "/"), "https://portal.comune.test/");
        assert_eq!(d.resolve("  ", "home"), "https://portal.comune.test/home");
    }

    #[test]
    fn test_internal_path_is_always_safe() {
        let d = dispatcher();
        assert_eq!(
            d.resolve("/a/b", "/"),
            "https://portal.comune.test/a/b"
        );
    }

    #[test]
    fn test_protocol_relative_is_not_internal() {
        let d = dispatcher();
        assert_eq!(d.resolve("//evil.test/x", "/"), "https://portal.comune.test/");
    }

    #[test]
    fn test_unlisted_host_falls_back() {
        let d = dispatcher();
        assert_eq!(
            d.resolve("https://evil.test/x", "/"),
            "https://portal.comune.test/"
        );
    }

    #[test]
    fn test_whitelisted_host_passes_verbatim() {
        let d = dispatcher();
        assert_eq!(
            d.resolve("https://trusted.org/x?y=1", "/"),
            "https://trusted.org/x?y=1"
        );
    }

    #[test]
    fn test_subdomain_of_whitelisted_host_passes() {
        let d = dispatcher();
        assert_eq!(
            d.resolve("https://sub.trusted.org/x", "/"),
            "https://sub.trusted.org/x"
        );
    }

    #[test]
    fn test_suffix_lookalike_host_rejected() {
        let d = dispatcher();
        assert_eq!(
            d.resolve("https://nottrusted.org/x", "/"),
            "https://portal.comune.test/"
        );
    }

    #[test]
    fn test_whitelist_entries_are_normalized() {
        let d = dispatcher();
        assert_eq!(
            d.resolve("https://servizi.comune.test/area", "/"),
            "https://servizi.comune.test/area"
        );
    }

    #[test]
    fn test_malformed_destination_falls_back() {
        let d = dispatcher();
        assert_eq!(d.resolve("ht!tp:::bad", "/"), "https://portal.comune.test/");
    }
}
