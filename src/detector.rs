use crate::utils::extract_domain;
use crate::Platform;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::trace;
use url::Url;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("URL pattern is valid"));

/// Hosts eligible for preview. A host matches an entry when it equals it or is a subdomain of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedDomains {
    domains: BTreeSet<String>,
}

impl Default for SupportedDomains {
    fn default() -> Self {
        Self::new(["x.com", "twitter.com", "reddit.com"])
    }
}

impl SupportedDomains {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .filter_map(|d| normalize_domain(d.as_ref()))
            .collect();
        Self { domains }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        if let Some(domain) = normalize_domain(domain) {
            self.domains.insert(domain);
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn is_supported(&self, host: &str) -> bool {
        self.matching_entry(host).is_some()
    }

    /// Which platform a supported host belongs to, if it is one the preview service knows.
    pub fn platform_for(&self, host: &str) -> Option<Platform> {
        match self.matching_entry(host)? {
            "x.com" | "twitter.com" => Some(Platform::Twitter),
            "reddit.com" => Some(Platform::Reddit),
            _ => None,
        }
    }

    fn matching_entry(&self, host: &str) -> Option<&str> {
        self.iter().find(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

fn normalize_domain(domain: &str) -> Option<String> {
    let domain = domain.trim().to_ascii_lowercase();
    let domain = domain.strip_prefix("www.").unwrap_or(&domain);
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_string())
    }
}

/// Finds the first link in free text that points at a supported domain.
#[derive(Debug, Clone, Default)]
pub struct UrlDetector {
    domains: SupportedDomains,
}

impl UrlDetector {
    pub fn new(domains: SupportedDomains) -> Self {
        Self { domains }
    }

    pub fn domains(&self) -> &SupportedDomains {
        &self.domains
    }

    pub fn detect(&self, text: &str) -> Option<String> {
        URL_PATTERN
            .find_iter(text)
            .map(|m| m.as_str())
            .find(|candidate| self.accepts(candidate))
            .map(str::to_string)
    }

    fn accepts(&self, candidate: &str) -> bool {
        let parsed = match Url::parse(candidate) {
            Ok(parsed) => parsed,
            Err(e) => {
                trace!(candidate = %candidate, error = %e, "Skipping malformed URL token");
                return false;
            }
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }

        extract_domain(candidate).is_some_and(|host| self.domains.is_supported(&host))
    }
}

/// Detects the first supported URL using the default allowlist.
pub fn detect_url(text: &str) -> Option<String> {
    static DEFAULT_DETECTOR: LazyLock<UrlDetector> = LazyLock::new(UrlDetector::default);
    DEFAULT_DETECTOR.detect(text)
}
