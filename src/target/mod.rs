//! Resolution of a configured host into API and CDN origins.
//!
//! Both site families serve their API from the base domain and file content
//! from numbered CDN subdomains of the same domain. Resolution is pure; the
//! network probe for a working API host lives in [`discovery`].

pub mod discovery;

pub use discovery::{DiscoveryError, DiscoveryPolicy};

use std::fmt;

/// CDN subdomain prefixes, tried in order before the base domain.
pub const CDN_PREFIXES: &[&str] = &["n1", "n2", "n3", "n4"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteFamily {
    Kemono,
    Coomer,
    /// A host outside the known families, used as given.
    Custom,
}

impl SiteFamily {
    /// Classify a bare domain, returning the family and its current domain.
    fn classify(domain: &str) -> (Self, Option<&'static str>) {
        match domain {
            "kemono.su" | "kemono.party" => (SiteFamily::Kemono, Some("kemono.su")),
            "coomer.su" | "coomer.party" => (SiteFamily::Coomer, Some("coomer.su")),
            _ => (SiteFamily::Custom, None),
        }
    }
}

impl fmt::Display for SiteFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteFamily::Kemono => f.write_str("kemono"),
            SiteFamily::Coomer => f.write_str("coomer"),
            SiteFamily::Custom => f.write_str("custom"),
        }
    }
}

/// API origin plus the ordered download hosts for one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    family: SiteFamily,
    scheme: String,
    base_domain: String,
    cdn_hosts: Vec<String>,
}

impl ResolvedTarget {
    /// Resolve a host string such as `kemono.party`, `https://www.coomer.su/`
    /// or `example.net`.
    pub fn resolve(host: &str) -> Self {
        let mut domain = host.trim().to_ascii_lowercase();
        for prefix in ["https://", "http://"] {
            if let Some(rest) = domain.strip_prefix(prefix) {
                domain = rest.to_string();
            }
        }
        let domain = domain
            .split('/')
            .next()
            .unwrap_or_default()
            .trim_start_matches("www.")
            .to_string();

        let (family, canonical) = SiteFamily::classify(&domain);
        if let Some(canonical) = canonical {
            if canonical != domain {
                tracing::debug!("Normalised legacy host {} to {}", domain, canonical);
            }
        }
        let base_domain = canonical.map(str::to_string).unwrap_or(domain);
        let cdn_hosts = CDN_PREFIXES
            .iter()
            .map(|prefix| format!("{}.{}", prefix, base_domain))
            .collect();

        Self {
            family,
            scheme: "https".to_string(),
            base_domain,
            cdn_hosts,
        }
    }

    /// Target with explicit origins, for mirrors and local test servers.
    pub fn with_origin(scheme: &str, base_domain: &str, cdn_hosts: Vec<String>) -> Self {
        Self {
            family: SiteFamily::Custom,
            scheme: scheme.to_string(),
            base_domain: base_domain.to_string(),
            cdn_hosts,
        }
    }

    pub fn family(&self) -> SiteFamily {
        self.family
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    pub fn cdn_hosts(&self) -> &[String] {
        &self.cdn_hosts
    }

    /// Number of download hosts: every CDN host plus the base domain.
    pub fn host_count(&self) -> usize {
        self.cdn_hosts.len() + 1
    }

    /// Download host for a failover index; `cdn_hosts.len()` is the base domain.
    pub fn download_host(&self, index: usize) -> &str {
        self.cdn_hosts
            .get(index)
            .map(String::as_str)
            .unwrap_or(&self.base_domain)
    }

    /// `scheme://host` for an arbitrary host of this target.
    pub fn origin_for(&self, host: &str) -> String {
        format!("{}://{}", self.scheme, host)
    }

    pub fn api_origin(&self) -> String {
        self.origin_for(&self.base_domain)
    }

    pub fn download_url(&self, remote_path: &str, file_name: &str, index: usize) -> String {
        let path = if remote_path.starts_with('/') {
            remote_path.to_string()
        } else {
            format!("/{}", remote_path)
        };
        format!(
            "{}/data{}?f={}",
            self.origin_for(self.download_host(index)),
            path,
            urlencoding::encode(file_name)
        )
    }

    pub fn posts_url(&self, api_host: &str, service: &str, user_id: &str, offset: usize) -> String {
        format!(
            "{}/api/v1/{}/user/{}/posts?o={}",
            self.origin_for(api_host),
            service,
            urlencoding::encode(user_id),
            offset
        )
    }

    pub fn profile_url(&self, api_host: &str, service: &str, user_id: &str) -> String {
        format!(
            "{}/api/v1/{}/user/{}/profile",
            self.origin_for(api_host),
            service,
            urlencoding::encode(user_id)
        )
    }
}
