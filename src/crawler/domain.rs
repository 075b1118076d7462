//! Domain checks for link following and redirect guarding

use url::Url;

use crate::crawler::error::CrawlError;

/// Lowercased host of `url` without port, if it has one
pub fn host_of(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Hosts an entity is allowed to fetch from
///
/// Built from the seed URL: its host both with and without the `www.`
/// prefix. Subdomains of either variant are allowed as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedDomains {
    variants: Vec<String>,
}

impl AllowedDomains {
    /// Build the list from an entity's seed URL; fails when it has no host
    pub fn from_seed(seed: &Url) -> Result<Self, CrawlError> {
        let host = host_of(seed)
            .ok_or_else(|| CrawlError::Other(format!("Seed URL has no host: {}", seed)))?;

        let variants = match host.strip_prefix("www.") {
            Some(bare) => vec![host.clone(), bare.to_string()],
            None => vec![host.clone(), format!("www.{}", host)],
        };

        Ok(Self { variants })
    }

    /// Host variants, the seed's own host first
    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    /// Whether `url` is on an allowed host or one of its subdomains
    pub fn allows(&self, url: &Url) -> bool {
        let Some(host) = host_of(url) else {
            return false;
        };
        self.variants
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
    }
}

/// Resolve `hrefs` against `page` and keep same-host http(s) links
///
/// Fragments are stripped and duplicates removed, preserving document order.
pub fn same_domain_links(page: &Url, hrefs: &[String]) -> Vec<Url> {
    let Some(page_host) = host_of(page) else {
        return Vec::new();
    };

    let mut links: Vec<Url> = Vec::new();
    for href in hrefs {
        let Ok(mut link) = page.join(href.trim()) else {
            continue;
        };
        if !matches!(link.scheme(), "http" | "https") {
            continue;
        }
        if host_of(&link).as_deref() != Some(page_host.as_str()) {
            continue;
        }
        link.set_fragment(None);
        if !links.contains(&link) {
            links.push(link);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_variants_from_bare_host() {
        let allowed = AllowedDomains::from_seed(&url("https://lutry.ch")).unwrap();
        assert_eq!(allowed.variants(), ["lutry.ch", "www.lutry.ch"]);
    }

    #[test]
    fn test_variants_from_www_host() {
        let allowed = AllowedDomains::from_seed(&url("https://WWW.Morges.ch:8443/fr")).unwrap();
        assert_eq!(allowed.variants(), ["www.morges.ch", "morges.ch"]);
    }

    #[test]
    fn test_allows_rejects_offsite() {
        let allowed = AllowedDomains::from_seed(&url("https://www.lutry.ch/")).unwrap();
        assert!(allowed.allows(&url("https://lutry.ch/energie")));
        assert!(allowed.allows(&url("http://www.lutry.ch/")));
        assert!(allowed.allows(&url("https://guichet.lutry.ch/")));
        assert!(!allowed.allows(&url("https://notlutry.ch/")));
        assert!(!allowed.allows(&url("https://pully.ch/")));
    }

    #[test]
    fn test_seed_without_host() {
        assert!(AllowedDomains::from_seed(&url("mailto:info@lutry.ch")).is_err());
    }

    #[test]
    fn test_same_domain_links() {
        let page = url("https://lutry.ch/vivre/energie");
        let hrefs: Vec<String> = [
            "/subventions",
            "photovoltaique#aides",
            "photovoltaique",
            "https://www.lutry.ch/autre",
            "https://vd.ch/energie",
            "mailto:greffe@lutry.ch",
            "javascript:void(0)",
            "//lutry.ch/doc.pdf",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let links: Vec<String> = same_domain_links(&page, &hrefs)
            .into_iter()
            .map(|u| u.to_string())
            .collect();

        assert_eq!(
            links,
            vec![
                "https://lutry.ch/subventions",
                "https://lutry.ch/vivre/photovoltaique",
                "https://lutry.ch/doc.pdf",
            ]
        );
    }
}
