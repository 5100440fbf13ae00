//! Amazon storefronts and detection of the storefront behind a product link.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Amazon storefronts recognized in product links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    #[default]
    Us,
    Ca,
    Uk,
    De,
    Fr,
    It,
    Es,
    Jp,
    Au,
    In,
    Mx,
    Br,
    Nl,
    Sg,
    Ae,
    Sa,
    Se,
    Pl,
    Tr,
}

impl Site {
    /// Returns the Amazon domain for this site.
    pub fn domain(&self) -> &'static str {
        match self {
            Site::Us => "amazon.com",
            Site::Ca => "amazon.ca",
            Site::Uk => "amazon.co.uk",
            Site::De => "amazon.de",
            Site::Fr => "amazon.fr",
            Site::It => "amazon.it",
            Site::Es => "amazon.es",
            Site::Jp => "amazon.co.jp",
            Site::Au => "amazon.com.au",
            Site::In => "amazon.in",
            Site::Mx => "amazon.com.mx",
            Site::Br => "amazon.com.br",
            Site::Nl => "amazon.nl",
            Site::Sg => "amazon.sg",
            Site::Ae => "amazon.ae",
            Site::Sa => "amazon.sa",
            Site::Se => "amazon.se",
            Site::Pl => "amazon.pl",
            Site::Tr => "amazon.com.tr",
        }
    }

    /// Upper-case storefront code, as shown in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Site::Us => "US",
            Site::Ca => "CA",
            Site::Uk => "UK",
            Site::De => "DE",
            Site::Fr => "FR",
            Site::It => "IT",
            Site::Es => "ES",
            Site::Jp => "JP",
            Site::Au => "AU",
            Site::In => "IN",
            Site::Mx => "MX",
            Site::Br => "BR",
            Site::Nl => "NL",
            Site::Sg => "SG",
            Site::Ae => "AE",
            Site::Sa => "SA",
            Site::Se => "SE",
            Site::Pl => "PL",
            Site::Tr => "TR",
        }
    }

    /// Returns the storefront root URL.
    pub fn base_url(&self) -> String {
        format!("https://www.{}", self.domain())
    }

    /// Returns the Accept-Language header value for this site.
    pub fn accept_language(&self) -> &'static str {
        match self {
            Site::Us | Site::Ca | Site::Au | Site::Sg => "en-US,en;q=0.9",
            Site::Uk => "en-GB,en;q=0.9",
            Site::De => "de-DE,de;q=0.9,en;q=0.8",
            Site::Fr => "fr-FR,fr;q=0.9,en;q=0.8",
            Site::Es | Site::Mx => "es-ES,es;q=0.9,en;q=0.8",
            Site::It => "it-IT,it;q=0.9,en;q=0.8",
            Site::Jp => "ja-JP,ja;q=0.9,en;q=0.8",
            Site::In => "en-IN,en;q=0.9,hi;q=0.8",
            Site::Br => "pt-BR,pt;q=0.9,en;q=0.8",
            Site::Nl => "nl-NL,nl;q=0.9,en;q=0.8",
            Site::Se => "sv-SE,sv;q=0.9,en;q=0.8",
            Site::Pl => "pl-PL,pl;q=0.9,en;q=0.8",
            Site::Ae | Site::Sa => "en-AE,en;q=0.9,ar;q=0.8",
            Site::Tr => "tr-TR,tr;q=0.9,en;q=0.8",
        }
    }

    /// Returns all supported sites.
    pub fn all() -> &'static [Site] {
        &[
            Site::Us,
            Site::Ca,
            Site::Uk,
            Site::De,
            Site::Fr,
            Site::It,
            Site::Es,
            Site::Jp,
            Site::Au,
            Site::In,
            Site::Mx,
            Site::Br,
            Site::Nl,
            Site::Sg,
            Site::Ae,
            Site::Sa,
            Site::Se,
            Site::Pl,
            Site::Tr,
        ]
    }

    /// Detects the storefront from a product URL.
    ///
    /// Matches the host against each domain as a suffix, longest domain
    /// first, so `amazon.com.au` never resolves to `amazon.com`. Anything
    /// unrecognized is treated as the US store.
    pub fn from_url(raw: &str) -> Site {
        let with_scheme = if raw.starts_with("http") { raw.to_string() } else { format!("https://{raw}") };

        let host = url::Url::parse(&with_scheme)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .unwrap_or_default();

        let mut sites: Vec<Site> = Site::all().to_vec();
        sites.sort_by_key(|s| std::cmp::Reverse(s.domain().len()));

        sites
            .into_iter()
            .find(|site| host == site.domain() || host.ends_with(&format!(".{}", site.domain())))
            .unwrap_or_default()
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code().to_lowercase())
    }
}

impl FromStr for Site {
    type Err = SiteParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        let wanted = if wanted == "gb" { "uk".to_string() } else { wanted };
        Site::all()
            .iter()
            .copied()
            .find(|site| site.code().eq_ignore_ascii_case(&wanted) || site.domain() == wanted)
            .ok_or(SiteParseError(s.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct SiteParseError(String);

impl fmt::Display for SiteParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown Amazon site '{}'. Run `sites` to list valid codes", self.0)
    }
}

impl std::error::Error for SiteParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url_common_sites() {
        assert_eq!(Site::from_url("https://www.amazon.com/dp/B08N5WRWNW"), Site::Us);
        assert_eq!(Site::from_url("https://www.amazon.co.uk/dp/B08N5WRWNW"), Site::Uk);
        assert_eq!(Site::from_url("https://www.amazon.de/dp/B08N5WRWNW"), Site::De);
        assert_eq!(Site::from_url("https://www.amazon.co.jp/dp/B08N5WRWNW"), Site::Jp);
        assert_eq!(Site::from_url("https://amazon.ca/dp/B08N5WRWNW"), Site::Ca);
    }

    #[test]
    fn test_from_url_prefers_longest_domain() {
        assert_eq!(Site::from_url("https://www.amazon.com.au/dp/B08N5WRWNW"), Site::Au);
        assert_eq!(Site::from_url("https://www.amazon.com.mx/dp/B08N5WRWNW"), Site::Mx);
        assert_eq!(Site::from_url("https://www.amazon.com.br/dp/B08N5WRWNW"), Site::Br);
        assert_eq!(Site::from_url("https://www.amazon.com.tr/dp/B08N5WRWNW"), Site::Tr);
    }

    #[test]
    fn test_from_url_without_scheme() {
        assert_eq!(Site::from_url("www.amazon.fr/dp/B08N5WRWNW"), Site::Fr);
    }

    #[test]
    fn test_from_url_unknown_defaults_to_us() {
        assert_eq!(Site::from_url("https://example.com/product"), Site::Us);
        assert_eq!(Site::from_url(""), Site::Us);
        // Look-alike hosts must not match by substring
        assert_eq!(Site::from_url("https://notamazon.de.example.org/x"), Site::Us);
    }

    #[test]
    fn test_site_parsing() {
        assert_eq!("us".parse::<Site>().unwrap(), Site::Us);
        assert_eq!("UK".parse::<Site>().unwrap(), Site::Uk);
        assert_eq!("gb".parse::<Site>().unwrap(), Site::Uk);
        assert_eq!("amazon.co.jp".parse::<Site>().unwrap(), Site::Jp);
        let err = "zz".parse::<Site>().unwrap_err();
        assert!(err.to_string().contains("zz"));
    }

    #[test]
    fn test_site_all() {
        let all = Site::all();
        assert_eq!(all.len(), 19);
        assert!(all.contains(&Site::Sg));
        assert!(all.contains(&Site::Tr));
    }

    #[test]
    fn test_base_url_and_display() {
        assert_eq!(Site::Uk.base_url(), "https://www.amazon.co.uk");
        assert_eq!(Site::Uk.to_string(), "uk");
        assert_eq!(Site::default(), Site::Us);
    }

    #[test]
    fn test_accept_language() {
        assert!(Site::De.accept_language().starts_with("de-DE"));
        assert!(Site::Jp.accept_language().starts_with("ja-JP"));
    }

    #[test]
    fn test_site_serde() {
        let json = serde_json::to_string(&Site::Au).unwrap();
        assert_eq!(json, "\"au\"");
        let parsed: Site = serde_json::from_str("\"se\"").unwrap();
        assert_eq!(parsed, Site::Se);
    }
}
