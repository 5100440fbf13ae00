//! Pattern table for locating product images in Amazon HTML.
//!
//! This file contains every selector and regex the extractor relies on.
//! Update this file when Amazon changes their page markup.
//!
//! **Update process**: When extraction fails, capture the HTML sample,
//! adjust the pattern order or add a pattern, and add a test fixture.
//! Order in [`IMAGE_PATTERNS`] is priority order: the first usable match wins.

use regex_lite::Regex;
use scraper::Selector;
use std::sync::LazyLock;

/// A named regex whose first capture group is an image URL.
pub struct ImagePattern {
    pub name: &'static str,
    pub regex: Regex,
}

impl ImagePattern {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self { name, regex: Regex::new(pattern).unwrap() }
    }
}

/// `data-a-dynamic-image` attribute: an HTML-escaped JSON map of URL to `[width, height]`.
pub static DYNAMIC_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-a-dynamic-image="([^"]+)""#).unwrap());

/// Opening of the `'colorImages': { 'initial': [...] }` gallery block.
///
/// Ends right before the array. Entries nest arrays and maps, so the array
/// itself is read with a JSON parser from the match end.
pub static COLOR_IMAGES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"['"]colorImages['"]\s*:\s*\{\s*['"]initial['"]\s*:\s*"#).unwrap()
});

/// Image URL patterns in priority order.
pub static IMAGE_PATTERNS: LazyLock<Vec<ImagePattern>> = LazyLock::new(|| {
    vec![
        // High resolution attributes
        ImagePattern::new("data-old-hires", r#"data-old-hires="(https://[^"]+)""#),
        ImagePattern::new("data-zoom-hires", r#"data-zoom-hires="(https://[^"]+)""#),
        // Main image elements
        ImagePattern::new("landing-image", r#"id="landingImage"[^>]+src="(https://[^"]+)""#),
        ImagePattern::new("img-blk-front", r#"id="imgBlkFront"[^>]+src="(https://[^"]+)""#),
        ImagePattern::new(
            "main-image-container",
            r#"id="main-image-container"[^>]+href="(https://[^"]+)""#,
        ),
        // Gallery JSON
        ImagePattern::new("json-large", r#""large":"(https://[^"]+\.jpg)""#),
        ImagePattern::new("json-main", r#""main":"(https://[^"]+\.jpg)""#),
        ImagePattern::new("json-main-url", r#""mainUrl":"(https://[^"]+)""#),
        // Fallback elements
        ImagePattern::new("image-name", r#"data-a-image-name="[^"]*"[^>]*src="(https://[^"]+)""#),
        ImagePattern::new("main-image", r#"id="main-image"[^>]+src="(https://[^"]+)""#),
        ImagePattern::new("dynamic-image-class", r#"class="a-dynamic-image"[^>]+src="(https://[^"]+)""#),
        // Attribute order variants, any scheme
        ImagePattern::new("img-blk-front-tag", r#"<img[^>]+id="imgBlkFront"[^>]+src="([^"]+)""#),
        ImagePattern::new("landing-image-tag", r#"<img[^>]+id="landingImage"[^>]+src="([^"]+)""#),
        ImagePattern::new("old-hires-tag", r#"<img[^>]+data-old-hires="([^"]+)""#),
        // Loose JSON keys
        ImagePattern::new("json-image-url", r#""imageUrl":"(https://[^"]+)""#),
        ImagePattern::new("json-hi-res", r#""hiRes":"(https://[^"]+)""#),
        ImagePattern::new("json-image", r#""image":"(https://[^"]+)""#),
        ImagePattern::new("json-thumb", r#""thumb":"(https://[^"]+)""#),
        ImagePattern::new("json-initial", r#""initial":"(https://[^"]+)""#),
    ]
});

/// Size tokens embedded in Amazon image URLs.
pub mod tokens {
    use super::*;

    /// Width-constrained size, e.g. `._SX300_`.
    pub static SX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\._SX\d+_").unwrap());

    /// Height-constrained size, e.g. `._SY450_`.
    pub static SY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\._SY\d+_").unwrap());

    /// Resize-to-box size, e.g. `._SR38,50_`.
    pub static SR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\._SR\d+,\d+_").unwrap());

    /// Image id and extension, e.g. `/images/I/71abcDEF12L._AC_SX679_.jpg`.
    pub static IMAGE_ID: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"/images/I/([^.]+).*\.(jpg|png)").unwrap());
}

/// Selectors for detecting anti-bot and error pages.
pub mod errors {
    use super::*;

    /// CAPTCHA form.
    pub static CAPTCHA: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            "form[action*='validateCaptcha'], \
             img[src*='captcha']",
        )
        .unwrap()
    });

    /// Dog page (Amazon's 503 error page). Product pages for pet supplies
    /// carry "dog" in image alt text, so only the page's own wording counts.
    pub static DOG_PAGE: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            "img[alt*='Dogs of Amazon'], \
             a[href='/ref=cs_503_link']",
        )
        .unwrap()
    });

    /// Page title, checked for "Robot Check".
    pub static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_patterns_compile() {
        // Force evaluation of all lazy statics
        assert_eq!(IMAGE_PATTERNS.len(), 19);
        let _ = &*DYNAMIC_IMAGE;
        let _ = &*COLOR_IMAGES;
        let _ = &*tokens::SX;
        let _ = &*tokens::IMAGE_ID;
        let _ = &*errors::CAPTCHA;
        let _ = &*errors::DOG_PAGE;
    }

    #[test]
    fn test_pattern_names_unique() {
        let mut names: Vec<_> = IMAGE_PATTERNS.iter().map(|p| p.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), IMAGE_PATTERNS.len());
    }

    #[test]
    fn test_landing_image_pattern() {
        let html = r#"<img alt="x" id="landingImage" class="a-dynamic-image" src="https://m.media-amazon.com/images/I/71abc._AC_SX679_.jpg">"#;
        let pattern = IMAGE_PATTERNS.iter().find(|p| p.name == "landing-image").unwrap();
        let caps = pattern.regex.captures(html).unwrap();
        assert_eq!(&caps[1], "https://m.media-amazon.com/images/I/71abc._AC_SX679_.jpg");
    }

    #[test]
    fn test_color_images_pattern() {
        let script = "var data = {\n 'colorImages': { 'initial': [{\"hiRes\":\"https://a/1.jpg\"}]},\n 'x': 1 };";
        let found = COLOR_IMAGES.find(script).unwrap();
        assert!(script[found.end()..].starts_with(r#"[{"hiRes""#));
    }

    #[test]
    fn test_image_id_pattern() {
        let caps = tokens::IMAGE_ID
            .captures("https://m.media-amazon.com/images/I/71abcDEF12L._AC_SX679_.jpg")
            .unwrap();
        assert_eq!(&caps[1], "71abcDEF12L");
        assert_eq!(&caps[2], "jpg");
    }

    #[test]
    fn test_captcha_selector() {
        let doc = Html::parse_document(r#"<form action="/errors/validateCaptcha"></form>"#);
        assert!(doc.select(&errors::CAPTCHA).next().is_some());
    }
}
