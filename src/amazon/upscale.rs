//! Size-token rewriting for Amazon image URLs.
//!
//! Amazon serves the same image at many sizes; the size lives in a token
//! between the image id and the extension (`._AC_SX679_`, `._SY450_`, ...).

use crate::amazon::patterns::tokens;

/// Canonical image sizes tried when optimizing, largest first.
pub const CANDIDATE_SIZES: [u32; 4] = [1500, 1200, 1000, 800];

/// Default target edge length.
pub const DEFAULT_SIZE: u32 = 1500;

/// Host serving canonical product images.
const MEDIA_HOST: &str = "https://m.media-amazon.com/images/I";

/// Rewrites the first recognized size token to request `size` pixels.
///
/// Tokens are checked in order `._AC_`, `_SX`, `_SY`, `_SR`; only the first
/// kind present is rewritten. URLs already carrying `_SL{size}_` are left alone.
pub fn upscale(url: &str, size: u32) -> String {
    let sl = format!("_SL{size}_");

    if !url.contains(&sl) && url.contains("._AC_") {
        url.replace("._AC_", &format!("._AC_SL{size}_"))
    } else if url.contains("_SX") {
        tokens::SX.replace_all(url, format!("._SX{size}_").as_str()).into_owned()
    } else if url.contains("_SY") {
        tokens::SY.replace_all(url, format!("._SY{size}_").as_str()).into_owned()
    } else if url.contains("_SR") {
        tokens::SR.replace_all(url, format!("._SR{size},{size}_").as_str()).into_owned()
    } else {
        url.to_string()
    }
}

/// Extracts the image id and extension (`jpg` or `png`).
pub fn image_id(url: &str) -> Option<(String, String)> {
    let caps = tokens::IMAGE_ID.captures(url)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Builds the canonical media URL for an image id.
pub fn canonical_url(id: &str, ext: &str, size: u32) -> String {
    format!("{MEDIA_HOST}/{id}._AC_SL{size}_.{ext}")
}

/// Cuts everything after the first `._` and requests the `size` rendition.
pub fn high_quality(url: &str, size: u32) -> String {
    let base = url.split("._").next().unwrap_or(url);
    format!("{base}._AC_SL{size}_.jpg")
}

/// Normalizes URLs taken from the `colorImages` gallery block.
pub fn clean(url: &str) -> String {
    let url = url.replace("._A.", ".");
    match url.split_once("_AC_") {
        Some((base, _)) => format!("{base}_AC_SL{DEFAULT_SIZE}_.jpg"),
        None => url,
    }
}

/// Drops the query string, for comparing image URLs.
pub fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

/// Sprites and lazy-load placeholders are never product images.
pub fn is_placeholder(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("sprite") || lower.contains("placeholder")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upscale_ac_token() {
        assert_eq!(
            upscale("https://m.media-amazon.com/images/I/71abc._AC_UY218_.jpg", 1500),
            "https://m.media-amazon.com/images/I/71abc._AC_SL1500_UY218_.jpg"
        );
    }

    #[test]
    fn test_upscale_already_sized() {
        let url = "https://m.media-amazon.com/images/I/71abc._AC_SL1500_.jpg";
        assert_eq!(upscale(url, 1500), url);
    }

    #[test]
    fn test_upscale_sx_sy_sr() {
        assert_eq!(
            upscale("https://images-na.ssl-images-amazon.com/images/I/41x._SX300_.jpg", 1500),
            "https://images-na.ssl-images-amazon.com/images/I/41x._SX1500_.jpg"
        );
        assert_eq!(
            upscale("https://images-na.ssl-images-amazon.com/images/I/41x._SY450_.jpg", 1200),
            "https://images-na.ssl-images-amazon.com/images/I/41x._SY1200_.jpg"
        );
        assert_eq!(
            upscale("https://images-na.ssl-images-amazon.com/images/I/41x._SR38,50_.jpg", 1500),
            "https://images-na.ssl-images-amazon.com/images/I/41x._SR1500,1500_.jpg"
        );
    }

    #[test]
    fn test_upscale_no_token() {
        let url = "https://m.media-amazon.com/images/I/71abc.jpg";
        assert_eq!(upscale(url, 1500), url);
    }

    #[test]
    fn test_image_id_and_canonical() {
        let (id, ext) = image_id("https://m.media-amazon.com/images/I/712mKQsLEbL._AC_SX679_.png").unwrap();
        assert_eq!(id, "712mKQsLEbL");
        assert_eq!(ext, "png");
        assert_eq!(
            canonical_url(&id, &ext, 1200),
            "https://m.media-amazon.com/images/I/712mKQsLEbL._AC_SL1200_.png"
        );
        assert!(image_id("https://example.com/pic.gif").is_none());
    }

    #[test]
    fn test_high_quality() {
        assert_eq!(
            high_quality("https://m.media-amazon.com/images/I/71abc._AC_SX679_.jpg", 1500),
            "https://m.media-amazon.com/images/I/71abc._AC_SL1500_.jpg"
        );
    }

    #[test]
    fn test_clean() {
        assert_eq!(
            clean("https://m.media-amazon.com/images/I/71abc._A._AC_SX522_.jpg"),
            "https://m.media-amazon.com/images/I/71abc._AC_SL1500_.jpg"
        );
        assert_eq!(clean("https://m.media-amazon.com/images/I/71abc.jpg"), "https://m.media-amazon.com/images/I/71abc.jpg");
    }

    #[test]
    fn test_strip_query() {
        assert_eq!(strip_query("https://x/a.jpg?v=2"), "https://x/a.jpg");
        assert_eq!(strip_query("https://x/a.jpg"), "https://x/a.jpg");
    }

    #[test]
    fn test_is_placeholder() {
        assert!(is_placeholder("https://x/Nav-Sprite.png"));
        assert!(is_placeholder("https://x/PLACEHOLDER.gif"));
        assert!(!is_placeholder("https://x/71abc.jpg"));
    }
}
