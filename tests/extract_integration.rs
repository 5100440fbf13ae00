//! Integration tests for image extraction using fixture files.

use seatable_image_sync::amazon::upscale::canonical_url;
use seatable_image_sync::amazon::{check_blocked, ExtractOptions, Extractor, ImageSource, ProductUrl, Site};

const PRODUCT_FIXTURE: &str = include_str!("fixtures/product_page.html");

#[test]
fn test_product_page_candidates() {
    let extractor = Extractor::default();
    let candidates = extractor.candidates(PRODUCT_FIXTURE);

    // Dynamic image map wins, largest entry
    let first = &candidates[0];
    assert_eq!(first.source, ImageSource::DynamicImage);
    assert_eq!(first.url, "https://m.media-amazon.com/images/I/61lamp._AC_SX679_.jpg");
    assert_eq!((first.width, first.height), (Some(679), Some(679)));

    // Gallery entries follow, normalized to the 1500 rendition. Entries carry
    // a nested `main` size map and null `hiRes`/`lowRes` fields.
    let gallery: Vec<_> = candidates
        .iter()
        .filter(|c| c.source == ImageSource::ColorImages)
        .map(|c| c.url.as_str())
        .collect();
    assert_eq!(
        gallery,
        vec![
            "https://m.media-amazon.com/images/I/61lamp._AC_SL1500_.jpg",
            "https://m.media-amazon.com/images/I/41lamp._AC_SL1500_.jpg",
            "https://m.media-amazon.com/images/I/31base._AC_SL1500_.jpg",
            "https://m.media-amazon.com/images/I/71side._AC_SL1500_.jpg",
            "https://m.media-amazon.com/images/I/41side._AC_SL1500_.jpg",
        ]
    );

    // No duplicates survive
    let mut urls: Vec<_> = candidates.iter().map(|c| c.url.as_str()).collect();
    let total = urls.len();
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), total);
}

#[test]
fn test_product_page_is_not_blocked() {
    assert!(check_blocked(PRODUCT_FIXTURE).is_ok());
    let image = Extractor::new(ExtractOptions { target_size: 1000 }).extract(PRODUCT_FIXTURE).unwrap().unwrap();
    assert_eq!(image.source, ImageSource::DynamicImage);
}

#[test]
fn test_canonical_rendition_of_selected_image() {
    assert_eq!(
        canonical_url("61lamp", "jpg", 1500),
        "https://m.media-amazon.com/images/I/61lamp._AC_SL1500_.jpg"
    );
}

#[test]
fn test_product_links_resolve_storefront() {
    let url = ProductUrl::parse("www.amazon.co.uk/Desk-Lamp/dp/B0LAMP0001/ref=sr_1_3?crid=X").unwrap();
    assert_eq!(url.as_str(), "https://www.amazon.co.uk/Desk-Lamp/dp/B0LAMP0001");
    assert_eq!(url.site(), Site::Uk);

    let url = ProductUrl::parse("https://www.amazon.com.au/dp/B0LAMP0001").unwrap();
    assert_eq!(url.site(), Site::Au);
}
