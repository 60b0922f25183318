/// Artifact naming and update-query building
///
/// Keys and URLs are derived only from the booth id, the original
/// filename and the artifact suffix, so re-running a batch publishes to
/// the same places.

use crate::config::StorageLayout;
use crate::state::data::{ImageCategory, ProcessedImageResult, UpdateQuery, UpdateUrls};

/// Extension of every published derivative
const ARTIFACT_EXTENSION: &str = "jpg";

/// Last path segment of a URL, without query string or fragment
pub fn filename_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// Filename without its final extension
pub fn basename(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    }
}

/// `-c(HEX)` for the product square crop and the thumbnail
pub fn color_suffix(color: &str) -> String {
    format!("-c({color})")
}

/// `-c(HEX)-p` for the product region crop
pub fn product_region_suffix(color: &str) -> String {
    format!("-c({color})-p")
}

/// `-w(W)-h(H)` with the source dimensions of an article
pub fn article_base_suffix(width: u32, height: u32) -> String {
    format!("-w({width})-h({height})")
}

/// Article tile suffix; the `-d(part-total)` part only appears for tiled sources
pub fn article_suffix(width: u32, height: u32, part: u32, total: u32) -> String {
    let mut suffix = article_base_suffix(width, height);
    if total > 1 {
        suffix.push_str(&format!("-d({part}-{total})"));
    }
    suffix
}

/// Derivative filename: `{basename}{suffix}.jpg`
pub fn artifact_filename(original_filename: &str, suffix: &str) -> String {
    format!("{}{}.{}", basename(original_filename), suffix, ARTIFACT_EXTENSION)
}

/// Key of an original waiting in the queue
pub fn queue_key(layout: &StorageLayout, filename: &str) -> String {
    format!("{}/{}", layout.queue_prefix, filename)
}

/// Key inside a booth's namespace (derivatives and archived originals)
pub fn booth_key(layout: &StorageLayout, booth_id: i64, filename: &str) -> String {
    format!("{}/{}/{}", layout.booth_prefix, booth_id, filename)
}

/// Public URL of an object key
pub fn public_url(layout: &StorageLayout, key: &str) -> String {
    format!("{}/{}", layout.public_base_url.trim_end_matches('/'), key)
}

/// URL recorded for one successful image: the first artifact, untiled for articles
fn primary_url(
    layout: &StorageLayout,
    booth_id: i64,
    category: ImageCategory,
    original_url: &str,
    result: &ProcessedImageResult,
) -> Option<String> {
    let first = result.artifacts().first()?;
    let filename = filename_from_url(original_url);

    let suffix = match category {
        ImageCategory::Article => {
            // Tiles carry their own height and always add up to the source
            let source_height = result.artifacts().iter().map(|a| a.height).sum();
            article_base_suffix(first.width, source_height)
        }
        ImageCategory::Thumbnail | ImageCategory::Product => first.suffix.clone(),
    };

    let key = booth_key(layout, booth_id, &artifact_filename(filename, &suffix));
    Some(public_url(layout, &key))
}

/// Build the persistence payload from every successful result
pub fn build_update_query(
    layout: &StorageLayout,
    booth_id: i64,
    results: &[ProcessedImageResult],
) -> UpdateQuery {
    let urls = results
        .iter()
        .filter(|result| result.is_success())
        .fold(UpdateUrls::default(), |mut urls, result| {
            let category = result.category();
            let original_url = result.original_url();
            if let Some(url) = primary_url(layout, booth_id, category, original_url, result) {
                match category {
                    ImageCategory::Thumbnail => urls.thumbnail = Some(url),
                    ImageCategory::Article => {
                        urls.article.insert(original_url.to_string(), url);
                    }
                    ImageCategory::Product => {
                        urls.product.insert(original_url.to_string(), url);
                    }
                }
            }
            urls
        });

    UpdateQuery { booth_id, urls }
}
