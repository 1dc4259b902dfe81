use url::Url;

use crate::config::FormBase;

/// Extra query parameters appended to a frame URL, in insertion order.
pub type QueryParams = Vec<(String, String)>;

/// Parse a `key=value&...` query string into [`QueryParams`].
pub fn parse_query(raw: &str) -> Result<QueryParams, serde_urlencoded::de::Error> {
    serde_urlencoded::from_str(raw.trim_start_matches('?'))
}

/// Build the deferred source URL for a form frame.
///
/// `iframe=true` is always set, `seamless=true` only when requested, then
/// every extra parameter overwrites any earlier value with the same name.
/// The form id is appended as a single path segment, so `/`, `?` and `#`
/// inside it are percent-encoded rather than read as URL structure.
pub fn build_frame_src(base: &FormBase, form: &str, seamless: bool, extra: &[(String, String)]) -> Url {
    let mut url = base.url().clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(form);
    }

    let mut pairs: QueryParams = url.query_pairs().into_owned().collect();
    set_param(&mut pairs, "iframe", "true");
    if seamless {
        set_param(&mut pairs, "seamless", "true");
    }
    for (key, value) in extra {
        set_param(&mut pairs, key, value);
    }

    url.query_pairs_mut().clear().extend_pairs(&pairs);
    url
}

// Same contract as URLSearchParams.set: replace the first occurrence in place
// and drop any later duplicates.
fn set_param(pairs: &mut QueryParams, key: &str, value: &str) {
    match pairs.iter().position(|(existing, _)| existing == key) {
        Some(index) => {
            pairs[index].1 = value.to_string();
            let mut seen = false;
            pairs.retain(|(existing, _)| {
                if existing != key {
                    return true;
                }
                let keep = !seen;
                seen = true;
                keep
            });
        }
        None => pairs.push((key.to_string(), value.to_string())),
    }
}
