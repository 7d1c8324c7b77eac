use crate::report::Category;
use std::borrow::Cow;
use url::Url;

/// References that never lead to a fetchable page.
const DROPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Resolve `raw` against the page it was found on.
///
/// Returns the absolute http(s) URL without fragment, or an empty string when
/// the reference should be dropped (script/mail/phone links, bare fragments,
/// other schemes, unparseable input). Resolving an already resolved URL
/// returns it unchanged.
pub fn resolve(origin: &Url, raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return String::new();
    }

    let lowered = raw.to_ascii_lowercase();
    if DROPPED_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme)) {
        return String::new();
    }

    match origin.join(raw) {
        Ok(mut url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
            url.set_fragment(None);
            url.to_string()
        }
        _ => String::new(),
    }
}

/// Host names and bucket identifiers: trimmed, lower-cased, no trailing dot.
pub fn canonical_artifact(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// JSON string escapes that hide URL separators in inline scripts.
const JSON_ESCAPES: &[(&str, &str)] = &[
    (r"\u002f", "/"),
    (r"\u002F", "/"),
    (r"\u0026", "&"),
];

/// Page body as it is filtered and scanned: percent-escapes decoded (invalid
/// UTF-8 replaced), then JSON `/` and `&` escapes replaced.
pub fn decode_body(raw: &str) -> String {
    let decoded = urlencoding::decode_binary(raw.as_bytes());
    let mut body = match decoded {
        Cow::Borrowed(_) => raw.to_string(),
        Cow::Owned(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
    };
    for &(escape, plain) in JSON_ESCAPES {
        if body.contains(escape) {
            body = body.replace(escape, plain);
        }
    }
    body
}

/// Normalize an output according to its category.
pub fn normalize(category: Category, origin: &Url, raw: &str) -> String {
    if category.is_url() {
        resolve(origin, raw)
    } else {
        canonical_artifact(raw)
    }
}
