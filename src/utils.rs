use crate::normalizer::text;
use url::Url;

/// Derive a display name from a URL's host.
///
/// `https://www.city-library.org/hours` becomes `City Library`. Hosts without
/// a registrable part (IP addresses, `localhost`) are used as they are, and an
/// unparseable URL is returned unchanged.
pub fn display_name_from_url(raw: &str) -> String {
    let Ok(url) = Url::parse(raw.trim()) else {
        return raw.to_string();
    };
    let Some(host) = url.host_str() else {
        return raw.to_string();
    };
    if url.domain().is_none() {
        return host.to_string();
    }

    let host = host.strip_prefix("www.").unwrap_or(host);
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 {
        return host.to_string();
    }

    labels[..labels.len() - 1]
        .join(".")
        .split('-')
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// First `max_chars` characters of `text` on one line, for log messages
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text::collapse_whitespace(text);
    let end = text::char_boundary(&flat, max_chars);
    if end < flat.len() {
        format!("{}...", &flat[..end])
    } else {
        flat
    }
}
