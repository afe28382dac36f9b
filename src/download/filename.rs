//! Local filename derivation for transfer items.
//!
//! Each item lands at `<blog dir>/<id><ext>`. The id is sanitized so a hostile id
//! can never escape the blog directory.

use std::path::{Component, Path};

use url::Url;

use crate::queue::MediaKind;

const MAX_STEM_CHARS: usize = 120;

/// Builds the file name an item is stored under.
///
/// The extension comes from the URL's last path segment, falling back to a default
/// for the media kind.
#[must_use]
pub fn destination_file_name(id: &str, url: &str, kind: MediaKind) -> String {
    let mut stem: String = sanitize_filename_component(id)
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();
    if stem.is_empty() || !is_safe_filename_segment(&stem) {
        stem = fallback_stem(url);
    }
    let extension = extension_from_url(url).unwrap_or_else(|| default_extension(kind).to_string());
    format!("{stem}{extension}")
}

pub(crate) fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let dot_index = last_segment.rfind('.')?;
    let ext = &last_segment[dot_index..];
    if ext.len() <= 1 || ext.len() > 6 || !ext[1..].chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_lowercase())
}

fn default_extension(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image | MediaKind::ExternalImage => ".jpg",
        MediaKind::Video | MediaKind::ExternalVideo => ".mp4",
        MediaKind::ExternalFile => ".bin",
    }
}

pub(crate) fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\'' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    out.trim_matches(|c| c == '_' || c == '.').to_string()
}

fn is_safe_filename_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn fallback_stem(url: &str) -> String {
    let stem = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .map(|last| {
            let without_ext = last.rsplit_once('.').map_or(last.as_str(), |(s, _)| s).to_string();
            sanitize_filename_component(&without_ext)
        })
        .unwrap_or_default();
    if stem.is_empty() {
        "media".to_string()
    } else {
        stem
    }
}
