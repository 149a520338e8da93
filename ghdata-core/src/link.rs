//! Link header parsing for paginated API responses.
//!
//! GitHub advertises further pages through a header of the form
//! `<https://api.github.com/user/repos?page=2>; rel="next", <...>; rel="last"`.
//! Only the `next` relation drives pagination.

use url::Url;

use crate::error::{GhDataError, Result};

/// One `<url>; rel="..."` entry of a Link header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRelation {
    pub target: String,
    pub rels: Vec<String>,
}

/// Split a Link header into its entries. Entries without a `<...>` target are skipped.
pub fn parse_link_header(header: &str) -> Vec<LinkRelation> {
    header
        .split(',')
        .filter_map(|segment| {
            let (target, rels) = split_segment(segment.trim());
            target.map(|target| LinkRelation {
                target: target.to_string(),
                rels,
            })
        })
        .collect()
}

fn split_segment(segment: &str) -> (Option<&str>, Vec<String>) {
    let mut parts = segment.split(';');
    let target = parts
        .next()
        .map(str::trim)
        .and_then(|t| t.strip_prefix('<'))
        .and_then(|t| t.strip_suffix('>'))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let mut rels = Vec::new();
    for param in parts {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("rel") {
            continue;
        }
        // rel may hold several space-separated relation types
        let value = value.trim().trim_matches('"');
        rels.extend(value.split_whitespace().map(|r| r.to_ascii_lowercase()));
    }

    (target, rels)
}

/// Resolve the `rel="next"` entry against `current`, the URL of the page that carried the header.
///
/// `Ok(None)` means there is no next page. A `next` entry whose target is missing or
/// cannot be resolved is a `Protocol` error, never the end of pagination.
pub fn next_link(header: Option<&str>, current: &Url) -> Result<Option<Url>> {
    let Some(header) = header else {
        return Ok(None);
    };

    for segment in header.split(',') {
        let (target, rels) = split_segment(segment.trim());
        if !rels.iter().any(|r| r == "next") {
            continue;
        }
        let target = target.ok_or_else(|| {
            GhDataError::Protocol(format!("next link without a <target>: {}", segment.trim()))
        })?;
        let url = current.join(target).map_err(|e| {
            GhDataError::Protocol(format!("unusable next link {:?}: {}", target, e))
        })?;
        return Ok(Some(url));
    }

    Ok(None)
}
