//! Extracting local script and stylesheet references from HTML, and writing
//! the uploaded locations back in.
//!
//! Only attribute values are rewritten; every other byte of the document is
//! passed through untouched.

use std::sync::LazyLock;

use regex::Regex;

use crate::{
    metadata::{FileSet, HtmlFile},
    path::format_href,
};

pub use scan::{Attribute, Element, elements};

mod scan;

static SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:").expect("scheme regex"));

/// What a page pulls in from the site itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedHtml {
    /// `href` of the first `<base>` carrying one.
    pub base: Option<String>,
    /// Local `script[src]` and `link[rel=stylesheet][href]` values, in
    /// document order, as written.
    pub references: Vec<String>,
}

/// The attribute of `element` that points at a dependency, if the element is
/// a script or a stylesheet link.
fn dependency_attr(element: &Element) -> Option<&Attribute> {
    match element.name.as_str() {
        "script" => element.attr("src"),
        "link" if element.is_stylesheet() => element.attr("href"),
        _ => None,
    }
}

pub fn parse_html(doc: &[u8]) -> ParsedHtml {
    elements(doc).fold(ParsedHtml::default(), |mut parsed, element| {
        if element.name == "base" {
            if parsed.base.is_none() {
                parsed.base = element.attr_value("href").map(str::to_string);
            }
            return parsed;
        }

        if let Some(value) = dependency_attr(&element).and_then(|a| a.value.as_deref()) {
            if is_local(value) {
                parsed.references.push(value.to_string());
            }
        }

        parsed
    })
}

/// True when `href` names a file on this site: no scheme and no host.
pub fn is_local(href: &str) -> bool {
    let href = href.trim();
    !href.is_empty() && !href.starts_with("//") && !SCHEME.is_match(href)
}

/// `href` without its query string or fragment.
pub fn strip_query(href: &str) -> &str {
    match href.find(['?', '#']) {
        Some(i) => &href[..i],
        None => href,
    }
}

/// Rewrites every dependency reference of `doc` that matches one of `page`'s
/// resolved references to its uploaded, root-relative location.
pub fn render_html(doc: &[u8], page: &HtmlFile, files: &FileSet) -> Vec<u8> {
    let mut replacements = Vec::new();

    for element in elements(doc) {
        let Some(attribute) = dependency_attr(&element) else {
            continue;
        };
        let (Some(value), Some(span)) = (&attribute.value, &attribute.value_span) else {
            continue;
        };

        let uploaded = page
            .dependencies
            .iter()
            .find(|dep| &dep.inst_path == value)
            .and_then(|dep| files[dep.file].uploaded_path.as_deref());

        if let Some(uploaded) = uploaded {
            replacements.push((span.clone(), scan::encode_attribute(&format_href(uploaded))));
        }
    }

    let mut out = Vec::with_capacity(doc.len());
    let mut cursor = 0;
    for (span, value) in replacements {
        out.extend_from_slice(&doc[cursor..span.start]);
        out.extend_from_slice(value.as_bytes());
        cursor = span.end;
    }
    out.extend_from_slice(&doc[cursor..]);

    out
}
