use std::{ops::Range, sync::LazyLock};

use regex::bytes::Regex;

static TAG_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u)^<([A-Za-z][A-Za-z0-9-]*)").expect("tag regex"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?-u)^\s*([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute regex")
});

/// Elements whose content is text, not markup.
const RAW_TEXT: &[&str] = &["script", "style", "textarea", "title", "xmp", "noscript"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Lowercased attribute name.
    pub name: String,
    /// Entity-decoded value, `None` for a bare attribute.
    pub value: Option<String>,
    /// Byte range of the raw value inside the document, quotes excluded.
    pub value_span: Option<Range<usize>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name.
    pub name: String,
    pub attributes: Vec<Attribute>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attr_value(&self, name: &str) -> Option<&str> {
        self.attr(name).and_then(|a| a.value.as_deref())
    }

    /// True for `<link>` elements whose `rel` lists `stylesheet`.
    pub fn is_stylesheet(&self) -> bool {
        self.name == "link"
            && self
                .attr_value("rel")
                .is_some_and(|rel| rel.split_ascii_whitespace().any(|t| t.eq_ignore_ascii_case("stylesheet")))
    }
}

/// Start tags of `doc` in document order. Comments, end tags, doctype and the
/// bodies of raw text elements such as `<script>` are skipped over.
///
/// The document is scanned as bytes, so pages in any ASCII-compatible
/// encoding work; only attribute values are decoded, lossily, as UTF-8.
pub fn elements(doc: &[u8]) -> Elements<'_> {
    Elements {
        doc,
        lower: doc.to_ascii_lowercase(),
        pos: 0,
    }
}

pub struct Elements<'a> {
    doc: &'a [u8],
    lower: Vec<u8>,
    pos: usize,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

impl Elements<'_> {
    fn skip_past(&mut self, needle: &[u8]) {
        self.pos = match find(&self.lower[self.pos..], needle) {
            Some(i) => self.pos + i + needle.len(),
            None => self.doc.len(),
        };
    }

    fn start_tag(&mut self) -> Option<Element> {
        let caps = TAG_OPEN.captures(&self.doc[self.pos..])?;
        let name = String::from_utf8_lossy(&caps[1]).to_ascii_lowercase();
        self.pos += caps[0].len();

        let mut attributes = Vec::new();
        while self.pos < self.doc.len() {
            let rest = &self.doc[self.pos..];
            let skipped = rest
                .iter()
                .take_while(|b| b.is_ascii_whitespace() || **b == b'/')
                .count();

            match rest.get(skipped) {
                None => {
                    self.pos = self.doc.len();
                    break;
                }
                Some(b'>') => {
                    self.pos += skipped + 1;
                    break;
                }
                Some(_) => {}
            }

            match ATTRIBUTE.captures(rest) {
                Some(caps) => {
                    let value = caps.get(2).or(caps.get(3)).or(caps.get(4));
                    attributes.push(Attribute {
                        name: String::from_utf8_lossy(&caps[1]).to_ascii_lowercase(),
                        value: value.map(|m| decode_entities(&String::from_utf8_lossy(m.as_bytes()))),
                        value_span: value.map(|m| self.pos + m.start()..self.pos + m.end()),
                    });
                    self.pos += caps[0].len();
                }
                // Stray quote or `=`; step over it.
                None => self.pos += skipped + 1,
            }
        }

        if RAW_TEXT.contains(&name.as_str()) {
            self.skip_past(format!("</{name}").as_bytes());
        }

        Some(Element { name, attributes })
    }
}

impl Iterator for Elements<'_> {
    type Item = Element;

    fn next(&mut self) -> Option<Element> {
        loop {
            let offset = self.doc[self.pos..].iter().position(|&b| b == b'<')?;
            self.pos += offset;

            if self.doc[self.pos..].starts_with(b"<!--") {
                self.pos += 4;
                self.skip_past(b"-->");
            } else if let Some(element) = self.start_tag() {
                return Some(element);
            } else {
                self.pos += 1;
            }
        }
    }
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "sol" => '/',
        "period" => '.',
        "colon" => ':',
        "quest" => '?',
        "num" => '#',
        "equals" => '=',
        "lowbar" => '_',
        "hyphen" | "dash" => '-',
        "percnt" => '%',
        "plus" => '+',
        "tilde" => '~',
        "excl" => '!',
        "commat" => '@',
        "dollar" => '$',
        "comma" => ',',
        "semi" => ';',
        "lpar" => '(',
        "rpar" => ')',
        "bsol" => '\\',
        _ => return None,
    })
}

fn numeric_entity(reference: &str) -> Option<char> {
    let code = match reference.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => reference.parse().ok()?,
    };
    char::from_u32(code).filter(|c| *c != '\0')
}

/// Decodes character references: decimal and hex numeric ones plus the named
/// ones that can appear in a URL. Anything unrecognised is kept verbatim.
fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest[1..].find(';').filter(|end| *end <= 32).and_then(|end| {
            let reference = &rest[1..1 + end];
            let c = match reference.strip_prefix('#') {
                Some(number) => numeric_entity(number),
                None => named_entity(reference),
            }?;
            Some((c, end + 2))
        });

        match decoded {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);

    out
}

pub fn encode_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(doc: &str) -> Vec<String> {
        elements(doc.as_bytes()).map(|e| e.name).collect()
    }

    #[test]
    fn yields_start_tags_in_order() {
        let doc = r#"<!DOCTYPE html><html><head><link rel="stylesheet" href="a.css"></head><body><p>hi</p></body></html>"#;
        assert_eq!(names(doc), vec!["html", "head", "link", "body", "p"]);
    }

    #[test]
    fn reads_quoted_unquoted_and_bare_attributes() {
        let doc = r#"<script async src=app.js type='module' data-x="a &amp; b"></script>"#;
        let element = elements(doc.as_bytes()).next().unwrap();

        assert_eq!(element.attr("async").unwrap().value, None);
        assert_eq!(element.attr_value("src"), Some("app.js"));
        assert_eq!(element.attr_value("type"), Some("module"));
        assert_eq!(element.attr_value("data-x"), Some("a & b"));

        let span = element.attr("src").unwrap().value_span.clone().unwrap();
        assert_eq!(&doc[span], "app.js");
    }

    #[test]
    fn skips_comments_and_script_bodies() {
        let doc = r#"<!-- <script src="old.js"></script> --><script>document.write('<link rel="stylesheet" href="x.css">')</script><img src="a.png" />"#;
        assert_eq!(names(doc), vec!["script", "img"]);
    }

    #[test]
    fn names_are_case_insensitive() {
        let doc = r#"<LINK REL="Stylesheet" HREF="a.css"><SCRIPT SRC="b.js"></SCRIPT>"#;
        let found: Vec<_> = elements(doc.as_bytes()).collect();

        assert!(found[0].is_stylesheet());
        assert_eq!(found[1].name, "script");
        assert_eq!(found[1].attr_value("src"), Some("b.js"));
    }

    #[test]
    fn unterminated_markup_does_not_loop() {
        assert_eq!(names("<a href=\"x"), vec!["a"]);
        assert_eq!(names("<!-- never closed"), Vec::<String>::new());
        assert_eq!(names("< p 1 < 2"), Vec::<String>::new());
        assert_eq!(names("<br  "), vec!["br"]);
    }

    #[test]
    fn non_utf8_text_does_not_disturb_spans() {
        let doc = b"<p>caf\xE9</p><script src=\"app.js\"></script>";
        let script = elements(doc).nth(1).unwrap();

        let span = script.attr("src").unwrap().value_span.clone().unwrap();
        assert_eq!(&doc[span], b"app.js");
    }

    #[test]
    fn decodes_character_references() {
        assert_eq!(decode_entities("app&#46;js"), "app.js");
        assert_eq!(decode_entities("app&#x2E;js"), "app.js");
        assert_eq!(decode_entities("a&period;js?x=1&amp;y=2"), "a.js?x=1&y=2");
        assert_eq!(decode_entities("a&unknown;b & c"), "a&unknown;b & c");
        assert_eq!(decode_entities("&#0;&#xZZ;"), "&#0;&#xZZ;");
    }

    #[test]
    fn encodes_attribute_values() {
        assert_eq!(encode_attribute("a&b\"c"), "a&amp;b&quot;c");
    }
}
