//! SVG cleanup.
//!
//! A streaming pass over the document with `quick-xml` that drops markup
//! browsers never need: comments, the XML declaration and doctype,
//! processing instructions, `<metadata>`, editor (Inkscape/Sodipodi)
//! elements and attributes, and whitespace between elements. Everything else
//! is written back byte-for-byte.
//!
//! Entity references are never expanded, so a doctype with an internal
//! subset (Illustrator's `<!ENTITY ns_svg ...>`) is kept.

use quick_xml::events::{BytesStart, Event};
use once_cell::sync::Lazy;
use quick_xml::{Reader, Writer};
use regex::Regex;
use std::collections::HashSet;

/// Namespace prefixes whose elements and attributes are removed.
const EDITOR_PREFIXES: &[&str] = &["inkscape", "sodipodi"];

/// Elements in which whitespace-only text is significant.
const TEXT_ELEMENTS: &[&[u8]] = &[b"text", b"tspan", b"textPath", b"style", b"script"];

/// What to strip beyond the fixed cleanup.
#[derive(Debug, Clone, Copy)]
pub struct SvgOptions {
    /// Drop the root `viewBox` when it is `0 0 <width> <height>`
    pub remove_viewbox: bool,
    /// Drop `id` attributes nothing in the document references
    pub cleanup_ids: bool,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self { remove_viewbox: true, cleanup_ids: false }
    }
}

/// Clean up an SVG document.
///
/// Returns a message describing the first XML error encountered.
pub fn optimize_svg(source: &str, options: SvgOptions) -> Result<String, String> {
    let referenced = if options.cleanup_ids { Some(referenced_ids(source)) } else { None };

    let mut reader = Reader::from_str(source);
    let mut writer = Writer::new(Vec::with_capacity(source.len()));

    // depth inside a dropped subtree; 0 when writing
    let mut skip_depth = 0usize;
    let mut text_depth = 0usize;
    let mut seen_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("XML error at byte {}: {}", reader.buffer_position(), e))?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => return Err("unexpected end of document".to_string()),
                _ => {}
            }
            continue;
        }

        let out = match event {
            Event::Eof => break,
            Event::DocType(doctype) if declares_entities(&doctype) => Event::DocType(doctype),
            Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_) => continue,
            Event::Start(start) => {
                if is_dropped_element(start.name().as_ref()) {
                    skip_depth = 1;
                    continue;
                }
                if is_text_element(start.name().as_ref()) {
                    text_depth += 1;
                }
                let is_root = !seen_root;
                seen_root = true;
                Event::Start(clean_element(&start, is_root, options, referenced.as_ref())?)
            }
            Event::Empty(start) => {
                if is_dropped_element(start.name().as_ref()) {
                    continue;
                }
                let is_root = !seen_root;
                seen_root = true;
                Event::Empty(clean_element(&start, is_root, options, referenced.as_ref())?)
            }
            Event::End(end) => {
                if is_text_element(end.name().as_ref()) {
                    text_depth = text_depth.saturating_sub(1);
                }
                Event::End(end)
            }
            Event::Text(text) => {
                if text_depth == 0 && text.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                Event::Text(text)
            }
            other => other,
        };

        writer.write_event(out).map_err(|e| e.to_string())?;
    }

    if !seen_root {
        return Err("document has no root element".to_string());
    }

    String::from_utf8(writer.into_inner()).map_err(|e| e.to_string())
}

/// `<!DOCTYPE svg [ ... ]>`
fn declares_entities(doctype: &[u8]) -> bool {
    doctype.contains(&b'[')
}

fn is_dropped_element(name: &[u8]) -> bool {
    name == b"metadata" || editor_prefixed(name)
}

fn is_text_element(name: &[u8]) -> bool {
    TEXT_ELEMENTS.contains(&name)
}

/// `inkscape:label`, `sodipodi:namedview`, ...
fn editor_prefixed(name: &[u8]) -> bool {
    EDITOR_PREFIXES.iter().any(|prefix| {
        name.len() > prefix.len()
            && name.starts_with(prefix.as_bytes())
            && name[prefix.len()] == b':'
    })
}

/// `xmlns:inkscape`, `xmlns:sodipodi`
fn editor_namespace_decl(name: &[u8]) -> bool {
    name.strip_prefix(b"xmlns:")
        .is_some_and(|prefix| EDITOR_PREFIXES.iter().any(|p| p.as_bytes() == prefix))
}

/// Copy an element, dropping editor attributes and, where allowed, the
/// redundant root `viewBox` and unreferenced ids.
fn clean_element(
    start: &BytesStart<'_>,
    is_root: bool,
    options: SvgOptions,
    referenced: Option<&HashSet<String>>,
) -> Result<BytesStart<'static>, String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = attr.key.as_ref();
        if editor_prefixed(key) || editor_namespace_decl(key) {
            continue;
        }
        if key == b"id" {
            if let Some(referenced) = referenced {
                let id = String::from_utf8_lossy(&attr.value);
                if !referenced.contains(id.as_ref()) {
                    continue;
                }
            }
        }
        attrs.push((key.to_vec(), attr.value.into_owned()));
    }

    if is_root && options.remove_viewbox && name == "svg" && viewbox_is_redundant(&attrs) {
        attrs.retain(|(key, _)| key.as_slice() != b"viewBox");
    }

    let mut cleaned = BytesStart::new(name);
    for (key, value) in &attrs {
        cleaned.push_attribute((key.as_slice(), value.as_slice()));
    }
    Ok(cleaned)
}

fn attr_value<'a>(attrs: &'a [(Vec<u8>, Vec<u8>)], key: &[u8]) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k.as_slice() == key)
        .and_then(|(_, v)| std::str::from_utf8(v).ok())
}

/// Whether `viewBox` is exactly `0 0 <width> <height>`.
fn viewbox_is_redundant(attrs: &[(Vec<u8>, Vec<u8>)]) -> bool {
    let (Some(view_box), Some(width), Some(height)) = (
        attr_value(attrs, b"viewBox"),
        attr_value(attrs, b"width"),
        attr_value(attrs, b"height"),
    ) else {
        return false;
    };

    let (Some(width), Some(height)) = (parse_length(width), parse_length(height)) else {
        return false;
    };

    let parts: Vec<f64> = view_box
        .split(|c: char| c.is_ascii_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .unwrap_or_default();

    parts.len() == 4 && parts[0] == 0.0 && parts[1] == 0.0 && parts[2] == width && parts[3] == height
}

/// A unitless or `px` length; anything else cannot be compared to a viewBox.
fn parse_length(value: &str) -> Option<f64> {
    let value = value.trim();
    value.strip_suffix("px").unwrap_or(value).parse().ok()
}

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:url\(\s*['"]?#|href\s*=\s*['"]#)([^\s'"()]+)"#).expect("Invalid regex pattern")
});

/// Ids used through `url(#id)` or `href="#id"` anywhere in the document.
fn referenced_ids(source: &str) -> HashSet<String> {
    REFERENCE.captures_iter(source).map(|c| c[1].to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INKSCAPE_SVG: &str = r##"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<!-- Created with Inkscape (http://www.inkscape.org/) -->
<svg
   xmlns="http://www.w3.org/2000/svg"
   xmlns:inkscape="http://www.inkscape.org/namespaces/inkscape"
   xmlns:sodipodi="http://sodipodi.sourceforge.net/DTD/sodipodi-0.dtd"
   width="64"
   height="64px"
   viewBox="0 0 64 64"
   inkscape:version="1.2">
  <sodipodi:namedview id="namedview1" pagecolor="#ffffff">
    <inkscape:grid type="xygrid"/>
  </sodipodi:namedview>
  <metadata>
    <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"/>
  </metadata>
  <defs>
    <linearGradient id="fade">
      <stop offset="0" stop-color="#000"/>
    </linearGradient>
  </defs>
  <g id="layer1" inkscape:label="Layer 1" inkscape:groupmode="layer">
    <circle id="dot" cx="32" cy="32" r="16" fill="url(#fade)"/>
    <text x="4" y="60">A <tspan>B</tspan> C</text>
  </g>
</svg>
"##;

    fn optimize(options: SvgOptions) -> String {
        optimize_svg(INKSCAPE_SVG, options).unwrap()
    }

    #[test]
    fn test_optimize_strips_editor_noise() {
        let out = optimize(SvgOptions::default());

        assert!(!out.contains("<?xml"));
        assert!(!out.contains("<!--"));
        assert!(!out.contains("inkscape"));
        assert!(!out.contains("sodipodi"));
        assert!(!out.contains("metadata"));
        assert!(!out.contains("rdf:RDF"));
        assert!(out.len() < INKSCAPE_SVG.len());
    }

    #[test]
    fn test_optimize_removes_whitespace_between_elements() {
        let out = optimize(SvgOptions::default());
        assert!(out.contains("<defs><linearGradient"));
        assert!(!out.contains(">\n"));
    }

    #[test]
    fn test_optimize_keeps_significant_text() {
        let out = optimize(SvgOptions::default());
        assert!(out.contains("A <tspan>B</tspan> C"));
    }

    #[test]
    fn test_optimize_preserves_ids_by_default() {
        let out = optimize(SvgOptions::default());
        assert!(out.contains(r#"id="layer1""#));
        assert!(out.contains(r#"id="dot""#));
        assert!(out.contains(r#"id="fade""#));
    }

    #[test]
    fn test_optimize_cleanup_ids_keeps_referenced() {
        let out = optimize(SvgOptions { remove_viewbox: true, cleanup_ids: true });
        assert!(out.contains(r#"id="fade""#));
        assert!(!out.contains(r#"id="layer1""#));
        assert!(!out.contains(r#"id="dot""#));
    }

    #[test]
    fn test_optimize_removes_redundant_viewbox() {
        let out = optimize(SvgOptions::default());
        assert!(!out.contains("viewBox"));
        assert!(out.contains(r#"width="64""#));
    }

    #[test]
    fn test_optimize_keeps_viewbox_when_disabled() {
        let out = optimize(SvgOptions { remove_viewbox: false, cleanup_ids: false });
        assert!(out.contains(r#"viewBox="0 0 64 64""#));
    }

    #[test]
    fn test_optimize_keeps_meaningful_viewbox() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="32" height="32" viewBox="0 0 16 16"><rect width="16" height="16"/></svg>"#;
        let out = optimize_svg(svg, SvgOptions::default()).unwrap();
        assert!(out.contains(r#"viewBox="0 0 16 16""#));

        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 16 16"><rect/></svg>"#;
        let out = optimize_svg(svg, SvgOptions::default()).unwrap();
        assert!(out.contains("viewBox"));
    }

    #[test]
    fn test_optimize_output_is_well_formed() {
        let out = optimize(SvgOptions::default());
        let mut reader = Reader::from_str(&out);
        let mut depth = 0i32;
        loop {
            match reader.read_event().unwrap() {
                Event::Start(_) => depth += 1,
                Event::End(_) => depth -= 1,
                Event::Eof => break,
                _ => {}
            }
        }
        assert_eq!(depth, 0);
    }

    #[test]
    fn test_optimize_rejects_malformed() {
        assert!(optimize_svg("<svg><g></svg>", SvgOptions::default()).is_err());
        assert!(optimize_svg("   ", SvgOptions::default()).is_err());
    }

    #[test]
    fn test_optimize_keeps_doctype_declaring_entities() {
        let svg = r#"<?xml version="1.0"?>
<!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN" "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd" [
  <!ENTITY ns_svg "http://www.w3.org/2000/svg">
]>
<svg xmlns="&ns_svg;" width="8" height="8"><rect width="8" height="8"/></svg>
"#;
        let out = optimize_svg(svg, SvgOptions::default()).unwrap();

        assert!(out.starts_with("<!DOCTYPE svg PUBLIC"));
        assert!(out.contains(r#"<!ENTITY ns_svg "http://www.w3.org/2000/svg">"#));
        assert!(out.contains(r#"<svg xmlns="&ns_svg;""#));
        assert!(!out.contains("<?xml"));
    }

    #[test]
    fn test_optimize_drops_plain_doctype() {
        let svg = r#"<!DOCTYPE svg PUBLIC "-//W3C//DTD SVG 1.1//EN" "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd">
<svg xmlns="http://www.w3.org/2000/svg"><rect/></svg>"#;
        let out = optimize_svg(svg, SvgOptions::default()).unwrap();
        assert!(out.starts_with("<svg"));
    }

    #[test]
    fn test_referenced_ids() {
        let ids = referenced_ids(r##"<use href="#icon"/><rect fill="url('#grad')"/><a xlink:href="#top"/>"##);
        assert!(ids.contains("icon"));
        assert!(ids.contains("grad"));
        assert!(ids.contains("top"));
    }
}
