//! Content cleaning: remote HTML → canonical stored HTML.
//!
//! Remote post bodies arrive as rendered WordPress HTML: block-editor
//! comments, shortcodes, embeds, inline scripts, and arbitrary markup.
//! [`clean_content`] reduces that to the canonical form stored locally:
//!
//! - `script`, `style`, `iframe` (and other active content) are removed
//!   together with everything inside them.
//! - Tags outside the allow-list are dropped; their text is kept.
//! - Attributes outside the per-tag allow-list are dropped, as are
//!   `javascript:`, `vbscript:` and `data:` URLs.
//! - Entities are decoded to Unicode; only `&`, `<`, `>` (and `"` inside
//!   attributes) are re-escaped.
//! - Whitespace runs collapse to one space; block elements start on their
//!   own line.
//!
//! Both functions are pure and total. The HTML5 parser recovers from any
//! malformed input (unclosed tags, stray end tags, bad entities), so the
//! output is always defined and identical for identical input.

use std::sync::OnceLock;

use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Elements removed together with their content.
const STRIPPED: &[&str] = &[
    "script", "style", "iframe", "noscript", "object", "embed", "form", "template",
];

/// Block-level elements kept in the output.
const BLOCK_TAGS: &[&str] = &[
    "p",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "blockquote",
    "ul",
    "ol",
    "li",
    "pre",
    "figure",
    "figcaption",
    "table",
    "thead",
    "tbody",
    "tr",
    "th",
    "td",
];

/// Inline elements kept in the output.
const INLINE_TAGS: &[&str] = &[
    "a", "em", "strong", "b", "i", "u", "s", "del", "ins", "sup", "sub", "code", "cite", "q",
    "abbr", "mark", "small",
];

/// Container elements that are dropped but still break the line.
const BOUNDARY_TAGS: &[&str] = &[
    "div", "section", "article", "header", "footer", "aside", "main", "nav",
];

const SHORTCODE_PATTERN: &str =
    r"\[/?(?:caption|gallery|embed|audio|video|playlist|wp_caption)\b[^\]]*\]";

fn shortcodes() -> Option<&'static Regex> {
    static SHORTCODES: OnceLock<Option<Regex>> = OnceLock::new();
    SHORTCODES
        .get_or_init(|| Regex::new(SHORTCODE_PATTERN).ok())
        .as_ref()
}

fn strip_shortcodes(raw: &str) -> String {
    match shortcodes() {
        Some(re) => re.replace_all(raw, "").into_owned(),
        None => raw.to_string(),
    }
}

/// Attributes kept for a tag, in output order.
fn allowed_attrs(tag: &str) -> &'static [&'static str] {
    match tag {
        "a" => &["href", "title"],
        "img" => &["src", "alt", "title", "width", "height"],
        "abbr" => &["title"],
        "th" | "td" => &["colspan", "rowspan"],
        "ol" => &["start"],
        _ => &[],
    }
}

fn is_unsafe_url(value: &str) -> bool {
    let lowered: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    lowered.starts_with("javascript:")
        || lowered.starts_with("vbscript:")
        || lowered.starts_with("data:")
}

/// Normalize remote HTML into the canonical stored form.
///
/// ```rust
/// use wpsync_core::clean::clean_content;
///
/// let raw = "<!-- wp:paragraph --><p>It  was <em>waiting</em>&nbsp;&hellip;</p>\
///            <script>track()</script><!-- /wp:paragraph -->";
/// assert_eq!(clean_content(raw), "<p>It was <em>waiting</em> …</p>");
/// ```
pub fn clean_content(raw_html: &str) -> String {
    let source = strip_shortcodes(raw_html);
    let fragment = Html::parse_fragment(&source);
    let mut writer = HtmlWriter::default();
    writer.children(fragment.root_element());
    writer.finish()
}

/// Reduce remote HTML to plain text: no markup, entities decoded,
/// whitespace collapsed. Used for titles and excerpts.
pub fn clean_text(raw_html: &str) -> String {
    let source = strip_shortcodes(raw_html);
    let fragment = Html::parse_fragment(&source);
    let mut text = String::new();
    collect_text(fragment.root_element(), &mut text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn breaks_text(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag) || BOUNDARY_TAGS.contains(&tag) || matches!(tag, "br" | "hr")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&**text),
            Node::Element(el) => {
                if STRIPPED.contains(&el.name()) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    // Only block boundaries separate words; inline tags join.
                    let breaks = breaks_text(el.name());
                    if breaks {
                        out.push(' ');
                    }
                    collect_text(child_el, out);
                    if breaks {
                        out.push(' ');
                    }
                }
            }
            _ => {}
        }
    }
}

#[derive(Default)]
struct HtmlWriter {
    out: String,
    /// Whitespace was seen and not yet written.
    pending_space: bool,
    /// Leading whitespace is dropped here (start of line / block).
    at_block_start: bool,
    /// Inside `<pre>`: whitespace is preserved verbatim.
    pre_depth: usize,
}

impl HtmlWriter {
    fn children(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.text(&**text),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.element(child_el);
                    }
                }
                // Comments, doctypes and processing instructions never survive.
                _ => {}
            }
        }
    }

    fn element(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();

        if STRIPPED.contains(&name) {
            return;
        }

        match name {
            "br" => {
                self.out.push_str("<br>");
                self.pending_space = false;
                self.at_block_start = true;
            }
            "hr" => {
                self.break_line();
                self.out.push_str("<hr>");
                self.break_line();
            }
            "img" => {
                self.flush_space();
                self.open_tag(element, name);
                self.at_block_start = false;
            }
            _ if BLOCK_TAGS.contains(&name) => {
                self.break_line();
                self.open_tag(element, name);
                self.at_block_start = true;
                if name == "pre" {
                    self.pre_depth += 1;
                }
                self.children(element);
                if name == "pre" {
                    self.pre_depth -= 1;
                }
                self.pending_space = false;
                self.close_tag(name);
                self.break_line();
            }
            _ if INLINE_TAGS.contains(&name) => {
                self.flush_space();
                self.open_tag(element, name);
                self.at_block_start = false;
                self.children(element);
                self.close_tag(name);
            }
            _ if BOUNDARY_TAGS.contains(&name) => {
                self.break_line();
                self.children(element);
                self.break_line();
            }
            _ => self.children(element),
        }
    }

    fn text(&mut self, text: &str) {
        if self.pre_depth > 0 {
            self.flush_space();
            escape_into(&mut self.out, text, false);
            self.at_block_start = false;
            return;
        }

        for c in text.chars() {
            if c.is_whitespace() {
                self.pending_space = true;
                continue;
            }
            self.flush_space();
            self.at_block_start = false;
            match c {
                '&' => self.out.push_str("&amp;"),
                '<' => self.out.push_str("&lt;"),
                '>' => self.out.push_str("&gt;"),
                _ => self.out.push(c),
            }
        }
    }

    fn flush_space(&mut self) {
        if self.pending_space && !self.at_block_start && !self.out.is_empty() {
            self.out.push(' ');
        }
        self.pending_space = false;
    }

    fn break_line(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        self.pending_space = false;
        self.at_block_start = true;
    }

    fn open_tag(&mut self, element: ElementRef<'_>, name: &str) {
        self.out.push('<');
        self.out.push_str(name);
        for attr in allowed_attrs(name) {
            let Some(value) = element.value().attr(attr) else {
                continue;
            };
            if matches!(*attr, "href" | "src") && is_unsafe_url(value) {
                continue;
            }
            self.out.push(' ');
            self.out.push_str(attr);
            self.out.push_str("=\"");
            escape_into(&mut self.out, value.trim(), true);
            self.out.push('"');
        }
        self.out.push('>');
    }

    fn close_tag(&mut self, name: &str) {
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    fn finish(self) -> String {
        self.out.trim().to_string()
    }
}

fn escape_into(out: &mut String, value: &str, attribute: bool) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}
