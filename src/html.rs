//! HTML normalization for alert email bodies.
//!
//! Alert bodies arrive as full HTML documents with quoting artifacts from the
//! mail ingestion layer. Before extraction they are cleaned in two steps:
//!
//! 1. [`normalize_html`] restores escaped quotes and drops `<head>`,
//!    `<script>` and `<style>` blocks.
//! 2. [`html_to_text`] renders the cleaned document as visible text followed
//!    by every anchor `href`, one per line.
//!
//! Block stripping is regex based, not a parser: nested or malformed tags may
//! survive. That is a known limitation.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

/// Any run of backslashes directly before a double quote.
#[allow(clippy::expect_used)]
static ESCAPED_QUOTE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\\+""#).expect("escaped quote regex is valid")); // Static pattern, safe to panic

#[allow(clippy::expect_used)]
static HEAD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<head(?:\s[^>]*)?>.*?</head\s*>").expect("head regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static SCRIPT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script(?:\s[^>]*)?>.*?</script\s*>").expect("script regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static STYLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style(?:\s[^>]*)?>.*?</style\s*>").expect("style regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector is valid")); // Static selector, safe to panic

/// Restores escaped double quotes (`\"`, `\\"`, ...) to plain `"`.
#[must_use]
pub fn undo_escaped_quotes(input: &str) -> String {
    ESCAPED_QUOTE_PATTERN.replace_all(input, "\"").into_owned()
}

/// Cleans a raw alert body for extraction.
///
/// Quotes are unescaped first so attribute values inside the stripped tags
/// cannot hide a closing `>`. Matching is case-insensitive and spans lines.
#[must_use]
#[instrument(skip(raw), fields(raw_len = raw.len()))]
pub fn normalize_html(raw: &str) -> String {
    let unescaped = undo_escaped_quotes(raw);
    let without_head = HEAD_PATTERN.replace_all(&unescaped, "");
    let without_scripts = SCRIPT_PATTERN.replace_all(&without_head, "");
    let cleaned = STYLE_PATTERN.replace_all(&without_scripts, "").into_owned();

    debug!(cleaned_len = cleaned.len(), "normalized alert body");
    cleaned
}

/// Renders cleaned HTML as the text handed to the extractor.
///
/// Emits each non-blank text node on its own line, then every anchor `href`
/// (scholar alerts keep the article URLs only in attributes).
#[must_use]
#[instrument(skip(html), fields(html_len = html.len()))]
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut lines: Vec<String> = document
        .root_element()
        .text()
        .map(|fragment| fragment.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect();

    let hrefs: Vec<String> = document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
        .collect();

    debug!(
        text_lines = lines.len(),
        hrefs = hrefs.len(),
        "rendered alert body as text"
    );

    lines.extend(hrefs);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALERT_BLOCK: &str = r#"<h3 style="font-weight:normal;margin:0;font-size:17px;line-height:20px;">
<span style="font-size:11px;font-weight:bold;color:#1a0dab;vertical-align:2px">[HTML]</span>
<a href="https://scholar.google.com/scholar_url?url=https://www.nature.com/articles/s41598-025-88482-7&amp;hl=nl" class="gse_alrt_title" style="font-size:17px;color:#1a0dab;line-height:22px">Evaluation of 3D seed structure and cellular traits in-situ using X-ray microscopy</a>
</h3>
<div style="color:#006621;line-height:18px">M Griffiths, B Gautam, C Lebow, K Duncan, X Ding&hellip;&nbsp;- Scientific Reports, 2025</div>
<div class="gse_alrt_sni" style="line-height:17px">Phenotyping methods for seed morphology are mostly limited to two-dimensional <br>imaging or manual measures.</div>"#;

    #[test]
    fn test_normalize_removes_head_script_and_style() {
        let raw = "<html><head><title>Alert</title></head><body>\
                   <script type=\"text/javascript\">var x = 1;</script>\
                   <style>.a { color: red; }</style><p>Keep me</p></body></html>";
        let cleaned = normalize_html(raw);
        assert!(!cleaned.contains("<head"));
        assert!(!cleaned.contains("<script"));
        assert!(!cleaned.contains("<style"));
        assert!(!cleaned.contains("var x"));
        assert!(cleaned.contains("<p>Keep me</p>"));
    }

    #[test]
    fn test_normalize_is_case_insensitive_and_multiline() {
        let raw = "<HEAD>\n<meta charset=\"utf-8\">\n</HEAD>\n<Script>\nalert(1);\n</SCRIPT>\n<STYLE media=\"all\">\nbody {}\n</Style><p>x</p>";
        let cleaned = normalize_html(raw);
        let lowered = cleaned.to_lowercase();
        assert!(!lowered.contains("<head"));
        assert!(!lowered.contains("<script"));
        assert!(!lowered.contains("<style"));
        assert!(cleaned.contains("<p>x</p>"));
    }

    #[test]
    fn test_normalize_strips_every_block_not_just_first() {
        let raw = "<script>a</script><p>1</p><script src=\"x.js\"></script><p>2</p>";
        let cleaned = normalize_html(raw);
        assert_eq!(cleaned, "<p>1</p><p>2</p>");
    }

    #[test]
    fn test_normalize_keeps_header_element() {
        let raw = "<header>Top</header><head></head>";
        assert_eq!(normalize_html(raw), "<header>Top</header>");
    }

    #[test]
    fn test_normalize_restores_escaped_quotes() {
        let raw = r#"<a href=\"https://example.com\">x</a><b class=\\"y\\">z</b>"#;
        let cleaned = normalize_html(raw);
        assert_eq!(
            cleaned,
            r#"<a href="https://example.com">x</a><b class="y">z</b>"#
        );
    }

    #[test]
    fn test_normalize_passes_through_plain_text() {
        assert_eq!(normalize_html("no markup here"), "no markup here");
        assert_eq!(normalize_html(""), "");
    }

    #[test]
    fn test_normalize_unterminated_script_is_left_best_effort() {
        let raw = "<p>a</p><script>never closed";
        assert_eq!(normalize_html(raw), raw);
    }

    #[test]
    fn test_html_to_text_appends_hrefs() {
        let text = html_to_text(ALERT_BLOCK);
        assert!(text.contains("Evaluation of 3D seed structure and cellular traits"));
        assert!(text.contains("Scientific Reports, 2025"));
        assert!(text.contains("Phenotyping methods for seed morphology"));

        let last_line = text.lines().last().unwrap_or_default();
        assert!(
            last_line.starts_with("https://scholar.google.com/scholar_url?url=https://www.nature.com/"),
            "href should be appended after the text, got: {last_line}"
        );
        assert!(last_line.contains("&hl=nl"), "entities should be decoded");
    }

    #[test]
    fn test_html_to_text_collapses_whitespace() {
        let text = html_to_text("<p>  many\n\n   spaces  </p><p></p><p>next</p>");
        assert_eq!(text, "many spaces\nnext");
    }
}
