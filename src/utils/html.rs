//! Message text cleanup
//!
//! Scraped messages arrive as innerHTML: inline tags (emphasis, line breaks)
//! and a handful of entities have to go before the text is typed into the
//! other site.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<.*?>").expect("static regex"));

static HTML_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(amp|lt|gt|quot|apos|nbsp|#39|#x27);").expect("static regex"));

/// Remove every `<...>` tag and decode the entities innerHTML emits.
pub fn strip_html_tags(input: &str) -> String {
    let without_tags = HTML_TAG.replace_all(input, "");
    HTML_ENTITY
        .replace_all(&without_tags, |caps: &regex::Captures<'_>| {
            match &caps[1] {
                "amp" => "&",
                "lt" => "<",
                "gt" => ">",
                "quot" => "\"",
                "nbsp" => " ",
                _ => "'",
            }
        })
        .into_owned()
}

/// NFKD normalisation. Compatibility characters (ligatures, full-width
/// forms, styled letters) some sites sprinkle into replies become plain
/// text the other site's textbox accepts.
pub fn normalize_message(input: &str) -> String {
    input.nfkd().collect()
}

/// Strip tags, then normalise
pub fn clean_message(input: &str) -> String {
    normalize_message(&strip_html_tags(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_inline_tags() {
        assert_eq!(
            strip_html_tags("Hello <em>there</em>, <b>friend</b>!"),
            "Hello there, friend!"
        );
    }

    #[test]
    fn strip_is_non_greedy() {
        assert_eq!(strip_html_tags("a <i>b</i> c <br/> d"), "a b c  d");
    }

    #[test]
    fn strips_tags_spanning_lines() {
        assert_eq!(strip_html_tags("x<span\n class=\"y\">z</span>"), "xz");
    }

    #[test]
    fn leaves_plain_text_alone() {
        assert_eq!(strip_html_tags("no tags 3 > 2"), "no tags 3 > 2");
    }

    #[test]
    fn decodes_common_entities() {
        assert_eq!(
            strip_html_tags("Tom &amp; Jerry &lt;3 it&#39;s&nbsp;fine"),
            "Tom & Jerry <3 it's fine"
        );
    }

    #[test]
    fn entity_decoding_does_not_create_tags() {
        // decoded brackets must survive, they were text in the page
        assert_eq!(strip_html_tags("&lt;b&gt;"), "<b>");
    }

    #[test]
    fn normalizes_compatibility_characters() {
        assert_eq!(normalize_message("ﬁne"), "fine");
        assert_eq!(normalize_message("ＡＢＣ"), "ABC");
    }

    #[test]
    fn clean_message_keeps_emoji() {
        assert_eq!(clean_message("<p>hi 😀</p>"), "hi 😀");
    }
}
