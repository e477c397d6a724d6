//! Main-content extraction for the tax sites we scrape.
//!
//! Each site keeps its article body in a different container, so we try the
//! known ones first and fall back to generic `<article>` and `<body>`.

use scraper::{ElementRef, Html, Node, Selector};

/// Tried in order; the first selector that matches wins.
pub const CONTENT_SELECTORS: &[&str] = &[
    "div.entry-content",   // IndiaFilings
    "div.bank-news-post",  // BankBazaar
    "div.story_content",   // Tax2Win
    "div#bodyContent",     // Wikipedia
    "article",
    "body",
];

pub const MIN_LINE_CHARS: usize = 50;
pub const MAX_LINES: usize = 200;

/// Returns the cleaned main text of a page, or `None` when no container
/// matched or nothing substantial survived cleaning.
pub fn extract_content(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let content = CONTENT_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| document.select(&selector).next())?;

    let text = element_text(&content);
    let cleaned = clean_lines(&text);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Text nodes joined by newlines, skipping script and style bodies.
fn element_text(element: &ElementRef) -> String {
    element
        .descendants()
        .filter_map(|node| {
            let text = match node.value() {
                Node::Text(text) => text,
                _ => return None,
            };
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name()))
                .map_or(false, |name| matches!(name, "script" | "style" | "noscript"));
            if hidden {
                None
            } else {
                Some(&**text)
            }
        })
        .collect::<Vec<&str>>()
        .join("\n")
}

/// Keeps trimmed lines longer than [`MIN_LINE_CHARS`], at most [`MAX_LINES`].
pub fn clean_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > MIN_LINE_CHARS)
        .take(MAX_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_A: &str = "Section 80C allows a deduction of up to Rs 1.5 lakh for eligible investments.";
    const LONG_B: &str = "House Rent Allowance is exempt to the extent of the least of three amounts.";

    #[test]
    fn prefers_site_specific_container() {
        let html = format!(
            r#"<html><body>
                <article><p>{}</p></article>
                <div class="entry-content"><p>{}</p><script>var trackingPixelLoadedWithAVeryLongNameIndeed = true;</script></div>
            </body></html>"#,
            LONG_B, LONG_A
        );
        let text = extract_content(&html).unwrap();
        assert_eq!(text, LONG_A);
    }

    #[test]
    fn falls_back_to_article_then_body() {
        let article = format!("<html><body><nav>menu</nav><article><p>{}</p></article></body></html>", LONG_A);
        assert_eq!(extract_content(&article).unwrap(), LONG_A);

        let body = format!("<html><body><p>{}</p><p>short</p></body></html>", LONG_B);
        assert_eq!(extract_content(&body).unwrap(), LONG_B);
    }

    #[test]
    fn wikipedia_body_content_by_id() {
        let html = format!(
            r#"<html><body><div id="siteNotice">{}</div><div id="bodyContent"><p>{}</p></div></body></html>"#,
            LONG_B, LONG_A
        );
        assert_eq!(extract_content(&html).unwrap(), LONG_A);
    }

    #[test]
    fn drops_short_lines_and_caps_line_count() {
        let mut text = String::from("tiny\n");
        for i in 0..250 {
            text.push_str(&format!("   {} number {:03} padded out to be long enough to keep   \n", LONG_A, i));
        }
        let cleaned = clean_lines(&text);
        let lines: Vec<&str> = cleaned.lines().collect();
        assert_eq!(lines.len(), MAX_LINES);
        assert!(lines[0].starts_with("Section 80C"));
        assert!(lines[199].contains("number 199"));
    }

    #[test]
    fn line_of_exactly_fifty_chars_is_dropped() {
        let fifty = "x".repeat(50);
        let fifty_one = "y".repeat(51);
        assert_eq!(clean_lines(&format!("{}\n{}", fifty, fifty_one)), fifty_one);
    }

    #[test]
    fn nothing_substantial_yields_none() {
        assert_eq!(extract_content("<html><body><p>short</p></body></html>"), None);
    }
}
