use scraper::{Html, Selector};
use std::sync::LazyLock;

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid title selector"));
static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));

/// Text of the first `<title>` element, trimmed; empty if there is none
pub fn title(html: &str) -> String {
    let doc = Html::parse_document(html);
    doc.select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Raw `href` values of every anchor, in document order
pub fn anchor_hrefs(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let links = doc
        .select(&ANCHOR_SELECTOR)
        .filter_map(|e| e.value().attr("href"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<String>>();

    ::log::trace!("HTML parser found {} links", links.len());
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_is_first_title_element() {
        let html = "<html><head><title> Tech News </title></head><body>\
                    <svg><title>icon</title></svg></body></html>";
        assert_eq!(title(html), "Tech News");
    }

    #[test]
    fn test_missing_title() {
        assert_eq!(title("<html><body><p>no title</p></body></html>"), "");
    }

    #[test]
    fn test_anchor_hrefs() {
        let html = r#"<html><body>
            <a href="/tech/a">A</a>
            <a>no href</a>
            <a href="  https://ads.example.com/x ">Ad</a>
            <a href="">empty</a>
        </body></html>"#;
        assert_eq!(
            anchor_hrefs(html),
            vec!["/tech/a".to_string(), "https://ads.example.com/x".to_string()]
        );
    }
}
