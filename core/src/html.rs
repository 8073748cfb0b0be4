use lazy_static::lazy_static;
use scraper::{Html, Node, Selector};

lazy_static! {
    static ref TITLE: Selector = Selector::parse("title").expect("valid selector");
}

/// Visible text of an HTML document, whitespace-joined. Script and style bodies are skipped.
pub fn page_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();
    for node in doc.root_element().descendants() {
        let Node::Text(text) = node.value() else { continue };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript" | "title"))
        });
        if hidden {
            continue;
        }
        let t = text.trim();
        if !t.is_empty() {
            parts.push(t);
        }
    }
    parts.join(" ")
}

pub fn page_title(html: &str) -> String {
    let doc = Html::parse_document(html);
    doc.select(&TITLE)
        .next()
        .map(|n| n.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "<html><head><title> Кошки </title><style>p{}</style></head>\
        <body><p>Кошка  сидит</p><script>var кот = 1;</script><div>на окне</div></body></html>";

    #[test]
    fn text_skips_hidden_nodes() {
        assert_eq!(page_text(DOC), "Кошка  сидит на окне");
    }

    #[test]
    fn title_is_trimmed() {
        assert_eq!(page_title(DOC), "Кошки");
        assert_eq!(page_title("<p>no title</p>"), "");
    }
}
