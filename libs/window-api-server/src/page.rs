const INDEX_TEMPLATE: &str = include_str!("../assets/index.html");

/// Dashboard page with the bus address and topic filled in.
pub(crate) fn render(bootstrap: &str, topic: &str) -> String {
    INDEX_TEMPLATE
        .replace("${BOOTSTRAP}", &escape_html(bootstrap))
        .replace("${TOPIC}", &escape_html(topic))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_and_escapes() {
        let html = render("broker:9092", "<orders>");
        assert!(html.contains("broker:9092"));
        assert!(html.contains("&lt;orders&gt;"));
        assert!(!html.contains("${TOPIC}"));
        assert!(!html.contains("${BOOTSTRAP}"));
    }
}
