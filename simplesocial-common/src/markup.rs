//! Markdown to HTML rendering for user supplied text.
//!
//! Rendering is total: every input produces some HTML. Raw HTML in the input
//! is escaped rather than passed through, and links or images pointing at
//! script-capable schemes lose their destination.

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html};

const SAFE_SCHEMES: [&str; 3] = ["http", "https", "mailto"];

#[must_use]
pub fn render(text: &str) -> String {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
    let parser = Parser::new_ext(text, options).map(sanitize_event);

    let mut html_output = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut html_output, parser);
    html_output
}

fn sanitize_event(event: Event<'_>) -> Event<'_> {
    match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: sanitize_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: sanitize_url(dest_url),
            title,
            id,
        }),
        event => event,
    }
}

fn sanitize_url(url: CowStr<'_>) -> CowStr<'_> {
    if is_safe_url(&url) {
        url
    } else {
        CowStr::Borrowed("")
    }
}

/// Relative urls are safe; absolute ones need an allow-listed scheme.
fn is_safe_url(url: &str) -> bool {
    // Browsers ignore whitespace and control characters inside schemes.
    let normalized: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();

    let Some((scheme, _)) = normalized.split_once(':') else {
        return true;
    };
    if scheme.contains(['/', '?', '#']) {
        return true;
    }

    SAFE_SCHEMES
        .iter()
        .any(|safe| scheme.eq_ignore_ascii_case(safe))
}

#[cfg(test)]
mod tests {
    use crate::markup::render;

    #[test]
    fn renders_markdown() {
        assert_eq!(
            render("Hello **world**"),
            "<p>Hello <strong>world</strong></p>\n"
        );
        assert_eq!(render("~~gone~~"), "<p><del>gone</del></p>\n");
    }

    #[test]
    fn renders_empty_and_odd_input() {
        assert_eq!(render(""), "");
        for input in ["[", "***", "```", "| a |\n|---|", "\u{0}", "<"] {
            let _ = render(input);
        }
    }

    #[test]
    fn escapes_raw_html() {
        let block = render("<script>alert(1)</script>");
        assert!(!block.contains("<script>"));
        assert!(block.contains("&lt;script&gt;"));

        let inline = render("hi <img src=x onerror=alert(1)> there");
        assert!(!inline.contains("<img"));
        assert!(inline.contains("&lt;img"));
    }

    #[test]
    fn neutralizes_script_links() {
        for destination in [
            "javascript:alert(1)",
            "JavaScript:alert(1)",
            "data:text/html;base64,PHNjcmlwdD4=",
            "vbscript:msgbox",
        ] {
            let html = render(&format!("[click](<{destination}>)"));
            assert!(html.contains(r#"<a href="">click</a>"#), "{destination}: {html}");
        }

        let image = render("![x](javascript:alert(1))");
        assert!(!image.to_lowercase().contains("javascript"));
    }

    #[test]
    fn keeps_ordinary_links() {
        assert_eq!(
            render("[site](https://example.com/a?b=c)"),
            "<p><a href=\"https://example.com/a?b=c\">site</a></p>\n"
        );
        assert!(render("[rel](/groups/book-club)").contains(r#"href="/groups/book-club""#));
        assert!(render("[mail](mailto:a@example.com)").contains("mailto:a@example.com"));
    }
}
