// HTML → markdown / plain text via spider_transformations Readability.

use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};

/// Convert raw HTML bytes into clean markdown using Readability extraction.
pub fn html_to_markdown(html: &[u8], url: Option<&str>) -> String {
    transform(html, url, ReturnFormat::Markdown, true)
}

/// Plain text of the whole document. Used when Readability's main-content
/// heuristics drop too much (listing pages, tables of figures).
pub fn html_to_text(html: &[u8], url: Option<&str>) -> String {
    transform(html, url, ReturnFormat::Text, false)
}

fn transform(html: &[u8], url: Option<&str>, format: ReturnFormat, readability: bool) -> String {
    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());
    let config = TransformConfig {
        readability,
        main_content: readability,
        return_format: format,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html,
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    transform_content_input(input, &config)
}

/// Simple title extraction from HTML <title> tag.
pub fn extract_title(html: &str) -> Option<String> {
    let start = html.find("<title")?.checked_add(6)?;
    let rest = &html[start..];
    let tag_end = rest.find('>')?;
    let after_tag = &rest[tag_end + 1..];
    let end = after_tag.find("</title>")?;
    let title = after_tag[..end].trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Crude tag stripper for short HTML fragments (feed summaries), where
/// Readability has too little to work with.
pub(crate) fn strip_tags(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
