use pulldown_cmark::{html, Options, Parser};

/// Renders user-supplied Markdown to HTML that is safe to embed in a page.
pub fn render(md: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;

    let mut unsafe_html = String::with_capacity(md.len() * 3 / 2);
    html::push_html(&mut unsafe_html, Parser::new_ext(md, options));

    ammonia::clean(&unsafe_html)
}
