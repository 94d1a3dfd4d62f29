//! Absolute-path rewriting for emitted HTML (spec §4.6 step 5, §9 Open
//! Question: apply whenever HTML is emitted, regardless of output format).
//!
//! A page fetched at `https://example.com/docs/index.html` with
//! `<img src="../assets/logo.png">` emits that `src` unresolved unless this
//! runs first; callers consuming `Document.html` in isolation (a webhook
//! payload, a cache entry) have no base URL of their own to resolve against.

use lol_html::{element, HtmlRewriter, Settings};
use url::Url;

/// Rewrite every relative `href`/`src` in `html` to an absolute URL resolved
/// against `page_url`. Already-absolute and non-resolvable (`mailto:`,
/// `javascript:`, malformed) attribute values pass through unchanged.
#[must_use]
pub fn rewrite_paths_absolute(html: &str, page_url: &str) -> String {
    let Ok(base) = Url::parse(page_url) else {
        return html.to_string();
    };

    let mut output = Vec::with_capacity(html.len());
    let resolve = |value: &str| -> Option<String> {
        base.join(value).ok().map(|u| u.to_string())
    };

    let rewrite_attr = move |el: &mut lol_html::html_content::Element<'_, '_>, attr: &str| {
        if let Some(value) = el.get_attribute(attr) {
            if let Some(absolute) = resolve(&value) {
                let _ = el.set_attribute(attr, &absolute);
            }
        }
    };

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("a[href]", {
                    let rewrite_attr = rewrite_attr.clone();
                    move |el| {
                        rewrite_attr(el, "href");
                        Ok(())
                    }
                }),
                element!("img[src]", {
                    let rewrite_attr = rewrite_attr.clone();
                    move |el| {
                        rewrite_attr(el, "src");
                        Ok(())
                    }
                }),
                element!("link[href]", {
                    let rewrite_attr = rewrite_attr.clone();
                    move |el| {
                        rewrite_attr(el, "href");
                        Ok(())
                    }
                }),
                element!("script[src]", {
                    let rewrite_attr = rewrite_attr.clone();
                    move |el| {
                        rewrite_attr(el, "src");
                        Ok(())
                    }
                }),
            ],
            ..Settings::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    if rewriter.write(html.as_bytes()).is_err() || rewriter.end().is_err() {
        return html.to_string();
    }

    String::from_utf8(output).unwrap_or_else(|_| html.to_string())
}
