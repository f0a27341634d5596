//! Scraping helpers for the identity provider's login pages.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::error::{Error, Result};

/// Bare object keys following `{`, whitespace or `,`.
static BARE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\{\s,])(\w+)(:)").expect("Invalid bare key regex"));

/// Marker of the inline script carrying the login template model.
const IDK_MARKER: &str = "window._IDK";

/// A form found on a login page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageForm {
    pub action: String,
    /// Hidden inputs in document order.
    pub hidden: Vec<(String, String)>,
}

/// Values of `window._IDK.templateModel` needed to submit the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdkTemplate {
    pub hmac: String,
    pub identifier_url: String,
    pub post_action: String,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Html(format!("invalid selector '{css}': {e:?}")))
}

/// Find `form#<id>` and collect its action and hidden inputs.
pub fn find_form(page: &str, id: &str) -> Result<PageForm> {
    let document = Html::parse_document(page);
    let form_selector = selector(&format!("form#{id}"))?;
    let hidden_selector = selector("input[type=hidden]")?;

    let form = document
        .select(&form_selector)
        .next()
        .ok_or_else(|| Error::Html(format!("form '{id}' not found")))?;
    let action = form
        .value()
        .attr("action")
        .ok_or_else(|| Error::Html(format!("action not found in form '{id}'")))?
        .to_string();

    let hidden = form
        .select(&hidden_selector)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();

    Ok(PageForm { action, hidden })
}

/// Contents of every `meta[name=identitykit]` tag.
pub fn identitykit_meta(page: &str) -> Vec<String> {
    let Ok(meta) = selector("meta[name=identitykit]") else {
        return Vec::new();
    };
    Html::parse_document(page)
        .select(&meta)
        .filter_map(|m| m.value().attr("content").map(str::to_string))
        .collect()
}

/// Pull the template model out of the inline `window._IDK` script.
pub fn extract_idk(page: &str) -> Result<IdkTemplate> {
    let missing = || Error::Login("cannot find login credentials in the email response".to_string());

    let scripts = selector("script")?;
    let document = Html::parse_document(page);
    let script = document
        .select(&scripts)
        .map(|s| s.text().collect::<String>())
        .find(|text| text.contains(IDK_MARKER))
        .ok_or_else(missing)?;

    let start = script.find(IDK_MARKER).unwrap_or_default();
    let block = object_block(&script[start..]).ok_or_else(missing)?;
    let idk = normalize_pseudo_json(block).map_err(|e| {
        tracing::debug!(error = %e, "Malformed login page script");
        missing()
    })?;

    let model = &idk["templateModel"];
    let field = |name: &str| {
        model[name]
            .as_str()
            .map(str::to_string)
            .ok_or_else(missing)
    };
    Ok(IdkTemplate {
        hmac: field("hmac")?,
        identifier_url: field("identifierUrl")?,
        post_action: field("postAction")?,
    })
}

/// First balanced `{...}` block, skipping braces inside quoted strings.
fn object_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a JavaScript object literal: single quotes become double quotes and
/// bare keys get quoted.
pub fn normalize_pseudo_json(text: &str) -> Result<serde_json::Value> {
    let quoted = text.replace('\'', "\"");
    let keyed = BARE_KEY.replace_all(&quoted, r#"$1"$2"$3"#);
    Ok(serde_json::from_str(&keyed)?)
}
