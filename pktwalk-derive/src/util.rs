use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use syn::spanned::Spanned;

pub(crate) fn make_err<T>(tok: &impl Spanned, msg: &str) -> syn::Result<T> {
    Err(syn::Error::new(tok.span(), msg))
}

/// Matches a lower-to-upper case transition, or a run of whitespace.
static WORD_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<lo>[a-z0-9])(?P<hi>[A-Z])|\s+").expect("word break pattern is valid")
});

/// `MessageBlock` becomes `message_block`. Used for filter key segments.
pub(crate) fn snake_case(ident: &impl ToString) -> String {
    let s = ident.to_string();
    let s = s.strip_prefix("r#").unwrap_or(&s);
    WORD_BREAK
        .replace_all(s, |caps: &Captures| match (caps.name("lo"), caps.name("hi")) {
            (Some(lo), Some(hi)) => format!("{}_{}", lo.as_str(), hi.as_str()),
            _ => "_".to_string(),
        })
        .to_ascii_lowercase()
}

/// `source_mac` becomes `Source Mac`. Used for display names.
pub(crate) fn title_case(ident: &impl ToString) -> String {
    snake_case(ident)
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join(" ")
}
