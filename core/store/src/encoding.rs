//! Wire encoding for query string keys and values.
//!
//! Two serializations are produced. The display form is what gets written
//! to the address bar: RFC 3986 percent-encoding with space as `+`, leaving
//! `!'()*,` (and `[]` in keys) literal. The form encoding is the strict
//! `application/x-www-form-urlencoded` output a `URLSearchParams`
//! serializer yields. Both parse back to identical pairs.

use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::form_urlencoded;

/// Characters escaped in query values.
const VALUE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b',');

/// Characters escaped in query keys. Brackets stay readable.
const KEY_SET: &AsciiSet = &VALUE_SET.remove(b'[').remove(b']');

fn encode_with(input: &str, set: &'static AsciiSet) -> String {
    input
        .split(' ')
        .map(|part| percent_encode(part.as_bytes(), set).to_string())
        .collect::<Vec<_>>()
        .join("+")
}

/// Encode a query key for display.
pub fn encode_key(key: &str) -> String {
    encode_with(key, KEY_SET)
}

/// Encode a query value for display.
pub fn encode_value(value: &str) -> String {
    encode_with(value, VALUE_SET)
}

/// Serialize pairs in display form, without a leading `?`.
pub fn to_display<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", encode_key(k), encode_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Serialize pairs as strict form encoding.
pub fn to_form<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Parse a search string into decoded pairs.
///
/// A leading `?` is ignored. Pairs without `=` decode to an empty value.
pub fn parse(search: &str) -> Vec<(String, String)> {
    let search = search.strip_prefix('?').unwrap_or(search);
    form_urlencoded::parse(search.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}
