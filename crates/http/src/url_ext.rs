//! Query-string composition on top of [`url::Url`].

use url::Url;

/// Append query parameters to a url, preserving any existing query
/// and the insertion order of the provided pairs. Pairs with a `None`
/// value are elided entirely. Values are percent-encoded per RFC
/// 3986.
pub fn merge_query<I, K, V>(url: &mut Url, params: I)
where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let had_any = {
        let mut pairs = url.query_pairs_mut();
        let mut had_any = false;
        for (key, value) in params {
            if let Some(value) = value {
                pairs.append_pair(key.as_ref(), value.as_ref());
                had_any = true;
            }
        }
        had_any
    };

    // query_pairs_mut leaves a trailing `?` when nothing was appended
    // to a previously-absent query
    if !had_any && url.query() == Some("") {
        url.set_query(None);
    }
}

/// The default port for this url's scheme, when the url does not name
/// one explicitly.
pub fn port_or_known_default(url: &Url) -> Option<u16> {
    url.port_or_known_default()
}
