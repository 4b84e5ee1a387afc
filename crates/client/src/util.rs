use encoding_rs::Encoding;
use mime::Mime;
use niquests_http::{Headers, KnownHeaderName};
use std::str::FromStr;

/// Extract the character encoding declared by a header map's
/// content-type charset parameter, if any.
pub(crate) fn header_encoding(headers: &Headers) -> Option<&'static Encoding> {
    headers
        .get_str(KnownHeaderName::ContentType)
        .and_then(|c| Mime::from_str(c).ok())
        .and_then(|m| {
            m.get_param(mime::CHARSET)
                .and_then(|v| Encoding::for_label(v.as_str().as_bytes()))
        })
}

/// Resolve the encoding for a body: declared charset first, then a
/// byte-order mark, then a confidence check that accepts only valid
/// utf-8. Returns None when nothing can be determined with
/// confidence.
pub(crate) fn detect_encoding(
    headers: &Headers,
    body: &[u8],
) -> Option<&'static Encoding> {
    if let Some(encoding) = header_encoding(headers) {
        return Some(encoding);
    }

    if let Some((encoding, _bom_len)) = Encoding::for_bom(body) {
        return Some(encoding);
    }

    if std::str::from_utf8(body).is_ok() {
        return Some(encoding_rs::UTF_8);
    }

    None
}
