//! Typed views over well-known header values.
//!
//! Each parser is total: malformed input falls back to
//! [`TypedHeader::Raw`] rather than erroring, because response headers
//! are advisory from the client's point of view.

use crate::{Headers, KnownHeaderName};
use mime::Mime;
use std::{str::FromStr, time::Duration, time::SystemTime};

/// A deserialized view of one header value.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum TypedHeader {
    /// `Content-Type`, parsed as a media type with parameters
    ContentType(ContentType),

    /// `Date`, `Expires`, `Last-Modified`, parsed as an http-date
    Date(SystemTime),

    /// `Alt-Svc` alternative services offered by the origin
    AltSvc(AltSvc),

    /// `Set-Cookie`, split into name, value, and attributes
    SetCookie(SetCookieField),

    /// `Report-To` endpoint group
    ReportTo(ReportTo),

    /// any other header, or a well-known header that failed to parse
    Raw(String),
}

/// `Content-Type` with access to the media type's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentType {
    mime: Mime,
}

impl ContentType {
    /// the full media type, e.g. `text/html`
    pub fn mime(&self) -> &Mime {
        &self.mime
    }

    /// the charset parameter, if present
    pub fn charset(&self) -> Option<&str> {
        self.mime.get_param(mime::CHARSET).map(|v| v.as_str())
    }

    /// the boundary parameter, present on multipart media types
    pub fn boundary(&self) -> Option<&str> {
        self.mime.get_param(mime::BOUNDARY).map(|v| v.as_str())
    }

    /// whether this media type indicates a JSON payload, either
    /// `application/json` or a `+json` suffix
    pub fn is_json(&self) -> bool {
        (self.mime.type_() == mime::APPLICATION && self.mime.subtype() == mime::JSON)
            || self.mime.suffix() == Some(mime::JSON)
    }
}

/// One `Set-Cookie` response header, structurally split. Cookie jar
/// semantics live above this type; this is only the wire shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookieField {
    /// cookie name
    pub name: String,
    /// cookie value
    pub value: String,
    /// trailing attributes such as `Path`, `Max-Age`, `Secure`, in
    /// declaration order. Value-less attributes carry None.
    pub attributes: Vec<(String, Option<String>)>,
}

/// Parsed `Alt-Svc` header contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AltSvc {
    /// the origin asks clients to invalidate all alternatives
    Clear,

    /// alternative services in preference order
    Services(Vec<AltService>),
}

/// A single alternative service offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltService {
    /// the alpn protocol id, e.g. `h3`
    pub protocol_id: String,
    /// alternative authority, `host:port` with an empty host meaning
    /// the same host
    pub authority: String,
    /// freshness lifetime; defaults to 24 hours per RFC 7838
    pub max_age: Duration,
}

/// `Report-To` group descriptor. Only the fields the client engine
/// consumes are pulled out; the raw json remains available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTo {
    /// the group's max_age, when present
    pub max_age: Option<u64>,
    /// the raw json value
    pub raw: String,
}

/// Parse the named header from this header map into its typed
/// representation. Returns None when the header is absent.
pub fn typed_header(headers: &Headers, name: &str) -> Option<TypedHeader> {
    let folded = headers.folded(name)?;
    let known = KnownHeaderName::from_str(name).ok();

    Some(match known {
        Some(KnownHeaderName::ContentType) => parse_content_type(&folded),
        Some(
            KnownHeaderName::Date | KnownHeaderName::Expires | KnownHeaderName::LastModified,
        ) => parse_date(&folded),
        Some(KnownHeaderName::AltSvc) => parse_alt_svc(&folded),
        Some(KnownHeaderName::SetCookie) => parse_set_cookie(&folded),
        Some(KnownHeaderName::ReportTo) => parse_report_to(&folded),
        _ => TypedHeader::Raw(folded),
    })
}

fn parse_content_type(value: &str) -> TypedHeader {
    match Mime::from_str(value) {
        Ok(mime) => TypedHeader::ContentType(ContentType { mime }),
        Err(_) => TypedHeader::Raw(value.to_string()),
    }
}

fn parse_date(value: &str) -> TypedHeader {
    match httpdate::parse_http_date(value) {
        Ok(time) => TypedHeader::Date(time),
        Err(_) => TypedHeader::Raw(value.to_string()),
    }
}

fn parse_set_cookie(value: &str) -> TypedHeader {
    let mut segments = value.split(';');
    let Some((name, cookie_value)) = segments.next().and_then(|pair| pair.split_once('=')) else {
        return TypedHeader::Raw(value.to_string());
    };

    let attributes = segments
        .map(|segment| match segment.split_once('=') {
            Some((attr, attr_value)) => {
                (attr.trim().to_string(), Some(attr_value.trim().to_string()))
            }
            None => (segment.trim().to_string(), None),
        })
        .collect();

    TypedHeader::SetCookie(SetCookieField {
        name: name.trim().to_string(),
        value: cookie_value.trim().to_string(),
        attributes,
    })
}

fn parse_report_to(value: &str) -> TypedHeader {
    // Report-To is a json object; we only surface max_age without
    // pulling in a json dependency at this layer
    let max_age = value
        .split_once("\"max_age\"")
        .and_then(|(_, rest)| rest.split_once(':'))
        .and_then(|(_, rest)| {
            let digits: String = rest
                .trim_start()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        });

    TypedHeader::ReportTo(ReportTo {
        max_age,
        raw: value.to_string(),
    })
}

const ALT_SVC_DEFAULT_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Parse an `Alt-Svc` header value per RFC 7838 §3. Unparseable
/// alternatives are skipped rather than failing the whole header.
pub fn parse_alt_svc(value: &str) -> TypedHeader {
    if value.trim() == "clear" {
        return TypedHeader::AltSvc(AltSvc::Clear);
    }

    let mut services = vec![];
    for alternative in value.split(',') {
        let mut parameters = alternative.split(';');
        let Some((protocol_id, authority)) = parameters.next().and_then(|p| p.split_once('='))
        else {
            continue;
        };
        let authority = authority.trim().trim_matches('"');
        if authority.is_empty() {
            continue;
        }

        let mut max_age = ALT_SVC_DEFAULT_MAX_AGE;
        for parameter in parameters {
            if let Some((key, param_value)) = parameter.split_once('=') {
                if key.trim().eq_ignore_ascii_case("ma") {
                    if let Ok(seconds) = param_value.trim().trim_matches('"').parse() {
                        max_age = Duration::from_secs(seconds);
                    }
                }
            }
        }

        services.push(AltService {
            protocol_id: protocol_id.trim().to_string(),
            authority: authority.to_string(),
            max_age,
        });
    }

    if services.is_empty() {
        TypedHeader::Raw(value.to_string())
    } else {
        TypedHeader::AltSvc(AltSvc::Services(services))
    }
}
