//! Request body composition.
//!
//! A request may carry at most one of several body forms. When more
//! than one is supplied, precedence follows the public contract:
//! files (multipart) win over any `data`, `data` of any shape wins
//! over `json`, and `json` applies only when nothing else was given.

use crate::{multipart::Multipart, Result};
use niquests_http::Body;
use url::form_urlencoded;

/// The body forms collected by a request builder.
#[derive(Debug, Default)]
pub(crate) struct BodyForms {
    pub(crate) form: Option<Vec<(String, String)>>,
    pub(crate) raw: Option<Body>,
    pub(crate) json: Option<Vec<u8>>,
    pub(crate) multipart: Option<Multipart>,
}

/// A composed body plus the content type it implies. The implied
/// content type never overrides one the caller set explicitly.
#[derive(Debug)]
pub(crate) struct EncodedBody {
    pub(crate) body: Option<Body>,
    pub(crate) content_type: Option<String>,
}

impl BodyForms {
    pub(crate) fn is_empty(&self) -> bool {
        self.form.is_none()
            && self.raw.is_none()
            && self.json.is_none()
            && self.multipart.is_none()
    }

    pub(crate) fn encode(self) -> Result<EncodedBody> {
        if let Some(multipart) = self.multipart {
            let (body, content_type) = multipart.encode()?;
            return Ok(EncodedBody {
                body: Some(body),
                content_type: Some(content_type),
            });
        }

        if let Some(raw) = self.raw {
            return Ok(EncodedBody {
                body: Some(raw),
                content_type: None,
            });
        }

        if let Some(form) = self.form {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (key, value) in &form {
                serializer.append_pair(key, value);
            }
            let encoded = serializer.finish();
            return Ok(EncodedBody {
                body: Some(Body::from(encoded)),
                content_type: Some("application/x-www-form-urlencoded".to_string()),
            });
        }

        if let Some(json) = self.json {
            return Ok(EncodedBody {
                body: Some(Body::from(json)),
                content_type: Some("application/json".to_string()),
            });
        }

        Ok(EncodedBody {
            body: None,
            content_type: None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures_lite::future::block_on;
    use pretty_assertions::assert_eq;

    fn decode_form(bytes: &[u8]) -> Vec<(String, String)> {
        form_urlencoded::parse(bytes)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    fn content(body: Body) -> Vec<u8> {
        block_on(body.into_bytes()).unwrap().into_owned()
    }

    #[test]
    fn form_encoding_repeats_duplicate_keys_in_order() {
        let forms = BodyForms {
            form: Some(vec![
                ("key1".into(), "value1".into()),
                ("key1".into(), "value2".into()),
            ]),
            ..Default::default()
        };

        let encoded = forms.encode().unwrap();
        assert_eq!(
            encoded.content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(content(encoded.body.unwrap()), b"key1=value1&key1=value2");
    }

    #[test]
    fn form_round_trip() {
        let pairs = vec![
            ("a key".to_string(), "a value & more".to_string()),
            ("unicode".to_string(), "héllo".to_string()),
        ];
        let forms = BodyForms {
            form: Some(pairs.clone()),
            ..Default::default()
        };
        let encoded = content(forms.encode().unwrap().body.unwrap());
        assert_eq!(decode_form(&encoded), pairs);
    }

    #[test]
    fn data_beats_json() {
        let forms = BodyForms {
            form: Some(vec![("a".into(), "1".into())]),
            json: Some(br#"{"ignored":true}"#.to_vec()),
            ..Default::default()
        };
        let encoded = forms.encode().unwrap();
        assert_eq!(
            encoded.content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(content(encoded.body.unwrap()), b"a=1");
    }

    #[test]
    fn raw_stream_beats_json() {
        let forms = BodyForms {
            raw: Some(Body::new_streaming(
                futures_lite::io::Cursor::new("streamed"),
                None,
            )),
            json: Some(b"{}".to_vec()),
            ..Default::default()
        };
        let encoded = forms.encode().unwrap();
        assert_eq!(encoded.content_type, None);
        assert_eq!(content(encoded.body.unwrap()), b"streamed");
    }

    #[test]
    fn files_beat_everything() {
        let forms = BodyForms {
            form: Some(vec![("a".into(), "1".into())]),
            json: Some(b"{}".to_vec()),
            multipart: Some(Multipart::new().with_boundary("b").field("f", "v")),
            ..Default::default()
        };
        let encoded = forms.encode().unwrap();
        assert_eq!(
            encoded.content_type.as_deref(),
            Some("multipart/form-data; boundary=b")
        );
    }

    #[test]
    fn json_applies_when_alone() {
        let forms = BodyForms {
            json: Some(br#"{"some":"data"}"#.to_vec()),
            ..Default::default()
        };
        let encoded = forms.encode().unwrap();
        assert_eq!(encoded.content_type.as_deref(), Some("application/json"));
        assert_eq!(content(encoded.body.unwrap()), br#"{"some":"data"}"#);
    }

    #[test]
    fn empty_forms_produce_no_body() {
        let encoded = BodyForms::default().encode().unwrap();
        assert!(encoded.body.is_none());
        assert!(encoded.content_type.is_none());
    }
}
