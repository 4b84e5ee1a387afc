//! Request authentication.
//!
//! Credential precedence is `auth=` on the request or session, then a
//! netrc entry for the host, then any manually-set `Authorization`
//! header. Netrc is read once, lazily, from `$NETRC` or `~/.netrc` /
//! `~/_netrc`, and is never written.

use base64::{engine::general_purpose::STANDARD, Engine};
use niquests_http::{Headers, KnownHeaderName};
use std::path::PathBuf;

/// Credentials attachable to a session or a single request.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// http basic auth
    Basic {
        /// user name
        username: String,
        /// optional password
        password: Option<String>,
    },

    /// a bearer token
    Bearer(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Basic { username, .. } => f
                .debug_struct("Auth::Basic")
                .field("username", username)
                .field("password", &"..")
                .finish(),
            Auth::Bearer(_) => f.debug_tuple("Auth::Bearer").field(&"..").finish(),
        }
    }
}

impl Auth {
    /// basic credentials
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Auth::Basic {
            username: username.into(),
            password: Some(password.into()),
        }
    }

    /// a bearer token
    pub fn bearer(token: impl Into<String>) -> Self {
        Auth::Bearer(token.into())
    }

    /// the `Authorization` header value for these credentials
    pub fn header_value(&self) -> String {
        match self {
            Auth::Basic { username, password } => {
                let credentials = match password {
                    Some(password) => format!("{username}:{password}"),
                    None => format!("{username}:"),
                };
                format!("Basic {}", STANDARD.encode(credentials))
            }
            Auth::Bearer(token) => format!("Bearer {token}"),
        }
    }
}

/// One machine entry from a netrc file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetrcEntry {
    /// machine name, None for the `default` entry
    pub machine: Option<String>,
    /// login name
    pub login: Option<String>,
    /// password
    pub password: Option<String>,
}

/// Parse netrc content. Unknown tokens are skipped; a `macdef` block
/// runs through its terminating blank line.
pub(crate) fn parse_netrc(content: &str) -> Vec<NetrcEntry> {
    let mut entries = vec![];
    let mut current: Option<NetrcEntry> = None;
    let mut in_macro = false;

    for line in content.lines() {
        if in_macro {
            if line.trim().is_empty() {
                in_macro = false;
            }
            continue;
        }

        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            match token {
                "machine" => {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                    current = Some(NetrcEntry {
                        machine: tokens.next().map(String::from),
                        login: None,
                        password: None,
                    });
                }
                "default" => {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                    current = Some(NetrcEntry {
                        machine: None,
                        login: None,
                        password: None,
                    });
                }
                "login" => {
                    if let Some(entry) = current.as_mut() {
                        entry.login = tokens.next().map(String::from);
                    }
                }
                "password" => {
                    if let Some(entry) = current.as_mut() {
                        entry.password = tokens.next().map(String::from);
                    }
                }
                "account" => {
                    let _ = tokens.next();
                }
                "macdef" => {
                    let _ = tokens.next();
                    in_macro = true;
                    break;
                }
                _ => {}
            }
        }
    }

    if let Some(entry) = current.take() {
        entries.push(entry);
    }

    entries
}

/// Locate the netrc file: `$NETRC` wins, else `~/.netrc`, else
/// `~/_netrc`.
pub(crate) fn netrc_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("NETRC") {
        let path = PathBuf::from(path);
        return path.exists().then_some(path);
    }

    let home = std::env::var_os("HOME").map(PathBuf::from)?;
    for name in [".netrc", "_netrc"] {
        let path = home.join(name);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Look up credentials for `host` in the netrc entries: an exact
/// machine match wins, else the `default` entry.
pub(crate) fn netrc_lookup(entries: &[NetrcEntry], host: &str) -> Option<Auth> {
    let entry = entries
        .iter()
        .find(|entry| {
            entry
                .machine
                .as_deref()
                .is_some_and(|machine| machine.eq_ignore_ascii_case(host))
        })
        .or_else(|| entries.iter().find(|entry| entry.machine.is_none()))?;

    Some(Auth::Basic {
        username: entry.login.clone()?,
        password: entry.password.clone(),
    })
}

/// Apply the credential precedence to a prepared header map:
/// explicit auth replaces everything; otherwise netrc fills in only
/// when no `Authorization` header was set manually.
pub(crate) fn apply_auth(
    headers: &mut Headers,
    explicit: Option<&Auth>,
    netrc: Option<&Auth>,
) {
    if let Some(auth) = explicit {
        headers.insert(KnownHeaderName::Authorization, auth.header_value());
    } else if let Some(auth) = netrc {
        headers.insert(KnownHeaderName::Authorization, auth.header_value());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn basic_header_value() {
        let auth = Auth::basic("aladdin", "opensesame");
        assert_eq!(
            auth.header_value(),
            "Basic YWxhZGRpbjpvcGVuc2VzYW1l"
        );
    }

    #[test]
    fn bearer_header_value() {
        assert_eq!(Auth::bearer("tok").header_value(), "Bearer tok");
    }

    #[test]
    fn netrc_parsing() {
        let entries = parse_netrc(indoc::indoc! {"
            machine example.test login alice password s3cret
            machine other.test
              login bob
              password hunter2
            default login anon password guest
        "});
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].machine.as_deref(), Some("example.test"));
        assert_eq!(entries[0].login.as_deref(), Some("alice"));
        assert_eq!(entries[1].password.as_deref(), Some("hunter2"));
        assert_eq!(entries[2].machine, None);
    }

    #[test]
    fn netrc_lookup_prefers_exact_machine() {
        let entries = parse_netrc(
            "default login anon password guest\n\
             machine example.test login alice password s3cret\n",
        );

        let Some(Auth::Basic { username, .. }) = netrc_lookup(&entries, "example.test") else {
            panic!("expected basic credentials");
        };
        assert_eq!(username, "alice");

        let Some(Auth::Basic { username, .. }) = netrc_lookup(&entries, "unknown.test") else {
            panic!("expected default credentials");
        };
        assert_eq!(username, "anon");
    }

    #[test]
    fn precedence_explicit_over_netrc_over_manual() {
        let netrc = Auth::basic("netrc", "pw");
        let explicit = Auth::bearer("explicit");

        // manual header alone survives
        let mut headers = Headers::new();
        headers.insert(KnownHeaderName::Authorization, "Basic manual");
        apply_auth(&mut headers, None, None);
        assert_eq!(
            headers.get_str(KnownHeaderName::Authorization),
            Some("Basic manual")
        );

        // netrc beats a manual header
        apply_auth(&mut headers, None, Some(&netrc));
        assert_eq!(
            headers.get_str(KnownHeaderName::Authorization),
            Some(netrc.header_value()).as_deref()
        );

        // explicit auth beats both
        apply_auth(&mut headers, Some(&explicit), Some(&netrc));
        assert_eq!(
            headers.get_str(KnownHeaderName::Authorization),
            Some("Bearer explicit")
        );
    }
}
