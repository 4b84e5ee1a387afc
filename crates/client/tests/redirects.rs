//! Redirect-chain behavior: history, terminal urls, credential
//! scrubbing, method rewriting, and the HEAD opt-in.

use futures_lite::future::block_on;
use niquests::{
    testing::{ScriptedConnector, ScriptedDial},
    Error, KnownHeaderName, RedirectPolicy, Session, Status,
};
use std::sync::Arc;

const OK_EMPTY: &str = "HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n";

fn session_with(dials: Vec<ScriptedDial>) -> (Session, Arc<ScriptedConnector>) {
    let connector = Arc::new(ScriptedConnector::new(dials));
    let session = Session::new().with_connector(Arc::clone(&connector));
    (session, connector)
}

fn redirect_to(target: &str) -> String {
    format!("HTTP/1.1 301 Moved Permanently\r\nlocation: {target}\r\ncontent-length: 0\r\n\r\n")
}

#[test]
fn authorization_is_scrubbed_on_off_host_redirects() {
    block_on(async {
        let hop = redirect_to("http://b.test/");
        let hop: &'static str = Box::leak(hop.into_boxed_str());
        let (session, connector) =
            session_with(vec![ScriptedDial::H1(hop), ScriptedDial::H1(OK_EMPTY)]);

        let response = session
            .get("http://a.test/")
            .header(KnownHeaderName::Authorization, "Basic X")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.url().as_str(), "http://b.test/");
        assert_eq!(response.history().len(), 1);
        assert_eq!(response.history()[0].status(), Status::MovedPermanently);
        assert_eq!(response.history()[0].url().as_str(), "http://a.test/");

        let first_hop = connector.wire_bytes(0);
        assert!(first_hop.contains("Authorization: Basic X\r\n"));

        let second_hop = connector.wire_bytes(1);
        assert!(!second_hop.contains("Authorization"));
        assert!(second_hop.contains("Host: b.test\r\n"));
    });
}

#[test]
fn same_host_redirects_keep_authorization() {
    block_on(async {
        let hop = redirect_to("/elsewhere");
        let hop: &'static str = Box::leak(hop.into_boxed_str());
        let (session, connector) = session_with(vec![ScriptedDial::H1(hop)]);

        let send = session
            .get("http://a.test/")
            .header(KnownHeaderName::Authorization, "Basic X")
            .send();
        futures_lite::pin!(send);
        assert!(futures_lite::future::poll_once(send.as_mut())
            .await
            .is_none());
        // second hop reuses the pooled connection to the same origin
        connector.server_ends()[0].append(OK_EMPTY);
        let response = send.await.unwrap();

        assert_eq!(response.url().as_str(), "http://a.test/elsewhere");
        let wire = connector.wire_bytes(0);
        let second_hop = &wire[wire.find("GET /elsewhere").unwrap()..];
        assert!(second_hop.contains("Authorization: Basic X\r\n"));
    });
}

#[test]
fn see_other_rewrites_post_to_get() {
    block_on(async {
        let (session, connector) = session_with(vec![
            ScriptedDial::H1(
                "HTTP/1.1 100 Continue\r\n\r\n\
                 HTTP/1.1 303 See Other\r\nlocation: http://b.test/done\r\ncontent-length: 0\r\n\r\n",
            ),
            ScriptedDial::H1(OK_EMPTY),
        ]);

        let response = session
            .post("http://a.test/submit")
            .form(&[("a", "1")])
            .send()
            .await
            .unwrap();

        assert_eq!(response.url().as_str(), "http://b.test/done");

        let second_hop = connector.wire_bytes(1);
        assert!(second_hop.starts_with("GET /done HTTP/1.1\r\n"));
        assert!(!second_hop.contains("Content-Length"));
        assert!(!second_hop.contains("a=1"));
    });
}

#[test]
fn permanent_redirect_preserves_post_by_default() {
    block_on(async {
        let (session, connector) = session_with(vec![
            ScriptedDial::H1(
                "HTTP/1.1 100 Continue\r\n\r\n\
                 HTTP/1.1 308 Permanent Redirect\r\nlocation: http://b.test/submit\r\ncontent-length: 0\r\n\r\n",
            ),
            ScriptedDial::H1(
                "HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n",
            ),
        ]);

        session
            .post("http://a.test/submit")
            .form(&[("a", "1")])
            .send()
            .await
            .unwrap();

        let second_hop = connector.wire_bytes(1);
        assert!(second_hop.starts_with("POST /submit HTTP/1.1\r\n"));
        assert!(second_hop.ends_with("a=1"));
    });
}

#[test]
fn found_rewrites_when_the_policy_says_so() {
    block_on(async {
        let (session, connector) = session_with(vec![
            ScriptedDial::H1(
                "HTTP/1.1 100 Continue\r\n\r\n\
                 HTTP/1.1 302 Found\r\nlocation: http://b.test/next\r\ncontent-length: 0\r\n\r\n",
            ),
            ScriptedDial::H1(OK_EMPTY),
        ]);
        let session = session.with_redirect_policy(RedirectPolicy {
            preserve_method: false,
            ..RedirectPolicy::default()
        });

        session
            .post("http://a.test/submit")
            .form(&[("a", "1")])
            .send()
            .await
            .unwrap();

        let second_hop = connector.wire_bytes(1);
        assert!(second_hop.starts_with("GET /next HTTP/1.1\r\n"));
    });
}

#[test]
fn head_requests_do_not_follow_redirects_by_default() {
    block_on(async {
        let hop = redirect_to("http://b.test/");
        let hop: &'static str = Box::leak(hop.into_boxed_str());
        let (session, _connector) = session_with(vec![ScriptedDial::H1(hop)]);

        let response = session.head("http://a.test/").send().await.unwrap();
        assert_eq!(response.status(), Status::MovedPermanently);
        assert!(response.history().is_empty());
    });
}

#[test]
fn redirect_chains_are_bounded() {
    block_on(async {
        // every hop bounces to a fresh target on the same host;
        // connection: close forces each hop onto its own dial
        let mut dials = vec![];
        for n in 0..6 {
            let hop = format!(
                "HTTP/1.1 301 Moved Permanently\r\nlocation: http://a.test/{n}\r\n\
                 connection: close\r\ncontent-length: 0\r\n\r\n"
            );
            dials.push(ScriptedDial::H1(Box::leak(hop.into_boxed_str())));
        }

        let (session, _connector) = session_with(dials);
        let session = session.with_redirect_policy(RedirectPolicy {
            max_redirects: 5,
            ..RedirectPolicy::default()
        });

        match session.get("http://a.test/").send().await {
            Err(Error::TooManyRedirects(5)) => {}
            other => panic!("expected TooManyRedirects, got {other:?}"),
        }
    });
}

#[test]
fn cookies_set_on_a_hop_reach_the_next_hop() {
    block_on(async {
        let (session, connector) = session_with(vec![
            ScriptedDial::H1(
                "HTTP/1.1 302 Found\r\nset-cookie: sid=fresh\r\nlocation: http://a.test/next\r\ncontent-length: 0\r\n\r\n",
            ),
        ]);

        let send = session.get("http://a.test/").send();
        futures_lite::pin!(send);
        assert!(futures_lite::future::poll_once(send.as_mut())
            .await
            .is_none());
        connector.server_ends()[0].append(OK_EMPTY);
        send.await.unwrap();

        let wire = connector.wire_bytes(0);
        let second_hop = &wire[wire.find("GET /next").unwrap()..];
        assert!(second_hop.contains("Cookie: sid=fresh\r\n"));
    });
}
