//! Inactivity timeouts: a silent peer fails the exchange and nothing
//! unusable is left behind in the pool.

use futures_lite::future::block_on;
use niquests::{
    testing::{ScriptedConnector, ScriptedDial},
    Error, Session,
};
use std::{sync::Arc, time::Duration};

#[test]
fn a_silent_server_times_out_the_head() {
    block_on(async {
        // the dial succeeds but the server never sends a byte
        let connector = Arc::new(ScriptedConnector::new(vec![ScriptedDial::H1("")]));
        let session = Session::new().with_connector(Arc::clone(&connector));

        let error = session
            .get("http://example.test/")
            .timeout(Duration::from_millis(20))
            .send()
            .await
            .unwrap_err();

        match error {
            Error::TimedOut("read", duration) => {
                assert_eq!(duration, Duration::from_millis(20));
            }
            other => panic!("expected a read timeout, got {other}"),
        }
    });
}

#[test]
fn timed_out_connections_are_not_pooled() {
    block_on(async {
        let connector = Arc::new(ScriptedConnector::new(vec![
            ScriptedDial::H1(""),
            ScriptedDial::H1("HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n"),
        ]));
        let session = Session::new().with_connector(Arc::clone(&connector));

        let _ = session
            .get("http://example.test/")
            .timeout(Duration::from_millis(20))
            .send()
            .await
            .unwrap_err();

        // the follow-up request must dial fresh; a pooled remnant of
        // the timed-out exchange would have no script behind it
        let response = session.get("http://example.test/").send().await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(connector.server_ends().len(), 2);
    });
}

#[test]
fn a_stalled_body_times_out_mid_stream() {
    block_on(async {
        // the head and half the body arrive, then silence
        let connector = Arc::new(ScriptedConnector::new(vec![ScriptedDial::H1(
            "HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\nhalf",
        )]));
        let session = Session::new().with_connector(Arc::clone(&connector));

        let mut response = session
            .get("http://example.test/")
            .timeout(Duration::from_millis(20))
            .stream(true)
            .send()
            .await
            .unwrap();

        let error = response.content().await.unwrap_err();
        assert!(error.is_timeout());
    });
}

#[test]
fn session_default_timeouts_are_overridable() {
    block_on(async {
        let connector = Arc::new(ScriptedConnector::new(vec![ScriptedDial::H1("")]));
        let session = Session::new()
            .with_connector(Arc::clone(&connector))
            .with_timeout(Duration::from_millis(10));

        let error = session
            .get("http://example.test/")
            .send()
            .await
            .unwrap_err();
        assert!(error.is_timeout());
    });
}
