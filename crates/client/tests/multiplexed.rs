//! Lazy dispatch over a shared mux connection: gather semantics,
//! completion ordering, and the premature-access guard.

use futures_lite::future::block_on;
use niquests::{
    testing::{ScriptedConnector, ScriptedDial, ScriptedMux, ScriptedResponse},
    Error, Session, Status, Version,
};
use std::sync::Arc;

fn mux_session(mux: Arc<ScriptedMux>) -> Session {
    let connector = Arc::new(ScriptedConnector::new(vec![ScriptedDial::Mux(
        mux,
        Version::Http2,
    )]));
    Session::new()
        .with_connector(connector)
        .with_multiplexed(true)
}

#[test]
fn gather_resolves_all_handles_over_one_connection() {
    block_on(async {
        let mux = Arc::new(ScriptedMux::new(vec![
            ScriptedResponse::ok("first"),
            ScriptedResponse::ok("second"),
        ]));
        let session = mux_session(Arc::clone(&mux));

        let mut a = session
            .get("https://example.test/a")
            .promise()
            .await
            .unwrap();
        let mut b = session
            .get("https://example.test/b")
            .promise()
            .await
            .unwrap();

        assert_eq!(session.pending_exchanges(), 2);
        session.gather(&mut [], None).await;
        assert_eq!(session.pending_exchanges(), 0);

        assert!(a.is_resolved());
        assert!(b.is_resolved());
        assert_eq!(a.status().unwrap(), Status::Ok);
        assert_eq!(b.status().unwrap(), Status::Ok);
        assert_eq!(a.version().unwrap(), Version::Http2);

        // both exchanges rode the single negotiated connection
        let requests = mux.requests();
        assert_eq!(requests.len(), 2);
    });
}

#[test]
fn later_issued_requests_complete_first() {
    block_on(async {
        let (gate_tx, gate_rx) = async_channel::bounded::<()>(1);

        let mux = Arc::new(ScriptedMux::new(vec![
            ScriptedResponse::ok("slow").gated_on(async move {
                let _ = gate_rx.recv().await;
            }),
            ScriptedResponse::ok("fast"),
        ]));
        let session = mux_session(mux);

        let mut slow = session
            .get("https://example.test/slow")
            .promise()
            .await
            .unwrap();
        let mut fast = session
            .get("https://example.test/fast")
            .promise()
            .await
            .unwrap();

        // the first exchange is gated, so max_fetch=1 must resolve
        // the second-issued one
        let resolved = session.gather(&mut [], Some(1)).await;
        assert_eq!(resolved, 1);
        assert!(fast.is_resolved());
        assert!(!slow.is_resolved());

        // releasing the gate lets a full gather drain the rest
        drop(gate_tx);
        session.gather(&mut [], None).await;
        assert!(slow.is_resolved());

        let mut response = slow.into_response().unwrap();
        assert_eq!(response.content().await.unwrap(), b"slow");
    });
}

#[test]
fn targeted_gather_leaves_other_handles_pending() {
    block_on(async {
        let (gate_tx, gate_rx) = async_channel::bounded::<()>(1);
        let mux = Arc::new(ScriptedMux::new(vec![
            ScriptedResponse::ok("gated").gated_on(async move {
                let _ = gate_rx.recv().await;
            }),
            ScriptedResponse::ok("wanted"),
        ]));
        let session = mux_session(mux);

        let mut gated = session
            .get("https://example.test/gated")
            .promise()
            .await
            .unwrap();
        let mut wanted = session
            .get("https://example.test/wanted")
            .promise()
            .await
            .unwrap();

        session.gather(&mut [&mut wanted], None).await;
        assert!(wanted.is_resolved());
        assert!(!gated.is_resolved());
        assert_eq!(session.pending_exchanges(), 1);

        drop(gate_tx);
        session.gather(&mut [&mut gated], None).await;
        assert!(gated.is_resolved());
    });
}

#[test]
fn unresolved_access_fails_rather_than_blocking() {
    block_on(async {
        let (_gate_tx, gate_rx) = async_channel::bounded::<()>(1);
        let mux = Arc::new(ScriptedMux::new(vec![ScriptedResponse::ok("later")
            .gated_on(async move {
                let _ = gate_rx.recv().await;
            })]));
        let session = mux_session(mux);

        let mut handle = session
            .get("https://example.test/")
            .promise()
            .await
            .unwrap();

        assert!(matches!(
            handle.status(),
            Err(Error::PrematureGatherAccess)
        ));
        assert!(matches!(
            handle.into_response(),
            Err(Error::PrematureGatherAccess)
        ));
    });
}

#[test]
fn promise_requires_a_multiplexed_session() {
    block_on(async {
        let session = Session::new();
        assert!(session.get("https://example.test/").promise().await.is_err());
    });
}

#[test]
fn trailers_surface_after_the_body() {
    block_on(async {
        let mux = Arc::new(ScriptedMux::new(vec![ScriptedResponse::ok("payload")
            .with_trailer("x-checksum", "deadbeef")]));
        let session = mux_session(mux);

        let mut handle = session
            .get("https://example.test/")
            .promise()
            .await
            .unwrap();
        session.gather(&mut [&mut handle], None).await;

        let mut response = handle.into_response().unwrap();
        assert!(response.trailers().is_none());
        assert_eq!(response.content().await.unwrap(), b"payload");
        let trailers = response.trailers().unwrap();
        assert_eq!(trailers.get_str("x-checksum"), Some("deadbeef"));
    });
}

#[test]
fn blocking_handles_gather_implicitly_on_access() {
    let mux = Arc::new(ScriptedMux::new(vec![ScriptedResponse::ok("implicit")]));
    let session = niquests::blocking::Session::from_async(mux_session(mux));

    let mut handle = session
        .get("https://example.test/")
        .promise()
        .unwrap();

    // no explicit gather: attribute access drives the exchange
    assert_eq!(handle.status().unwrap(), Status::Ok);

    let mut response = handle.into_response().unwrap();
    assert_eq!(response.content().unwrap(), b"implicit");
}

#[test]
fn stream_capacity_spills_to_error_free_queueing() {
    block_on(async {
        // capacity of one: the second exchange must wait for a slot
        // rather than failing
        let mux = Arc::new(
            ScriptedMux::new(vec![
                ScriptedResponse::ok("one"),
                ScriptedResponse::ok("two"),
            ])
            .with_max_streams(1),
        );
        let session = mux_session(mux);

        let mut a = session
            .get("https://example.test/one")
            .promise()
            .await
            .unwrap();
        let mut b = session
            .get("https://example.test/two")
            .promise()
            .await
            .unwrap();

        session.gather(&mut [], None).await;
        assert!(a.is_resolved());
        assert!(b.is_resolved());
    });
}
