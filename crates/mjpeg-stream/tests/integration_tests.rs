//! Integration tests for mjpeg-stream
//!
//! These spin up a real in-process HTTP server and exercise the full
//! connect → parse → worker path over actual sockets.

use axum::body::Body;
use axum::http::{header, HeaderMap as AxumHeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use mjpeg_stream::testing::{
    content_type_for, multipart_body, stalling_stream_router, stream_router, MjpegTestServer,
};
use mjpeg_stream::{
    ConnectionError, ConnectionTarget, MultipartFrameReader, StreamConnection, StreamEvent,
    StreamSession, StreamWorker,
};

async fn serve_frames(boundary: &str, payloads: &[&[u8]]) -> MjpegTestServer {
    let router = stream_router(
        content_type_for(boundary),
        multipart_body(boundary, payloads),
    );
    MjpegTestServer::start(router)
        .await
        .expect("test server starts")
}

async fn collect_events(target: ConnectionTarget) -> Vec<StreamEvent> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let worker = StreamWorker::spawn(target, tx);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    worker.join().await;
    events
}

// =============================================================================
// Reader over a real connection
// =============================================================================

#[tokio::test]
async fn reader_consumes_well_formed_stream() {
    let server = serve_frames("myboundary", &[b"AAAA", b"BBB"]).await;
    let target = ConnectionTarget::parse(&server.url("/stream")).unwrap();

    let connection = StreamConnection::new().unwrap();
    let open = connection.connect(&target).await.unwrap();
    assert_eq!(open.boundary().as_str(), "--myboundary");

    let mut reader = MultipartFrameReader::new(open);

    assert!(reader.has_next());
    let first = reader.next_frame().await.unwrap().unwrap();
    assert_eq!(first.bytes().as_ref(), b"AAAA");
    assert_eq!(first.len(), first.declared_len());

    assert!(reader.has_next());
    let second = reader.next_frame().await.unwrap().unwrap();
    assert_eq!(second.bytes().as_ref(), b"BBB");

    assert!(reader.next_frame().await.is_none());
    assert!(!reader.has_next());

    server.shutdown().await;
}

#[tokio::test]
async fn connect_rejects_non_multipart_content_type() {
    let router = stream_router("text/html".to_string(), b"<html></html>".to_vec());
    let server = MjpegTestServer::start(router).await.unwrap();
    let target = ConnectionTarget::parse(&server.url("/stream")).unwrap();

    let err = StreamConnection::new()
        .unwrap()
        .connect(&target)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::UnsupportedContentType(_)));
}

#[tokio::test]
async fn connect_rejects_missing_boundary_before_any_read() {
    let router = stream_router(
        "multipart/x-mixed-replace".to_string(),
        multipart_body("myboundary", &[b"AAAA"]),
    );
    let server = MjpegTestServer::start(router).await.unwrap();
    let target = ConnectionTarget::parse(&server.url("/stream")).unwrap();

    let err = StreamConnection::new()
        .unwrap()
        .connect(&target)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::MissingBoundary(_)));
}

#[tokio::test]
async fn connect_sends_basic_auth_from_url_userinfo() {
    // base64("user:pass")
    const EXPECTED: &str = "Basic dXNlcjpwYXNz";

    let boundary = "authbound";
    let body = multipart_body(boundary, &[b"JPEG"]);
    let content_type = content_type_for(boundary);
    let router = Router::new().route(
        "/stream",
        get(move |headers: AxumHeaderMap| {
            let body = body.clone();
            let content_type = content_type.clone();
            async move {
                let authorized = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    == Some(EXPECTED);
                if authorized {
                    Response::builder()
                        .header(header::CONTENT_TYPE, content_type)
                        .body(Body::from(body))
                        .unwrap()
                } else {
                    Response::builder()
                        .status(StatusCode::UNAUTHORIZED)
                        .header(header::CONTENT_TYPE, "text/plain")
                        .body(Body::from("unauthorized"))
                        .unwrap()
                }
            }
        }),
    );
    let server = MjpegTestServer::start(router).await.unwrap();

    let url = server.url("/stream").replace("http://", "http://user:pass@");
    let target = ConnectionTarget::parse(&url).unwrap();

    let open = StreamConnection::new()
        .unwrap()
        .connect(&target)
        .await
        .unwrap();
    let mut reader = MultipartFrameReader::new(open);
    let frame = reader.next_frame().await.unwrap().unwrap();
    assert_eq!(frame.bytes().as_ref(), b"JPEG");
}

// =============================================================================
// Worker sessions
// =============================================================================

#[tokio::test]
async fn worker_emits_frames_and_stats_for_full_stream() {
    let server = serve_frames("myboundary", &[b"AAAA", b"BBB"]).await;
    let target = ConnectionTarget::parse(&server.url("/stream")).unwrap();

    let events = collect_events(target).await;

    let frames: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Frame(frame) => Some(frame.bytes().as_ref().to_vec()),
            _ => None,
        })
        .collect();
    assert_eq!(frames, vec![b"AAAA".to_vec(), b"BBB".to_vec()]);

    // One stats snapshot after every processed frame, counters monotonic.
    let stats: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Stats(s) => Some(s.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].frame_count, 1);
    assert_eq!(stats[0].bytes_read, 4);
    assert_eq!(stats[1].frame_count, 2);
    assert_eq!(stats[1].error_frame_count, 0);
    assert_eq!(stats[1].bytes_read, 7);

    assert!(!events
        .iter()
        .any(|e| matches!(e, StreamEvent::Error { .. })));
}

#[tokio::test]
async fn worker_counts_malformed_part_and_continues() {
    // Hand-build a body whose first part has a non-numeric Content-Length.
    let mut body = Vec::new();
    body.extend_from_slice(b"--myboundary\r\nContent-Length: banana\r\n\r\n");
    body.extend_from_slice(b"--myboundary\r\nContent-Length: 2\r\n\r\nOK");
    body.extend_from_slice(b"--myboundary--\r\n");

    let router = stream_router(content_type_for("myboundary"), body);
    let server = MjpegTestServer::start(router).await.unwrap();
    let target = ConnectionTarget::parse(&server.url("/stream")).unwrap();

    let events = collect_events(target).await;

    let frames: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Frame(frame) => Some(frame.bytes().as_ref().to_vec()),
            _ => None,
        })
        .collect();
    // The malformed part produces no frame event, only the good one lands.
    assert_eq!(frames, vec![b"OK".to_vec()]);

    let last_stats = events
        .iter()
        .rev()
        .find_map(|e| match e {
            StreamEvent::Stats(s) => Some(s.clone()),
            _ => None,
        })
        .expect("stats emitted");
    assert_eq!(last_stats.frame_count, 1);
    assert_eq!(last_stats.error_frame_count, 1);

    assert!(!events
        .iter()
        .any(|e| matches!(e, StreamEvent::Error { .. })));
}

#[tokio::test]
async fn worker_reports_connect_failure_exactly_once() {
    let router = stream_router("text/html".to_string(), b"nope".to_vec());
    let server = MjpegTestServer::start(router).await.unwrap();
    let target = ConnectionTarget::parse(&server.url("/stream")).unwrap();

    let events = collect_events(target).await;

    let errors: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Frame(_))));
}

#[tokio::test]
async fn cancel_during_stalled_read_is_a_clean_shutdown() {
    // Two complete parts, then the connection stalls with no more bytes.
    let boundary = "myboundary";
    let mut head = Vec::new();
    head.extend_from_slice(b"--myboundary\r\nContent-Length: 4\r\n\r\nAAAA");
    head.extend_from_slice(b"--myboundary\r\nContent-Length: 3\r\n\r\nBBB");

    let router = stalling_stream_router(content_type_for(boundary), head);
    let server = MjpegTestServer::start(router).await.unwrap();
    let target = ConnectionTarget::parse(&server.url("/stream")).unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let worker = StreamWorker::spawn(target, tx);

    // Two frames and two stats snapshots arrive, then the stream stalls.
    let mut frames_seen = 0;
    while frames_seen < 2 {
        match rx.recv().await.expect("worker still alive") {
            StreamEvent::Frame(_) => frames_seen += 1,
            StreamEvent::Stats(_) => {}
            StreamEvent::Error { message } => panic!("unexpected error: {message}"),
        }
    }

    worker.cancel();
    worker.join().await;

    // The shutdown was clean: no torn frame, no error event.
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Frame(_) => panic!("frame emitted after cancellation"),
            StreamEvent::Error { message } => panic!("error after cancellation: {message}"),
            StreamEvent::Stats(_) => {}
        }
    }

    server.shutdown().await;
}

#[tokio::test]
async fn session_replaces_prior_worker() {
    let first = serve_frames("one", &[b"XXXX"]).await;
    let second = serve_frames("two", &[b"YYYY"]).await;

    let mut session = StreamSession::new();

    let (tx1, mut rx1) = tokio::sync::mpsc::unbounded_channel();
    session
        .start(
            ConnectionTarget::parse(&first.url("/stream")).unwrap(),
            tx1,
        )
        .await;

    let (tx2, mut rx2) = tokio::sync::mpsc::unbounded_channel();
    session
        .start(
            ConnectionTarget::parse(&second.url("/stream")).unwrap(),
            tx2,
        )
        .await;

    // The first worker is fully joined before the second starts, so its
    // channel is closed by the time start() returns.
    let mut first_errors = 0;
    while let Some(event) = rx1.recv().await {
        if matches!(event, StreamEvent::Error { .. }) {
            first_errors += 1;
        }
    }
    assert_eq!(first_errors, 0);

    let mut saw_frame = false;
    while let Some(event) = rx2.recv().await {
        if let StreamEvent::Frame(frame) = event {
            assert_eq!(frame.bytes().as_ref(), b"YYYY");
            saw_frame = true;
        }
    }
    assert!(saw_frame);

    session.stop().await;
}
