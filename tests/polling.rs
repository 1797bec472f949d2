mod common;

use common::{body_bytes, body_string, get, message, post, TestServer};
use data_encoding::BASE64;
use http::{Method, Request, StatusCode};
use pulseserver::protocol::{EnginePacket, PacketType};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_handshake_returns_open_and_root_connect() {
    let server = TestServer::new();
    let (sid, packets) = server.handshake().await;

    assert_eq!(packets.len(), 2);
    let open: serde_json::Value = serde_json::from_str(&packets[0].data).unwrap();
    assert_eq!(open["sid"], json!(sid));
    assert_eq!(open["upgrades"], json!(["websocket"]));
    assert_eq!(open["pingInterval"], json!(200));
    assert_eq!(open["pingTimeout"], json!(200));
    assert_eq!(packets[1].encode(), "40");

    assert!(server.engine.session(&sid).is_some());
    assert_eq!(server.recorder.events(), vec!["connect:/"]);
}

#[tokio::test]
async fn test_handshake_content_type_is_binary_by_default() {
    let server = TestServer::new();
    let response = server
        .request(get("/socket.io/?EIO=3&transport=polling"))
        .await;
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/octet-stream"
    );
    let bytes = body_bytes(response).await;
    assert_eq!(bytes[0], 0, "string packet marker");
}

#[tokio::test]
async fn test_context_path_without_trailing_slash() {
    let server = TestServer::new();
    let response = server
        .request(get("/socket.io?EIO=3&transport=polling"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upgrades_not_offered_when_disabled() {
    let server = TestServer::with_config(pulseserver::config::Config {
        allow_upgrades: false,
        ..common::fast_config()
    });
    let (_, packets) = server.handshake().await;
    let open: serde_json::Value = serde_json::from_str(&packets[0].data).unwrap();
    assert_eq!(open["upgrades"], json!([]));
}

#[tokio::test]
async fn test_b64_handshake_is_base64_text() {
    let server = TestServer::new();
    let response = server
        .request(get("/socket.io/?EIO=3&transport=polling&b64=1"))
        .await;
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/plain; charset=UTF-8"
    );
    let text = String::from_utf8(BASE64.decode(&body_bytes(response).await).unwrap()).unwrap();
    assert!(text.ends_with("2:40"), "unexpected payload {text}");
    let start = text.find(":0{").expect("open packet") + 2;
    let end = text.len() - "2:40".len();
    let open: serde_json::Value = serde_json::from_str(&text[start..end]).unwrap();
    let sid = open["sid"].as_str().expect("sid in open packet");
    assert!(server.engine.session(sid).is_some());
}

#[tokio::test]
async fn test_jsonp_handshake_wraps_callback() {
    let server = TestServer::new();
    let response = server
        .request(get("/socket.io/?EIO=3&transport=polling&j=4"))
        .await;
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/javascript; charset=UTF-8"
    );
    let body = body_string(response).await;
    assert!(body.starts_with("___eio[4](\""), "unexpected body {body}");
    assert!(body.ends_with("2:40\");"), "unexpected body {body}");
}

#[tokio::test]
async fn test_malformed_query_is_bad_request() {
    let server = TestServer::new();
    for uri in [
        "/socket.io/?EIO=3",
        "/socket.io/?EIO=3&transport=smoke-signals",
        "/socket.io/?EIO=3&transport=polling&b64=maybe",
        "/socket.io/?EIO=3&transport=polling&j=abc",
    ] {
        let response = server.request(get(uri)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let body = common::parse_body(response).await;
        assert_eq!(body["error"]["code"], "invalid_request");
    }
}

#[tokio::test]
async fn test_unknown_session_closes_connection() {
    let server = TestServer::new();
    let response = server
        .request(get("/socket.io/?EIO=3&transport=polling&sid=nope"))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers().get("connection").unwrap(), "close");
    let body = common::parse_body(response).await;
    assert_eq!(body["error"]["code"], "unknown_session");
}

#[tokio::test]
async fn test_post_without_session_id_is_rejected() {
    let server = TestServer::new();
    let response = server
        .request(post("/socket.io/?EIO=3&transport=polling", "1:2"))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(server.engine.registry().is_empty());
}

#[tokio::test]
async fn test_unsupported_method_closes_connection() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;
    let response = server
        .request(
            Request::builder()
                .method(Method::PUT)
                .uri(format!("/socket.io/?EIO=3&transport=polling&sid={sid}"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers().get("connection").unwrap(), "close");
}

#[tokio::test]
async fn test_options_preflight_is_ok() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;
    let response = server
        .request(
            Request::builder()
                .method(Method::OPTIONS)
                .uri(format!("/socket.io/?EIO=3&transport=polling&sid={sid}"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_post_answers_ok_and_ping_gets_pong() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    let response = server
        .post(&sid, &[EnginePacket::new(PacketType::Ping, "x")])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "text/html");
    assert_eq!(body_string(response).await, "ok");

    let packets = server.poll(&sid).await;
    assert_eq!(packets, vec![EnginePacket::new(PacketType::Pong, "x")]);
}

#[tokio::test]
async fn test_event_reaches_listener_and_reply_is_polled() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    server.post(&sid, &[message(r#"2["echo","hi"]"#)]).await;
    let packets = server.poll(&sid).await;
    assert_eq!(packets, vec![message(r#"2["echo","hi"]"#)]);
    assert!(server
        .recorder
        .events()
        .contains(&r#"event:/:echo:["hi"]"#.to_string()));
}

#[tokio::test]
async fn test_event_with_ack_id_is_acknowledged() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    server.post(&sid, &[message(r#"27["echo",1,2]"#)]).await;
    let packets = server.poll(&sid).await;
    assert_eq!(packets, vec![message("37[1,2]")]);
}

#[tokio::test]
async fn test_several_packets_in_one_post() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    server
        .post(
            &sid,
            &[
                EnginePacket::new(PacketType::Ping, "é"),
                message(r#"2["echo","ü"]"#),
            ],
        )
        .await;
    let packets = server.poll_at_least(&sid, 2).await;
    assert_eq!(
        packets,
        vec![
            EnginePacket::new(PacketType::Pong, "é"),
            message(r#"2["echo","ü"]"#)
        ]
    );
}

#[tokio::test]
async fn test_b64_post_is_decoded() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    let body = BASE64.encode(b"6:2probe");
    let response = server
        .request(post(
            &format!("/socket.io/?EIO=3&transport=polling&sid={sid}&b64=1"),
            body,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        server.poll(&sid).await,
        vec![EnginePacket::new(PacketType::Pong, "probe")]
    );
}

#[tokio::test]
async fn test_jsonp_form_post_is_decoded() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    let response = server
        .request(post(
            &format!("/socket.io/?EIO=3&transport=polling&sid={sid}&j=0"),
            "d=6%3A2hello",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        server.poll(&sid).await,
        vec![EnginePacket::new(PacketType::Pong, "hello")]
    );
}

#[tokio::test]
async fn test_malformed_post_is_bad_request() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    let response = server
        .request(post(
            &format!("/socket.io/?EIO=3&transport=polling&sid={sid}"),
            "9:2",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(server.engine.session(&sid).is_some());
}

#[tokio::test]
async fn test_oversized_post_is_rejected() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    let data = "x".repeat(2048);
    let response = server
        .request(post(
            &format!("/socket.io/?EIO=3&transport=polling&sid={sid}"),
            format!("{}:4{data}", data.len() + 1),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_parked_poll_is_woken_by_broadcast() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    let router = server.router();
    let uri = format!("/socket.io/?EIO=3&transport=polling&sid={sid}");
    let parked = tokio::spawn(async move {
        use tower::ServiceExt;
        let response = router.oneshot(get(&uri)).await.unwrap();
        common::decode_payload(&body_bytes(response).await)
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(server.engine.broadcast("/", None, "news", vec![json!(7)]), 1);
    let packets = parked.await.unwrap();
    assert_eq!(packets, vec![message(r#"2["news",7]"#)]);
}

#[tokio::test]
async fn test_idle_poll_answers_noop_after_timeout() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    let packets = server.poll(&sid).await;
    assert_eq!(packets, vec![EnginePacket::empty(PacketType::Noop)]);
    assert!(server.engine.session(&sid).is_some());
}

#[tokio::test]
async fn test_second_parked_poll_closes_session() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    let router = server.router();
    let uri = format!("/socket.io/?EIO=3&transport=polling&sid={sid}");
    let first = tokio::spawn(async move {
        use tower::ServiceExt;
        let response = router.oneshot(get(&uri)).await.unwrap();
        common::decode_payload(&body_bytes(response).await)
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = server.poll(&sid).await;
    assert_eq!(second, vec![EnginePacket::empty(PacketType::Close)]);
    assert_eq!(
        first.await.unwrap(),
        vec![EnginePacket::empty(PacketType::Close)]
    );
    assert!(server.engine.session(&sid).is_none());
    assert!(server
        .recorder
        .events()
        .contains(&"disconnect:/:protocol violation".to_string()));
}

#[tokio::test]
async fn test_disconnect_flag_closes_session() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    let response = server
        .request(get(&format!(
            "/socket.io/?EIO=3&transport=polling&sid={sid}&disconnect=1"
        )))
        .await;
    assert_eq!(body_string(response).await, "ok");

    let engine = server.engine.clone();
    let id = sid.clone();
    common::eventually(move || engine.session(&id).is_none()).await;
    let response = server
        .request(get(&format!("/socket.io/?EIO=3&transport=polling&sid={sid}")))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(server
        .recorder
        .events()
        .contains(&"disconnect:/:client disconnect".to_string()));
}

#[tokio::test]
async fn test_close_packet_closes_session() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    server
        .post(&sid, &[EnginePacket::empty(PacketType::Close)])
        .await;
    let engine = server.engine.clone();
    common::eventually(move || engine.session(&sid).is_none()).await;
    assert!(server.engine.hub().clients("/").is_empty());
}

#[tokio::test]
async fn test_namespace_connect_and_disconnect() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    server.post(&sid, &[message("0/chat")]).await;
    assert_eq!(server.poll(&sid).await, vec![message("0/chat,")]);
    let id = server.engine.session(&sid).unwrap().id();
    assert_eq!(server.engine.hub().clients("/chat"), vec![id]);

    server.post(&sid, &[message(r#"2/chat,["echo","x"]"#)]).await;
    assert_eq!(
        server.poll(&sid).await,
        vec![message(r#"2/chat,["echo","x"]"#)]
    );

    server.post(&sid, &[message("1/chat")]).await;
    let engine = server.engine.clone();
    common::eventually(move || engine.hub().clients("/chat").is_empty()).await;
    assert!(server.engine.session(&sid).is_some(), "root stays connected");
    assert!(server
        .recorder
        .events()
        .contains(&"disconnect:/chat:client disconnect".to_string()));
}

#[tokio::test]
async fn test_room_broadcast_reaches_members_only() {
    let server = TestServer::new();
    let (member, _) = server.handshake().await;
    let (outsider, _) = server.handshake().await;

    server.post(&member, &[message(r#"2["join","lobby"]"#)]).await;
    let engine = server.engine.clone();
    common::eventually(move || engine.hub().room_members("/", "lobby").len() == 1).await;

    assert_eq!(
        server
            .engine
            .broadcast("/", Some("lobby"), "hello", vec![json!("room")]),
        1
    );
    assert_eq!(
        server.poll(&member).await,
        vec![message(r#"2["hello","room"]"#)]
    );
    assert_eq!(
        server.poll(&outsider).await,
        vec![EnginePacket::empty(PacketType::Noop)]
    );
}

#[tokio::test]
async fn test_silent_client_times_out() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(server.engine.session(&sid).is_none());
    assert!(server.engine.hub().clients("/").is_empty());
    assert!(server
        .recorder
        .events()
        .contains(&"disconnect:/:ping timeout".to_string()));
}

#[tokio::test]
async fn test_parked_jsonp_poll_is_framed_as_jsonp() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    let router = server.router();
    let uri = format!("/socket.io/?EIO=3&transport=polling&sid={sid}&j=2");
    let parked = tokio::spawn(async move {
        use tower::ServiceExt;
        let response = router.oneshot(get(&uri)).await.unwrap();
        body_string(response).await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    server.engine.broadcast("/", None, "news", vec![]);
    assert_eq!(
        parked.await.unwrap(),
        r#"___eio[2]("10:42[\"news\"]");"#
    );
}

#[tokio::test]
async fn test_jsonp_index_does_not_excuse_a_missing_sid() {
    let server = TestServer::new();
    let (sid, _) = server.handshake().await;

    let response = server
        .request(post("/socket.io/?EIO=3&transport=polling&j=3", "d=1%3A2"))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = server
        .request(post(
            &format!("/socket.io/?EIO=3&transport=polling&sid={sid}&j=3"),
            "d=1%3A2",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}
