//! End-to-end feed sessions against a local WebSocket exchange

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use market_data_feed::{
    Config, ConnectionState, FeedManager, FeedObserver, Level, MarketDataError,
};
use rust_decimal_macros::dec;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

const WAIT: Duration = Duration::from_secs(5);

/// Accept one client and hand its socket to `script`
async fn spawn_exchange<F, Fut>(script: F) -> (String, JoinHandle<()>)
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        script(ws).await;
    });
    (format!("ws://{addr}"), handle)
}

/// Read frames until the client closes
async fn drain(ws: &mut WebSocketStream<TcpStream>) {
    while let Some(Ok(msg)) = ws.next().await {
        if msg.is_close() {
            break;
        }
    }
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return text,
            Some(Ok(_)) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

fn test_config(url: &str) -> Config {
    Config {
        ws_endpoint: url.to_string(),
        max_depth: 2,
        level_count: 2,
        heartbeat_interval_ms: 50,
        ..Config::default()
    }
}

async fn wait_for_total(feed: &FeedManager, total: u64) {
    timeout(WAIT, async {
        while feed.counts().total_message_count < total {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("messages not processed in time");
}

async fn wait_for_state(feed: &FeedManager, wanted: ConnectionState) {
    let mut states = feed.subscribe_state();
    timeout(WAIT, states.wait_for(|state| *state == wanted))
        .await
        .expect("state not reached in time")
        .expect("state channel closed");
}

#[derive(Default)]
struct CountingObserver {
    opened: AtomicUsize,
    closed: AtomicUsize,
    errors: AtomicUsize,
}

impl FeedObserver for CountingObserver {
    fn on_open(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    fn on_close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _error: &MarketDataError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

const SESSION: [&str; 11] = [
    r#"{"type":"subscriptions","channels":[{"name":"full","product_ids":["BTC-USD"]}]}"#,
    r#"{"type":"open","order_id":"1","side":"buy","price":"1.00","remaining_size":"1.005"}"#,
    r#"{"type":"open","order_id":"2","side":"buy","price":"2.00","remaining_size":"0.5"}"#,
    r#"{"type":"open","order_id":"5","side":"buy","price":"0.50","remaining_size":"5.555"}"#,
    r#"{"type":"open","order_id":"6","side":"buy","price":"6.00","remaining_size":"6.00"}"#,
    r#"{"type":"match","maker_order_id":"6","taker_order_id":"t1","side":"buy","size":"6.00","price":"6.00"}"#,
    r#"{"type":"match","maker_order_id":"2","taker_order_id":"t2","side":"buy","size":"0.2","price":"2.00"}"#,
    r#"{"type":"change","order_id":"2","side":"buy","new_size":"0.1","old_size":"0.3","price":"2.00"}"#,
    r#"{"type":"done","order_id":"1","side":"buy","reason":"canceled"}"#,
    r#"{"type":"open","order_id":"a1","side":"sell","price":"7.25","remaining_size":"1.5"}"#,
    r#"{"type":"heartbeat","sequence":90,"last_trade_id":20}"#,
];

#[tokio::test]
async fn test_session_builds_book_and_closes_cleanly() {
    let (sub_tx, sub_rx) = oneshot::channel();
    let (url, server) = spawn_exchange(|mut ws| async move {
        let _ = sub_tx.send(next_text(&mut ws).await);
        for raw in SESSION {
            ws.send(Message::Text(raw.to_string())).await.unwrap();
        }
        drain(&mut ws).await;
    })
    .await;

    let observer = Arc::new(CountingObserver::default());
    let mut feed = FeedManager::new(test_config(&url))
        .unwrap()
        .with_observer(observer.clone());
    feed.start().await.unwrap();

    let subscription: serde_json::Value =
        serde_json::from_str(&timeout(WAIT, sub_rx).await.unwrap().unwrap()).unwrap();
    assert_eq!(
        subscription,
        serde_json::json!({"type": "subscribe", "product_ids": ["BTC-USD"], "channels": ["full"]})
    );

    wait_for_total(&feed, SESSION.len() as u64).await;
    assert_eq!(feed.state(), ConnectionState::Running);
    assert!(matches!(feed.start().await, Err(MarketDataError::AlreadyRunning)));

    let snapshot = feed.snapshot(2).await;
    assert_eq!(snapshot.bids, vec![Level { quantity: dec!(0.3), price: dec!(2.00) }]);
    assert_eq!(snapshot.asks, vec![Level { quantity: dec!(1.5), price: dec!(7.25) }]);
    assert_eq!(
        feed.inside_levels().await,
        " 1.50000 @ 7.25\n----------------\n 0.30000 @ 2.00"
    );

    let counts = feed.counts();
    assert_eq!(counts.by_type["open"], 5);
    assert_eq!(counts.by_type["match"], 2);
    assert_eq!(counts.by_type["done"], 1);
    assert_eq!(counts.by_type["change"], 1);
    assert_eq!(counts.by_type["subscriptions"], 1);
    assert_eq!(counts.by_type["unknown"], 1);

    feed.close().await;
    assert_eq!(feed.state(), ConnectionState::Closed);
    assert_eq!(feed.last_error(), None);
    timeout(WAIT, server).await.unwrap().unwrap();

    feed.close().await;
    assert_eq!(observer.opened.load(Ordering::SeqCst), 1);
    assert_eq!(observer.closed.load(Ordering::SeqCst), 1);
    assert_eq!(observer.errors.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_message_is_terminal() {
    let (url, server) = spawn_exchange(|mut ws| async move {
        next_text(&mut ws).await;
        ws.send(Message::Text(
            r#"{"type":"open","order_id":"1","side":"sell","price":"10","remaining_size":"1"}"#
                .to_string(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text("this is not json".to_string()))
            .await
            .unwrap();
        drain(&mut ws).await;
    })
    .await;

    let observer = Arc::new(CountingObserver::default());
    let mut feed = FeedManager::new(test_config(&url))
        .unwrap()
        .with_observer(observer.clone());
    feed.start().await.unwrap();

    wait_for_state(&feed, ConnectionState::Errored).await;
    assert!(matches!(feed.last_error(), Some(MarketDataError::ParseError(_))));
    assert_eq!(feed.counts().total_message_count, 1);
    assert_eq!(feed.snapshot(2).await.best_ask(), Some(dec!(10)));
    assert_eq!(observer.errors.load(Ordering::SeqCst), 1);

    feed.close().await;
    assert_eq!(feed.state(), ConnectionState::Errored);
    assert!(feed.last_error().is_some());
    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_non_utf8_binary_frame_is_terminal() {
    let (url, server) = spawn_exchange(|mut ws| async move {
        next_text(&mut ws).await;
        ws.send(Message::Text(
            r#"{"type":"open","order_id":"1","side":"buy","price":"1","remaining_size":"1"}"#
                .to_string(),
        ))
        .await
        .unwrap();
        let mut corrupt = br#"{"type":"open","order_id":"x"#.to_vec();
        corrupt.push(0xff);
        corrupt.extend_from_slice(br#"","side":"buy","price":"2","remaining_size":"1"}"#);
        ws.send(Message::Binary(corrupt)).await.unwrap();
        drain(&mut ws).await;
    })
    .await;

    let mut feed = FeedManager::new(test_config(&url)).unwrap();
    feed.start().await.unwrap();

    wait_for_state(&feed, ConnectionState::Errored).await;
    assert!(matches!(feed.last_error(), Some(MarketDataError::ParseError(_))));
    assert_eq!(feed.counts().total_message_count, 1);
    assert_eq!(
        feed.snapshot(2).await.bids,
        vec![Level { quantity: dec!(1), price: dec!(1) }]
    );

    feed.close().await;
    assert_eq!(feed.state(), ConnectionState::Errored);
    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_peer_close_is_transport_failure() {
    let (url, server) = spawn_exchange(|mut ws| async move {
        next_text(&mut ws).await;
        ws.close(None).await.unwrap();
        drain(&mut ws).await;
    })
    .await;

    let mut feed = FeedManager::new(test_config(&url)).unwrap();
    feed.start().await.unwrap();

    wait_for_state(&feed, ConnectionState::Errored).await;
    let err = feed.last_error().unwrap();
    assert!(err.is_transport(), "unexpected error {err:?}");

    feed.close().await;
    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_heartbeat_pings_while_connected() {
    let (ping_tx, ping_rx) = oneshot::channel();
    let (url, server) = spawn_exchange(|mut ws| async move {
        next_text(&mut ws).await;
        let mut pings = 0;
        let mut ping_tx = Some(ping_tx);
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Ping(payload) => {
                    assert_eq!(payload, b"keepalive".to_vec());
                    pings += 1;
                    if pings == 2 {
                        if let Some(tx) = ping_tx.take() {
                            let _ = tx.send(());
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    })
    .await;

    let mut feed = FeedManager::new(Config {
        heartbeat_interval_ms: 20,
        ..test_config(&url)
    })
    .unwrap();
    feed.start().await.unwrap();

    timeout(WAIT, ping_rx)
        .await
        .expect("no keepalive pings")
        .unwrap();
    assert_eq!(feed.state(), ConnectionState::Running);

    feed.close().await;
    assert_eq!(feed.state(), ConnectionState::Closed);
    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut feed = FeedManager::new(test_config(&format!("ws://{addr}"))).unwrap();
    let err = feed.start().await.unwrap_err();

    assert!(matches!(err, MarketDataError::WebSocketConnection(_)));
    assert_eq!(feed.state(), ConnectionState::Closed);
    assert_eq!(feed.last_error(), Some(err));
}
