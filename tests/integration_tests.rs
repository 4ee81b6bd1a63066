//! Integration tests for the trivia sync protocol
//!
//! These tests run a real server on an ephemeral port and talk to it over
//! WebSockets, either with raw sockets or through the client's
//! `ConnectionManager`.

use client::network::{ClientConfig, ConnectionEvent, ConnectionManager};
use futures_util::{SinkExt, StreamExt};
use server::game::GameEngine;
use server::network::{Server, ServerConfig};
use shared::{
    Activities, Activity, ActivityContent, Command, Effect, Event, GameState, Media, MediaType,
    PlaybackAction, PlayerId,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

fn media(id: &str, media_type: MediaType) -> Activity {
    Activity::new(
        id,
        ActivityContent::media(media_type, Media::new(format!("{}.bin", id))),
    )
}

fn catalog() -> Activities {
    let reveal = Activity::new(
        "q1",
        ActivityContent::Reveal {
            question: Box::new(media("q1-q", MediaType::Text)),
            answer: Box::new(media("q1-a", MediaType::Image)),
        },
    );
    let clip = media("clip", MediaType::Video);
    let list = Activity::new(
        "list",
        ActivityContent::MediaList {
            items: vec![media("list-0", MediaType::Image), media("list-1", MediaType::Audio)],
        },
    );
    // Alphabetical, the order the catalog has after a trip over the wire
    Activities::from_trees([clip, list, reveal]).unwrap()
}

async fn start_server(heartbeat: Duration) -> SocketAddr {
    let mut engine = GameEngine::new(Arc::new(catalog()));
    engine.add_player("Ada", "http://media/ada.png", None);
    engine.add_player("Grace", "http://media/grace.png", None);

    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        heartbeat_interval: heartbeat,
    };
    let server = Server::bind(config, engine).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();
    socket
}

/// Next non-heartbeat event on the socket
async fn next_event(socket: &mut Socket) -> Event {
    loop {
        let frame = timeout(WAIT, socket.next())
            .await
            .expect("Timed out waiting for an event")
            .expect("Socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            let event = Event::decode(text.as_str()).unwrap();
            if !matches!(event, Event::Heartbeat { .. }) {
                return event;
            }
        }
    }
}

async fn next_state(socket: &mut Socket) -> GameState {
    match next_event(socket).await {
        Event::GameState { state, .. } => state,
        other => panic!("Expected a GameState event, got {:?}", other),
    }
}

/// Connects and consumes the greeting
async fn join(addr: SocketAddr) -> Socket {
    let mut socket = connect(addr).await;
    assert!(matches!(next_event(&mut socket).await, Event::Activities { .. }));
    next_state(&mut socket).await;
    socket
}

async fn send(socket: &mut Socket, command: &Command) {
    socket
        .send(Message::Text(command.encode().unwrap().into()))
        .await
        .unwrap();
}

/// CONNECTION TESTS
mod connection_tests {
    use super::*;

    #[tokio::test]
    async fn greets_with_activities_then_state() {
        let addr = start_server(Duration::from_secs(60)).await;
        let mut socket = connect(addr).await;

        match next_event(&mut socket).await {
            Event::Activities { activities, .. } => {
                assert_eq!(activities, catalog());
            }
            other => panic!("Expected Activities first, got {:?}", other),
        }

        let state = next_state(&mut socket).await;
        assert_eq!(state.players.len(), 2);
        assert!(!state.buzzers.enabled);
        assert!(state.active.activity.is_none());
    }

    #[tokio::test]
    async fn heartbeats_arrive_periodically() {
        let addr = start_server(Duration::from_millis(50)).await;
        let mut socket = join(addr).await;

        let mut heartbeats = 0;
        while heartbeats < 3 {
            let frame = timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap();
            if let Message::Text(text) = frame {
                if let Ok(Event::Heartbeat { time }) = Event::decode(text.as_str()) {
                    assert!(time > 0);
                    heartbeats += 1;
                }
            }
        }
    }

    #[tokio::test]
    async fn rejects_other_paths() {
        let addr = start_server(Duration::from_secs(60)).await;
        let result = tokio_tungstenite::connect_async(format!("ws://{}/other", addr)).await;
        assert!(result.is_err());
    }
}

/// BROADCAST TESTS
mod broadcast_tests {
    use super::*;

    #[tokio::test]
    async fn buzz_fans_out_to_every_connection() {
        let addr = start_server(Duration::from_secs(60)).await;
        let mut host = join(addr).await;
        let mut player = join(addr).await;

        send(&mut host, &Command::EnableBuzzers { enabled: true }).await;
        assert!(next_state(&mut host).await.buzzers.enabled);
        assert!(next_state(&mut player).await.buzzers.enabled);

        send(
            &mut player,
            &Command::Buzz {
                player_id: PlayerId(1),
            },
        )
        .await;

        for socket in [&mut host, &mut player] {
            let state = next_state(socket).await;
            let order = state.buzzers.state.unwrap();
            assert_eq!(order.len(), 1);
            assert_eq!(order[0].player_id, PlayerId(1));
        }
    }

    #[tokio::test]
    async fn no_op_commands_produce_no_snapshot() {
        let addr = start_server(Duration::from_secs(60)).await;
        let mut socket = join(addr).await;

        send(&mut socket, &Command::EnableBuzzers { enabled: true }).await;
        assert!(next_state(&mut socket).await.buzzers.enabled);

        // Already enabled, nothing to reset, unknown player
        send(&mut socket, &Command::EnableBuzzers { enabled: true }).await;
        send(&mut socket, &Command::ResetBuzzers).await;
        send(
            &mut socket,
            &Command::Buzz {
                player_id: PlayerId(99),
            },
        )
        .await;

        send(&mut socket, &Command::EnableBuzzers { enabled: false }).await;
        assert!(!next_state(&mut socket).await.buzzers.enabled);
    }

    #[tokio::test]
    async fn set_activity_broadcasts_tree_and_state() {
        let addr = start_server(Duration::from_secs(60)).await;
        let mut socket = join(addr).await;

        let command = Command::set_activity(
            Some("q1".into()),
            Some(&shared::ActiveState::reveal(true)),
        )
        .unwrap();
        send(&mut socket, &command).await;

        let state = next_state(&mut socket).await;
        let activity = state.active.activity.unwrap();
        assert_eq!(activity.id.as_str(), "q1");
        assert!(matches!(activity.content, ActivityContent::Reveal { .. }));
        assert_eq!(state.active.state, Some(shared::ActiveState::reveal(true)));
    }

    #[tokio::test]
    async fn invalid_commands_are_dropped_silently() {
        let addr = start_server(Duration::from_secs(60)).await;
        let mut socket = join(addr).await;

        socket
            .send(Message::Text("{not json".into()))
            .await
            .unwrap();
        socket
            .send(Message::Text(r#"{"command":"Explode","data":{}}"#.into()))
            .await
            .unwrap();
        // State tag does not match the activity
        socket
            .send(Message::Text(
                r#"{"command":"SetActivity","data":{"activityId":"clip","state":{"type":"reveal","showAnswer":true}}}"#.into(),
            ))
            .await
            .unwrap();

        send(&mut socket, &Command::EnableBuzzers { enabled: true }).await;
        let state = next_state(&mut socket).await;
        assert!(state.buzzers.enabled);
        assert!(state.active.activity.is_none());
    }

    #[tokio::test]
    async fn rejected_effect_is_never_delivered() {
        let addr = start_server(Duration::from_secs(60)).await;
        let mut sender = join(addr).await;
        let mut watcher = join(addr).await;

        let unknown = Effect::playback(PlaybackAction::Play, "nope", None);
        let valid = Effect::playback(PlaybackAction::Pause, "list-1", Some("list".into()));
        send(&mut sender, &Command::send_effect(&unknown).unwrap()).await;
        send(&mut sender, &Command::send_effect(&valid).unwrap()).await;

        for socket in [&mut sender, &mut watcher] {
            match next_event(socket).await {
                Event::Effect { effect, .. } => assert_eq!(effect, valid),
                other => panic!("Expected the valid effect, got {:?}", other),
            }
        }
    }
}

/// CLIENT CONNECTION MANAGER TESTS
mod client_tests {
    use super::*;

    async fn next_client_event(
        events: &mut broadcast::Receiver<ConnectionEvent>,
    ) -> ConnectionEvent {
        timeout(WAIT, events.recv())
            .await
            .expect("Timed out waiting for a connection event")
            .unwrap()
    }

    #[tokio::test]
    async fn manager_receives_greeting_and_sends_commands() {
        let addr = start_server(Duration::from_millis(100)).await;
        let manager = ConnectionManager::new(ClientConfig {
            url: format!("ws://{}/ws", addr),
            ..ClientConfig::default()
        });
        let mut events = manager.subscribe();
        let handle = manager.start();

        assert!(matches!(next_client_event(&mut events).await, ConnectionEvent::Connecting));
        assert!(matches!(next_client_event(&mut events).await, ConnectionEvent::Connected));
        assert!(matches!(
            next_client_event(&mut events).await,
            ConnectionEvent::Activities(_)
        ));
        assert!(matches!(
            next_client_event(&mut events).await,
            ConnectionEvent::GameState(_)
        ));

        let sent = manager
            .send_command(&Command::EnableBuzzers { enabled: true })
            .await
            .unwrap();
        assert!(sent);

        match next_client_event(&mut events).await {
            ConnectionEvent::GameState(state) => assert!(state.buzzers.enabled),
            other => panic!("Expected a snapshot, got {:?}", other),
        }

        manager.close();
        timeout(WAIT, handle).await.unwrap().unwrap();
    }

    /// Accepts WebSocket connections and hands each socket to `serve`
    async fn fake_server<F, Fut>(serve: F) -> SocketAddr
    where
        F: Fn(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(socket) = tokio_tungstenite::accept_async(stream).await {
                    tokio::spawn(serve(socket));
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn missed_heartbeat_triggers_reconnect() {
        // Never sends anything, so every connection times out
        let addr = fake_server(|mut socket| async move {
            while let Some(Ok(_)) = socket.next().await {}
        })
        .await;

        let manager = ConnectionManager::new(ClientConfig {
            url: format!("ws://{}/ws", addr),
            heartbeat_timeout: Duration::from_millis(200),
            reconnect_step: Duration::from_millis(50),
            max_reconnect_delay: Duration::from_millis(100),
        });
        let mut events = manager.subscribe();
        let handle = manager.start();

        let mut seen = Vec::new();
        while seen.len() < 5 {
            match next_client_event(&mut events).await {
                ConnectionEvent::Connecting => seen.push("connecting"),
                ConnectionEvent::Connected => seen.push("connected"),
                ConnectionEvent::Disconnected => seen.push("disconnected"),
                other => panic!("Unexpected event {:?}", other),
            }
        }
        assert_eq!(
            seen,
            vec!["connecting", "connected", "disconnected", "connecting", "connected"]
        );

        manager.close();
        timeout(WAIT, handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stale_snapshot_is_dropped() {
        let addr = fake_server(|mut socket| async move {
            for (time, enabled) in [(100u64, true), (50, false), (150, true)] {
                let text = serde_json::json!({
                    "type": "GameState",
                    "time": time,
                    "state": { "players": {}, "buzzers": { "enabled": enabled }, "active": {} }
                })
                .to_string();
                if socket.send(Message::Text(text.into())).await.is_err() {
                    return;
                }
            }
            while let Some(Ok(_)) = socket.next().await {}
        })
        .await;

        let manager = ConnectionManager::new(ClientConfig {
            url: format!("ws://{}/ws", addr),
            ..ClientConfig::default()
        });
        let mut events = manager.subscribe();
        let handle = manager.start();

        let mut snapshots = Vec::new();
        while snapshots.len() < 2 {
            if let ConnectionEvent::GameState(state) = next_client_event(&mut events).await {
                snapshots.push(state.buzzers.enabled);
            }
        }
        // The (50, false) snapshot never surfaces
        assert_eq!(snapshots, vec![true, true]);

        manager.close();
        timeout(WAIT, handle).await.unwrap().unwrap();
    }
}
