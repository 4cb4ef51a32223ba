mod common;

use common::{setup_logger, MockServer};
use rocket_connector_rs::config::SocketOptions;
use rocket_connector_rs::sims::{NewRoom, NewUser, RoomSims, UserSims};
use rocket_connector_rs::types::Message;
use rocket_connector_rs::websocket::Socket;
use rocket_connector_rs::ConnectorError;
use serde_json::json;

fn admin_options(server: &MockServer) -> SocketOptions {
    SocketOptions {
        username: "admin".to_string(),
        ..server.options()
    }
}

fn sim_bot() -> NewUser {
    NewUser {
        name: Some("Sim Bot".to_string()),
        username: Some("simbot".to_string()),
        password: Some("secret".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_user_once() {
    setup_logger();
    let server = MockServer::start().await;
    let users = UserSims::new(Socket::new(admin_options(&server)));

    let created = users.create(sim_bot()).await.unwrap();
    assert_eq!(created.id, "id-simbot");
    assert_eq!(created.account.name, "Sim Bot");
    assert!(server.has_user("simbot"));

    let insert = server
        .frames("method")
        .into_iter()
        .find(|f| f["method"] == "insertOrUpdateUser")
        .unwrap();
    assert_eq!(insert["params"][0]["email"], "bit-bucket+simbot@test.smtp.org");
    assert_eq!(insert["params"][0]["joinDefaultChannels"], false);

    let again = users.create(sim_bot()).await.unwrap();
    assert_eq!(again.id, created.id);
    assert_eq!(server.calls("insertOrUpdateUser"), 1);
    assert_eq!(users.users().len(), 1);

    let found = users.lookup("simbot").await.unwrap().unwrap();
    assert_eq!(found["_id"], "id-simbot");
    assert!(users.lookup("nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn test_random_user_gets_generated_names() {
    setup_logger();
    let server = MockServer::start().await;
    let users = UserSims::new(Socket::new(admin_options(&server)));

    let record = users.random(None).await.unwrap();
    assert!(!record.account.name.is_empty());
    assert_eq!(record.account.username, record.account.name.to_lowercase());
    assert_eq!(record.account.password.len(), 16);
    assert!(server.has_user(&record.account.username));
}

#[tokio::test]
async fn test_user_acts_on_own_socket() {
    setup_logger();
    let server = MockServer::start().await;
    let users = UserSims::new(Socket::new(admin_options(&server)));
    let bot = users.create(sim_bot()).await.unwrap();

    let socket = users.login_with_user(&bot.id).await.unwrap();
    assert!(socket.logged_in());
    assert_eq!(socket.user().unwrap().username.as_deref(), Some("simbot"));
    let connections = server.connections();

    let message = Message {
        rid: Some("GENERAL".to_string()),
        msg: Some("hello from a sim".to_string()),
        ..Default::default()
    };
    let receipt = users.send_from_user(&bot.id, &message).await.unwrap();
    assert_eq!(receipt.u.unwrap().username, "simbot");
    assert_eq!(receipt.msg, "hello from a sim");

    let joined = users
        .join_room_with_user(&bot.id, "room-random")
        .await
        .unwrap();
    assert_eq!(joined, json!(true));
    users
        .leave_room_with_user(&bot.id, "room-random")
        .await
        .unwrap();

    // The user's socket is reused
    assert_eq!(server.connections(), connections);

    let err = users.login_with_user("id-ghost").await.unwrap_err();
    assert!(matches!(err, ConnectorError::ParameterRequiredError { .. }));
}

#[tokio::test]
async fn test_delete_users() {
    setup_logger();
    let server = MockServer::start().await;
    let users = UserSims::new(Socket::new(admin_options(&server)));
    let bot = users.create(sim_bot()).await.unwrap();
    let socket = users.login_with_user(&bot.id).await.unwrap();
    users.create(NewUser::with_username("helper")).await.unwrap();

    users.delete_user(&bot.id).await.unwrap();
    assert!(!server.has_user("simbot"));
    assert!(!socket.connected());
    assert!(users.record(&bot.id).is_none());

    users.delete_all().await.unwrap();
    assert!(!server.has_user("helper"));
    assert!(users.users().is_empty());

    // Unknown usernames are skipped
    users.delete_username("nobody").await.unwrap();
    assert!(server.has_user("bot"));
}

#[tokio::test]
async fn test_create_and_delete_rooms() {
    setup_logger();
    let server = MockServer::start().await;
    let rooms = RoomSims::new(Socket::new(admin_options(&server)));

    let team = rooms.create(NewRoom::named("Team Room"), false).await.unwrap();
    assert_eq!(team.name, "team-room");
    assert_eq!(team.id, "room-team-room");
    assert!(server.has_room("team-room"));

    let again = rooms.create(NewRoom::named("team-room"), false).await.unwrap();
    assert_eq!(again, team);
    assert_eq!(server.calls("createChannel"), 1);

    let secret = rooms
        .random_private(Some(NewRoom {
            name: "secret".to_string(),
            members: vec!["bot".to_string()],
            read_only: true,
        }))
        .await
        .unwrap();
    assert_eq!(secret.id, "room-secret");
    let create = server
        .frames("method")
        .into_iter()
        .find(|f| f["method"] == "createPrivateGroup")
        .unwrap();
    assert_eq!(create["params"], json!(["secret", ["bot"], true]));

    let random = rooms.random(None).await.unwrap();
    assert!(random.name.contains('-'));
    assert_eq!(rooms.rooms().len(), 3);

    let err = rooms.create(NewRoom::named("!!!"), false).await.unwrap_err();
    assert!(matches!(err, ConnectorError::ParameterRequiredError { .. }));
    assert!(rooms.lookup("nowhere").await.unwrap().is_none());

    rooms.delete_room_by_name("random").await.unwrap();
    assert!(!server.has_room("random"));

    rooms.delete_all().await.unwrap();
    assert!(!server.has_room("team-room"));
    assert!(!server.has_room("secret"));
    assert!(rooms.rooms().is_empty());
    assert!(server.has_room("GENERAL"));
}
