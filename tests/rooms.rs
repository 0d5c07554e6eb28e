//! Integration tests for multi-user chats: converting a chat into a room,
//! invitations, and occupant traffic relayed by the room.

mod common;

use common::{TestRouter, addr};
use parley_proto::{
    Envelope, FullAddress, Invitation, MessageKind, MessageStanza, Occupant, PresenceKind,
    PresenceStanza, RoomStanza, Stanza,
};
use parleyd::notify::Notification;
use parleyd::persona::OutgoingMessage;

const THREAD: &str = "chat-alice%example.com-1";
const ROOM: &str = "chat-alice%example.com-1@conference.example.com";

fn occupant(nick: &str) -> FullAddress {
    addr(ROOM).with_resource(nick)
}

fn invitation(from: &str, reason: Option<&str>) -> Stanza {
    Stanza::Message(MessageStanza {
        invite: Some(Invitation {
            from: addr(from),
            reason: reason.map(str::to_string),
        }),
        ..MessageStanza::default()
    })
}

async fn open_chat(router: &TestRouter) {
    router
        .hub
        .send_message(
            addr("alice@example.com"),
            addr("bob@example.com"),
            None,
            OutgoingMessage::text("hi"),
        )
        .unwrap();
    router.settle().await;
}

#[tokio::test]
async fn adding_a_user_converts_the_chat_into_a_room() {
    let mut router = TestRouter::spawn();
    open_chat(&router).await;
    router.outbound();

    router
        .hub
        .add_user_to_chat(
            addr("alice@example.com"),
            THREAD,
            addr("carol@example.com"),
            Some("come join".into()),
        )
        .unwrap();
    router.settle().await;

    let sent = router.outbound();
    let requests: Vec<(String, RoomStanza)> = sent
        .into_iter()
        .filter_map(|e| match e.stanza {
            Stanza::Room(r) => Some((e.to.to_string(), r)),
            _ => None,
        })
        .collect();
    assert_eq!(
        requests,
        vec![
            (
                format!("{ROOM}/alice"),
                RoomStanza::Create {
                    nick: "alice".into()
                }
            ),
            (
                ROOM.to_string(),
                RoomStanza::Invite {
                    invitee: addr("bob@example.com"),
                    reason: None
                }
            ),
            (
                ROOM.to_string(),
                RoomStanza::Invite {
                    invitee: addr("carol@example.com"),
                    reason: Some("come join".into())
                }
            ),
        ]
    );

    let persona = router.persona("alice@example.com").await;
    let alice = persona.lock().await;
    let chat = alice.chat(THREAD).expect("chat");
    assert!(chat.is_multi_user());
    assert_eq!(chat.room(), Some(&addr(ROOM)));
}

#[tokio::test]
async fn adding_to_a_missing_chat_fails_quietly() {
    let mut router = TestRouter::spawn();
    router
        .hub
        .add_user_to_chat(
            addr("alice@example.com"),
            "no-such-thread",
            addr("carol@example.com"),
            None,
        )
        .unwrap();
    router.settle().await;
    assert!(router.outbound().is_empty());
}

#[tokio::test]
async fn peer_follows_a_converted_chat() {
    let mut router = TestRouter::spawn();
    open_chat(&router).await;
    let mut bob = router.attach("bob@example.com").await;
    bob.drain();
    router.outbound();

    router
        .hub
        .receive(Envelope::new(
            addr(ROOM),
            addr("bob@example.com"),
            invitation("alice@example.com", None),
        ))
        .unwrap();
    router.settle().await;

    let sent = router.outbound();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, occupant("bob"));
    assert_eq!(
        sent[0].stanza,
        Stanza::Room(RoomStanza::Join { nick: "bob".into() })
    );

    let persona = router.persona("bob@example.com").await;
    let bob_side = persona.lock().await;
    let chat = bob_side.chat(THREAD).expect("same thread");
    assert!(chat.is_multi_user());
    assert_eq!(chat.messages().len(), 2);
    assert!(chat.messages()[1].from.is_none());
    drop(bob_side);
    assert_eq!(bob.message_bodies().len(), 1);
}

#[tokio::test]
async fn fresh_invitation_is_offered_to_the_user() {
    let mut router = TestRouter::spawn();
    let mut carol = router.attach("carol@example.com").await;
    carol.drain();

    router
        .hub
        .receive(Envelope::new(
            addr(ROOM),
            addr("carol@example.com"),
            invitation("alice@example.com", None),
        ))
        .unwrap();
    router.settle().await;

    let expected_text =
        format!("alice@example.com has invited you into a groupchat (/join {ROOM})");
    assert!(carol.drain().contains(&Notification::ChatInvite {
        thread: THREAD.to_string(),
        room: addr(ROOM),
        from: addr("alice@example.com"),
        text: expected_text,
    }));
    // Nothing is sent until the user joins.
    assert!(router.outbound().is_empty());

    router
        .hub
        .join_chat(addr("carol@example.com"), addr(ROOM), None)
        .unwrap();
    router.settle().await;
    let sent = router.outbound();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, occupant("carol"));

    let persona = router.persona("carol@example.com").await;
    assert_eq!(persona.lock().await.chat_threads(), vec![THREAD.to_string()]);
}

#[tokio::test]
async fn occupants_entering_and_leaving_are_logged() {
    let router = TestRouter::spawn();
    router
        .hub
        .join_chat(addr("bob@example.com"), addr(ROOM), Some(THREAD.into()))
        .unwrap();
    router.settle().await;
    let mut bob = router.attach("bob@example.com").await;
    bob.drain();

    let carol_presence =
        PresenceStanza::of_kind(PresenceKind::Available).with_occupant(Occupant {
            real_address: Some(addr("carol@example.com")),
            ..Occupant::default()
        });
    router
        .hub
        .receive(Envelope::new(
            occupant("carol"),
            addr("bob@example.com"),
            Stanza::Presence(carol_presence.clone()),
        ))
        .unwrap();
    router.settle().await;

    let seen = bob.drain();
    assert!(seen.contains(&Notification::EnteredChat {
        thread: THREAD.to_string(),
        address: addr("carol@example.com"),
        nick: Some("carol".into()),
    }));
    {
        let persona = router.persona("bob@example.com").await;
        let bob_side = persona.lock().await;
        let chat = bob_side.chat(THREAD).expect("room chat");
        assert!(chat.has_participant(&addr("carol@example.com")));
        assert_eq!(
            chat.messages().last().map(|m| m.body.as_str()),
            Some("carol has entered the chat.")
        );
    }

    let leaving = PresenceStanza {
        kind: PresenceKind::Unavailable,
        ..carol_presence
    };
    router
        .hub
        .receive(Envelope::new(
            occupant("carol"),
            addr("bob@example.com"),
            Stanza::Presence(leaving),
        ))
        .unwrap();
    router.settle().await;
    assert!(bob.message_bodies().contains(&"carol has left the chat.".to_string()));
}

#[tokio::test]
async fn room_messages_carry_the_nick_and_skip_our_echo() {
    let router = TestRouter::spawn();
    router
        .hub
        .join_chat(addr("bob@example.com"), addr(ROOM), Some(THREAD.into()))
        .unwrap();
    router.settle().await;
    let mut bob = router.attach("bob@example.com").await;
    bob.drain();

    for nick in ["carol", "bob"] {
        router
            .hub
            .receive(Envelope::new(
                occupant(nick),
                addr("bob@example.com"),
                Stanza::Message(
                    MessageStanza::chat(format!("from {nick}"))
                        .with_kind(MessageKind::GroupChat)
                        .with_thread(THREAD),
                ),
            ))
            .unwrap();
    }
    router.settle().await;

    let messages: Vec<Notification> = bob
        .drain()
        .into_iter()
        .filter(|n| n.kind() == "message")
        .collect();
    assert_eq!(messages.len(), 1);
    assert!(matches!(
        &messages[0],
        Notification::Message { nick: Some(nick), body, .. } if nick == "carol" && body == "from carol"
    ));
}

#[tokio::test]
async fn sending_into_a_room_goes_to_the_room() {
    let mut router = TestRouter::spawn();
    router
        .hub
        .join_chat(addr("bob@example.com"), addr(ROOM), Some(THREAD.into()))
        .unwrap();
    router.settle().await;
    router.outbound();

    router
        .hub
        .send_message(
            addr("bob@example.com"),
            addr("ignored@example.com"),
            Some(THREAD.into()),
            OutgoingMessage::text("hello room"),
        )
        .unwrap();
    router.settle().await;

    let sent = router.outbound();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, FullAddress::from(addr(ROOM)));
    assert!(matches!(
        &sent[0].stanza,
        Stanza::Message(m) if m.kind == MessageKind::GroupChat && m.body.as_deref() == Some("hello room")
    ));
}

async fn type_into_chat(router: &TestRouter, text: &str) {
    router
        .hub
        .send_message(
            addr("alice@example.com"),
            addr("bob@example.com"),
            Some(THREAD.into()),
            OutgoingMessage::text(text),
        )
        .unwrap();
    router.settle().await;
}

#[tokio::test]
async fn add_command_invites_with_the_standard_reason() {
    let mut router = TestRouter::spawn();
    open_chat(&router).await;
    router.outbound();

    type_into_chat(&router, "/add carol@example.com").await;

    let invites: Vec<RoomStanza> = router
        .outbound()
        .into_iter()
        .filter_map(|e| match e.stanza {
            Stanza::Room(r @ RoomStanza::Invite { .. }) => Some(r),
            _ => None,
        })
        .collect();
    assert_eq!(
        invites,
        vec![
            RoomStanza::Invite {
                invitee: addr("bob@example.com"),
                reason: None
            },
            RoomStanza::Invite {
                invitee: addr("carol@example.com"),
                reason: Some("Please join my chat".into())
            },
        ]
    );

    let persona = router.persona("alice@example.com").await;
    let alice = persona.lock().await;
    let chat = alice.chat(THREAD).expect("chat");
    assert!(chat.is_multi_user());
    // The command itself is not logged.
    assert_eq!(chat.messages().len(), 1);
}

#[tokio::test]
async fn join_command_binds_the_chat_to_the_room() {
    let mut router = TestRouter::spawn();
    open_chat(&router).await;
    router.outbound();

    let other_room = "lobby@conference.example.com";
    type_into_chat(&router, &format!("/join {other_room}")).await;

    let sent = router.outbound();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, addr(other_room).with_resource("alice"));
    assert_eq!(
        sent[0].stanza,
        Stanza::Room(RoomStanza::Join {
            nick: "alice".into()
        })
    );

    let persona = router.persona("alice@example.com").await;
    let alice = persona.lock().await;
    assert_eq!(alice.chat(THREAD).and_then(|c| c.room()), Some(&addr(other_room)));
}

#[tokio::test]
async fn info_command_describes_the_chat_to_the_sender_only() {
    let mut router = TestRouter::spawn();
    open_chat(&router).await;
    let mut alice = router.attach("alice@example.com").await;
    alice.drain();
    router.outbound();

    type_into_chat(&router, "/info").await;

    let seen = alice.drain();
    let description = seen.iter().find_map(|n| match n {
        Notification::Message {
            from: None, body, ..
        } => Some(body.clone()),
        _ => None,
    });
    let description = description.expect("chat description");
    assert!(description.contains(THREAD));
    assert!(description.contains("bob@example.com"));
    assert!(router.outbound().is_empty());

    let persona = router.persona("alice@example.com").await;
    assert_eq!(
        persona.lock().await.chat(THREAD).map(|c| c.messages().len()),
        Some(1)
    );
}

#[tokio::test]
async fn command_errors_and_unknown_commands() {
    let mut router = TestRouter::spawn();
    open_chat(&router).await;
    let mut alice = router.attach("alice@example.com").await;
    alice.drain();
    router.outbound();

    type_into_chat(&router, "/add").await;
    assert!(
        alice
            .drain()
            .iter()
            .any(|n| matches!(n, Notification::Error { thread: Some(t), .. } if t == THREAD))
    );
    assert!(router.outbound().is_empty());

    type_into_chat(&router, "/shrug").await;
    assert_eq!(alice.message_bodies(), vec!["/shrug".to_string()]);
    let persona = router.persona("bob@example.com").await;
    let bob_side = persona.lock().await;
    let received = bob_side.chat(THREAD).expect("bob has the chat");
    assert_eq!(
        received.messages().last().map(|m| m.body.as_str()),
        Some("/shrug")
    );
}
