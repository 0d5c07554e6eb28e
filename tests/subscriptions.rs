//! Integration tests for the subscription handshake and presence delivery
//! between local personas.

mod common;

use common::{TestRouter, addr};
use parley_proto::{PresenceKind, Presence, Show, Stanza};
use parleyd::notify::Notification;
use parleyd::persona::{Ask, RosterEntry};
use parleyd::subscription::Subscription;

async fn subscription_of(router: &TestRouter, owner: &str, buddy: &str) -> Option<(Subscription, Option<Ask>)> {
    let persona = router.persona(owner).await;
    let persona = persona.lock().await;
    persona
        .buddy(&addr(buddy))
        .map(|b| (b.subscription(), b.ask()))
}

/// Alice and Bob end up subscribed to each other.
async fn befriend(router: &TestRouter) {
    router
        .hub
        .subscribe(
            addr("alice@example.com"),
            addr("bob@example.com"),
            RosterEntry::named("Bob").in_group("Friends"),
        )
        .unwrap();
    router.settle().await;
    router
        .hub
        .authorize_subscribe(
            addr("bob@example.com"),
            addr("alice@example.com"),
            true,
            Some(RosterEntry::named("Alice")),
        )
        .unwrap();
    router.settle().await;
    router
        .hub
        .authorize_subscribe(
            addr("alice@example.com"),
            addr("bob@example.com"),
            true,
            None,
        )
        .unwrap();
    router.settle().await;
}

#[tokio::test]
async fn request_is_pending_until_answered() {
    let router = TestRouter::spawn();
    let mut bob = router.attach("bob@example.com").await;
    bob.drain();

    router
        .hub
        .subscribe(
            addr("alice@example.com"),
            addr("bob@example.com"),
            RosterEntry::default(),
        )
        .unwrap();
    router.settle().await;

    assert_eq!(
        subscription_of(&router, "alice@example.com", "bob@example.com").await,
        Some((Subscription::Unset, Some(Ask::Subscribe)))
    );
    assert!(bob.drain().contains(&Notification::Subscribe {
        from: addr("alice@example.com")
    }));
    let persona = router.persona("bob@example.com").await;
    assert_eq!(
        persona.lock().await.pending_subscriptions(),
        vec![addr("alice@example.com")]
    );
}

#[tokio::test]
async fn mutual_subscription_reaches_both() {
    let router = TestRouter::spawn();
    befriend(&router).await;

    assert_eq!(
        subscription_of(&router, "alice@example.com", "bob@example.com").await,
        Some((Subscription::Both, None))
    );
    assert_eq!(
        subscription_of(&router, "bob@example.com", "alice@example.com").await,
        Some((Subscription::Both, None))
    );

    let persona = router.persona("alice@example.com").await;
    let alice = persona.lock().await;
    assert!(alice.pending_subscriptions().is_empty());
    assert_eq!(alice.group_members("Friends"), vec![addr("bob@example.com")]);
    assert_eq!(
        alice.buddy(&addr("bob@example.com")).and_then(|b| b.name()),
        Some("Bob")
    );
    drop(alice);

    // Roster changes are persisted.
    let saved = router
        .store
        .persona(&addr("alice@example.com"))
        .expect("alice saved");
    assert_eq!(saved.roster.len(), 1);
    assert_eq!(saved.roster[0].subscription, Subscription::Both);
}

#[tokio::test]
async fn presence_flows_to_subscribers() {
    let router = TestRouter::spawn();
    befriend(&router).await;
    let mut alice = router.attach("alice@example.com").await;
    alice.drain();

    let mut bob = router.attach("bob@example.com").await;
    router.settle().await;
    assert!(alice.drain().iter().any(|n| matches!(
        n,
        Notification::Presence { address, presence }
            if address.as_str() == "bob@example.com" && presence.show == Show::Online
    )));

    router
        .hub
        .set_presence(
            addr("bob@example.com"),
            Presence::new(Show::Away, 2).with_status("lunch"),
        )
        .unwrap();
    router.settle().await;
    let seen = alice.drain();
    assert!(seen.contains(&Notification::Presence {
        address: addr("bob@example.com"),
        presence: Presence::new(Show::Away, 2).with_status("lunch"),
    }));
    // Bob's own sessions see it too.
    assert!(bob.drain().iter().any(|n| matches!(
        n,
        Notification::Presence { address, .. } if address.as_str() == "bob@example.com"
    )));

    router
        .hub
        .remove_listener(addr("bob@example.com"), bob.id())
        .unwrap();
    router.settle().await;
    assert!(alice.drain().iter().any(|n| matches!(
        n,
        Notification::Presence { address, presence }
            if address.as_str() == "bob@example.com" && presence.show == Show::Offline
    )));
}

#[tokio::test]
async fn presence_without_subscription_is_ignored() {
    let router = TestRouter::spawn();
    let mut alice = router.attach("alice@example.com").await;
    alice.drain();

    // Carol is not on Alice's roster.
    router
        .hub
        .receive(parley_proto::Envelope::new(
            "carol@example.com/phone".parse::<parley_proto::FullAddress>().unwrap(),
            addr("alice@example.com"),
            Stanza::Presence(parley_proto::PresenceStanza::from_presence(Presence::new(
                Show::Chat,
                5,
            ))),
        ))
        .unwrap();
    router.settle().await;
    assert!(alice.drain().is_empty());
}

#[tokio::test]
async fn unsubscribe_keeps_the_other_direction() {
    let router = TestRouter::spawn();
    befriend(&router).await;

    router
        .hub
        .unsubscribe(addr("alice@example.com"), addr("bob@example.com"))
        .unwrap();
    router.settle().await;

    assert_eq!(
        subscription_of(&router, "alice@example.com", "bob@example.com").await,
        Some((Subscription::From, None))
    );
    assert_eq!(
        subscription_of(&router, "bob@example.com", "alice@example.com").await,
        Some((Subscription::To, None))
    );
}

#[tokio::test]
async fn denied_request_removes_the_entry() {
    let router = TestRouter::spawn();
    router
        .hub
        .subscribe(
            addr("carol@example.com"),
            addr("alice@example.com"),
            RosterEntry::default(),
        )
        .unwrap();
    router.settle().await;
    router
        .hub
        .authorize_subscribe(
            addr("alice@example.com"),
            addr("carol@example.com"),
            false,
            None,
        )
        .unwrap();
    router.settle().await;

    assert_eq!(
        subscription_of(&router, "carol@example.com", "alice@example.com").await,
        None
    );
    assert_eq!(
        subscription_of(&router, "alice@example.com", "carol@example.com").await,
        None
    );
}

#[tokio::test]
async fn remote_buddies_go_through_the_protocol() {
    let mut router = TestRouter::spawn();
    router
        .hub
        .subscribe(
            addr("alice@example.com"),
            addr("dave@other.org"),
            RosterEntry::default(),
        )
        .unwrap();
    router.settle().await;

    let sent = router.outbound();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to.address(), &addr("dave@other.org"));
    assert!(matches!(
        &sent[0].stanza,
        Stanza::Presence(p) if p.kind == PresenceKind::Subscribe
    ));
}

#[tokio::test]
async fn roster_refresh_lists_buddies() {
    let router = TestRouter::spawn();
    befriend(&router).await;
    let mut alice = router.attach("alice@example.com").await;
    alice.drain();

    router
        .hub
        .refresh_roster(addr("alice@example.com"), alice.listener())
        .unwrap();
    router.settle().await;

    let seen = alice.drain();
    let Some(Notification::Roster { items }) = seen.into_iter().find(|n| n.kind() == "roster") else {
        panic!("no roster notification");
    };
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].address, addr("bob@example.com"));
    assert_eq!(items[0].subscription, Subscription::Both);
    assert_eq!(items[0].groups, vec!["Friends".to_string()]);
}
