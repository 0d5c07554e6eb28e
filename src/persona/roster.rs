//! Roster, groups and the subscription handshake.

use parley_proto::{Address, Envelope, Presence, PresenceKind, PresenceStanza, Stanza};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::Persona;
use crate::notify::{Listener, Notification, RosterItem, deliver_to};
use crate::presence::PresenceResolver;
use crate::store::RosterRecord;
use crate::subscription::Subscription;
use crate::switchboard::Context;

/// Outstanding request on a roster entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ask {
    Subscribe,
    Unsubscribe,
}

/// Display details for a roster entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterEntry {
    pub name: Option<String>,
    pub groups: Vec<String>,
}

impl RosterEntry {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            groups: Vec::new(),
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }
}

/// Another address on a persona's roster.
#[derive(Debug, Clone)]
pub struct Buddy {
    address: Address,
    name: Option<String>,
    groups: Vec<String>,
    subscription: Subscription,
    ask: Option<Ask>,
    presence: PresenceResolver,
}

impl Buddy {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            name: None,
            groups: Vec::new(),
            subscription: Subscription::Unset,
            ask: None,
            presence: PresenceResolver::new(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn subscription(&self) -> Subscription {
        self.subscription
    }

    pub fn ask(&self) -> Option<Ask> {
        self.ask
    }

    /// Effective presence across the buddy's resources.
    pub fn presence(&self) -> Presence {
        self.presence.effective_presence()
    }

    /// Neither facet is held and nothing is pending.
    fn is_removable(&self) -> bool {
        !self.subscription.is_outgoing() && !self.subscription.is_incoming() && self.ask.is_none()
    }

    pub(super) fn record(&self) -> RosterRecord {
        RosterRecord {
            address: self.address.clone(),
            name: self.name.clone(),
            groups: self.groups.clone(),
            subscription: self.subscription,
            ask: self.ask,
        }
    }

    fn item(&self) -> RosterItem {
        RosterItem {
            address: self.address.clone(),
            name: self.name.clone(),
            groups: self.groups.clone(),
            subscription: self.subscription,
            ask: self.ask,
            presence: self.presence(),
        }
    }
}

/// A named set of buddies.
#[derive(Debug, Clone, Default)]
pub struct Group {
    name: String,
    members: BTreeSet<Address>,
}

impl Group {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> impl Iterator<Item = &Address> {
        self.members.iter()
    }
}

impl Persona {
    pub fn buddy(&self, address: &Address) -> Option<&Buddy> {
        self.buddies.get(address)
    }

    pub fn buddies(&self) -> impl Iterator<Item = &Buddy> {
        self.buddies.values()
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    pub fn group_members(&self, group: &str) -> Vec<Address> {
        self.groups
            .get(group)
            .map(|g| g.members().cloned().collect())
            .unwrap_or_default()
    }

    /// Addresses that asked for our presence and have not been answered.
    pub fn pending_subscriptions(&self) -> Vec<Address> {
        self.pending_subscribes.iter().cloned().collect()
    }

    pub fn roster_items(&self) -> Vec<RosterItem> {
        self.buddies.values().map(Buddy::item).collect()
    }

    /// Send the full roster to one listener, followed by every buddy's
    /// presence and the subscribe requests still waiting for an answer.
    pub fn refresh_roster(&self, listener: &Arc<dyn Listener>) {
        let items = self.roster_items();
        deliver_to(listener.as_ref(), Arc::new(Notification::Roster { items }));
        for buddy in self.buddies.values() {
            deliver_to(
                listener.as_ref(),
                Arc::new(Notification::Presence {
                    address: buddy.address.clone(),
                    presence: buddy.presence(),
                }),
            );
        }
        for from in &self.pending_subscribes {
            deliver_to(
                listener.as_ref(),
                Arc::new(Notification::Subscribe { from: from.clone() }),
            );
        }
    }

    pub(super) fn restore_buddy(&mut self, record: RosterRecord) {
        let mut buddy = Buddy::new(record.address.clone());
        buddy.name = record.name;
        buddy.subscription = record.subscription;
        buddy.ask = record.ask;
        self.buddies.insert(record.address.clone(), buddy);
        self.set_buddy_groups(&record.address, record.groups);
    }

    fn set_buddy_groups(&mut self, address: &Address, groups: Vec<String>) {
        for group in self.groups.values_mut() {
            group.members.remove(address);
        }
        for name in &groups {
            self.groups
                .entry(name.clone())
                .or_insert_with(|| Group {
                    name: name.clone(),
                    members: BTreeSet::new(),
                })
                .members
                .insert(address.clone());
        }
        self.groups.retain(|_, g| !g.members.is_empty());
        if let Some(buddy) = self.buddies.get_mut(address) {
            buddy.groups = groups;
        }
    }

    /// Drop a buddy that no longer carries any relationship.
    fn prune_buddy(&mut self, address: &Address) -> bool {
        if !self.buddies.get(address).is_some_and(Buddy::is_removable) {
            return false;
        }
        self.set_buddy_groups(address, Vec::new());
        self.buddies.remove(address);
        debug!(persona = %self.address, buddy = %address, "Buddy removed from roster");
        true
    }

    fn notify_subscription(&self, address: &Address) {
        let (state, ask) = self
            .buddies
            .get(address)
            .map(|b| (b.subscription, b.ask))
            .unwrap_or((Subscription::None, None));
        self.listeners.notify(Notification::Subscription {
            address: address.clone(),
            state,
            ask,
        });
    }

    fn send_presence_kind(&self, ctx: &Context<'_>, to: &Address, kind: PresenceKind) {
        ctx.deliver(Envelope::new(
            self.full_address(),
            to.clone(),
            Stanza::Presence(PresenceStanza::of_kind(kind)),
        ));
    }

    /// Ask to receive `buddy`'s presence, adding it to the roster.
    pub async fn add_outgoing_subscription(
        &mut self,
        ctx: &Context<'_>,
        buddy: Address,
        entry: RosterEntry,
    ) -> crate::error::RouterResult {
        let record = self
            .buddies
            .entry(buddy.clone())
            .or_insert_with(|| Buddy::new(buddy.clone()));
        if entry.name.is_some() {
            record.name = entry.name;
        }
        if !record.subscription.is_outgoing() {
            record.ask = Some(Ask::Subscribe);
        }
        let already = record.subscription.is_outgoing();
        self.set_buddy_groups(&buddy, entry.groups);

        if !already {
            self.send_presence_kind(ctx, &buddy, PresenceKind::Subscribe);
        }
        info!(persona = %self.address, buddy = %buddy, "Subscription requested");
        self.persist(ctx).await;
        self.notify_subscription(&buddy);
        Ok(())
    }

    /// Stop receiving `buddy`'s presence.
    pub async fn remove_outgoing_subscription(
        &mut self,
        ctx: &Context<'_>,
        buddy: Address,
    ) -> crate::error::RouterResult {
        self.send_presence_kind(ctx, &buddy, PresenceKind::Unsubscribe);
        let Some(record) = self.buddies.get_mut(&buddy) else {
            debug!(persona = %self.address, buddy = %buddy, "Unsubscribe for unknown buddy");
            return Ok(());
        };
        record.subscription = record.subscription.clear_outgoing();
        record.ask = None;
        record.presence.clear();

        self.notify_subscription(&buddy);
        self.prune_buddy(&buddy);
        info!(persona = %self.address, buddy = %buddy, "Subscription removed");
        self.persist(ctx).await;
        Ok(())
    }

    /// Answer a pending subscription request.
    ///
    /// `add` additionally requests the reverse subscription with the given
    /// display details.
    pub async fn authorize_subscribe(
        &mut self,
        ctx: &Context<'_>,
        requester: Address,
        authorized: bool,
        add: Option<RosterEntry>,
    ) -> crate::error::RouterResult {
        self.pending_subscribes.remove(&requester);

        if authorized {
            let record = self
                .buddies
                .entry(requester.clone())
                .or_insert_with(|| Buddy::new(requester.clone()));
            record.subscription = record.subscription.set_incoming();
            self.send_presence_kind(ctx, &requester, PresenceKind::Subscribed);
            self.push_my_presence(ctx, Some(&requester));
        } else {
            self.send_presence_kind(ctx, &requester, PresenceKind::Unsubscribed);
            if let Some(record) = self.buddies.get_mut(&requester) {
                record.subscription = record.subscription.clear_incoming();
            }
        }
        info!(persona = %self.address, requester = %requester, authorized, "Subscription answered");
        self.notify_subscription(&requester);

        match add {
            Some(entry) if authorized => {
                self.add_outgoing_subscription(ctx, requester, entry).await
            }
            _ => {
                self.prune_buddy(&requester);
                self.persist(ctx).await;
                Ok(())
            }
        }
    }

    /// Presence-channel stanza from someone other than a room.
    pub(super) async fn receive_presence(
        &mut self,
        ctx: &Context<'_>,
        from: parley_proto::FullAddress,
        stanza: PresenceStanza,
    ) -> crate::error::RouterResult {
        let sender = from.address().clone();
        match stanza.kind {
            PresenceKind::Available | PresenceKind::Unavailable => {
                let Some(buddy) = self.buddies.get_mut(&sender) else {
                    debug!(persona = %self.address, from = %from, "Presence from non-buddy ignored");
                    return Ok(());
                };
                if !buddy.subscription.is_outgoing() {
                    debug!(persona = %self.address, from = %from, "Presence without subscription ignored");
                    return Ok(());
                }
                if stanza.kind == PresenceKind::Available {
                    buddy.presence.add_presence_update(from.resource(), stanza.presence);
                } else {
                    buddy.presence.remove_presence(from.resource());
                }
                let presence = buddy.presence();
                self.listeners.notify(Notification::Presence {
                    address: sender,
                    presence,
                });
            }
            PresenceKind::Subscribe => {
                self.pending_subscribes.insert(sender.clone());
                self.listeners.notify(Notification::Subscribe { from: sender });
            }
            PresenceKind::Subscribed => {
                let buddy = self
                    .buddies
                    .entry(sender.clone())
                    .or_insert_with(|| Buddy::new(sender.clone()));
                buddy.subscription = buddy.subscription.set_outgoing();
                buddy.ask = None;
                info!(persona = %self.address, buddy = %sender, "Subscription granted");
                self.persist(ctx).await;
                self.notify_subscription(&sender);
            }
            PresenceKind::Unsubscribe => {
                self.pending_subscribes.remove(&sender);
                if let Some(buddy) = self.buddies.get_mut(&sender) {
                    buddy.subscription = buddy.subscription.clear_incoming();
                }
                self.send_presence_kind(ctx, &sender, PresenceKind::Unsubscribed);
                self.notify_subscription(&sender);
                self.prune_buddy(&sender);
                self.persist(ctx).await;
            }
            PresenceKind::Unsubscribed => {
                if let Some(buddy) = self.buddies.get_mut(&sender) {
                    buddy.subscription = buddy.subscription.clear_outgoing();
                    buddy.ask = None;
                    buddy.presence.clear();
                }
                self.notify_subscription(&sender);
                self.listeners.notify(Notification::Presence {
                    address: sender.clone(),
                    presence: Presence::offline(),
                });
                self.prune_buddy(&sender);
                self.persist(ctx).await;
            }
            PresenceKind::Probe => {
                if self
                    .buddies
                    .get(&sender)
                    .is_some_and(|b| b.subscription.is_incoming())
                {
                    self.push_my_presence(ctx, Some(&sender));
                } else {
                    debug!(persona = %self.address, from = %from, "Probe from unauthorized address");
                }
            }
            PresenceKind::Error => {
                self.listeners.notify(Notification::Error {
                    thread: None,
                    from: Some(sender),
                    text: stanza
                        .error
                        .unwrap_or_else(|| "presence delivery failed".to_string()),
                });
            }
        }
        Ok(())
    }
}
