//! Roster subscription state.
//!
//! A subscription is two independent facets:
//! - **outgoing**: this persona receives the buddy's presence
//! - **incoming**: this persona sends the buddy its presence
//!
//! `None`, `To`, `From` and `Both` are the four combinations of the facets.
//! `Unset` marks an address that has never been on the roster; clearing a
//! facet on it leaves it unset.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription between a persona and one buddy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subscription {
    #[default]
    Unset,
    None,
    /// Outgoing only.
    To,
    /// Incoming only.
    From,
    Both,
}

impl Subscription {
    pub fn set_outgoing(self) -> Self {
        match self {
            Subscription::Unset | Subscription::None | Subscription::To => Subscription::To,
            Subscription::From | Subscription::Both => Subscription::Both,
        }
    }

    pub fn set_incoming(self) -> Self {
        match self {
            Subscription::Unset | Subscription::None | Subscription::From => Subscription::From,
            Subscription::To | Subscription::Both => Subscription::Both,
        }
    }

    pub fn clear_outgoing(self) -> Self {
        match self {
            Subscription::Unset => Subscription::Unset,
            Subscription::None | Subscription::To => Subscription::None,
            Subscription::From | Subscription::Both => Subscription::From,
        }
    }

    pub fn clear_incoming(self) -> Self {
        match self {
            Subscription::Unset => Subscription::Unset,
            Subscription::None | Subscription::From => Subscription::None,
            Subscription::To | Subscription::Both => Subscription::To,
        }
    }

    /// True when this persona receives the buddy's presence.
    pub fn is_outgoing(self) -> bool {
        matches!(self, Subscription::To | Subscription::Both)
    }

    /// True when this persona sends the buddy its presence.
    pub fn is_incoming(self) -> bool {
        matches!(self, Subscription::From | Subscription::Both)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Subscription::Unset => "unset",
            Subscription::None => "none",
            Subscription::To => "to",
            Subscription::From => "from",
            Subscription::Both => "both",
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Subscription as S;
    use proptest::prelude::*;

    const ALL: [S; 5] = [S::Unset, S::None, S::To, S::From, S::Both];

    #[test]
    fn transition_table() {
        // state, set_outgoing, set_incoming, clear_outgoing, clear_incoming
        let table = [
            (S::Unset, S::To, S::From, S::Unset, S::Unset),
            (S::None, S::To, S::From, S::None, S::None),
            (S::To, S::To, S::Both, S::None, S::To),
            (S::From, S::Both, S::From, S::From, S::None),
            (S::Both, S::Both, S::Both, S::From, S::To),
        ];
        for (state, so, si, co, ci) in table {
            assert_eq!(state.set_outgoing(), so, "{state}.set_outgoing");
            assert_eq!(state.set_incoming(), si, "{state}.set_incoming");
            assert_eq!(state.clear_outgoing(), co, "{state}.clear_outgoing");
            assert_eq!(state.clear_incoming(), ci, "{state}.clear_incoming");
        }
    }

    #[test]
    fn facet_predicates() {
        let outgoing: Vec<_> = ALL.into_iter().filter(|s| s.is_outgoing()).collect();
        let incoming: Vec<_> = ALL.into_iter().filter(|s| s.is_incoming()).collect();
        assert_eq!(outgoing, vec![S::To, S::Both]);
        assert_eq!(incoming, vec![S::From, S::Both]);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        SetOutgoing,
        SetIncoming,
        ClearOutgoing,
        ClearIncoming,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::SetOutgoing),
            Just(Op::SetIncoming),
            Just(Op::ClearOutgoing),
            Just(Op::ClearIncoming),
        ]
    }

    proptest! {
        #[test]
        fn facets_track_independent_booleans(
            start in 0usize..5,
            ops in proptest::collection::vec(op(), 0..32),
        ) {
            let mut state = ALL[start];
            let mut outgoing = state.is_outgoing();
            let mut incoming = state.is_incoming();
            for op in ops {
                state = match op {
                    Op::SetOutgoing => { outgoing = true; state.set_outgoing() }
                    Op::SetIncoming => { incoming = true; state.set_incoming() }
                    Op::ClearOutgoing => { outgoing = false; state.clear_outgoing() }
                    Op::ClearIncoming => { incoming = false; state.clear_incoming() }
                };
                prop_assert_eq!(state.is_outgoing(), outgoing);
                prop_assert_eq!(state.is_incoming(), incoming);
            }
        }
    }
}
