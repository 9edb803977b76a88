//! State Machine (§4.3): the three-state node lifecycle, fanning out a
//! `StateChanged` event on every transition. Grounded on the teacher's
//! preference for tagged-union dispatch over trait objects (§9).

pub use meshnow_wire::NodeState;
use meshnow_wire::Address;

fn is_legal_edge(old: NodeState, new: NodeState) -> bool {
    use NodeState::*;
    matches!(
        (old, new),
        (DisconnectedFromParent, ConnectedToParent)
            | (ConnectedToParent, ReachesRoot)
            | (ReachesRoot, ConnectedToParent)
            | (ConnectedToParent, DisconnectedFromParent)
            | (ReachesRoot, DisconnectedFromParent)
    )
}

/// The node lifecycle state plus the `root_mac` it knows about while
/// `REACHES_ROOT` (§3 invariants).
pub struct StateMachine {
    state: NodeState,
    root_mac: Option<Address>,
    is_root: bool,
    this_mac: Address,
}

impl StateMachine {
    pub fn new(is_root: bool, this_mac: Address) -> Self {
        if is_root {
            Self { state: NodeState::ReachesRoot, root_mac: Some(this_mac), is_root, this_mac }
        } else {
            Self { state: NodeState::DisconnectedFromParent, root_mac: None, is_root, this_mac }
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn root_mac(&self) -> Option<Address> {
        self.root_mac
    }

    /// Applies a transition, returning `(old, new)` for the caller to
    /// publish as a `StateChanged` event. Panics in debug builds on an
    /// illegal edge (§7: internal panics are restricted to genuine bugs).
    /// The root never transitions — callers must not invoke this on a root
    /// state machine.
    pub fn transition(&mut self, new: NodeState, root_mac: Option<Address>) -> (NodeState, NodeState) {
        debug_assert!(!self.is_root, "root state machine must never transition");
        debug_assert!(is_legal_edge(self.state, new), "illegal state edge {:?} -> {:?}", self.state, new);
        let old = self.state;
        self.state = new;
        self.root_mac = root_mac;
        log::info!("{}: {:?} -> {:?}", self.this_mac, old, new);
        (old, new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a(n: u8) -> Address {
        Address::new([0, 0, 0, 0, 0, n])
    }

    #[test]
    fn root_starts_reaching_root_with_self_as_root_mac() {
        let sm = StateMachine::new(true, a(1));
        assert_eq!(sm.state(), NodeState::ReachesRoot);
        assert_eq!(sm.root_mac(), Some(a(1)));
    }

    #[test]
    fn non_root_starts_disconnected() {
        let sm = StateMachine::new(false, a(1));
        assert_eq!(sm.state(), NodeState::DisconnectedFromParent);
        assert_eq!(sm.root_mac(), None);
    }

    #[test]
    fn legal_edges_accepted() {
        let mut sm = StateMachine::new(false, a(1));
        let (old, new) = sm.transition(NodeState::ConnectedToParent, None);
        assert_eq!((old, new), (NodeState::DisconnectedFromParent, NodeState::ConnectedToParent));
        sm.transition(NodeState::ReachesRoot, Some(a(9)));
        assert_eq!(sm.state(), NodeState::ReachesRoot);
        assert_eq!(sm.root_mac(), Some(a(9)));
        sm.transition(NodeState::ConnectedToParent, None);
        assert_eq!(sm.state(), NodeState::ConnectedToParent);
        sm.transition(NodeState::DisconnectedFromParent, None);
        assert_eq!(sm.state(), NodeState::DisconnectedFromParent);
    }

    #[test]
    #[should_panic]
    fn illegal_edge_panics_in_debug() {
        let mut sm = StateMachine::new(false, a(1));
        // Disconnected -> ReachesRoot is not a legal single edge.
        sm.transition(NodeState::ReachesRoot, Some(a(2)));
    }
}
