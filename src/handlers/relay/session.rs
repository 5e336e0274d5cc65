//! Per-connection session state: the enhancement cycle, the rolling
//! history and the current upstream bridge.

use std::collections::VecDeque;

use crate::core::context::ConversationTurn;
use crate::core::realtime::{BridgeHandle, UpstreamBridge};

/// Number of turns kept in the rolling history.
pub const HISTORY_LIMIT: usize = 10;

/// Bounded FIFO of recent conversation turns.
#[derive(Debug, Clone, Default)]
pub struct RollingHistory {
    turns: VecDeque<ConversationTurn>,
}

impl RollingHistory {
    pub fn new() -> Self {
        Self {
            turns: VecDeque::with_capacity(HISTORY_LIMIT),
        }
    }

    /// Append a turn, evicting the oldest once the limit is reached.
    pub fn push(&mut self, turn: ConversationTurn) {
        if self.turns.len() == HISTORY_LIMIT {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Where the connection is in the context enhancement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnhancementPhase {
    #[default]
    Idle,
    /// Audio was committed, the next transcript triggers enhancement
    AwaitingTranscript,
    /// A retrieval is in flight
    Enhancing,
}

/// Mutable state owned by one connection.
///
/// Only the connection's receive task and its bridge's event task touch this,
/// always under the connection's lock and never across an `.await`.
#[derive(Debug)]
pub struct SessionState {
    phase: EnhancementPhase,
    /// A commit arrived while enhancing; the next transcript enhances too
    commit_queued: bool,
    history: RollingHistory,
    base_instructions: String,
    bridge: Option<UpstreamBridge>,
}

impl SessionState {
    pub fn new(base_instructions: String) -> Self {
        Self {
            phase: EnhancementPhase::Idle,
            commit_queued: false,
            history: RollingHistory::new(),
            base_instructions,
            bridge: None,
        }
    }

    pub fn phase(&self) -> EnhancementPhase {
        self.phase
    }

    /// Pending-context flag: a transcript is expected to start enhancement.
    pub fn pending_context(&self) -> bool {
        self.phase == EnhancementPhase::AwaitingTranscript || self.commit_queued
    }

    pub fn on_commit(&mut self) {
        match self.phase {
            EnhancementPhase::Idle => self.phase = EnhancementPhase::AwaitingTranscript,
            EnhancementPhase::AwaitingTranscript => {}
            EnhancementPhase::Enhancing => self.commit_queued = true,
        }
    }

    /// Move to `Enhancing` if a transcript was expected. At most one cycle
    /// is in flight, so this returns false while enhancing.
    pub fn begin_enhancement(&mut self) -> bool {
        if self.phase != EnhancementPhase::AwaitingTranscript {
            return false;
        }
        self.phase = EnhancementPhase::Enhancing;
        true
    }

    pub fn finish_enhancement(&mut self) {
        if self.phase != EnhancementPhase::Enhancing {
            return;
        }
        if self.commit_queued {
            self.commit_queued = false;
            self.phase = EnhancementPhase::AwaitingTranscript;
        } else {
            self.phase = EnhancementPhase::Idle;
        }
    }

    /// Clear the enhancement cycle, e.g. when the session ends.
    pub fn reset(&mut self) {
        self.phase = EnhancementPhase::Idle;
        self.commit_queued = false;
    }

    pub fn history(&self) -> &RollingHistory {
        &self.history
    }

    pub fn record(&mut self, turn: ConversationTurn) {
        self.history.push(turn);
    }

    pub fn base_instructions(&self) -> &str {
        &self.base_instructions
    }

    pub fn set_base_instructions(&mut self, instructions: String) {
        self.base_instructions = instructions;
    }

    /// Install a new bridge for a fresh session, returning the previous one.
    pub fn attach(&mut self, bridge: UpstreamBridge, base_instructions: String) -> Option<UpstreamBridge> {
        self.reset();
        self.history.clear();
        self.base_instructions = base_instructions;
        self.bridge.replace(bridge)
    }

    /// Take the bridge out, leaving the connection without a session.
    pub fn detach(&mut self) -> Option<UpstreamBridge> {
        self.reset();
        self.bridge.take()
    }

    /// Take the bridge only if it is still the one identified by `bridge_id`.
    pub fn detach_if(&mut self, bridge_id: uuid::Uuid) -> Option<UpstreamBridge> {
        match &self.bridge {
            Some(bridge) if bridge.id() == bridge_id => self.detach(),
            _ => None,
        }
    }

    pub fn bridge_handle(&self) -> Option<BridgeHandle> {
        self.bridge.as_ref().map(UpstreamBridge::handle)
    }

    pub fn current_bridge_id(&self) -> Option<uuid::Uuid> {
        self.bridge.as_ref().map(UpstreamBridge::id)
    }
}
