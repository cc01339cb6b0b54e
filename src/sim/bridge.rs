//! Event bridge: upstream chain events -> typed state machine commands
//!
//! The bridge subscribes for one identity, queues every delivery batch and
//! applies it to the state machine when pumped. It never reorders across
//! batches; within a batch, finish events go last. Upstream delivery is
//! at-least-once, so note results for already consumed indices are dropped
//! here and application is exactly-once per note index.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::state::{GameState, Outcome, Quality};
use crate::platform::{ChainEvent, EventSource, Subscription};
use crate::sim::Identity;

/// Typed command for the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainCommand {
    ArmSession { start_reference: u64 },
    ResolveNote { index: usize, quality: Quality },
    /// Points-valued result; mapped to a quality through the score table
    ScoreNote { index: usize, points: u64 },
    FinishSession,
}

impl DomainCommand {
    fn from_event(event: &ChainEvent) -> Self {
        match *event {
            ChainEvent::SessionStarted {
                start_reference, ..
            } => DomainCommand::ArmSession { start_reference },
            ChainEvent::NoteResult {
                note_index,
                quality,
                ..
            } => DomainCommand::ResolveNote {
                index: note_index,
                quality,
            },
            ChainEvent::NoteScored {
                note_index, points, ..
            } => DomainCommand::ScoreNote {
                index: note_index,
                points,
            },
            ChainEvent::SessionFinished { .. } => DomainCommand::FinishSession,
        }
    }
}

/// Why the bridge dropped an event before it reached the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Addressed to a different account
    IdentityMismatch,
    /// Note index already consumed
    AlreadyApplied,
}

/// Running counters, for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub received: u64,
    pub forwarded: u64,
    pub applied: u64,
    pub dropped_identity: u64,
    pub dropped_replay: u64,
}

type Inbox = Rc<RefCell<VecDeque<ChainEvent>>>;

pub struct EventBridge {
    identity: Identity,
    inbox: Inbox,
    subscription: Option<Subscription>,
    stats: BridgeStats,
}

impl EventBridge {
    /// Subscribe to `source` on behalf of `identity`
    pub fn attach(source: &dyn EventSource, identity: Identity) -> Self {
        let inbox: Inbox = Rc::new(RefCell::new(VecDeque::new()));
        let weak = Rc::downgrade(&inbox);

        let subscription = source.subscribe(Box::new(move |batch: &[ChainEvent]| {
            // Owner gone: nothing to feed
            let Some(inbox) = weak.upgrade() else {
                return;
            };
            let mut inbox = inbox.borrow_mut();
            inbox.extend(batch.iter().filter(|e| !e.is_finish()).cloned());
            inbox.extend(batch.iter().filter(|e| e.is_finish()).cloned());
        }));

        log::info!("Event bridge attached for {}", identity);
        Self {
            identity,
            inbox,
            subscription: Some(subscription),
            stats: BridgeStats::default(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Events queued but not yet applied
    pub fn pending(&self) -> usize {
        self.inbox.borrow().len()
    }

    /// Drop the subscription and anything still queued
    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            self.inbox.borrow_mut().clear();
            log::info!("Event bridge detached for {} ({:?})", self.identity, self.stats);
        }
    }

    /// Identity and replay filtering for a single event
    pub fn filter(&self, event: &ChainEvent, consumed_index: usize) -> Result<DomainCommand, DropReason> {
        if event.identity() != &self.identity {
            return Err(DropReason::IdentityMismatch);
        }
        if let Some(note_index) = event.note_index()
            && note_index < consumed_index
        {
            return Err(DropReason::AlreadyApplied);
        }
        Ok(DomainCommand::from_event(event))
    }

    /// Apply everything queued, in delivery order. Returns how many
    /// commands the state machine accepted.
    pub fn pump(&mut self, state: &mut GameState) -> usize {
        let queued: Vec<ChainEvent> = self.inbox.borrow_mut().drain(..).collect();
        let mut applied = 0;

        for event in queued {
            self.stats.received += 1;
            let command = match self.filter(&event, state.consumed_index()) {
                Ok(command) => command,
                Err(reason) => {
                    match reason {
                        DropReason::IdentityMismatch => self.stats.dropped_identity += 1,
                        DropReason::AlreadyApplied => self.stats.dropped_replay += 1,
                    }
                    log::debug!("Bridge dropped {:?}: {:?}", event, reason);
                    continue;
                }
            };

            self.stats.forwarded += 1;
            if state.apply(command) == Outcome::Applied {
                self.stats.applied += 1;
                applied += 1;
            }
        }
        applied
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{LocalEventSource, RecordingSink};
    use crate::settings::{EngineConfig, Song};
    use crate::sim::GamePhase;
    use proptest::prelude::*;

    const PLAYER: &str = "0xPlayer";

    fn started(start_reference: u64) -> ChainEvent {
        ChainEvent::SessionStarted {
            identity: Identity::new(PLAYER),
            start_reference,
        }
    }

    fn result(note_index: usize, quality: Quality) -> ChainEvent {
        ChainEvent::NoteResult {
            identity: Identity::new(PLAYER),
            note_index,
            quality,
        }
    }

    fn finished() -> ChainEvent {
        ChainEvent::SessionFinished {
            identity: Identity::new(PLAYER),
        }
    }

    /// Bridge + state already in Playing at start reference 1000
    fn playing() -> (LocalEventSource, EventBridge, GameState) {
        let source = LocalEventSource::new();
        let mut state = GameState::new(EngineConfig::with_song(Song::new(1, "Short", vec![0, 50, 120])));
        let mut sink = RecordingSink::new();
        state.begin_session(Identity::new(PLAYER), &mut sink);
        let mut bridge = EventBridge::attach(&source, Identity::new(PLAYER));

        source.deliver(&[started(1000)]);
        bridge.pump(&mut state);
        let countdown_ms = state.config().countdown_ms;
        state.advance_wall(countdown_ms);
        assert_eq!(state.phase(), GamePhase::Playing);
        (source, bridge, state)
    }

    #[test]
    fn test_foreign_identity_dropped() {
        let (source, mut bridge, mut state) = playing();
        source.deliver(&[ChainEvent::NoteResult {
            identity: Identity::new("0xSomeoneElse"),
            note_index: 0,
            quality: Quality::Perfect,
        }]);
        assert_eq!(bridge.pump(&mut state), 0);
        assert_eq!(state.score(), 0);
        assert_eq!(bridge.stats().dropped_identity, 1);
    }

    #[test]
    fn test_identity_match_ignores_case() {
        let (source, mut bridge, mut state) = playing();
        source.deliver(&[ChainEvent::NoteResult {
            identity: Identity::new("0XPLAYER"),
            note_index: 0,
            quality: Quality::Good,
        }]);
        assert_eq!(bridge.pump(&mut state), 1);
        assert_eq!(state.score(), 50);
    }

    #[test]
    fn test_points_result_mapped_and_replay_dropped() {
        let (source, mut bridge, mut state) = playing();
        let scored = ChainEvent::NoteScored {
            identity: Identity::new(PLAYER),
            note_index: 0,
            points: 100,
        };
        source.deliver(&[scored.clone(), scored]);
        assert_eq!(bridge.pump(&mut state), 1);
        assert_eq!(state.score(), 100);
        assert_eq!(state.consumed_index(), 1);
        assert_eq!(state.feedback().map(|f| f.quality), Some(Quality::Perfect));
        assert_eq!(bridge.stats().dropped_replay, 1);
    }

    #[test]
    fn test_scenario_b_and_c() {
        let (source, mut bridge, mut state) = playing();
        source.deliver(&[result(0, Quality::Perfect)]);
        bridge.pump(&mut state);
        assert_eq!(state.score(), 100);
        assert_eq!(state.consumed_index(), 1);
        assert_eq!(state.feedback().map(|f| f.quality), Some(Quality::Perfect));

        // Duplicate delivery of the same result
        source.deliver(&[result(0, Quality::Perfect)]);
        assert_eq!(bridge.pump(&mut state), 0);
        assert_eq!(state.score(), 100);
        assert_eq!(state.consumed_index(), 1);
        assert_eq!(bridge.stats().dropped_replay, 1);
    }

    #[test]
    fn test_scenario_d_finish_then_results_dropped() {
        let (source, mut bridge, mut state) = playing();
        source.deliver(&[finished()]);
        bridge.pump(&mut state);
        assert_eq!(state.phase(), GamePhase::Finished);

        source.deliver(&[result(0, Quality::Perfect)]);
        assert_eq!(bridge.pump(&mut state), 0);
        assert_eq!(state.score(), 0);
    }

    #[test]
    fn test_finish_applied_last_within_batch() {
        let (source, mut bridge, mut state) = playing();
        source.deliver(&[result(0, Quality::Perfect), finished(), result(1, Quality::Good)]);
        assert_eq!(bridge.pump(&mut state), 3);
        assert_eq!(state.phase(), GamePhase::Finished);
        assert_eq!(state.score(), 150);
        assert_eq!(state.consumed_index(), 2);
    }

    #[test]
    fn test_events_before_start_confirmed() {
        let source = LocalEventSource::new();
        let mut state = GameState::new(EngineConfig::demo());
        let mut sink = RecordingSink::new();
        state.begin_session(Identity::new(PLAYER), &mut sink);
        let mut bridge = EventBridge::attach(&source, Identity::new(PLAYER));

        // A result that races ahead of the start is not legal in Menu
        source.deliver(&[result(0, Quality::Perfect), started(500)]);
        assert_eq!(bridge.pump(&mut state), 1);
        assert_eq!(state.phase(), GamePhase::Countdown);
        assert_eq!(state.score(), 0);
    }

    #[test]
    fn test_detach_stops_delivery() {
        let (source, mut bridge, mut state) = playing();
        bridge.detach();
        assert!(!bridge.is_attached());
        assert_eq!(source.subscriber_count(), 0);

        source.deliver(&[result(0, Quality::Perfect)]);
        assert_eq!(bridge.pending(), 0);
        assert_eq!(bridge.pump(&mut state), 0);
    }

    #[test]
    fn test_drop_detaches() {
        let (source, bridge, _state) = playing();
        assert_eq!(source.subscriber_count(), 1);
        drop(bridge);
        assert_eq!(source.subscriber_count(), 0);
        // Delivery with no subscribers is harmless
        source.deliver(&[finished()]);
    }

    fn arb_event() -> impl Strategy<Value = ChainEvent> {
        let identity = prop_oneof![Just(PLAYER), Just("0xother")];
        let quality = prop_oneof![
            Just(Quality::Perfect),
            Just(Quality::Good),
            Just(Quality::Miss)
        ];
        prop_oneof![
            (identity.clone(), 0usize..5, quality).prop_map(|(who, note_index, quality)| {
                ChainEvent::NoteResult {
                    identity: Identity::new(who),
                    note_index,
                    quality,
                }
            }),
            (identity.clone(), 0u64..3000).prop_map(|(who, start_reference)| {
                ChainEvent::SessionStarted {
                    identity: Identity::new(who),
                    start_reference,
                }
            }),
            identity.prop_map(|who| ChainEvent::SessionFinished {
                identity: Identity::new(who),
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_index_monotone_and_bounded(
            batches in prop::collection::vec(prop::collection::vec(arb_event(), 0..6), 0..30),
        ) {
            let (source, mut bridge, mut state) = playing();
            let song_len = state.config().song.len();
            let mut last_index = state.consumed_index();
            let mut last_score = state.score();
            let start = state.start_reference();

            for batch in &batches {
                source.deliver(batch);
                bridge.pump(&mut state);
                prop_assert!(state.consumed_index() >= last_index);
                prop_assert!(state.consumed_index() <= song_len);
                prop_assert!(state.score() >= last_score);
                prop_assert_eq!(state.start_reference(), start);
                last_index = state.consumed_index();
                last_score = state.score();
            }
        }

        #[test]
        fn prop_replay_is_idempotent(
            batches in prop::collection::vec(prop::collection::vec(arb_event(), 0..6), 1..20),
        ) {
            let (source, mut bridge, mut state) = playing();
            for batch in &batches {
                source.deliver(batch);
                bridge.pump(&mut state);
            }
            let score = state.score();
            let index = state.consumed_index();
            let phase = state.phase();

            // Redeliver every note result already seen
            for batch in &batches {
                let replay: Vec<ChainEvent> = batch
                    .iter()
                    .filter(|e| matches!(e, ChainEvent::NoteResult { note_index, .. } if *note_index < index))
                    .cloned()
                    .collect();
                source.deliver(&replay);
                bridge.pump(&mut state);
            }
            prop_assert_eq!(state.score(), score);
            prop_assert_eq!(state.consumed_index(), index);
            prop_assert_eq!(state.phase(), phase);
        }
    }
}
