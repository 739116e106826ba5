//! Slide transitions between the two slots

use std::time::Duration;

use super::queue::Queue;
use super::slots::SlotId;
use crate::models::QueueItem;

/// Navigation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards newer queue entries
    Forward,
    /// Towards earlier queue entries
    Backward,
}

impl Direction {
    /// Vertical offset (in viewport heights) the incoming view starts from
    pub const fn incoming_from(self) -> f32 {
        match self {
            Self::Forward => 1.0,
            Self::Backward => -1.0,
        }
    }

    /// Vertical offset the outgoing view slides to
    pub const fn outgoing_to(self) -> f32 {
        -self.incoming_from()
    }
}

/// Easing curve shared by both directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    /// Material "standard" curve
    #[default]
    Standard,
}

impl Easing {
    /// Cubic bezier control points (x1, y1, x2, y2)
    pub const fn control_points(self) -> [f32; 4] {
        match self {
            Self::Standard => [0.4, 0.0, 0.2, 1.0],
        }
    }
}

/// Identifies one animation so late completions can be discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionToken(u64);

/// Animation request handed to the presenter
#[derive(Debug, Clone, PartialEq)]
pub struct SlideAnimation {
    /// Must be echoed back on completion
    pub token: TransitionToken,
    /// Direction of travel
    pub direction: Direction,
    /// Slot sliding into view
    pub incoming: SlotId,
    /// Slot sliding out
    pub outgoing: SlotId,
    /// Start offset of the incoming view
    pub incoming_from: f32,
    /// End offset of the outgoing view
    pub outgoing_to: f32,
    /// Animation length
    pub duration: Duration,
    /// Easing curve
    pub easing: Easing,
}

/// A finished transition, ready to be committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Committed {
    /// Direction of travel
    pub direction: Direction,
    /// Queue index now on screen
    pub target: usize,
    /// Slot that became active
    pub incoming: SlotId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Idle,
    AwaitingContent {
        direction: Direction,
        target: usize,
        animate: bool,
    },
    Animating {
        token: TransitionToken,
        direction: Direction,
        target: usize,
        incoming: SlotId,
    },
}

/// Where a navigation request lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Show the item at this index
    Ready(usize),
    /// The queue must grow past this index first
    NeedsContent(usize),
    /// Nothing playable in that direction
    Blocked,
}

/// Find the first non-skipped item from `target` in the direction of travel
pub fn resolve_target(
    queue: &Queue,
    target: usize,
    direction: Direction,
    skip: impl Fn(&QueueItem) -> bool,
) -> Resolution {
    match direction {
        Direction::Forward => {
            let mut index = target;
            while let Some(item) = queue.get(index) {
                if !skip(item) {
                    return Resolution::Ready(index);
                }
                index += 1;
            }
            Resolution::NeedsContent(index)
        }
        Direction::Backward => (0..=target)
            .rev()
            .find(|i| queue.get(*i).is_some_and(|item| !skip(item)))
            .map_or(Resolution::Blocked, Resolution::Ready),
    }
}

/// Tracks the one navigation that may be in flight at a time
#[derive(Debug)]
pub struct TransitionController {
    phase: Phase,
    next_token: u64,
    duration: Duration,
}

impl TransitionController {
    /// Create an idle controller
    pub const fn new(duration: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            next_token: 0,
            duration,
        }
    }

    /// Whether a navigation is waiting or animating
    pub fn is_in_flight(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Whether a slide is on screen
    pub const fn is_animating(&self) -> bool {
        matches!(self.phase, Phase::Animating { .. })
    }

    /// Slot currently sliding in, if any
    pub const fn incoming(&self) -> Option<SlotId> {
        match self.phase {
            Phase::Animating { incoming, .. } => Some(incoming),
            _ => None,
        }
    }

    /// Park a navigation until the queue grows
    pub fn await_content(&mut self, direction: Direction, target: usize, animate: bool) {
        self.phase = Phase::AwaitingContent {
            direction,
            target,
            animate,
        };
    }

    /// Parked navigation, as (direction, target, animate)
    pub const fn awaiting(&self) -> Option<(Direction, usize, bool)> {
        match self.phase {
            Phase::AwaitingContent {
                direction,
                target,
                animate,
            } => Some((direction, target, animate)),
            _ => None,
        }
    }

    /// Start a slide; the returned animation carries a fresh token
    pub fn begin(
        &mut self,
        direction: Direction,
        target: usize,
        incoming: SlotId,
        outgoing: SlotId,
    ) -> SlideAnimation {
        self.next_token += 1;
        let token = TransitionToken(self.next_token);
        self.phase = Phase::Animating {
            token,
            direction,
            target,
            incoming,
        };

        SlideAnimation {
            token,
            direction,
            incoming,
            outgoing,
            incoming_from: direction.incoming_from(),
            outgoing_to: direction.outgoing_to(),
            duration: self.duration,
            easing: Easing::Standard,
        }
    }

    /// Complete the slide identified by `token`; stale tokens return None
    pub fn finish(&mut self, token: TransitionToken) -> Option<Committed> {
        match self.phase {
            Phase::Animating {
                token: current,
                direction,
                target,
                incoming,
            } if current == token => {
                self.phase = Phase::Idle;
                Some(Committed {
                    direction,
                    target,
                    incoming,
                })
            }
            _ => {
                tracing::debug!("Ignoring stale transition {token:?}");
                None
            }
        }
    }

    /// Drop whatever is in flight. Tokens keep increasing so completions of
    /// cancelled slides stay stale.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }
}
