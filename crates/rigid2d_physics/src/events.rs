//! Notifications produced by the world
//!
//! Events are queued in detection order while the world runs and handed to
//! the caller through [`World::drain_events`](crate::world::World::drain_events).

use crate::contact::ContactKey;
use crate::fixture::FixtureKey;
use crate::joints::JointKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorldEvent {
    /// Two fixtures started touching
    BeginContact {
        contact: ContactKey,
        fixture_a: FixtureKey,
        fixture_b: FixtureKey,
    },
    /// Two fixtures stopped touching, or a touching contact was destroyed
    EndContact {
        contact: ContactKey,
        fixture_a: FixtureKey,
        fixture_b: FixtureKey,
    },
    /// A joint exceeded its breakpoint and was disabled
    JointBroke { joint: JointKey },
    /// A joint was removed because one of its bodies was destroyed
    JointRemoved { joint: JointKey },
    /// A fixture was removed because its body was destroyed
    FixtureRemoved { fixture: FixtureKey },
}
