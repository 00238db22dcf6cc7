//! Contact lifetime management
//!
//! Owns the broad-phase and the contact arena. New candidate pairs from the
//! broad-phase become contacts after filtering; contacts whose fat AABBs
//! stop overlapping are destroyed during `collide`.

use log::trace;
use slotmap::SlotMap;

use crate::body::{Body, BodyKey, ContactEdge};
use crate::broad_phase::BroadPhase;
use crate::contact::{Contact, ContactFlags, ContactKey};
use crate::events::WorldEvent;
use crate::fixture::{Fixture, FixtureKey};

/// Pairs involving a bullet or a non-dynamic body get time-of-impact handling
fn is_continuous_pair(a: &Body, b: &Body) -> bool {
    a.is_bullet() || b.is_bullet() || !a.is_dynamic() || !b.is_dynamic()
}

#[derive(Default)]
pub(crate) struct ContactManager {
    pub broad_phase: BroadPhase<FixtureKey>,
    pub contacts: SlotMap<ContactKey, Contact>,
    /// Scratch for new broad-phase pairs, kept between steps
    pair_buffer: Vec<(FixtureKey, FixtureKey)>,
    /// Scratch snapshot of contact keys for `collide`
    key_buffer: Vec<ContactKey>,
}

impl ContactManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn buffered broad-phase pairs into contacts
    pub fn find_new_contacts(&mut self, bodies: &mut SlotMap<BodyKey, Body>, fixtures: &SlotMap<FixtureKey, Fixture>) {
        let mut pairs = std::mem::take(&mut self.pair_buffer);
        pairs.clear();
        self.broad_phase.update_pairs(|a, b| pairs.push((a, b)));
        for &(a, b) in &pairs {
            self.add_pair(a, b, bodies, fixtures);
        }
        self.pair_buffer = pairs;
    }

    /// Create a contact for a candidate pair unless it is filtered or already exists
    fn add_pair(
        &mut self,
        fixture_a_key: FixtureKey,
        fixture_b_key: FixtureKey,
        bodies: &mut SlotMap<BodyKey, Body>,
        fixtures: &SlotMap<FixtureKey, Fixture>,
    ) {
        let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(fixture_a_key), fixtures.get(fixture_b_key)) else {
            return;
        };
        let body_a_key = fixture_a.body;
        let body_b_key = fixture_b.body;

        // Fixtures on the same body never collide
        if body_a_key == body_b_key {
            return;
        }

        let (Some(body_a), Some(body_b)) = (bodies.get(body_a_key), bodies.get(body_b_key)) else {
            return;
        };

        // Does a contact already exist?
        let exists = body_b.contact_edges.iter().any(|edge| {
            edge.other == body_a_key
                && self.contacts.get(edge.contact).is_some_and(|c| {
                    (c.fixture_a == fixture_a_key && c.fixture_b == fixture_b_key)
                        || (c.fixture_a == fixture_b_key && c.fixture_b == fixture_a_key)
                })
        });
        if exists {
            return;
        }

        if !body_b.should_collide(body_a_key, body_a) {
            return;
        }
        if !fixture_a.filter.should_collide(&fixture_b.filter) {
            return;
        }

        let mut contact = Contact::new(fixture_a_key, fixture_a, fixture_b_key, fixture_b);
        contact.flags.set(ContactFlags::CONTINUOUS, is_continuous_pair(body_a, body_b));
        let key = self.contacts.insert(contact);

        if let Some(body_a) = bodies.get_mut(body_a_key) {
            body_a.contact_edges.push(ContactEdge {
                other: body_b_key,
                contact: key,
            });
        }
        if let Some(body_b) = bodies.get_mut(body_b_key) {
            body_b.contact_edges.push(ContactEdge {
                other: body_a_key,
                contact: key,
            });
        }
        trace!("contact created between {:?} and {:?}", fixture_a_key, fixture_b_key);
    }

    /// Remove a contact and its body edges; a touching contact reports its end
    pub fn destroy(&mut self, key: ContactKey, bodies: &mut SlotMap<BodyKey, Body>, events: &mut Vec<WorldEvent>) {
        let Some(contact) = self.contacts.remove(key) else {
            return;
        };

        if contact.is_touching() {
            events.push(WorldEvent::EndContact {
                contact: key,
                fixture_a: contact.fixture_a,
                fixture_b: contact.fixture_b,
            });
        }

        // Bodies resting on each other must not stay asleep without support
        let had_points = !contact.manifold.points().is_empty();
        for body_key in [contact.body_a, contact.body_b] {
            if let Some(body) = bodies.get_mut(body_key) {
                body.contact_edges.retain(|edge| edge.contact != key);
                if had_points {
                    body.set_awake(true);
                }
            }
        }
    }

    /// Refresh one contact's manifold, waking its bodies and queueing
    /// begin/end events on touching changes
    pub fn update_contact(
        &mut self,
        key: ContactKey,
        bodies: &mut SlotMap<BodyKey, Body>,
        fixtures: &SlotMap<FixtureKey, Fixture>,
        events: &mut Vec<WorldEvent>,
    ) {
        let Some(contact) = self.contacts.get_mut(key) else {
            return;
        };
        let (Some(fixture_a), Some(fixture_b)) = (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
        else {
            return;
        };
        let (Some(body_a), Some(body_b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
            return;
        };

        let update = contact.update(&fixture_a.shape, &body_a.xf, &fixture_b.shape, &body_b.xf);

        if update.touching != update.was_touching {
            for body_key in [contact.body_a, contact.body_b] {
                if let Some(body) = bodies.get_mut(body_key) {
                    body.set_awake(true);
                }
            }
        }

        if update.began() {
            events.push(WorldEvent::BeginContact {
                contact: key,
                fixture_a: contact.fixture_a,
                fixture_b: contact.fixture_b,
            });
        } else if update.ended() {
            events.push(WorldEvent::EndContact {
                contact: key,
                fixture_a: contact.fixture_a,
                fixture_b: contact.fixture_b,
            });
        }
    }

    /// Narrow phase for every live contact
    ///
    /// Pairs flagged for filtering are re-checked first. Pairs whose fat
    /// AABBs no longer overlap are destroyed. Pairs where neither body is
    /// awake keep their previous manifold.
    pub fn collide(
        &mut self,
        bodies: &mut SlotMap<BodyKey, Body>,
        fixtures: &SlotMap<FixtureKey, Fixture>,
        events: &mut Vec<WorldEvent>,
    ) {
        let mut keys = std::mem::take(&mut self.key_buffer);
        keys.clear();
        keys.extend(self.contacts.keys());
        for &key in &keys {
            let Some(contact) = self.contacts.get(key) else {
                continue;
            };
            let (Some(fixture_a), Some(fixture_b)) =
                (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
            else {
                self.destroy(key, bodies, events);
                continue;
            };
            let (Some(body_a), Some(body_b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b)) else {
                self.destroy(key, bodies, events);
                continue;
            };

            if contact.flags.contains(ContactFlags::FILTER) {
                if !body_b.should_collide(contact.body_a, body_a) || !fixture_a.filter.should_collide(&fixture_b.filter)
                {
                    self.destroy(key, bodies, events);
                    continue;
                }
                if let Some(contact) = self.contacts.get_mut(key) {
                    contact.flags -= ContactFlags::FILTER;
                }
            }

            let active_a = body_a.is_awake() && !body_a.is_static();
            let active_b = body_b.is_awake() && !body_b.is_static();
            if !active_a && !active_b {
                continue;
            }

            let overlap = match (fixture_a.proxy, fixture_b.proxy) {
                (Some(proxy_a), Some(proxy_b)) => self.broad_phase.test_overlap(proxy_a, proxy_b),
                _ => false,
            };
            if !overlap {
                self.destroy(key, bodies, events);
                continue;
            }

            let continuous = is_continuous_pair(body_a, body_b);
            if let Some(contact) = self.contacts.get_mut(key) {
                contact.flags.set(ContactFlags::CONTINUOUS, continuous);
            }

            self.update_contact(key, bodies, fixtures, events);
        }
        self.key_buffer = keys;
    }

    /// Destroy every contact touching `body`
    pub fn destroy_body_contacts(
        &mut self,
        body: BodyKey,
        bodies: &mut SlotMap<BodyKey, Body>,
        events: &mut Vec<WorldEvent>,
    ) {
        let keys: Vec<ContactKey> = bodies
            .get(body)
            .map(|b| b.contact_edges.iter().map(|edge| edge.contact).collect())
            .unwrap_or_default();
        for key in keys {
            self.destroy(key, bodies, events);
        }
    }

    /// Destroy every contact involving `fixture`
    pub fn destroy_fixture_contacts(
        &mut self,
        fixture: FixtureKey,
        body: BodyKey,
        bodies: &mut SlotMap<BodyKey, Body>,
        events: &mut Vec<WorldEvent>,
    ) {
        let keys: Vec<ContactKey> = bodies
            .get(body)
            .map(|b| {
                b.contact_edges
                    .iter()
                    .map(|edge| edge.contact)
                    .filter(|&c| {
                        self.contacts
                            .get(c)
                            .is_some_and(|contact| contact.fixture_a == fixture || contact.fixture_b == fixture)
                    })
                    .collect()
            })
            .unwrap_or_default();
        for key in keys {
            self.destroy(key, bodies, events);
        }
    }

    /// Flag every contact between two bodies for re-filtering
    pub fn flag_pair_for_filtering(&mut self, body: BodyKey, other: BodyKey, bodies: &SlotMap<BodyKey, Body>) {
        let Some(body) = bodies.get(body) else {
            return;
        };
        for edge in body.contact_edges.iter().filter(|edge| edge.other == other) {
            if let Some(contact) = self.contacts.get_mut(edge.contact) {
                contact.flag_for_filtering();
            }
        }
    }
}
