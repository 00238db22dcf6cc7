//! Physics error types
//!
//! Every fallible world operation reports precondition violations through
//! [`PhysicsError`] and leaves the world unchanged.

use std::fmt;

use crate::body::BodyKey;
use crate::contact::ContactKey;
use crate::fixture::FixtureKey;
use crate::joints::JointKey;

/// Error type for world operations
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// A structural change was attempted while the world was stepping
    WorldLocked,
    /// The body key is stale or was never issued by this world
    InvalidBody(BodyKey),
    /// The fixture key is stale or was never issued by this world
    InvalidFixture(FixtureKey),
    /// The joint key is stale or was never issued by this world
    InvalidJoint(JointKey),
    /// The contact no longer exists
    InvalidContact(ContactKey),
    /// Shape geometry was rejected (too few vertices, not convex, ...)
    InvalidShape(String),
    /// A joint was requested between a body and itself
    SameBody,
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicsError::WorldLocked => write!(f, "World is locked during a step"),
            PhysicsError::InvalidBody(key) => write!(f, "Invalid body key: {:?}", key),
            PhysicsError::InvalidFixture(key) => write!(f, "Invalid fixture key: {:?}", key),
            PhysicsError::InvalidJoint(key) => write!(f, "Invalid joint key: {:?}", key),
            PhysicsError::InvalidContact(key) => write!(f, "Invalid contact key: {:?}", key),
            PhysicsError::InvalidShape(msg) => write!(f, "Invalid shape: {}", msg),
            PhysicsError::SameBody => write!(f, "Joint bodies must be distinct"),
        }
    }
}

impl std::error::Error for PhysicsError {}

impl From<String> for PhysicsError {
    fn from(msg: String) -> Self {
        PhysicsError::InvalidShape(msg)
    }
}

impl From<&str> for PhysicsError {
    fn from(msg: &str) -> Self {
        PhysicsError::InvalidShape(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_display() {
        let msg = format!("{}", PhysicsError::WorldLocked);
        assert!(msg.contains("locked"));
    }

    #[test]
    fn test_invalid_shape_display() {
        let err = PhysicsError::InvalidShape("polygon needs 3 vertices".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid shape"));
        assert!(msg.contains("3 vertices"));
    }

    #[test]
    fn test_invalid_body_display() {
        let err = PhysicsError::InvalidBody(BodyKey::default());
        assert!(format!("{}", err).contains("Invalid body key"));
    }

    #[test]
    fn test_from_str() {
        let err: PhysicsError = "bad polygon".into();
        match err {
            PhysicsError::InvalidShape(msg) => assert_eq!(msg, "bad polygon"),
            _ => panic!("Expected InvalidShape variant"),
        }
    }

    #[test]
    fn test_is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&PhysicsError::SameBody);
    }
}
