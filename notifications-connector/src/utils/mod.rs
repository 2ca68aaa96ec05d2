//! Timestamp and id helpers shared by the codec and the test fixtures.

pub mod timestamps;

pub use timestamps::{iso_timestamp, now_utc, parse_timestamp, Timestamp, TimestampError};

/// Generates a random (v4) UUID.
#[must_use]
pub fn generate_uuid() -> uuid::Uuid {
    uuid::Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_is_valid() {
        let id = generate_uuid();
        assert_eq!(id.get_version_num(), 4);
    }

    #[test]
    fn test_generate_uuid_is_unique() {
        assert_ne!(generate_uuid(), generate_uuid());
    }
}
