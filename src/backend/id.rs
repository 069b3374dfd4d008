//! Identifier generation.

use uuid::Uuid;

/// Factory for sortable, collision-resistant identifiers.
///
/// Chunk, branch, and document identifiers all come from here; a host may
/// substitute its own generator (e.g. the identifier scheme of its ORM)
/// as long as ids sort by creation time.
pub trait IdFactory: Send + Sync {
    fn next_id(&self) -> String;
}

/// Default factory: UUIDv7 in simple (hyphen-free) form.
///
/// v7 ids embed a millisecond timestamp in their high bits, so
/// lexicographic order follows creation order.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidFactory;

impl IdFactory for UuidFactory {
    fn next_id(&self) -> String {
        Uuid::now_v7().simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_sortable() {
        let factory = UuidFactory;
        let a = factory.next_id();
        let b = factory.next_id();
        assert_ne!(a, b);
        assert!(a <= b);
        assert_eq!(a.len(), 32);
    }
}
