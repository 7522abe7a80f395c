//! Identifier allocation for persisted entities.

use uuid::Uuid;

/// Allocate a time-ordered 128-bit identifier.
///
/// Storage treats the raw 16 bytes as canonical; the string form only
/// appears in filesystem paths.
pub fn new_id() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1_000 {
            assert!(seen.insert(new_id()));
        }
    }

    #[test]
    fn ids_are_time_ordered_across_ticks() {
        let first = new_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = new_id();
        assert!(second > first);
    }
}
