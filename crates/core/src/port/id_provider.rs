// ID Provider Port (run and job IDs)

/// ID provider interface (allows deterministic IDs in tests)
pub trait IdProvider: Send + Sync {
    /// Generate a new unique ID, safe to use as a directory name
    fn generate_id(&self) -> String;
}

/// UUID v4 provider (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Counter-based provider: `run-1`, `run-2`, ...
pub struct SequentialIdProvider {
    prefix: String,
    next: std::sync::atomic::AtomicU64,
}

impl SequentialIdProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: std::sync::atomic::AtomicU64::new(1),
        }
    }
}

impl IdProvider for SequentialIdProvider {
    fn generate_id(&self) -> String {
        let n = self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::scratch_store::is_valid_run_id;

    #[test]
    fn test_uuid_ids_are_valid_run_ids() {
        let id = UuidProvider.generate_id();
        assert!(is_valid_run_id(&id));
    }

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIdProvider::new("run");
        assert_eq!(ids.generate_id(), "run-1");
        assert_eq!(ids.generate_id(), "run-2");
    }
}
