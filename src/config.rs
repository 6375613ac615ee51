/// Default bound on nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Configuration for a [`DeepDict`](crate::DeepDict), fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Start with the root explicitly locked. Otherwise the root is left in the
    /// inherited state, which resolves to unlocked.
    pub locked: bool,
    /// Deepest node depth the tree may reach (the root is depth 0). Paths that
    /// would vivify or attach below this fail with `DepthExceeded`.
    pub max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locked: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Config {
    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}
