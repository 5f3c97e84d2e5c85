//! Time-indexed memoization
//!
//! Every output of the stabilizer and of the flexibility models is a
//! function of the host's time index. A value is computed on first demand
//! for an index and served from the cache until the index advances. A
//! request for an older index is answered with the newest value.

/// Time index of the host control loop
pub type TimeIndex = i64;

/// Value cached for a single time index
#[derive(Debug, Clone)]
pub struct TimeCache<T> {
    entry: Option<(TimeIndex, T)>,
}

impl<T> TimeCache<T> {
    pub fn new() -> Self {
        Self { entry: None }
    }

    /// Time index of the cached value, if any
    pub fn time(&self) -> Option<TimeIndex> {
        self.entry.as_ref().map(|(t, _)| *t)
    }

    /// Cached value for `time`, if it is the current one
    pub fn get(&self, time: TimeIndex) -> Option<&T> {
        match &self.entry {
            Some((t, value)) if *t == time => Some(value),
            _ => None,
        }
    }

    /// Most recently cached value regardless of its time index
    pub fn latest(&self) -> Option<&T> {
        self.entry.as_ref().map(|(_, value)| value)
    }

    /// Return the value for `time`, computing it with `compute` only when
    /// `time` is newer than the cached index. A failed computation leaves
    /// the cache untouched.
    pub fn get_or_try_compute<E>(
        &mut self,
        time: TimeIndex,
        compute: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, E> {
        let entry = match self.entry.take() {
            Some((t, value)) if time <= t => (t, value),
            previous => match compute() {
                Ok(value) => (time, value),
                Err(err) => {
                    self.entry = previous;
                    return Err(err);
                }
            },
        };
        let (_, value) = self.entry.insert(entry);
        Ok(&*value)
    }

    /// Drop the cached value so the next request recomputes
    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

impl<T> Default for TimeCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
