//! Operation timing helpers.

use std::future::Future;
use std::time::Instant;

use agrowatch_types::Tags;

use crate::store::MetricsStore;

/// Measures one operation and records it when dropped.
///
/// On drop the guard records `name.duration`, increments `name.calls`, and
/// increments either `name.success` or `name.errors` (the latter tagged with
/// `error_type`).
#[must_use = "the operation is recorded when the guard is dropped"]
pub struct TimingGuard<'a> {
    store: &'a MetricsStore,
    name: String,
    tags: Option<Tags>,
    started: Instant,
    error_type: Option<String>,
}

impl<'a> TimingGuard<'a> {
    pub fn new(store: &'a MetricsStore, name: impl Into<String>, tags: Option<Tags>) -> Self {
        Self {
            store,
            name: name.into(),
            tags,
            started: Instant::now(),
            error_type: None,
        }
    }

    /// Mark the operation as failed.
    pub fn fail(&mut self, error_type: impl Into<String>) {
        self.error_type = Some(error_type.into());
    }
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        let tags = self.tags.as_ref();

        self.store
            .increment_counter(&format!("{}.calls", self.name), 1.0, tags);

        match self.error_type.take() {
            None => self
                .store
                .increment_counter(&format!("{}.success", self.name), 1.0, tags),
            Some(error_type) => {
                let mut error_tags = self.tags.clone().unwrap_or_default();
                error_tags.insert("error_type".to_string(), error_type);
                self.store
                    .increment_counter(&format!("{}.errors", self.name), 1.0, Some(&error_tags));
            }
        }

        self.store.record_timing(&self.name, elapsed, tags);
    }
}

impl MetricsStore {
    /// Start timing an operation.
    pub fn start_timer(&self, name: impl Into<String>, tags: Option<Tags>) -> TimingGuard<'_> {
        TimingGuard::new(self, name, tags)
    }
}

/// Await `operation`, recording its duration and outcome under `name`.
///
/// The error type recorded on failure is the short type name of `E`.
pub async fn time_operation<F, T, E>(
    store: &MetricsStore,
    name: &str,
    tags: Option<Tags>,
    operation: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let mut guard = store.start_timer(name, tags);
    let result = operation.await;
    if result.is_err() {
        guard.fail(short_type_name::<E>());
    }
    result
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
