//! # Callable registry.
//!
//! Workers resolve a job's callable reference against a [`CallableRegistry`]. A reference is a
//! stable, module-qualified name. Anonymous closures have no such name and are refused, both
//! at registration and when a publisher builds a job.
//!
//! Two kinds of callables exist:
//! - [`Callable::Async`]: awaited directly on the worker runtime
//! - [`Callable::Blocking`]: offloaded to the blocking thread pool
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, PoisonError, RwLock},
};

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::trace;

use crate::CoreError;

mod call;
pub use call::{Call, CallError, TaskContext};

/// Outcome of a callable: a JSON result or a [`CallError`].
pub type CallResult = Result<Value, CallError>;

pub type AsyncFn = Arc<dyn Fn(Call) -> BoxFuture<'static, CallResult> + Send + Sync>;
pub type BlockingFn = Arc<dyn Fn(Call) -> CallResult + Send + Sync>;

/// Registered callable.
#[derive(Clone)]
pub enum Callable {
    Async(AsyncFn),
    Blocking(BlockingFn),
}

impl Callable {
    #[inline]
    pub fn is_blocking(&self) -> bool {
        matches!(self, Callable::Blocking(_))
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Async(_) => f.write_str("Callable::Async"),
            Callable::Blocking(_) => f.write_str("Callable::Blocking"),
        }
    }
}

/// Checks that `reference` is a usable callable name.
pub fn validate_reference(reference: &str) -> Result<(), CoreError> {
    if reference.contains("{{closure}}") || reference.contains("{closure") {
        return Err(CoreError::AnonymousCallable(reference.to_string()));
    }
    if reference.is_empty() || reference.chars().any(char::is_whitespace) {
        return Err(CoreError::UnresolvableCallable(reference.to_string()));
    }
    Ok(())
}

/// Stable name of a function item, derived from its type path.
///
/// Fails for closures.
pub fn reference_of<F>(_f: &F) -> Result<String, CoreError> {
    let name = std::any::type_name::<F>();
    validate_reference(name)?;
    Ok(name.to_string())
}

/// Name → callable map shared by every task of a worker.
#[derive(Clone, Default)]
pub struct CallableRegistry {
    inner: Arc<RwLock<HashMap<String, Callable>>>,
}

impl CallableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an async callable under `name`.
    pub fn register_async<F, Fut>(&self, name: impl Into<String>, f: F) -> Result<&Self, CoreError>
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallResult> + Send + 'static,
    {
        let f: AsyncFn = Arc::new(move |call| Box::pin(f(call)));
        self.insert(name.into(), Callable::Async(f))
    }

    /// Registers a blocking callable under `name`.
    pub fn register_blocking<F>(&self, name: impl Into<String>, f: F) -> Result<&Self, CoreError>
    where
        F: Fn(Call) -> CallResult + Send + Sync + 'static,
    {
        self.insert(name.into(), Callable::Blocking(Arc::new(f)))
    }

    /// Registers an async function item under its type path; returns the reference.
    pub fn register_async_fn<F, Fut>(&self, f: F) -> Result<String, CoreError>
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallResult> + Send + 'static,
    {
        let name = reference_of(&f)?;
        self.register_async(name.clone(), f)?;
        Ok(name)
    }

    /// Registers a blocking function item under its type path; returns the reference.
    pub fn register_blocking_fn<F>(&self, f: F) -> Result<String, CoreError>
    where
        F: Fn(Call) -> CallResult + Send + Sync + 'static,
    {
        let name = reference_of(&f)?;
        self.register_blocking(name.clone(), f)?;
        Ok(name)
    }

    /// Looks up the callable behind `reference`.
    pub fn resolve(&self, reference: &str) -> Result<Callable, CoreError> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.get(reference)
            .cloned()
            .ok_or_else(|| CoreError::UnresolvableCallable(reference.to_string()))
    }

    pub fn contains(&self, reference: &str) -> bool {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        map.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered references, sorted.
    pub fn names(&self) -> Vec<String> {
        let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }

    fn insert(&self, name: String, callable: Callable) -> Result<&Self, CoreError> {
        validate_reference(&name)?;
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(&name) {
            return Err(CoreError::DuplicateCallable(name));
        }
        trace!(target: "farm.core.registry", callable = %name, blocking = callable.is_blocking(), "callable registered");
        map.insert(name, callable);
        Ok(self)
    }
}

impl fmt::Debug for CallableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableRegistry")
            .field("callables", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn double(call: Call) -> CallResult {
        let n: i64 = call.arg(0)?;
        Ok(json!(n * 2))
    }

    fn shout(call: Call) -> CallResult {
        let s: String = call.arg(0)?;
        Ok(json!(s.to_uppercase()))
    }

    #[test]
    fn function_items_register_under_their_path() {
        let registry = CallableRegistry::new();
        let a = registry.register_async_fn(double).unwrap();
        let b = registry.register_blocking_fn(shout).unwrap();

        assert!(a.ends_with("::double"), "{a}");
        assert!(b.ends_with("::shout"), "{b}");
        assert!(!registry.resolve(&a).unwrap().is_blocking());
        assert!(registry.resolve(&b).unwrap().is_blocking());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn closures_are_refused_by_path() {
        let registry = CallableRegistry::new();
        let err = registry
            .register_blocking_fn(|_call: Call| Ok(Value::Null))
            .unwrap_err();
        assert!(matches!(err, CoreError::AnonymousCallable(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn closures_can_be_registered_under_an_explicit_name() {
        let registry = CallableRegistry::new();
        registry
            .register_blocking("jobs::noop", |_call: Call| Ok(Value::Null))
            .unwrap();
        assert!(registry.contains("jobs::noop"));
    }

    #[test]
    fn duplicates_and_bad_names_are_rejected() {
        let registry = CallableRegistry::new();
        registry.register_blocking("jobs::a", shout).unwrap();
        assert!(matches!(
            registry.register_blocking("jobs::a", shout),
            Err(CoreError::DuplicateCallable(_))
        ));
        assert!(matches!(
            registry.register_blocking("", shout),
            Err(CoreError::UnresolvableCallable(_))
        ));
        assert!(matches!(
            registry.register_blocking("jobs a", shout),
            Err(CoreError::UnresolvableCallable(_))
        ));
    }

    #[test]
    fn unknown_reference_is_unresolvable() {
        let registry = CallableRegistry::new();
        assert!(matches!(
            registry.resolve("nope::nothing"),
            Err(CoreError::UnresolvableCallable(name)) if name == "nope::nothing"
        ));
    }

    #[tokio::test]
    async fn resolved_async_callable_runs() {
        let registry = CallableRegistry::new();
        let name = registry.register_async_fn(double).unwrap();
        let Callable::Async(f) = registry.resolve(&name).unwrap() else {
            panic!("expected async callable");
        };
        let call = Call::new(vec![json!(21)], Default::default(), TaskContext::detached("t"));
        assert_eq!(f(call).await.unwrap(), json!(42));
    }
}
