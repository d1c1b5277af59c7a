//! Dependency-injection container.
//!
//! Services are registered under string ids in one of three ways:
//!
//! | Method | Factory runs | `make` returns |
//! |---|---|---|
//! | [`bind`](Container::bind) | on every `make` | a fresh value |
//! | [`singleton`](Container::singleton) | once, on first `make` | the same `Arc` |
//! | [`instance`](Container::instance) | never | the stored `Arc` |
//!
//! Values are stored type-erased next to their [`TypeId`]; resolving with the
//! wrong type yields [`ContainerError::TypeMismatch`] instead of panicking.
//!
//! # Example
//!
//! ```rust,ignore
//! let container = Container::new();
//! container.instance("config.title", String::from("My Blog"));
//! container.singleton("repo.articles", |c| {
//!     let title = c.make::<String>("config.title")?;
//!     Ok(ArticleRepo::new(&title))
//! });
//!
//! let repo = container.make::<ArticleRepo>("repo.articles")?;
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use keel_core::BoxError;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{ContainerError, ContainerResult};

type Service = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Container) -> Result<Service, BoxError> + Send + Sync>;

struct Binding {
    type_id: TypeId,
    type_name: &'static str,
    factory: Factory,
}

/// Thread-safe service container shared through the
/// [`AppContext`](crate::AppContext).
#[derive(Default)]
pub struct Container {
    factories: RwLock<HashMap<String, Binding>>,
    singletons: RwLock<HashMap<String, Binding>>,
    instances: RwLock<HashMap<String, (TypeId, Service)>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    fn erase<T, F>(factory: F) -> Binding
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Binding {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            factory: Arc::new(move |c| factory(c).map(|v| Arc::new(v) as Service)),
        }
    }

    /// Registers a factory that runs on every [`make`](Self::make).
    ///
    /// Replaces any previous binding under `id`.
    pub fn bind<T, F>(&self, id: impl Into<String>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let id = id.into();
        trace!(service = %id, ty = type_name::<T>(), "Binding factory");
        self.forget(&id);
        self.factories.write().insert(id, Self::erase(factory));
    }

    /// Registers a factory that runs once, on the first
    /// [`make`](Self::make); every later call shares its result.
    pub fn singleton<T, F>(&self, id: impl Into<String>, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let id = id.into();
        trace!(service = %id, ty = type_name::<T>(), "Binding singleton");
        self.forget(&id);
        self.singletons.write().insert(id, Self::erase(factory));
    }

    /// Stores an already-built value.
    pub fn instance<T>(&self, id: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.instance_arc(id, Arc::new(value));
    }

    /// Stores an already-shared value.
    pub fn instance_arc<T>(&self, id: impl Into<String>, value: Arc<T>)
    where
        T: Send + Sync + 'static,
    {
        let id = id.into();
        trace!(service = %id, ty = type_name::<T>(), "Storing instance");
        self.forget(&id);
        self.instances
            .write()
            .insert(id, (TypeId::of::<T>(), value as Service));
    }

    fn forget(&self, id: &str) {
        self.factories.write().remove(id);
        self.singletons.write().remove(id);
        self.instances.write().remove(id);
    }

    /// Returns `true` if anything is registered under `id`.
    pub fn has(&self, id: &str) -> bool {
        self.instances.read().contains_key(id)
            || self.singletons.read().contains_key(id)
            || self.factories.read().contains_key(id)
    }

    /// Resolves `id` as a `T`.
    ///
    /// # Errors
    ///
    /// - [`ContainerError::NotBound`] if nothing is registered under `id`.
    /// - [`ContainerError::TypeMismatch`] if the binding holds another type.
    /// - [`ContainerError::Factory`] if the factory returned an error.
    pub fn make<T>(&self, id: &str) -> ContainerResult<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        if let Some((type_id, service)) = self.instances.read().get(id).cloned() {
            return downcast(id, type_id, service);
        }

        // Clone the binding out so the factory runs without holding a lock;
        // factories may resolve other services.
        let singleton = self.singletons.read().get(id).map(|b| {
            (b.type_id, b.type_name, Arc::clone(&b.factory))
        });
        if let Some((type_id, ty, factory)) = singleton {
            check_type::<T>(id, type_id)?;
            debug!(service = %id, ty, "Building singleton");
            let value = factory(self).map_err(|e| ContainerError::Factory {
                id: id.to_string(),
                message: e.to_string(),
            })?;

            // Another thread may have built it first; keep the earliest.
            let mut instances = self.instances.write();
            let (type_id, service) = instances
                .entry(id.to_string())
                .or_insert((type_id, value))
                .clone();
            drop(instances);
            self.singletons.write().remove(id);
            return downcast(id, type_id, service);
        }

        let factory = self
            .factories
            .read()
            .get(id)
            .map(|b| (b.type_id, Arc::clone(&b.factory)));
        match factory {
            Some((type_id, factory)) => {
                check_type::<T>(id, type_id)?;
                let value = factory(self).map_err(|e| ContainerError::Factory {
                    id: id.to_string(),
                    message: e.to_string(),
                })?;
                downcast(id, type_id, value)
            }
            None => Err(ContainerError::NotBound(id.to_string())),
        }
    }

    /// Ids of every registration, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .instances
            .read()
            .keys()
            .chain(self.singletons.read().keys())
            .chain(self.factories.read().keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

fn check_type<T: 'static>(id: &str, type_id: TypeId) -> ContainerResult<()> {
    if type_id == TypeId::of::<T>() {
        Ok(())
    } else {
        Err(ContainerError::TypeMismatch {
            id: id.to_string(),
            expected: type_name::<T>(),
        })
    }
}

fn downcast<T>(id: &str, type_id: TypeId, service: Service) -> ContainerResult<Arc<T>>
where
    T: Send + Sync + 'static,
{
    check_type::<T>(id, type_id)?;
    service
        .downcast::<T>()
        .map_err(|_| ContainerError::TypeMismatch {
            id: id.to_string(),
            expected: type_name::<T>(),
        })
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("ids", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Counter(usize);

    #[test]
    fn test_bind_builds_every_time() {
        let container = Container::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        container.bind("counter", move |_| {
            Ok(Counter(calls_clone.fetch_add(1, Ordering::SeqCst)))
        });

        let a = container.make::<Counter>("counter").unwrap();
        let b = container.make::<Counter>("counter").unwrap();
        assert_eq!((a.0, b.0), (0, 1));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_singleton_builds_once() {
        let container = Container::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        container.singleton("counter", move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(Counter(7))
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let a = container.make::<Counter>("counter").unwrap();
        let b = container.make::<Counter>("counter").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factories_resolve_dependencies() {
        let container = Container::new();
        container.instance("greeting", String::from("hello"));
        container.bind("shout", |c| {
            let greeting = c.make::<String>("greeting")?;
            Ok(greeting.to_uppercase())
        });
        assert_eq!(*container.make::<String>("shout").unwrap(), "HELLO");
    }

    #[test]
    fn test_errors() {
        let container = Container::new();
        assert!(matches!(
            container.make::<String>("missing"),
            Err(ContainerError::NotBound(_))
        ));

        container.instance("n", 5_u32);
        assert!(container.has("n"));
        assert!(matches!(
            container.make::<String>("n"),
            Err(ContainerError::TypeMismatch { .. })
        ));

        container.bind::<String, _>("broken", |_| Err("boom".into()));
        let err = container.make::<String>("broken").unwrap_err();
        assert!(matches!(err, ContainerError::Factory { ref message, .. } if message == "boom"));
    }

    #[test]
    fn test_rebinding_replaces() {
        let container = Container::new();
        container.instance("value", 1_i32);
        container.bind("value", |_| Ok(2_i32));
        assert_eq!(*container.make::<i32>("value").unwrap(), 2);
        assert_eq!(container.ids(), vec!["value".to_string()]);
    }
}
