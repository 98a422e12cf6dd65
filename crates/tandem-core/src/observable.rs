//! Observable values.
//!
//! A reactive cell built on [`tokio::sync::watch`]: readers can take the
//! current value synchronously or wait until it satisfies a predicate.
//! Session state, the entry collection and per-entry attribution are all
//! published this way.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Result, SessionError};

/// Writable side of an observable value.
pub struct Observable<T> {
    tx: watch::Sender<T>,
}

impl<T> Observable<T> {
    pub fn new(value: T) -> Self {
        let (tx, _rx) = watch::channel(value);
        Self { tx }
    }

    /// Runs `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.tx.borrow())
    }

    /// Mutates the value in place. `f` reports whether it changed anything;
    /// readers are only woken when it did.
    pub fn update(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    pub fn reader(&self) -> ObservableReader<T> {
        ObservableReader {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone> Observable<T> {
    #[must_use]
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }
}

impl<T: PartialEq> Observable<T> {
    /// Replaces the value, notifying readers only if it differs.
    pub fn set(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Observable").field(&*self.tx.borrow()).finish()
    }
}

/// Read-only handle to an observable value.
pub struct ObservableReader<T> {
    rx: watch::Receiver<T>,
}

impl<T> Clone for ObservableReader<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ObservableReader<T> {
    #[must_use]
    pub fn get(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Waits for the next change after the last value this reader saw.
    pub async fn changed(&mut self) -> Result<()> {
        self.rx
            .changed()
            .await
            .map_err(|_| SessionError::ObservableClosed)
    }

    /// Resolves with the first value (current or future) that satisfies
    /// `predicate`. There is no built-in timeout.
    pub async fn wait_for(&self, predicate: impl FnMut(&T) -> bool) -> Result<T> {
        let mut rx = self.rx.clone();
        let value = rx
            .wait_for(predicate)
            .await
            .map_err(|_| SessionError::ObservableClosed)?;
        Ok(T::clone(&value))
    }

    /// A view that maps every value through `f`.
    pub fn map<U>(&self, f: impl Fn(&T) -> U + Send + Sync + 'static) -> Derived<T, U> {
        Derived {
            rx: self.rx.clone(),
            f: Arc::new(f),
        }
    }
}

/// A mapped view over an observable value, recomputed on read.
pub struct Derived<T, U> {
    rx: watch::Receiver<T>,
    f: Arc<dyn Fn(&T) -> U + Send + Sync>,
}

impl<T, U> Clone for Derived<T, U> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            f: Arc::clone(&self.f),
        }
    }
}

impl<T: Send + Sync + 'static, U> Derived<T, U> {
    #[must_use]
    pub fn get(&self) -> U {
        (self.f)(&*self.rx.borrow())
    }

    pub async fn changed(&mut self) -> Result<()> {
        self.rx
            .changed()
            .await
            .map_err(|_| SessionError::ObservableClosed)
    }

    pub async fn wait_for(&self, mut predicate: impl FnMut(&U) -> bool) -> Result<U> {
        let mut rx = self.rx.clone();
        let f = Arc::clone(&self.f);
        let value = rx
            .wait_for(|t| predicate(&f(t)))
            .await
            .map_err(|_| SessionError::ObservableClosed)?;
        Ok(f(&*value))
    }
}
