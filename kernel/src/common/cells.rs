//! Interior-mutability cells used throughout the capsules crate in place
//! of a heap allocator or `RefCell`'s runtime-panicking borrow checks.
//!
//! `TakeCell` and `MapCell` both wrap a `Cell<Option<T>>`-shaped slot but
//! differ in how access is exposed: `TakeCell` lets a caller take exclusive,
//! temporary ownership of the contents (typically a `&'static mut [u8]`
//! buffer) and must put something back before the next access; `MapCell`
//! only ever exposes the value through a closure, so it can hold a `Copy`
//! struct without ever handing out ownership.

use core::cell::Cell;

/// Holds an optional value and exposes it only via `take`/`replace`/`map`.
pub struct TakeCell<'a, T: 'a + ?Sized> {
    val: Cell<Option<&'a mut T>>,
}

impl<'a, T: ?Sized> TakeCell<'a, T> {
    pub const fn empty() -> TakeCell<'a, T> {
        TakeCell { val: Cell::new(None) }
    }

    pub fn new(value: &'a mut T) -> TakeCell<'a, T> {
        TakeCell { val: Cell::new(Some(value)) }
    }

    pub fn is_none(&self) -> bool {
        let inner = self.val.replace(None);
        let result = inner.is_none();
        self.val.replace(inner);
        result
    }

    pub fn take(&self) -> Option<&'a mut T> {
        self.val.replace(None)
    }

    pub fn replace(&self, val: &'a mut T) -> Option<&'a mut T> {
        self.val.replace(Some(val))
    }

    pub fn put(&self, val: Option<&'a mut T>) {
        self.val.replace(val);
    }

    /// Calls `closure` with a mutable reference to the held value, if any,
    /// and always leaves the value back in the cell afterwards.
    pub fn map<F, R>(&self, closure: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let maybe_val = self.take();
        maybe_val.map(|val| {
            let result = closure(val);
            self.replace(val);
            result
        })
    }
}

/// Holds an optional, owned, `Copy` value behind a single `Cell`.
pub struct MapCell<T> {
    val: Cell<Option<T>>,
}

impl<T: Copy> MapCell<T> {
    pub const fn empty() -> MapCell<T> {
        MapCell { val: Cell::new(None) }
    }

    pub const fn new(value: T) -> MapCell<T> {
        MapCell { val: Cell::new(Some(value)) }
    }

    pub fn is_none(&self) -> bool {
        self.val.get().is_none()
    }

    pub fn put(&self, value: T) {
        self.val.set(Some(value));
    }

    pub fn take(&self) -> Option<T> {
        self.val.replace(None)
    }

    pub fn map<F, R>(&self, closure: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut maybe_val = self.val.replace(None);
        let result = maybe_val.as_mut().map(closure);
        self.val.set(maybe_val);
        result
    }

    pub fn map_or<F, R>(&self, default: R, closure: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        self.map(closure).unwrap_or(default)
    }
}

/// A `Cell<Option<T>>` with ergonomic accessors, for small `Copy` state
/// (flags, counters, addresses) that does not need `TakeCell`'s exclusive
/// ownership semantics.
pub struct OptionalCell<T> {
    value: Cell<Option<T>>,
}

impl<T: Copy> OptionalCell<T> {
    pub const fn empty() -> OptionalCell<T> {
        OptionalCell { value: Cell::new(None) }
    }

    pub const fn new(value: T) -> OptionalCell<T> {
        OptionalCell { value: Cell::new(Some(value)) }
    }

    pub fn set(&self, value: T) {
        self.value.set(Some(value));
    }

    pub fn clear(&self) {
        self.value.set(None);
    }

    pub fn is_some(&self) -> bool {
        self.value.get().is_some()
    }

    pub fn is_none(&self) -> bool {
        self.value.get().is_none()
    }

    pub fn get(&self) -> Option<T> {
        self.value.get()
    }

    pub fn map<F, R>(&self, closure: F) -> Option<R>
    where
        F: FnOnce(T) -> R,
    {
        self.value.get().map(closure)
    }

    pub fn map_or<F, R>(&self, default: R, closure: F) -> R
    where
        F: FnOnce(T) -> R,
    {
        self.value.get().map_or(default, closure)
    }
}
