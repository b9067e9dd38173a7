//! Typed per-object property store
//!
//! Extension state that only some surfaces carry (viewport crop, secure
//! output flag, blending, a back-pointer to the wire object) is attached
//! through a [`PropertyStore`] instead of widening the surface type.
//!
//! Keys are declared once as statics and carry their value type and default:
//!
//! ```
//! use hearth::properties::{PropertyKey, PropertyStore};
//!
//! static HAS_WIDGET: PropertyKey<bool> = PropertyKey::new("has-widget", || false);
//!
//! let mut store = PropertyStore::new();
//! assert!(!store.get(&HAS_WIDGET));
//! store.set(&HAS_WIDGET, true);
//! assert!(store.get(&HAS_WIDGET));
//! ```
//!
//! Values may also be stored as owned slots with a release callback. The
//! callback receives the value when it is overwritten, cleared, or when the
//! store itself is torn down together with its owner.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Static registration token for one property
pub struct PropertyKey<T: 'static> {
    name: &'static str,
    default: fn() -> T,
}

impl<T: 'static> PropertyKey<T> {
    pub const fn new(name: &'static str, default: fn() -> T) -> Self {
        Self { name, default }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_value(&self) -> T {
        (self.default)()
    }

    fn token(&self) -> Token {
        Token {
            type_id: TypeId::of::<T>(),
            name: self.name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Token {
    type_id: TypeId,
    name: &'static str,
}

type Release = Box<dyn FnOnce(Box<dyn Any>)>;

struct Slot {
    value: Box<dyn Any>,
    release: Option<Release>,
}

impl Slot {
    fn release(self) {
        if let Some(release) = self.release {
            release(self.value);
        }
    }
}

#[derive(Default)]
pub struct PropertyStore {
    slots: HashMap<Token, Slot>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a plain value, releasing whatever owned value the key held
    pub fn set<T: 'static>(&mut self, key: &PropertyKey<T>, value: T) {
        self.insert(
            key.token(),
            Slot {
                value: Box::new(value),
                release: None,
            },
        );
    }

    /// Stores a value together with the callback that disposes of it
    pub fn set_owned<T, F>(&mut self, key: &PropertyKey<T>, value: T, release: F)
    where
        T: 'static,
        F: FnOnce(T) + 'static,
    {
        let release: Release = Box::new(move |value: Box<dyn Any>| {
            if let Ok(value) = value.downcast::<T>() {
                release(*value);
            }
        });
        self.insert(
            key.token(),
            Slot {
                value: Box::new(value),
                release: Some(release),
            },
        );
    }

    fn insert(&mut self, token: Token, slot: Slot) {
        if let Some(previous) = self.slots.insert(token, slot) {
            previous.release();
        }
    }

    /// Current value, or the key's default when unset
    pub fn get<T: Clone + 'static>(&self, key: &PropertyKey<T>) -> T {
        self.get_ref(key)
            .cloned()
            .unwrap_or_else(|| key.default_value())
    }

    pub fn get_ref<T: 'static>(&self, key: &PropertyKey<T>) -> Option<&T> {
        self.slots
            .get(&key.token())
            .and_then(|slot| slot.value.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self, key: &PropertyKey<T>) -> Option<&mut T> {
        self.slots
            .get_mut(&key.token())
            .and_then(|slot| slot.value.downcast_mut::<T>())
    }

    pub fn contains<T: 'static>(&self, key: &PropertyKey<T>) -> bool {
        self.slots.contains_key(&key.token())
    }

    /// Removes one entry, running its release callback. Returns whether the
    /// key was present.
    pub fn clear<T: 'static>(&mut self, key: &PropertyKey<T>) -> bool {
        match self.slots.remove(&key.token()) {
            Some(slot) => {
                slot.release();
                true
            }
            None => false,
        }
    }

    /// Removes every entry, running all release callbacks
    pub fn clear_all(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.release();
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Drop for PropertyStore {
    fn drop(&mut self) {
        self.clear_all();
    }
}

impl fmt::Debug for PropertyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.slots.keys().map(|t| t.name).collect();
        names.sort_unstable();
        f.debug_struct("PropertyStore").field("keys", &names).finish()
    }
}
