//! Window-side collaborators: pixel size and a window-scoped property store.
//!
//! The backend never owns window structures. It binds its per-window state to
//! a window through [`Properties`], the same way any other subsystem would.

use std::any::Any;
use std::collections::HashMap;

/// Typed key/value store scoped to one window.
///
/// Setting a key that is already present drops the previous value first;
/// clearing a key drops its value. Ownership of the stored value is what keeps
/// a bound resource alive.
#[derive(Default)]
pub struct Properties {
    values: HashMap<String, Box<dyn Any + Send>>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Any + Send>(&mut self, key: &str, value: T) {
        // Release the old value before the new one lands
        self.values.remove(key);
        self.values.insert(key.to_string(), Box::new(value));
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Drop the value stored under `key`. Returns false if there was none.
    pub fn clear(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Properties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

pub trait Window {
    /// Drawable size in device pixels
    fn size_in_pixels(&self) -> (u32, u32);
    fn properties(&self) -> &Properties;
    fn properties_mut(&mut self) -> &mut Properties;
}

/// Minimal window: a fixed pixel size and its property store.
#[derive(Debug)]
pub struct BasicWindow {
    width: u32,
    height: u32,
    properties: Properties,
}

impl BasicWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, properties: Properties::new() }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }
}

impl Window for BasicWindow {
    fn size_in_pixels(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }
}
