//! Typed tag buffers and the managers that control their layout.
//!
//! A tag is a typed slot attached to every chromosome storage object of a
//! population (or to the population itself). Operators park their working
//! state there: partial sharing sums, dominance counters, hyperbox
//! coordinates. Slot layout is owned by a [`TagManager`]: operators refer
//! to tags by stable [`TagId`]s, the manager maps ids to slot indices and
//! hands out typed [`TagHandle`]s.
//!
//! Layout changes (add, remove, resize, update) never happen while a
//! parallel pass is running; the owning population applies them to every
//! live and pooled storage object between barriers, so at every quiescent
//! point each buffer matches the manager's layout.

use crate::errors::{Error, Result};
use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

/// Stable identifier chosen by the operator that owns the tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(pub u32);

pub type TagBox = Box<dyn Any + Send + Sync>;

/// Typed accessor for one tag slot. Carries the element type at compile
/// time; the slot index stays valid until the tag is removed.
pub struct TagHandle<T> {
    slot: usize,
    marker: PhantomData<fn() -> T>,
}

impl<T> TagHandle<T> {
    pub(crate) fn new(slot: usize) -> Self {
        Self {
            slot,
            marker: PhantomData,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl<T> Copy for TagHandle<T> {}

impl<T> Clone for TagHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> fmt::Debug for TagHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagHandle({})", self.slot)
    }
}

/// Creates tag values and refreshes them when a pooled storage object is
/// reissued.
pub trait TagLifecycle: Send + Sync {
    fn create(&self) -> TagBox;

    /// Reset an existing tag for reuse. The default rebuilds it from
    /// scratch.
    fn prepare(&self, tag: &mut TagBox) {
        *tag = self.create();
    }
}

/// Lifecycle for plain `Default`-constructed tag values.
pub struct TypedTagLifecycle<T> {
    marker: PhantomData<fn() -> T>,
}

impl<T> Default for TypedTagLifecycle<T> {
    fn default() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}

impl<T: Default + Send + Sync + 'static> TagLifecycle for TypedTagLifecycle<T> {
    fn create(&self) -> TagBox {
        Box::new(T::default())
    }

    fn prepare(&self, tag: &mut TagBox) {
        match tag.downcast_mut::<T>() {
            Some(value) => *value = T::default(),
            None => *tag = self.create(),
        }
    }
}

/// Tag values whose size follows an external dimension, typically the
/// branch count.
pub trait SizableTag: Send + Sync + 'static {
    fn with_len(len: usize) -> Self;

    fn set_len(&mut self, len: usize);

    fn reset(&mut self);
}

/// Lifecycle for [`SizableTag`] values, parameterized by the current size.
pub struct SizableTagLifecycle<T> {
    len: usize,
    marker: PhantomData<fn() -> T>,
}

impl<T> SizableTagLifecycle<T> {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            marker: PhantomData,
        }
    }
}

impl<T: SizableTag> TagLifecycle for SizableTagLifecycle<T> {
    fn create(&self) -> TagBox {
        Box::new(T::with_len(self.len))
    }

    fn prepare(&self, tag: &mut TagBox) {
        match tag.downcast_mut::<T>() {
            Some(value) => {
                value.set_len(self.len);
                value.reset();
            }
            None => *tag = self.create(),
        }
    }
}

/// Per-branch partial sums, one `f32` slot per branch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PartialSum(pub Vec<f32>);

impl PartialSum {
    pub fn total(&self) -> f32 {
        self.0.iter().sum()
    }
}

impl SizableTag for PartialSum {
    fn with_len(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    fn set_len(&mut self, len: usize) {
        self.0.resize(len, 0.0);
    }

    fn reset(&mut self) {
        self.0.iter_mut().for_each(|slot| *slot = 0.0);
    }
}

/// Fixed-layout heterogeneous array of tag slots.
#[derive(Default)]
pub struct TagBuffer {
    slots: Vec<Option<TagBox>>,
}

impl TagBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Grow or shrink the slot array. New slots start empty.
    pub fn resize(&mut self, new_size: usize) {
        self.slots.resize_with(new_size, || None);
    }

    /// Install a tag at `slot`, growing the buffer when needed.
    pub fn set(&mut self, slot: usize, tag: TagBox) {
        if slot >= self.slots.len() {
            self.resize(slot + 1);
        }
        self.slots[slot] = Some(tag);
    }

    /// Drop the tag at `slot`, leaving the slot empty.
    pub fn remove(&mut self, slot: usize) -> Result<()> {
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or(Error::TagNotFound(slot as u32))?;
        *entry = None;
        Ok(())
    }

    pub fn has(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    pub fn get<T: 'static>(&self, handle: TagHandle<T>) -> Result<&T> {
        self.get_by_slot(handle.slot)
    }

    pub fn get_mut<T: 'static>(&mut self, handle: TagHandle<T>) -> Result<&mut T> {
        self.get_mut_by_slot(handle.slot)
    }

    pub fn get_by_slot<T: 'static>(&self, slot: usize) -> Result<&T> {
        let tag = self
            .slots
            .get(slot)
            .and_then(|entry| entry.as_ref())
            .ok_or(Error::TagNotFound(slot as u32))?;
        tag.downcast_ref::<T>().ok_or(Error::InvalidTagType {
            slot,
            requested: std::any::type_name::<T>(),
        })
    }

    pub fn get_mut_by_slot<T: 'static>(&mut self, slot: usize) -> Result<&mut T> {
        let tag = self
            .slots
            .get_mut(slot)
            .and_then(|entry| entry.as_mut())
            .ok_or(Error::TagNotFound(slot as u32))?;
        tag.downcast_mut::<T>().ok_or(Error::InvalidTagType {
            slot,
            requested: std::any::type_name::<T>(),
        })
    }

    /// Overwrite the value stored at a slot.
    pub fn put<T: Send + Sync + 'static>(&mut self, handle: TagHandle<T>, value: T) -> Result<()> {
        *self.get_mut(handle)? = value;
        Ok(())
    }

    /// Apply an arbitrary update to the raw tag box.
    pub fn update(&mut self, slot: usize, update: &dyn Fn(&mut TagBox)) -> Result<()> {
        let tag = self
            .slots
            .get_mut(slot)
            .and_then(|entry| entry.as_mut())
            .ok_or(Error::TagNotFound(slot as u32))?;
        update(tag);
        Ok(())
    }
}

impl fmt::Debug for TagBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let occupied: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|_| index))
            .collect();
        f.debug_struct("TagBuffer")
            .field("len", &self.slots.len())
            .field("occupied", &occupied)
            .finish()
    }
}

/// Maps stable tag ids to slot indices and owns the lifecycles that build
/// tag values.
pub struct TagManager {
    entries: FxHashMap<TagId, TagEntry>,
    occupancy: Vec<bool>,
}

struct TagEntry {
    slot: usize,
    lifecycle: Box<dyn TagLifecycle>,
}

impl Default for TagManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TagManager {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            occupancy: Vec::new(),
        }
    }

    pub fn is_registered(&self, id: TagId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn tag_count(&self) -> usize {
        self.entries.len()
    }

    /// Current slot-array size required by this layout.
    pub fn buffer_size(&self) -> usize {
        self.occupancy.len()
    }

    /// Register a tag and return its slot. Fails when the id is taken.
    pub fn register(&mut self, id: TagId, lifecycle: Box<dyn TagLifecycle>) -> Result<usize> {
        if self.entries.contains_key(&id) {
            return Err(Error::InvalidOperation(
                "a tag is already registered under this id",
            ));
        }

        let slot = match self.occupancy.iter().position(|used| !used) {
            Some(free) => free,
            None => {
                self.occupancy.push(false);
                self.occupancy.len() - 1
            }
        };
        self.occupancy[slot] = true;
        self.entries.insert(id, TagEntry { slot, lifecycle });

        log::trace!("tag {:?} registered at slot {}", id, slot);
        Ok(slot)
    }

    /// Unregister a tag and return the slot it occupied.
    pub fn unregister(&mut self, id: TagId) -> Result<usize> {
        let entry = self.entries.remove(&id).ok_or(Error::TagNotFound(id.0))?;
        self.occupancy[entry.slot] = false;
        Ok(entry.slot)
    }

    /// Replace the lifecycle of a registered tag, e.g. after the branch
    /// count changed. Returns the slot so the caller can refresh buffers.
    pub fn replace_lifecycle(
        &mut self,
        id: TagId,
        lifecycle: Box<dyn TagLifecycle>,
    ) -> Result<usize> {
        let entry = self.entries.get_mut(&id).ok_or(Error::TagNotFound(id.0))?;
        entry.lifecycle = lifecycle;
        Ok(entry.slot)
    }

    pub fn slot_of(&self, id: TagId) -> Result<usize> {
        self.entries
            .get(&id)
            .map(|entry| entry.slot)
            .ok_or(Error::TagNotFound(id.0))
    }

    pub fn handle<T>(&self, id: TagId) -> Result<TagHandle<T>> {
        Ok(TagHandle::new(self.slot_of(id)?))
    }

    pub fn lifecycle(&self, id: TagId) -> Result<&dyn TagLifecycle> {
        self.entries
            .get(&id)
            .map(|entry| entry.lifecycle.as_ref())
            .ok_or(Error::TagNotFound(id.0))
    }

    /// Build a buffer matching this layout from scratch.
    pub fn init_buffer(&self, buffer: &mut TagBuffer) {
        buffer.resize(self.buffer_size());
        for entry in self.entries.values() {
            buffer.set(entry.slot, entry.lifecycle.create());
        }
    }

    /// Refresh an existing buffer for reuse: size it to the layout and
    /// reset every registered tag.
    pub fn prepare_buffer(&self, buffer: &mut TagBuffer) {
        buffer.resize(self.buffer_size());
        for entry in self.entries.values() {
            if buffer.has(entry.slot) {
                let _ = buffer.update(entry.slot, &|tag| entry.lifecycle.prepare(tag));
            } else {
                buffer.set(entry.slot, entry.lifecycle.create());
            }
        }
    }
}

impl fmt::Debug for TagManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagManager")
            .field("tags", &self.entries.len())
            .field("buffer_size", &self.occupancy.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_reuses_freed_slots() {
        let mut manager = TagManager::new();
        let a = manager
            .register(TagId(1), Box::new(TypedTagLifecycle::<i32>::default()))
            .unwrap();
        let b = manager
            .register(TagId(2), Box::new(TypedTagLifecycle::<f32>::default()))
            .unwrap();
        assert_ne!(a, b);

        manager.unregister(TagId(1)).unwrap();
        let c = manager
            .register(TagId(3), Box::new(TypedTagLifecycle::<u8>::default()))
            .unwrap();
        assert_eq!(a, c);
        assert_eq!(manager.buffer_size(), 2);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut manager = TagManager::new();
        manager
            .register(TagId(7), Box::new(TypedTagLifecycle::<i32>::default()))
            .unwrap();
        assert!(manager
            .register(TagId(7), Box::new(TypedTagLifecycle::<i32>::default()))
            .is_err());
    }

    #[test]
    fn typed_access_enforces_the_declared_type() {
        let mut manager = TagManager::new();
        manager
            .register(TagId(1), Box::new(TypedTagLifecycle::<i64>::default()))
            .unwrap();

        let mut buffer = TagBuffer::new();
        manager.init_buffer(&mut buffer);

        let handle: TagHandle<i64> = manager.handle(TagId(1)).unwrap();
        *buffer.get_mut(handle).unwrap() = 42;
        assert_eq!(*buffer.get(handle).unwrap(), 42);

        let wrong: TagHandle<f32> = manager.handle(TagId(1)).unwrap();
        assert!(matches!(
            buffer.get(wrong),
            Err(Error::InvalidTagType { .. })
        ));
    }

    #[test]
    fn prepare_buffer_resets_sizable_tags() {
        let mut manager = TagManager::new();
        manager
            .register(TagId(1), Box::new(SizableTagLifecycle::<PartialSum>::new(3)))
            .unwrap();

        let mut buffer = TagBuffer::new();
        manager.init_buffer(&mut buffer);

        let handle: TagHandle<PartialSum> = manager.handle(TagId(1)).unwrap();
        buffer.get_mut(handle).unwrap().0[1] = 5.0;

        manager.prepare_buffer(&mut buffer);
        assert_eq!(buffer.get(handle).unwrap().0, vec![0.0; 3]);
    }

    #[test]
    fn layout_matches_after_add_remove_resize() {
        let mut manager = TagManager::new();
        let mut buffer = TagBuffer::new();

        for id in 0..4 {
            manager
                .register(TagId(id), Box::new(TypedTagLifecycle::<u32>::default()))
                .unwrap();
        }
        manager.init_buffer(&mut buffer);
        assert_eq!(buffer.len(), manager.buffer_size());

        let freed = manager.unregister(TagId(2)).unwrap();
        buffer.remove(freed).unwrap();
        assert!(!buffer.has(freed));

        let slot = manager
            .register(TagId(9), Box::new(TypedTagLifecycle::<u32>::default()))
            .unwrap();
        buffer.set(slot, manager.lifecycle(TagId(9)).unwrap().create());

        for id in [0u32, 1, 3, 9] {
            let handle: TagHandle<u32> = manager.handle(TagId(id)).unwrap();
            assert!(buffer.get(handle).is_ok());
        }
    }
}
