use std::sync::{Mutex, MutexGuard, PoisonError};

use gridphase_common::EntityId;

use crate::error::FindPairsError;
use crate::processor::SafeEntity;

/// Dense per-entity state that processors can write during a query.
///
/// Slots are indexed by [`EntityId::index`]. Writes go through a
/// [`SafeEntity`] and are refused when the finder could not promise that no
/// other task is reporting the same entity at the same time.
#[derive(Debug, Default)]
pub struct SafeLookup<T> {
    slots: Vec<Mutex<T>>,
}

impl<T> SafeLookup<T> {
    pub fn new(len: usize) -> Self
    where
        T: Default,
    {
        Self::from_fn(len, |_| T::default())
    }

    pub fn from_fn<F>(len: usize, init: F) -> Self
    where
        F: FnMut(usize) -> T,
    {
        Self {
            slots: (0..len).map(init).map(Mutex::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, entity: EntityId) -> Result<MutexGuard<'_, T>, FindPairsError> {
        let slot = self
            .slots
            .get(entity.index())
            .ok_or(FindPairsError::UnknownEntity(entity))?;
        Ok(slot.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Read a slot. Reads are allowed through any handle.
    pub fn get(&self, entity: EntityId) -> Result<T, FindPairsError>
    where
        T: Clone,
    {
        Ok(self.slot(entity)?.clone())
    }

    /// Mutate the slot of `entity`.
    pub fn update<F>(&self, entity: SafeEntity, f: F) -> Result<(), FindPairsError>
    where
        F: FnOnce(&mut T),
    {
        if !entity.is_exclusive() {
            return Err(FindPairsError::AliasViolation(entity.entity()));
        }
        f(&mut *self.slot(entity.entity())?);
        Ok(())
    }

    pub fn set(&self, entity: SafeEntity, value: T) -> Result<(), FindPairsError> {
        self.update(entity, |slot| *slot = value)
    }

    pub fn into_inner(self) -> Vec<T> {
        self.slots
            .into_iter()
            .map(|slot| slot.into_inner().unwrap_or_else(PoisonError::into_inner))
            .collect()
    }
}
