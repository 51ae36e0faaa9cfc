use std::collections::HashMap;

use nalgebra as na;

use crate::circular_queue::CircularQueue;
use crate::detection::EntityClass;

pub const DEFAULT_HISTORY_LEN: usize = 50;

pub type EntityKey = (EntityClass, u32);

/// Pitch-space trails keyed by class and track id.
#[derive(Debug, Clone)]
pub struct MovementHistory {
    capacity: usize,
    trails: HashMap<EntityKey, CircularQueue<na::Point2<f32>>>,
}

impl Default for MovementHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

impl MovementHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            trails: HashMap::new(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&mut self, class: EntityClass, id: u32, point: na::Point2<f32>) {
        let cap = self.capacity;

        self.trails
            .entry((class, id))
            .or_insert_with(|| CircularQueue::with_capacity(cap))
            .push(point);
    }

    #[inline]
    pub fn trail(&self, class: EntityClass, id: u32) -> Option<&CircularQueue<na::Point2<f32>>> {
        self.trails.get(&(class, id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &CircularQueue<na::Point2<f32>>)> {
        self.trails.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.trails.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trails.is_empty()
    }

    /// Drops every trail whose key fails `keep`.
    pub fn retain<F: FnMut(&EntityKey) -> bool>(&mut self, mut keep: F) {
        self.trails.retain(|key, _| keep(key));
    }

    pub fn clear(&mut self) {
        self.trails.clear();
    }
}
