// RustPixel GL2D
// copyright zipxing@hotmail.com 2022～2025

//! This module implements a simple object pool
//! It is designed for recycling of slots, the GPU resource records
//! (surfaces, shaders, buffers) and the backend object tables live here
//!
//! A slot is recycled by clearing its active flag. Every slot carries a
//! generation counter, so a stale handle to a recycled slot never
//! resolves to the new occupant.

/// handle to an object in a Pool, index is the slot offset and
/// generation identifies the occupant of that slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    pub index: u32,
    pub generation: u32,
}

/// pool slot, active is to label whether the slot is in use
struct PoolSlot<T> {
    generation: u32,
    obj: Option<T>,
    active: bool,
}

pub struct Pool<T> {
    slots: Vec<PoolSlot<T>>,
    count: usize,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Self {
            slots: vec![],
            count: 0,
        }
    }

    pub fn insert(&mut self, obj: T) -> PoolHandle {
        self.count += 1;
        // search for an available slot
        for (i, s) in self.slots.iter_mut().enumerate() {
            if !s.active {
                s.generation = s.generation.wrapping_add(1);
                s.obj = Some(obj);
                s.active = true;
                return PoolHandle {
                    index: i as u32,
                    generation: s.generation,
                };
            }
        }
        // if not found, push a new one
        let l = self.slots.len();
        self.slots.push(PoolSlot {
            generation: 0,
            obj: Some(obj),
            active: true,
        });
        PoolHandle {
            index: l as u32,
            generation: 0,
        }
    }

    fn slot(&self, h: PoolHandle) -> Option<&PoolSlot<T>> {
        self.slots
            .get(h.index as usize)
            .filter(|s| s.active && s.generation == h.generation)
    }

    pub fn contains(&self, h: PoolHandle) -> bool {
        self.slot(h).is_some()
    }

    pub fn get(&self, h: PoolHandle) -> Option<&T> {
        self.slot(h).and_then(|s| s.obj.as_ref())
    }

    pub fn get_mut(&mut self, h: PoolHandle) -> Option<&mut T> {
        self.slots
            .get_mut(h.index as usize)
            .filter(|s| s.active && s.generation == h.generation)
            .and_then(|s| s.obj.as_mut())
    }

    pub fn remove(&mut self, h: PoolHandle) -> Option<T> {
        let s = self
            .slots
            .get_mut(h.index as usize)
            .filter(|s| s.active && s.generation == h.generation)?;
        s.active = false;
        self.count -= 1;
        s.obj.take()
    }

    /// takes every active object out, leaving the pool empty
    pub fn drain(&mut self) -> Vec<(PoolHandle, T)> {
        let mut out = vec![];
        for (i, s) in self.slots.iter_mut().enumerate() {
            if s.active {
                s.active = false;
                if let Some(o) = s.obj.take() {
                    out.push((
                        PoolHandle {
                            index: i as u32,
                            generation: s.generation,
                        },
                        o,
                    ));
                }
            }
        }
        self.count = 0;
        out
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    // processing active objects by calling custom closure
    pub fn update_active<F>(&mut self, mut f: F)
    where
        F: FnMut(PoolHandle, &mut T),
    {
        for (i, s) in self.slots.iter_mut().enumerate() {
            if let (true, Some(o)) = (s.active, s.obj.as_mut()) {
                f(
                    PoolHandle {
                        index: i as u32,
                        generation: s.generation,
                    },
                    o,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut p = Pool::new();
        let a = p.insert("a");
        let b = p.insert("b");
        assert_eq!(p.len(), 2);
        assert_eq!(p.get(a), Some(&"a"));
        assert_eq!(p.remove(a), Some("a"));
        assert!(!p.contains(a));
        assert_eq!(p.get(b), Some(&"b"));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut p = Pool::new();
        let a = p.insert(1);
        p.remove(a);
        let c = p.insert(3);
        // slot is recycled, generation is bumped
        assert_eq!(a.index, c.index);
        assert_ne!(a.generation, c.generation);
        assert_eq!(p.get(a), None);
        assert_eq!(p.get(c), Some(&3));
        assert_eq!(p.remove(a), None);
    }

    #[test]
    fn test_drain() {
        let mut p = Pool::new();
        p.insert(1);
        let b = p.insert(2);
        p.insert(3);
        p.remove(b);
        let v: Vec<i32> = p.drain().into_iter().map(|(_, o)| o).collect();
        assert_eq!(v, vec![1, 3]);
        assert!(p.is_empty());
    }
}
