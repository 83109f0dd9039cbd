//! Object arena
//!
//! Slots are reused after collection; the generation counter makes old
//! handles to a reused slot resolve to nothing instead of the new object.

use crate::object::HeapObject;
use crate::value::ObjectId;

struct Entry {
    generation: u32,
    object: Option<HeapObject>,
}

#[derive(Default)]
pub(crate) struct Heap {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
}

impl Heap {
    pub fn alloc(&mut self, object: HeapObject) -> ObjectId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.object = Some(object);
            return ObjectId { index, generation: entry.generation };
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry { generation: 0, object: Some(object) });
        ObjectId { index, generation: 0 }
    }

    pub fn get(&self, id: ObjectId) -> Option<&HeapObject> {
        self.entries
            .get(id.index as usize)
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.object.as_ref())
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        self.entries
            .get_mut(id.index as usize)
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.object.as_mut())
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<HeapObject> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        let object = entry.object.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(object)
    }

    pub fn live_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, e)| {
            e.object.as_ref().map(|_| ObjectId { index: index as u32, generation: e.generation })
        })
    }

    pub fn pinned_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, e)| {
            e.object
                .as_ref()
                .filter(|o| o.pins > 0)
                .map(|_| ObjectId { index: index as u32, generation: e.generation })
        })
    }

    pub fn len(&self) -> usize {
        self.live
    }
}
