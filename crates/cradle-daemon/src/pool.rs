//! Bounded pools of pre-created resources
//!
//! A pool is filled once at construction and never grows or shrinks; the
//! per-resource cost (namespace unshare, rootfs prep) dwarfs any caching
//! policy, so there is no eviction and `get` never creates. Per-type
//! behaviour lives entirely in the create/destroy hooks.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use cradle_core::{Error, Result};
use parking_lot::Mutex;

/// A slot handed to the destroy hook: the descriptor plus whatever the create
/// hook attached to it.
pub struct Slot<I> {
    pub id: usize,
    pub fd: OwnedFd,
    pub info: I,
}

/// What `get` returns. The pool keeps descriptor ownership; the lease only
/// carries the raw fd number for the wire response.
#[derive(Debug, Clone)]
pub struct Lease<I> {
    pub id: usize,
    pub fd: RawFd,
    pub info: I,
}

struct Entry<I> {
    fd: OwnedFd,
    info: I,
    in_use: bool,
}

struct State<I> {
    /// Every slot ever created, indexed by id. Ids are dense in
    /// `[0, capacity)` and never reused.
    slots: Vec<Entry<I>>,
    /// Idle slot ids; a stack, so the most recently returned slot is reused
    /// first.
    available: Vec<usize>,
}

pub struct Pool<I> {
    state: Mutex<State<I>>,
    destroy: Box<dyn Fn(Slot<I>) -> Result<()> + Send + Sync>,
}

impl<I: std::fmt::Debug> std::fmt::Debug for Pool<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").finish_non_exhaustive()
    }
}

impl<I: Clone> Pool<I> {
    /// Eagerly create exactly `capacity` slots. Any creation failure tears
    /// down the slots already created and fails construction.
    pub fn new(
        capacity: usize,
        mut create: impl FnMut(usize) -> Result<(OwnedFd, I)>,
        destroy: impl Fn(Slot<I>) -> Result<()> + Send + Sync + 'static,
    ) -> Result<Self> {
        let mut slots: Vec<Entry<I>> = Vec::with_capacity(capacity);

        for id in 0..capacity {
            match create(id) {
                Ok((fd, info)) => slots.push(Entry {
                    fd,
                    info,
                    in_use: false,
                }),
                Err(e) => {
                    for (done, entry) in slots.into_iter().enumerate() {
                        let _ = destroy(Slot {
                            id: done,
                            fd: entry.fd,
                            info: entry.info,
                        });
                    }
                    return Err(e);
                }
            }
        }

        // Reversed so the first get hands out slot 0.
        let available = (0..capacity).rev().collect();

        Ok(Self {
            state: Mutex::new(State { slots, available }),
            destroy: Box::new(destroy),
        })
    }

    /// Pop an idle slot. Pools are eagerly filled, so an empty stack means
    /// every slot is leased out.
    pub fn get(&self) -> Result<Lease<I>> {
        let mut state = self.state.lock();
        let id = state.available.pop().ok_or(Error::Exhausted)?;
        let entry = &mut state.slots[id];
        entry.in_use = true;
        Ok(Lease {
            id,
            fd: entry.fd.as_raw_fd(),
            info: entry.info.clone(),
        })
    }

    /// Return a slot. Double-put is a client bug and is rejected without
    /// touching the pool.
    pub fn put(&self, id: usize) -> Result<()> {
        let mut state = self.state.lock();
        {
            let entry = state.slots.get_mut(id).ok_or(Error::UnknownId(id))?;
            if !entry.in_use {
                return Err(Error::NotInUse(id));
            }
            entry.in_use = false;
        }
        state.available.push(id);
        Ok(())
    }

    /// Destroy every slot exactly once, aggregating failures. The pool is
    /// empty afterwards and every further `get` reports exhaustion.
    pub fn cleanup(&self) -> Result<()> {
        let slots = {
            let mut state = self.state.lock();
            state.available.clear();
            std::mem::take(&mut state.slots)
        };

        let mut failed = Vec::new();
        for (id, entry) in slots.into_iter().enumerate() {
            if let Err(e) = (self.destroy)(Slot {
                id,
                fd: entry.fd,
                info: entry.info,
            }) {
                failed.push(format!("slot {id}: {e}"));
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::Cleanup(failed.join("; ")))
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn idle(&self) -> usize {
        self.state.lock().available.len()
    }
}
