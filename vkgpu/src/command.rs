//! Per-thread command pools and recyclable command buffer records.
//!
//! Command pools are not thread-safe, so every thread that asks for a
//! command buffer gets its own pool. The registry maps thread identity to
//! an index into an arena of pools; that map and the pools' free lists sit
//! behind one mutex which is only held for lookup, lazy creation, reclaim
//! and growth. Resetting and recording happen outside the lock.
//!
//! A record cycles through
//! `Inactive -> Recording -> Submitted -> Inactive` (or straight back to
//! `Inactive` when abandoned) and is never freed before the device is.
//! Submitted records return to the inactive list once their completion
//! fence has signaled, and every record is reset before it is begun again.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::ThreadId;

use ash::vk;
use thiserror::Error;

use crate::error::{Fatality, classify, result_name};

/// Records allocated alongside a new pool.
pub const INITIAL_POOL_CAPACITY: u32 = 2;

#[derive(Debug, Error)]
pub enum CommandBufferError {
    #[error("Out of memory during {stage}")]
    ResourceExhaustion { stage: &'static str },

    #[error("{stage} failed: {}", result_name(*.result))]
    Vulkan {
        stage: &'static str,
        result: vk::Result,
    },
}

impl CommandBufferError {
    pub fn from_vk(stage: &'static str, result: vk::Result) -> Self {
        match classify(result) {
            Fatality::ResourceExhaustion => Self::ResourceExhaustion { stage },
            Fatality::InitializationFailure => Self::Vulkan { stage, result },
        }
    }

    fn at(stage: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::from_vk(stage, result)
    }
}

/// Native operations the registry needs.
///
/// Every handle passed back in was produced by the same backend, and a
/// pool's handles are only touched by the thread that owns the pool or
/// while the registry lock is held.
pub(crate) trait CommandBackend {
    fn create_command_pool(&self) -> Result<vk::CommandPool, vk::Result>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>, vk::Result>;
    fn free_command_buffers(
        &self,
        pool: vk::CommandPool,
        buffers: &[vk::CommandBuffer],
    );

    fn create_fence(&self) -> Result<vk::Fence, vk::Result>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn fence_signaled(&self, fence: vk::Fence) -> Result<bool, vk::Result>;

    fn reset_command_buffer(
        &self,
        buffer: vk::CommandBuffer,
    ) -> Result<(), vk::Result>;
    fn begin_command_buffer(
        &self,
        buffer: vk::CommandBuffer,
    ) -> Result<(), vk::Result>;
}

#[derive(Debug, Clone, Copy)]
struct CommandRecord {
    handle: vk::CommandBuffer,
    fence: vk::Fence,
}

#[derive(Debug)]
struct CommandPool {
    thread: ThreadId,
    handle: vk::CommandPool,
    records: Vec<CommandRecord>,
    inactive: Vec<usize>,
    submitted: Vec<usize>,
    capacity: u32,
}

impl CommandPool {
    /// Create a pool and its initial batch. Nothing is left behind if any
    /// step fails.
    fn create<B: CommandBackend + ?Sized>(
        thread: ThreadId,
        backend: &B,
    ) -> Result<Self, CommandBufferError> {
        let handle = backend
            .create_command_pool()
            .map_err(CommandBufferError::at("vkCreateCommandPool"))?;

        let mut pool = Self {
            thread,
            handle,
            records: Vec::new(),
            inactive: Vec::new(),
            submitted: Vec::new(),
            capacity: 0,
        };

        if let Err(e) = pool.grow(backend, INITIAL_POOL_CAPACITY) {
            backend.destroy_command_pool(handle);
            return Err(e);
        }

        tracing::debug!("Created command pool {:?} for {:?}", handle, thread);
        Ok(pool)
    }

    /// Allocate `count` more records. Capacity only changes on success.
    fn grow<B: CommandBackend + ?Sized>(
        &mut self,
        backend: &B,
        count: u32,
    ) -> Result<(), CommandBufferError> {
        let buffers = backend
            .allocate_command_buffers(self.handle, count)
            .map_err(CommandBufferError::at("vkAllocateCommandBuffers"))?;

        let mut fences = Vec::with_capacity(buffers.len());
        for _ in &buffers {
            match backend.create_fence() {
                Ok(fence) => fences.push(fence),
                Err(e) => {
                    for fence in fences {
                        backend.destroy_fence(fence);
                    }
                    backend.free_command_buffers(self.handle, &buffers);
                    return Err(CommandBufferError::from_vk("vkCreateFence", e));
                }
            }
        }

        for (handle, fence) in buffers.into_iter().zip(fences) {
            self.inactive.push(self.records.len());
            self.records.push(CommandRecord { handle, fence });
        }
        self.capacity += count;
        Ok(())
    }

    /// Move every submitted record whose fence has signaled back to the
    /// inactive list.
    fn reclaim<B: CommandBackend + ?Sized>(
        &mut self,
        backend: &B,
    ) -> Result<(), CommandBufferError> {
        let mut still_pending = Vec::with_capacity(self.submitted.len());
        let mut result = Ok(());
        for &index in &self.submitted {
            if result.is_err() {
                still_pending.push(index);
                continue;
            }
            match backend.fence_signaled(self.records[index].fence) {
                Ok(true) => self.inactive.push(index),
                Ok(false) => still_pending.push(index),
                Err(e) => {
                    still_pending.push(index);
                    result = Err(CommandBufferError::from_vk(
                        "vkGetFenceStatus",
                        e,
                    ));
                }
            }
        }
        self.submitted = still_pending;
        result
    }
}

/// Snapshot of one thread's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: u32,
    pub inactive: usize,
    pub submitted: usize,
}

/// A record handed out by [`CommandRegistry::acquire_for`], already reset
/// and in the recording state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ActiveRecord {
    pool: usize,
    record: usize,
    pub(crate) handle: vk::CommandBuffer,
    pub(crate) fence: vk::Fence,
}

#[derive(Debug, Default)]
struct RegistryState {
    pools: Vec<CommandPool>,
    by_thread: HashMap<ThreadId, usize>,
}

#[derive(Debug, Default)]
pub(crate) struct CommandRegistry {
    state: Mutex<RegistryState>,
}

impl CommandRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand out an inactive record from `thread`'s pool, creating the
    /// pool or growing it as needed.
    pub(crate) fn acquire_for<B: CommandBackend + ?Sized>(
        &self,
        thread: ThreadId,
        backend: &B,
    ) -> Result<ActiveRecord, CommandBufferError> {
        let active = {
            let mut state = self.lock();
            let existing = state.by_thread.get(&thread).copied();
            let pool_index = match existing {
                Some(index) => index,
                None => {
                    let pool = CommandPool::create(thread, backend)?;
                    let index = state.pools.len();
                    state.pools.push(pool);
                    state.by_thread.insert(thread, index);
                    index
                }
            };

            let pool = &mut state.pools[pool_index];
            pool.reclaim(backend)?;
            if pool.inactive.is_empty() {
                let count = pool.capacity;
                pool.grow(backend, count)?;
                tracing::debug!(
                    "Grew command pool {:?} to {} buffers",
                    pool.handle,
                    pool.capacity
                );
            }

            let Some(record_index) = pool.inactive.pop() else {
                return Err(CommandBufferError::ResourceExhaustion {
                    stage: "vkAllocateCommandBuffers",
                });
            };
            let record = pool.records[record_index];
            ActiveRecord {
                pool: pool_index,
                record: record_index,
                handle: record.handle,
                fence: record.fence,
            }
        };

        if let Err(e) = backend.reset_command_buffer(active.handle) {
            self.abandon(&active);
            return Err(CommandBufferError::from_vk("vkResetCommandBuffer", e));
        }
        if let Err(e) = backend.begin_command_buffer(active.handle) {
            self.abandon(&active);
            return Err(CommandBufferError::from_vk("vkBeginCommandBuffer", e));
        }

        Ok(active)
    }

    /// Return a record that was never submitted.
    pub(crate) fn abandon(&self, active: &ActiveRecord) {
        let mut state = self.lock();
        state.pools[active.pool].inactive.push(active.record);
    }

    /// Park a record until its fence signals.
    pub(crate) fn mark_submitted(&self, active: &ActiveRecord) {
        let mut state = self.lock();
        state.pools[active.pool].submitted.push(active.record);
    }

    pub(crate) fn pool_count(&self) -> usize {
        self.lock().pools.len()
    }

    pub(crate) fn pool_stats(&self, thread: ThreadId) -> Option<PoolStats> {
        let state = self.lock();
        let pool = &state.pools[*state.by_thread.get(&thread)?];
        Some(PoolStats {
            capacity: pool.capacity,
            inactive: pool.inactive.len(),
            submitted: pool.submitted.len(),
        })
    }

    /// Destroy every fence and pool. The device must be idle.
    pub(crate) fn destroy_all<B: CommandBackend + ?Sized>(&self, backend: &B) {
        let mut state = self.lock();
        state.by_thread.clear();
        for pool in state.pools.drain(..) {
            tracing::debug!(
                "Dropping command pool {:?} of {:?}",
                pool.handle,
                pool.thread
            );
            for record in &pool.records {
                backend.destroy_fence(record.fence);
            }
            backend.destroy_command_pool(pool.handle);
        }
    }
}
