//! Descriptor set pooling and recycling.
//!
//! This module owns the two descriptor allocation strategies the 2D layer
//! needs:
//!
//! - **Buffer sets** (uniform-buffer descriptors): one per in-flight
//!   frame, allocated exactly once at startup from a single pool sized to
//!   the flight count.
//! - **Image sets** (combined-image-sampler descriptors): one per
//!   texture, demand-allocated from a growable series of fixed-capacity
//!   pools that recycle freed slots.
//!
//! # Pool recycling
//!
//! Image pools are partitioned into an "available" and a "full" list.
//! Allocation always takes the pool at the back of the available list,
//! creating a new capacity-[`IMAGE_POOL_CAPACITY`] pool when the list is
//! empty; a pool whose remaining capacity reaches zero moves to the full
//! list and moves back the moment one of its sets is freed. Splitting the
//! two descriptor kinds into separate pools avoids descriptor-type
//! fragmentation, and growing lazily bounds wasted capacity without
//! paying for a pool per allocation.
//!
//! The bookkeeping itself ([`PoolLedger`]) is independent of any live
//! device, so its invariants are testable without a GPU.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use blit2d_rhi::device::Device;
//! use blit2d_rhi::descriptor::DescriptorSetAllocator;
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     buffer_layout: vk::DescriptorSetLayout,
//! #     image_layout: vk::DescriptorSetLayout,
//! # ) -> Result<(), blit2d_rhi::RhiError> {
//! let mut allocator =
//!     DescriptorSetAllocator::new(device, 2, buffer_layout, image_layout)?;
//!
//! // Once, at startup: one uniform set per frame in flight
//! let frame_sets = allocator.alloc_buffer_sets(2)?;
//!
//! // Per texture
//! let image_set = allocator.alloc_image_set()?;
//! allocator.free_image_set(image_set)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Number of sets each image descriptor pool can hold.
pub const IMAGE_POOL_CAPACITY: u32 = 10;

/// An allocated descriptor set together with the pool it came from.
///
/// The pool, not the set, is the unit of GPU-side destruction, so callers
/// must hand the pair back through
/// [`DescriptorSetAllocator::free_image_set`] rather than freeing the set
/// themselves. The fields are private and there is no public constructor,
/// so a handle cannot be fabricated or double-freed by value.
#[derive(Debug)]
pub struct SetHandle {
    set: vk::DescriptorSet,
    pool: vk::DescriptorPool,
}

impl SetHandle {
    /// Returns the descriptor set for binding.
    #[inline]
    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    /// Returns the owning pool.
    #[inline]
    pub fn pool(&self) -> vk::DescriptorPool {
        self.pool
    }
}

/// Per-pool bookkeeping entry.
#[derive(Clone, Copy, Debug)]
struct PoolSlot {
    pool: vk::DescriptorPool,
    capacity: u32,
    remaining: u32,
}

/// Pure accounting for a growable family of fixed-capacity pools.
///
/// Tracks which pools have free slots without touching the device.
/// Invariants maintained:
/// - `0 <= remaining <= capacity` for every pool
/// - a pool is in exactly one of {available, full}, and is in "full" iff
///   `remaining == 0`
/// - the sum of `remaining` over all pools plus the number of outstanding
///   reservations equals the sum of capacities
pub struct PoolLedger {
    available: Vec<PoolSlot>,
    full: Vec<PoolSlot>,
}

impl PoolLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            available: Vec::new(),
            full: Vec::new(),
        }
    }

    /// Registers a freshly created pool with the given capacity.
    pub fn register(&mut self, pool: vk::DescriptorPool, capacity: u32) {
        debug_assert!(capacity > 0, "pool capacity must be non-zero");
        self.available.push(PoolSlot {
            pool,
            capacity,
            remaining: capacity,
        });
    }

    /// Reserves one slot, preferring the most recently active pool.
    ///
    /// Returns the pool the slot came from, or `None` when every
    /// registered pool is full and a new one must be created.
    pub fn reserve(&mut self) -> Option<vk::DescriptorPool> {
        let slot = self.available.last_mut()?;
        slot.remaining -= 1;
        let pool = slot.pool;
        if slot.remaining == 0 {
            let full = self.available.pop().expect("available list non-empty");
            self.full.push(full);
        }
        Some(pool)
    }

    /// Releases one slot back to the pool it was reserved from.
    ///
    /// A pool that was full becomes available again. Linear search by
    /// pool identity over both lists; pool counts stay small (texture
    /// churn, not per-frame churn), so this is fine.
    ///
    /// Returns `false` if the pool is unknown to the ledger. Releasing
    /// more slots than were reserved from a pool is a programmer error.
    pub fn release(&mut self, pool: vk::DescriptorPool) -> bool {
        if let Some(pos) = self.full.iter().position(|s| s.pool == pool) {
            let mut slot = self.full.remove(pos);
            slot.remaining += 1;
            self.available.push(slot);
            return true;
        }

        if let Some(slot) = self.available.iter_mut().find(|s| s.pool == pool) {
            debug_assert!(
                slot.remaining < slot.capacity,
                "released more slots than the pool holds"
            );
            slot.remaining += 1;
            return true;
        }

        false
    }

    /// Whether `pool` is registered with this ledger, full or not.
    pub fn contains(&self, pool: vk::DescriptorPool) -> bool {
        self.available
            .iter()
            .chain(self.full.iter())
            .any(|s| s.pool == pool)
    }

    /// Iterates over every registered pool, in no particular order.
    pub fn pools(&self) -> impl Iterator<Item = vk::DescriptorPool> + '_ {
        self.available
            .iter()
            .chain(self.full.iter())
            .map(|s| s.pool)
    }

    /// Number of pools with at least one free slot.
    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    /// Number of pools with no free slot.
    pub fn full_count(&self) -> usize {
        self.full.len()
    }

    /// Sum of capacities over all pools.
    pub fn total_capacity(&self) -> u32 {
        self.available
            .iter()
            .chain(self.full.iter())
            .map(|s| s.capacity)
            .sum()
    }

    /// Sum of free slots over all pools.
    pub fn total_remaining(&self) -> u32 {
        self.available.iter().map(|s| s.remaining).sum()
    }
}

impl Default for PoolLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocates and recycles the 2D layer's descriptor sets.
///
/// Owns the underlying descriptor pool objects: the single pre-sized
/// buffer-set pool and the growable image-set pools. It does *not* own
/// the buffers and images bound into the sets, nor the set layouts, which
/// come from the compiled shader bundle.
///
/// Pool policy is grow-only: a pool whose sets have all been freed stays
/// registered until the allocator is dropped.
pub struct DescriptorSetAllocator {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Layout for per-frame uniform-buffer sets.
    buffer_layout: vk::DescriptorSetLayout,
    /// Layout for per-texture image sets.
    image_layout: vk::DescriptorSetLayout,
    /// The single pool for buffer sets, sized to the flight count.
    buffer_pool: vk::DescriptorPool,
    /// Remaining buffer-set capacity.
    buffer_remaining: u32,
    /// Bookkeeping for the image-set pools.
    image_pools: PoolLedger,
}

impl DescriptorSetAllocator {
    /// Creates the allocator and the pre-sized buffer-set pool.
    ///
    /// The buffer pool holds exactly `max_flight` sets, with two
    /// uniform-buffer descriptors per set (transform and color bindings).
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `max_flight` - Number of frames in flight; fixes the buffer-set
    ///   pool capacity
    /// * `buffer_layout` - Set layout for the per-frame uniform sets
    /// * `image_layout` - Set layout for the per-texture image sets
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        max_flight: u32,
        buffer_layout: vk::DescriptorSetLayout,
        image_layout: vk::DescriptorSetLayout,
    ) -> RhiResult<Self> {
        debug_assert!(max_flight > 0, "at least one frame in flight");

        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(2 * max_flight)];

        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_flight)
            .pool_sizes(&pool_sizes);

        let buffer_pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!("Created buffer-set pool for {} frames in flight", max_flight);

        Ok(Self {
            device,
            buffer_layout,
            image_layout,
            buffer_pool,
            buffer_remaining: max_flight,
            image_pools: PoolLedger::new(),
        })
    }

    /// Allocates `count` uniform-buffer sets from the pre-sized pool.
    ///
    /// Called once at startup with the flight count. The sets live for
    /// the allocator's whole lifetime; there is no free path for them.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PoolExhausted`] if `count` exceeds the
    /// remaining pool capacity, or a Vulkan error if allocation fails.
    pub fn alloc_buffer_sets(&mut self, count: u32) -> RhiResult<Vec<SetHandle>> {
        if count > self.buffer_remaining {
            return Err(RhiError::PoolExhausted {
                requested: count,
                remaining: self.buffer_remaining,
            });
        }

        let layouts = vec![self.buffer_layout; count as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.buffer_pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        self.buffer_remaining -= count;

        debug!("Allocated {} buffer descriptor set(s)", count);

        Ok(sets
            .into_iter()
            .map(|set| SetHandle {
                set,
                pool: self.buffer_pool,
            })
            .collect())
    }

    /// Allocates one combined-image-sampler set.
    ///
    /// Takes the most recently active pool with free capacity, creating a
    /// new fixed-capacity pool when none has room.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation or set allocation fails; both
    /// are fatal, there is no retry.
    pub fn alloc_image_set(&mut self) -> RhiResult<SetHandle> {
        let pool = match self.image_pools.reserve() {
            Some(pool) => pool,
            None => {
                self.add_image_pool()?;
                self.image_pools
                    .reserve()
                    .expect("freshly registered pool has capacity")
            }
        };

        let layouts = [self.image_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };

        debug!("Allocated image descriptor set");

        Ok(SetHandle { set: sets[0], pool })
    }

    /// Returns an image set to its owning pool.
    ///
    /// The caller must ensure the set is no longer referenced by any
    /// in-flight frame (in practice: after a fence wait or an idle wait).
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan free fails or the handle does not
    /// belong to any image pool.
    pub fn free_image_set(&mut self, handle: SetHandle) -> RhiResult<()> {
        // Validate before the vk call: a buffer-pool handle must never
        // reach free_descriptor_sets, since that pool is created without
        // FREE_DESCRIPTOR_SET and freeing from it is undefined.
        if !self.image_pools.contains(handle.pool) {
            return Err(RhiError::InvalidHandle(
                "descriptor set does not belong to any image pool".to_string(),
            ));
        }

        unsafe {
            self.device
                .handle()
                .free_descriptor_sets(handle.pool, &[handle.set])?;
        }

        let released = self.image_pools.release(handle.pool);
        debug_assert!(released, "pool vanished between contains and release");

        debug!("Freed image descriptor set");

        Ok(())
    }

    /// Remaining capacity of the buffer-set pool.
    #[inline]
    pub fn buffer_sets_remaining(&self) -> u32 {
        self.buffer_remaining
    }

    /// Bookkeeping view of the image pools, for diagnostics.
    #[inline]
    pub fn image_pool_ledger(&self) -> &PoolLedger {
        &self.image_pools
    }

    /// Creates one more image pool and registers it with the ledger.
    fn add_image_pool(&mut self) -> RhiResult<()> {
        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(IMAGE_POOL_CAPACITY)];

        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(IMAGE_POOL_CAPACITY)
            .pool_sizes(&pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = unsafe {
            self.device
                .handle()
                .create_descriptor_pool(&create_info, None)?
        };

        self.image_pools.register(pool, IMAGE_POOL_CAPACITY);

        debug!(
            "Created image-set pool (capacity {}), {} pool(s) total",
            IMAGE_POOL_CAPACITY,
            self.image_pools.available_count() + self.image_pools.full_count()
        );

        Ok(())
    }
}

impl Drop for DescriptorSetAllocator {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.buffer_pool, None);
            for pool in self.image_pools.pools() {
                self.device.handle().destroy_descriptor_pool(pool, None);
            }
        }
        debug!("Destroyed descriptor pools");
    }
}

/// Updates descriptor sets with resource bindings.
///
/// The primary way to connect buffers and images to shaders.
pub fn update_descriptor_sets(device: &Device, writes: &[vk::WriteDescriptorSet]) {
    if writes.is_empty() {
        return;
    }

    unsafe {
        device.handle().update_descriptor_sets(writes, &[]);
    }

    debug!("Updated {} descriptor set(s)", writes.len());
}

/// Creates a buffer info for descriptor set updates.
#[inline]
pub fn buffer_info(
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range)
}

/// Creates an image info for descriptor set updates.
#[inline]
pub fn image_info(
    sampler: vk::Sampler,
    image_view: vk::ImageView,
    image_layout: vk::ImageLayout,
) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image_view)
        .image_layout(image_layout)
}

/// Creates a uniform buffer layout binding.
#[inline]
pub fn uniform_buffer_binding(
    binding: u32,
    stage_flags: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(stage_flags)
}

/// Creates a combined image sampler layout binding.
#[inline]
pub fn combined_image_sampler_binding(
    binding: u32,
    stage_flags: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(1)
        .stage_flags(stage_flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn pool_id(raw: u64) -> vk::DescriptorPool {
        vk::DescriptorPool::from_raw(raw)
    }

    /// Drains `n` reservations, creating capacity-10 pools on demand the
    /// way the allocator does.
    fn reserve_n(ledger: &mut PoolLedger, n: u32, next_pool: &mut u64) -> Vec<vk::DescriptorPool> {
        (0..n)
            .map(|_| match ledger.reserve() {
                Some(pool) => pool,
                None => {
                    *next_pool += 1;
                    ledger.register(pool_id(*next_pool), IMAGE_POOL_CAPACITY);
                    ledger.reserve().unwrap()
                }
            })
            .collect()
    }

    #[test]
    fn test_empty_ledger_has_nothing_to_reserve() {
        let mut ledger = PoolLedger::new();
        assert!(ledger.reserve().is_none());
        assert_eq!(ledger.total_capacity(), 0);
    }

    #[test]
    fn test_pool_fills_after_capacity_reservations() {
        let mut ledger = PoolLedger::new();
        ledger.register(pool_id(1), IMAGE_POOL_CAPACITY);

        for _ in 0..IMAGE_POOL_CAPACITY {
            assert_eq!(ledger.reserve(), Some(pool_id(1)));
        }

        assert_eq!(ledger.available_count(), 0);
        assert_eq!(ledger.full_count(), 1);
        assert_eq!(ledger.total_remaining(), 0);
        assert!(ledger.reserve().is_none());
    }

    #[test]
    fn test_eleventh_set_comes_from_a_new_pool() {
        let mut ledger = PoolLedger::new();
        let mut next_pool = 0;

        let pools = reserve_n(&mut ledger, IMAGE_POOL_CAPACITY + 1, &mut next_pool);

        // First ten from pool 1, the eleventh from a fresh pool
        assert!(pools[..IMAGE_POOL_CAPACITY as usize]
            .iter()
            .all(|&p| p == pool_id(1)));
        assert_eq!(pools[IMAGE_POOL_CAPACITY as usize], pool_id(2));

        // Available now holds exactly the new pool
        assert_eq!(ledger.available_count(), 1);
        assert_eq!(ledger.full_count(), 1);
        assert_eq!(ledger.total_remaining(), IMAGE_POOL_CAPACITY - 1);
    }

    #[test]
    fn test_full_pool_recycles_on_release() {
        let mut ledger = PoolLedger::new();
        let mut next_pool = 0;
        reserve_n(&mut ledger, IMAGE_POOL_CAPACITY + 1, &mut next_pool);

        // Free one set from the first (full) pool
        assert!(ledger.release(pool_id(1)));

        assert_eq!(ledger.available_count(), 2);
        assert_eq!(ledger.full_count(), 0);
        // The recycled pool has exactly one free slot again
        assert_eq!(ledger.total_remaining(), IMAGE_POOL_CAPACITY);
    }

    #[test]
    fn test_release_into_available_pool() {
        let mut ledger = PoolLedger::new();
        ledger.register(pool_id(1), IMAGE_POOL_CAPACITY);
        ledger.reserve().unwrap();
        ledger.reserve().unwrap();

        assert!(ledger.release(pool_id(1)));
        assert_eq!(ledger.total_remaining(), IMAGE_POOL_CAPACITY - 1);
        assert_eq!(ledger.available_count(), 1);
    }

    #[test]
    fn test_release_unknown_pool_is_rejected() {
        let mut ledger = PoolLedger::new();
        ledger.register(pool_id(1), IMAGE_POOL_CAPACITY);
        assert!(!ledger.release(pool_id(99)));
    }

    #[test]
    fn test_contains_tracks_membership_without_mutating() {
        let mut ledger = PoolLedger::new();
        ledger.register(pool_id(1), IMAGE_POOL_CAPACITY);

        // A foreign pool (e.g. the buffer-set pool) is rejected up front,
        // before any destructive free could run against it
        assert!(!ledger.contains(pool_id(42)));
        assert!(ledger.contains(pool_id(1)));

        // Membership survives the move to the full list
        for _ in 0..IMAGE_POOL_CAPACITY {
            ledger.reserve().unwrap();
        }
        assert_eq!(ledger.full_count(), 1);
        assert!(ledger.contains(pool_id(1)));

        // The membership check reserved nothing
        assert_eq!(ledger.total_remaining(), 0);
        assert_eq!(ledger.total_capacity(), IMAGE_POOL_CAPACITY);
    }

    #[test]
    fn test_accounting_invariant_over_mixed_sequence() {
        let mut ledger = PoolLedger::new();
        let mut next_pool = 0;

        let mut outstanding = reserve_n(&mut ledger, 23, &mut next_pool);

        // Free a few out of order
        for idx in [20, 3, 11] {
            let pool = outstanding.swap_remove(idx);
            assert!(ledger.release(pool));
        }

        // remaining + outstanding == capacity, at every point
        assert_eq!(
            ledger.total_remaining() + outstanding.len() as u32,
            ledger.total_capacity()
        );

        // Partition: full pools really have zero remaining
        assert!(ledger.full_count() <= 3);
        while let Some(pool) = outstanding.pop() {
            assert!(ledger.release(pool));
        }
        assert_eq!(ledger.total_remaining(), ledger.total_capacity());
        assert_eq!(ledger.full_count(), 0);
    }

    #[test]
    fn test_binding_helpers() {
        let binding = uniform_buffer_binding(0, vk::ShaderStageFlags::VERTEX);
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.descriptor_count, 1);

        let binding = combined_image_sampler_binding(1, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_buffer_info_helper() {
        let info = buffer_info(vk::Buffer::null(), 64, 128);
        assert_eq!(info.buffer, vk::Buffer::null());
        assert_eq!(info.offset, 64);
        assert_eq!(info.range, 128);
    }

    #[test]
    fn test_image_info_helper() {
        let info = image_info(
            vk::Sampler::null(),
            vk::ImageView::null(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(info.image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }
}
