//! Frame synchronization.
//!
//! The scheduler owns the per-tick state machine and the slot ring. The
//! GPU-facing steps (fence waits, acquire, submit, present, swapchain
//! rebuild) go through [`FrameBackend`], so the protocol can be driven by
//! the renderer or by a test double.
//!
//! # Tick
//!
//! ```text
//! SwapchainInvalid ── recreate ── targets? ── pipelines? ── slots ──> Idle
//! Idle ── advance slot ── wait fence ── acquire ─┬─ ready ──> Rendering
//!                                                 └─ invalid > SwapchainInvalid (slot rolled back)
//! Rendering ── reset fence ── record + submit ── present ─┬─ ok ──────> Idle
//!                                                          └─ invalid ─> SwapchainInvalid
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use lumen_rhi::RhiResult;
use lumen_rhi::command::{CommandBuffer, CommandPool};
use lumen_rhi::device::Device;
use lumen_rhi::swapchain::{AcquireOutcome, PresentOutcome, SwapchainChanges};
use lumen_rhi::sync::{Fence, Semaphore};

/// Scheduler state between and during ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    /// The swapchain must be rebuilt before the next frame.
    SwapchainInvalid,
    /// A frame has acquired an image and is being recorded or presented.
    Rendering,
}

/// What one call to [`FrameScheduler::tick`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The quit condition was set; nothing was issued.
    Stopped,
    /// The swapchain was rebuilt with this many slots.
    Rebuilt { slot_count: usize },
    /// The surface has no area; the rebuild was postponed.
    Deferred,
    /// Acquire reported an invalid swapchain; no slot was consumed.
    AcquireInvalidated,
    Presented { slot: usize, image_index: u32 },
    /// The frame was submitted but present reported an invalid swapchain.
    PresentInvalidated { slot: usize, image_index: u32 },
}

/// Round-robin index over the frame slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotRing {
    count: usize,
    next: usize,
}

impl SlotRing {
    pub fn new(count: usize) -> Self {
        debug_assert!(count > 0);
        Self {
            count: count.max(1),
            next: 0,
        }
    }

    /// Claims the next slot.
    pub fn advance(&mut self) -> usize {
        let slot = self.next;
        self.next = (self.next + 1) % self.count;
        slot
    }

    /// Returns the most recently claimed slot to the ring.
    pub fn roll_back(&mut self) {
        self.next = (self.next + self.count - 1) % self.count;
    }

    /// Restarts the ring with a new slot count.
    pub fn reset(&mut self, count: usize) {
        *self = Self::new(count);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The slot the next [`advance`](Self::advance) will claim.
    #[inline]
    pub fn peek(&self) -> usize {
        self.next
    }
}

/// Which swapchain-dependent resources a recreation invalidated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildScope {
    /// Off-screen targets and the binding-set entries that sample them.
    pub targets: bool,
    /// Pipelines that render into the swapchain format.
    pub pipelines: bool,
}

impl From<SwapchainChanges> for RebuildScope {
    fn from(changes: SwapchainChanges) -> Self {
        Self {
            targets: changes.extent_changed,
            pipelines: changes.format_changed,
        }
    }
}

/// GPU side of the frame protocol.
pub trait FrameBackend {
    /// Blocks until the slot's previous submission has completed.
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()>;
    fn acquire(&mut self, slot: usize) -> RhiResult<AcquireOutcome>;
    /// Unsignals the slot's fence ahead of a new submission.
    fn reset_slot(&mut self, slot: usize) -> RhiResult<()>;
    fn record_and_submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome>;
    /// Waits for the device and recreates the swapchain. Returns `None`
    /// while the surface has no area.
    fn recreate_swapchain(&mut self) -> RhiResult<Option<SwapchainChanges>>;
    /// Recreates the off-screen targets and rewrites the sets sampling them.
    fn rebuild_targets(&mut self) -> RhiResult<()>;
    /// Rebuilds the pipelines that render into the swapchain format.
    fn rebuild_pipelines(&mut self) -> RhiResult<()>;
    /// Recreates the frame slots for the new image count and returns it.
    fn rebuild_slots(&mut self) -> RhiResult<usize>;
}

/// Drives one frame per tick over a ring of slots.
pub struct FrameScheduler {
    state: FrameState,
    ring: SlotRing,
    frames_submitted: u64,
}

impl FrameScheduler {
    pub fn new(slot_count: usize) -> Self {
        Self {
            state: FrameState::Idle,
            ring: SlotRing::new(slot_count),
            frames_submitted: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// Marks the swapchain invalid, e.g. after a window resize.
    pub fn invalidate(&mut self) {
        if self.state != FrameState::SwapchainInvalid {
            debug!("Swapchain invalidated");
            self.state = FrameState::SwapchainInvalid;
        }
    }

    /// Runs one tick of the frame protocol.
    pub fn tick<B: FrameBackend>(&mut self, backend: &mut B, quit: bool) -> RhiResult<TickOutcome> {
        if quit {
            return Ok(TickOutcome::Stopped);
        }

        if self.state == FrameState::SwapchainInvalid {
            return self.rebuild(backend);
        }

        let slot = self.ring.advance();
        backend.wait_for_slot(slot)?;

        let image_index = match backend.acquire(slot)? {
            AcquireOutcome::Ready { image_index } => image_index,
            AcquireOutcome::Invalidated => {
                self.ring.roll_back();
                self.invalidate();
                return Ok(TickOutcome::AcquireInvalidated);
            }
        };

        self.state = FrameState::Rendering;
        backend.reset_slot(slot)?;
        backend.record_and_submit(slot, image_index)?;
        self.frames_submitted += 1;

        match backend.present(slot, image_index)? {
            PresentOutcome::Presented => {
                self.state = FrameState::Idle;
                Ok(TickOutcome::Presented { slot, image_index })
            }
            PresentOutcome::Invalidated => {
                self.invalidate();
                Ok(TickOutcome::PresentInvalidated { slot, image_index })
            }
        }
    }

    fn rebuild<B: FrameBackend>(&mut self, backend: &mut B) -> RhiResult<TickOutcome> {
        let Some(changes) = backend.recreate_swapchain()? else {
            return Ok(TickOutcome::Deferred);
        };
        let scope = RebuildScope::from(changes);
        debug!("Swapchain recreated: {:?}, rebuilding {:?}", changes, scope);

        if scope.targets {
            backend.rebuild_targets()?;
        }
        if scope.pipelines {
            backend.rebuild_pipelines()?;
        }
        let slot_count = backend.rebuild_slots()?;

        self.ring.reset(slot_count);
        self.state = FrameState::Idle;
        info!("Swapchain rebuilt with {} frame slots", slot_count);
        Ok(TickOutcome::Rebuilt { slot_count })
    }
}

/// Command buffer and synchronization objects of one in-flight frame.
pub struct FrameSlot {
    command_buffer: CommandBuffer,
    acquired: Semaphore,
    render_finished: Semaphore,
    fence: Fence,
}

impl FrameSlot {
    fn new(device: &Arc<Device>, command_buffer: CommandBuffer) -> RhiResult<Self> {
        Ok(Self {
            command_buffer,
            acquired: Semaphore::new(device)?,
            render_finished: Semaphore::new(device)?,
            // Signaled so the first wait on a fresh slot returns immediately.
            fence: Fence::new(device, true)?,
        })
    }

    #[inline]
    pub fn command_buffer(&mut self) -> &mut CommandBuffer {
        &mut self.command_buffer
    }

    #[inline]
    pub fn acquired(&self) -> &Semaphore {
        &self.acquired
    }

    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    #[inline]
    pub fn fence(&self) -> &Fence {
        &self.fence
    }
}

/// The slot array. Command buffers are kept across rebuilds since the pool
/// only frees them when it is destroyed.
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
    spare: Vec<CommandBuffer>,
    device: Arc<Device>,
}

impl FrameSlots {
    pub fn new(device: &Arc<Device>, pool: &CommandPool, count: usize) -> RhiResult<Self> {
        let mut slots = Self {
            slots: Vec::new(),
            spare: Vec::new(),
            device: device.clone(),
        };
        slots.rebuild(pool, count)?;
        Ok(slots)
    }

    /// Replaces every slot with fresh synchronization objects.
    ///
    /// The device must be idle.
    pub fn rebuild(&mut self, pool: &CommandPool, count: usize) -> RhiResult<()> {
        let mut buffers: Vec<CommandBuffer> = self
            .slots
            .drain(..)
            .map(|slot| slot.command_buffer)
            .chain(self.spare.drain(..))
            .collect();
        if buffers.len() < count {
            buffers.extend(pool.allocate((count - buffers.len()) as u32)?);
        }
        self.spare = buffers.split_off(count);

        for command_buffer in buffers {
            self.slots.push(FrameSlot::new(&self.device, command_buffer)?);
        }
        debug!("Created {} frame slots", self.slots.len());
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn get(&self, slot: usize) -> &FrameSlot {
        &self.slots[slot]
    }

    #[inline]
    pub fn get_mut(&mut self, slot: usize) -> &mut FrameSlot {
        &mut self.slots[slot]
    }
}
