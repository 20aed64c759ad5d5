//! Scoped ownership of native Vulkan handles.
//!
//! [`OwnedHandle`] is the single place where native objects are destroyed.
//! Each handle kind implements [`Destroy`] for the context its destroy call
//! needs: the logical [`Device`] for device-level objects, an extension
//! loader for surfaces, swapchains and debug messengers, and `()` for the
//! instance and device themselves.
//!
//! A wrapper created with [`OwnedHandle::empty`] owns nothing. Moving a
//! wrapper moves ownership; [`OwnedHandle::take`] moves it out of a borrowed
//! wrapper and leaves that one empty. Wrappers are not `Clone`. Dropping a
//! wrapper destroys its handle iff one is owned, so composites built from
//! several wrappers are released in field declaration order.

use std::fmt;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::error;

use crate::device::Device;

/// Release operation for a native handle kind.
pub trait Destroy<C> {
    /// Destroys the object.
    ///
    /// Called at most once per handle, after the GPU has finished with it.
    fn destroy(self, context: &C);
}

/// Exclusive owner of one native handle together with its destroy context.
pub struct OwnedHandle<H: Destroy<C>, C> {
    inner: Option<(H, C)>,
}

/// Handle owned against the logical device.
pub type DeviceHandle<H> = OwnedHandle<H, Arc<Device>>;

impl<H: Destroy<C>, C> OwnedHandle<H, C> {
    /// A wrapper that owns nothing.
    pub const fn empty() -> Self {
        Self { inner: None }
    }

    /// Takes ownership of `handle`, to be destroyed with `context`.
    pub fn new(context: C, handle: H) -> Self {
        Self {
            inner: Some((handle, context)),
        }
    }

    #[inline]
    pub fn get(&self) -> Option<&H> {
        self.inner.as_ref().map(|(handle, _)| handle)
    }

    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut H> {
        self.inner.as_mut().map(|(handle, _)| handle)
    }

    #[inline]
    pub fn context(&self) -> Option<&C> {
        self.inner.as_ref().map(|(_, context)| context)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Moves ownership into a new wrapper, leaving `self` empty.
    pub fn take(&mut self) -> Self {
        Self {
            inner: self.inner.take(),
        }
    }

    /// Gives up ownership without destroying the handle.
    pub fn into_raw(mut self) -> Option<H> {
        self.inner.take().map(|(handle, _)| handle)
    }

    /// Destroys the owned handle now, if any.
    pub fn reset(&mut self) {
        if let Some((handle, context)) = self.inner.take() {
            handle.destroy(&context);
        }
    }

    /// Destroys the current handle (if any) and takes ownership of `other`'s.
    pub fn replace(&mut self, mut other: Self) {
        self.reset();
        self.inner = other.inner.take();
    }
}

impl<H: Destroy<C> + Copy + Default, C> OwnedHandle<H, C> {
    /// The raw handle value, or the null handle if nothing is owned.
    #[inline]
    pub fn handle(&self) -> H {
        self.get().copied().unwrap_or_default()
    }
}

impl<H: Destroy<C>, C> Default for OwnedHandle<H, C> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<H: Destroy<C>, C> Drop for OwnedHandle<H, C> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<H: Destroy<C> + fmt::Debug, C> fmt::Debug for OwnedHandle<H, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(handle) => f.debug_tuple("OwnedHandle").field(handle).finish(),
            None => f.write_str("OwnedHandle(empty)"),
        }
    }
}

macro_rules! device_destroy {
    ($($handle:ty => $call:ident),* $(,)?) => {
        $(
            impl Destroy<Arc<Device>> for $handle {
                fn destroy(self, device: &Arc<Device>) {
                    unsafe { device.handle().$call(self, None) };
                }
            }
        )*
    };
}

device_destroy! {
    vk::Buffer => destroy_buffer,
    vk::Image => destroy_image,
    vk::ImageView => destroy_image_view,
    vk::Sampler => destroy_sampler,
    vk::Pipeline => destroy_pipeline,
    vk::PipelineLayout => destroy_pipeline_layout,
    vk::DescriptorSetLayout => destroy_descriptor_set_layout,
    vk::DescriptorPool => destroy_descriptor_pool,
    vk::CommandPool => destroy_command_pool,
    vk::Fence => destroy_fence,
    vk::Semaphore => destroy_semaphore,
    vk::ShaderModule => destroy_shader_module,
}

impl Destroy<Arc<Device>> for Allocation {
    fn destroy(self, device: &Arc<Device>) {
        if let Err(e) = device.free(self) {
            error!("Failed to free allocation: {}", e);
        }
    }
}

impl Destroy<ash::khr::swapchain::Device> for vk::SwapchainKHR {
    fn destroy(self, loader: &ash::khr::swapchain::Device) {
        unsafe { loader.destroy_swapchain(self, None) };
    }
}

impl Destroy<ash::khr::surface::Instance> for vk::SurfaceKHR {
    fn destroy(self, loader: &ash::khr::surface::Instance) {
        unsafe { loader.destroy_surface(self, None) };
    }
}

impl Destroy<ash::ext::debug_utils::Instance> for vk::DebugUtilsMessengerEXT {
    fn destroy(self, loader: &ash::ext::debug_utils::Instance) {
        unsafe { loader.destroy_debug_utils_messenger(self, None) };
    }
}

impl Destroy<()> for ash::Device {
    fn destroy(self, _: &()) {
        unsafe { self.destroy_device(None) };
    }
}

impl Destroy<()> for ash::Instance {
    fn destroy(self, _: &()) {
        unsafe { self.destroy_instance(None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<u64>>>;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct FakeHandle(u64);

    impl Destroy<Log> for FakeHandle {
        fn destroy(self, log: &Log) {
            log.borrow_mut().push(self.0);
        }
    }

    fn owned(log: &Log, id: u64) -> OwnedHandle<FakeHandle, Log> {
        OwnedHandle::new(log.clone(), FakeHandle(id))
    }

    #[test]
    fn test_default_owns_nothing() {
        let handle: OwnedHandle<FakeHandle, Log> = OwnedHandle::default();
        assert!(handle.is_empty());
        assert_eq!(handle.handle(), FakeHandle(0));
    }

    #[test]
    fn test_drop_destroys_exactly_once() {
        let log = Log::default();
        {
            let handle = owned(&log, 7);
            assert_eq!(handle.handle(), FakeHandle(7));
        }
        assert_eq!(*log.borrow(), vec![7]);
    }

    #[test]
    fn test_take_leaves_source_empty() {
        let log = Log::default();
        let mut source = owned(&log, 1);
        let moved = source.take();

        assert!(source.is_empty());
        assert_eq!(moved.handle(), FakeHandle(1));

        drop(source);
        assert!(log.borrow().is_empty());
        drop(moved);
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn test_into_raw_releases_without_destroying() {
        let log = Log::default();
        let raw = owned(&log, 3).into_raw();
        assert_eq!(raw, Some(FakeHandle(3)));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_reset_destroys_immediately() {
        let log = Log::default();
        let mut handle = owned(&log, 4);
        handle.reset();
        assert!(handle.is_empty());
        assert_eq!(*log.borrow(), vec![4]);

        // A second reset and the final drop are no-ops.
        handle.reset();
        drop(handle);
        assert_eq!(*log.borrow(), vec![4]);
    }

    #[test]
    fn test_replace_destroys_previous() {
        let log = Log::default();
        let mut handle = owned(&log, 5);
        handle.replace(owned(&log, 6));
        assert_eq!(*log.borrow(), vec![5]);
        assert_eq!(handle.handle(), FakeHandle(6));
        drop(handle);
        assert_eq!(*log.borrow(), vec![5, 6]);
    }

    #[test]
    fn test_composite_releases_in_field_order() {
        struct Composite {
            _view: OwnedHandle<FakeHandle, Log>,
            _image: OwnedHandle<FakeHandle, Log>,
            _memory: OwnedHandle<FakeHandle, Log>,
        }

        let log = Log::default();
        let composite = Composite {
            _view: owned(&log, 30),
            _image: owned(&log, 20),
            _memory: owned(&log, 10),
        };
        drop(composite);
        assert_eq!(*log.borrow(), vec![30, 20, 10]);
    }

    #[test]
    fn test_debug_format() {
        let log = Log::default();
        assert_eq!(
            format!("{:?}", owned(&log, 9)),
            "OwnedHandle(FakeHandle(9))"
        );
        assert_eq!(
            format!("{:?}", OwnedHandle::<FakeHandle, Log>::empty()),
            "OwnedHandle(empty)"
        );
    }
}
