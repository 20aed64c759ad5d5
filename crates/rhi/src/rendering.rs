//! Dynamic rendering helpers (Vulkan 1.3).
//!
//! A [`RenderingConfig`] describes the attachments of one pass as plain
//! data; [`RenderingConfig::build`] turns it into the `VkRenderingInfo`
//! structures with lifetimes tied to a [`RenderingInfoBundle`].

use ash::vk;

/// How a colour attachment's previous contents are treated.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColorLoad {
    Load,
    Clear([f32; 4]),
    /// Every pixel is overwritten by the pass.
    DontCare,
}

/// A colour attachment, always stored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorAttachment {
    pub image_view: vk::ImageView,
    pub load: ColorLoad,
}

impl ColorAttachment {
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            load: ColorLoad::Load,
        }
    }

    #[inline]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.load = ColorLoad::Clear(color);
        self
    }

    #[inline]
    pub fn overwritten(mut self) -> Self {
        self.load = ColorLoad::DontCare;
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        let (load_op, clear_color) = match self.load {
            ColorLoad::Load => (vk::AttachmentLoadOp::LOAD, [0.0; 4]),
            ColorLoad::Clear(color) => (vk::AttachmentLoadOp::CLEAR, color),
            ColorLoad::DontCare => (vk::AttachmentLoadOp::DONT_CARE, [0.0; 4]),
        };
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            })
    }
}

/// A depth attachment, always cleared.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthAttachment {
    pub image_view: vk::ImageView,
    pub clear_depth: f32,
    /// Whether the depth values are needed after the pass.
    pub store: bool,
}

impl DepthAttachment {
    /// A cleared (to 1.0), discarded depth attachment.
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            clear_depth: 1.0,
            store: false,
        }
    }

    /// Keep the rendered depth, e.g. for a shadow map.
    #[inline]
    pub fn store(mut self) -> Self {
        self.store = true;
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        let store_op = if self.store {
            vk::AttachmentStoreOp::STORE
        } else {
            vk::AttachmentStoreOp::DONT_CARE
        };
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(store_op)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: 0,
                },
            })
    }
}

/// Attachments and render area of one dynamic-rendering pass.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderingConfig {
    pub extent: vk::Extent2D,
    pub color: Option<ColorAttachment>,
    pub depth: Option<DepthAttachment>,
}

impl RenderingConfig {
    pub fn from_extent(extent: vk::Extent2D) -> Self {
        Self {
            extent,
            color: None,
            depth: None,
        }
    }

    pub fn with_color_attachment(mut self, attachment: ColorAttachment) -> Self {
        self.color = Some(attachment);
        self
    }

    pub fn with_depth_attachment(mut self, attachment: DepthAttachment) -> Self {
        self.depth = Some(attachment);
        self
    }

    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }

    pub fn build(&self) -> RenderingInfoBundle {
        RenderingInfoBundle {
            render_area: self.render_area(),
            color_attachments: self
                .color
                .iter()
                .map(ColorAttachment::to_rendering_attachment_info)
                .collect(),
            depth_attachment: self
                .depth
                .as_ref()
                .map(DepthAttachment::to_rendering_attachment_info),
        }
    }
}

/// Owns the attachment infos a `vk::RenderingInfo` points into.
pub struct RenderingInfoBundle {
    render_area: vk::Rect2D,
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
}

impl RenderingInfoBundle {
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments);
        match &self.depth_attachment {
            Some(depth) => info.depth_attachment(depth),
            None => info,
        }
    }
}
