use crate::coords::PixelRect;

/// Identifies an atlas page inside its allocator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub(crate) u32);

impl PageId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies one live allocation inside a page.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AllocId(pub(crate) u64);

/// A reserved rectangle within an atlas page.
///
/// Does not own the page. It must be handed back to the allocator that
/// produced it; a copy that outlives its release refers to reusable space.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub(crate) page: PageId,
    pub(crate) id: AllocId,
    pub(crate) rect: PixelRect,
    pub(crate) page_extent: (u32, u32),
}

impl Allocation {
    #[inline]
    pub fn page(&self) -> PageId {
        self.page
    }

    /// Texels of the image inside the page, gutter excluded.
    #[inline]
    pub fn rect(&self) -> PixelRect {
        self.rect
    }

    #[inline]
    pub fn page_extent(&self) -> (u32, u32) {
        self.page_extent
    }

    /// Normalized `[u0, v0, u1, v1]` of the rectangle within the page.
    pub fn uv_rect(&self) -> [f32; 4] {
        let (pw, ph) = self.page_extent;
        let (pw, ph) = (pw.max(1) as f32, ph.max(1) as f32);
        [
            self.rect.x as f32 / pw,
            self.rect.y as f32 / ph,
            self.rect.right() as f32 / pw,
            self.rect.bottom() as f32 / ph,
        ]
    }
}

/// An image living in the atlas, plus its logical size.
///
/// The default sprite is empty: it has no allocation and paints with the
/// device's shared 1×1 white texture.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Sprite {
    allocation: Option<Allocation>,
    width: u32,
    height: u32,
}

impl Sprite {
    pub(crate) fn new(allocation: Allocation) -> Self {
        Self {
            width: allocation.rect.w,
            height: allocation.rect.h,
            allocation: Some(allocation),
        }
    }

    #[inline]
    pub fn allocation(&self) -> Option<&Allocation> {
        self.allocation.as_ref()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
