/// Integer rectangle in texels, half-open `[x, x + w) × [y, y + h)`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl PixelRect {
    #[inline]
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    #[inline]
    pub const fn right(self) -> u32 {
        self.x + self.w
    }

    #[inline]
    pub const fn bottom(self) -> u32 {
        self.y + self.h
    }

    #[inline]
    pub const fn area(self) -> u64 {
        self.w as u64 * self.h as u64
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.w == 0 || self.h == 0
    }

    #[inline]
    pub fn fits(self, w: u32, h: u32) -> bool {
        w <= self.w && h <= self.h
    }

    #[inline]
    pub fn contains_rect(self, other: PixelRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// True when the interiors share at least one texel.
    #[inline]
    pub fn overlaps(self, other: PixelRect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Union of two rectangles sharing a full edge, if they form a rectangle.
    pub fn merge_adjacent(self, other: PixelRect) -> Option<PixelRect> {
        if self.y == other.y && self.h == other.h {
            if self.right() == other.x {
                return Some(PixelRect::new(self.x, self.y, self.w + other.w, self.h));
            }
            if other.right() == self.x {
                return Some(PixelRect::new(other.x, self.y, self.w + other.w, self.h));
            }
        }
        if self.x == other.x && self.w == other.w {
            if self.bottom() == other.y {
                return Some(PixelRect::new(self.x, self.y, self.w, self.h + other.h));
            }
            if other.bottom() == self.y {
                return Some(PixelRect::new(self.x, other.y, self.w, self.h + other.h));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_edges_do_not_overlap() {
        let a = PixelRect::new(0, 0, 10, 10);
        let b = PixelRect::new(10, 0, 10, 10);
        assert!(!a.overlaps(b));
        assert!(a.overlaps(PixelRect::new(9, 9, 5, 5)));
    }

    #[test]
    fn merge_horizontal_neighbours() {
        let a = PixelRect::new(0, 4, 8, 6);
        let b = PixelRect::new(8, 4, 2, 6);
        assert_eq!(a.merge_adjacent(b), Some(PixelRect::new(0, 4, 10, 6)));
        assert_eq!(b.merge_adjacent(a), Some(PixelRect::new(0, 4, 10, 6)));
    }

    #[test]
    fn merge_requires_full_shared_edge() {
        let a = PixelRect::new(0, 0, 8, 6);
        let b = PixelRect::new(8, 0, 2, 5);
        assert_eq!(a.merge_adjacent(b), None);
        let c = PixelRect::new(0, 6, 8, 1);
        assert_eq!(a.merge_adjacent(c), Some(PixelRect::new(0, 0, 8, 7)));
    }
}
