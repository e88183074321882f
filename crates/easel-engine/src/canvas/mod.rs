//! Batching paint front end.
//!
//! A [`Canvas`] owns the vertex storage and the recorded draws of one paint
//! target. [`Canvas::begin_paint`] opens a bracket and returns a [`Painter`];
//! [`Painter::end_paint`] closes it and uploads the vertices, after which the
//! canvas can be submitted with [`crate::device::Device::submit`].
//!
//! Vertices accumulate into a run under one paint state. Any state change
//! flushes the run as one draw first, so a draw never mixes states and draws
//! keep append order.

mod batch;
mod shapes;

use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::{RawPipeline, RawTexture, RenderPass};
use crate::device::{DescriptorArray, Device, Pipeline, Texture, VertexBuffer};
use crate::paint::{Brush, Color, PaintSource, Pen};
use crate::pipeline::{PaintVertex, PipelineKey};
use crate::{Error, Result};

use batch::PaintState;

pub use batch::DrawCall;

/// Where a canvas is in its paint bracket.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CanvasState {
    /// Never painted.
    Idle,
    /// A bracket is open, or was abandoned without `end_paint`.
    Painting,
    /// The last bracket ended; draws and vertices are ready to submit.
    Ready,
}

/// Vertex storage and recorded draws for one paint target.
///
/// A canvas may be painted with different devices over its lifetime; the
/// GPU vertex storage follows the device of the current bracket.
pub struct Canvas {
    pass: RenderPass,
    background: Color,
    state: CanvasState,
    clear: bool,
    width: u32,
    height: u32,
    vertices: Vec<PaintVertex>,
    draws: Vec<DrawCall>,
    descriptors: HashMap<(RawPipeline, RawTexture), Rc<DescriptorArray>>,
    vertex_buffer: Option<VertexBuffer>,
}

impl Canvas {
    /// A canvas whose pipelines target `pass`.
    pub fn new(pass: RenderPass) -> Self {
        Self {
            pass,
            background: Color::TRANSPARENT,
            state: CanvasState::Idle,
            clear: false,
            width: 0,
            height: 0,
            vertices: Vec::new(),
            draws: Vec::new(),
            descriptors: HashMap::new(),
            vertex_buffer: None,
        }
    }

    /// Color the target is cleared to when a bracket starts with `clear`.
    pub fn set_background(&mut self, color: Color) {
        self.background = color;
    }

    #[inline]
    pub fn background(&self) -> Color {
        self.background
    }

    #[inline]
    pub fn state(&self) -> CanvasState {
        self.state
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == CanvasState::Ready
    }

    #[inline]
    pub fn render_pass(&self) -> RenderPass {
        self.pass
    }

    /// Target shape of the current or last bracket.
    #[inline]
    pub fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn vertices(&self) -> &[PaintVertex] {
        &self.vertices
    }

    #[inline]
    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draws
    }

    #[inline]
    pub fn vertex_buffer(&self) -> Option<&VertexBuffer> {
        self.vertex_buffer.as_ref()
    }

    pub(crate) fn clear_color(&self) -> Option<Color> {
        self.clear.then_some(self.background)
    }

    /// Opens a paint bracket on a `width×height` target.
    ///
    /// Whatever an earlier, unfinished bracket accumulated is discarded.
    pub fn begin_paint<'a>(
        &'a mut self,
        device: &'a mut Device,
        clear: bool,
        width: u32,
        height: u32,
    ) -> Painter<'a> {
        if self.state == CanvasState::Painting {
            log::debug!(
                "canvas: discarding abandoned bracket ({} vertices, {} draws)",
                self.vertices.len(),
                self.draws.len()
            );
        }
        self.vertices.clear();
        self.draws.clear();
        self.descriptors.clear();
        if self
            .vertex_buffer
            .as_ref()
            .is_some_and(|b| !device.owns_vertex_buffer(b))
        {
            log::debug!("canvas: painting with another device; dropping vertex buffer");
            self.vertex_buffer = None;
        }
        self.clear = clear;
        self.width = width;
        self.height = height;
        self.state = CanvasState::Painting;

        Painter {
            canvas: self,
            device,
            brush: Brush::default(),
            pen: Pen::default(),
            bound: None,
            run_start: 0,
            polygon: Vec::new(),
        }
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(RenderPass::default())
    }
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("state", &self.state)
            .field("size", &(self.width, self.height))
            .field("vertices", &self.vertices.len())
            .field("draws", &self.draws.len())
            .finish()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Slot {
    Fill,
    Stroke,
}

struct Bound {
    state: PaintState,
    pipeline: Rc<Pipeline>,
    descriptors: Option<Rc<DescriptorArray>>,
}

/// An open paint bracket.
///
/// Dropping a painter without [`Painter::end_paint`] abandons the bracket:
/// the canvas cannot be submitted until the next bracket ends.
pub struct Painter<'a> {
    canvas: &'a mut Canvas,
    device: &'a mut Device,
    brush: Brush,
    pen: Pen,
    bound: Option<Bound>,
    /// First vertex of the run not yet flushed.
    run_start: usize,
    /// Points of the open polygon, UVs already mapped.
    polygon: Vec<PaintVertex>,
}

impl Painter<'_> {
    /// The device this bracket paints with.
    #[inline]
    pub fn device(&mut self) -> &mut Device {
        self.device
    }

    #[inline]
    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    #[inline]
    pub fn pen(&self) -> &Pen {
        &self.pen
    }

    /// Makes `brush` the fill state.
    ///
    /// When the state differs from the bound one, the pending run is flushed
    /// and the pipeline (and texture binding) for the new state is resolved.
    /// Textures are resolved here, so atlas and pipeline errors surface at
    /// this call.
    pub fn set_brush(&mut self, brush: Brush) -> Result<()> {
        self.brush = brush;
        self.bind(Slot::Fill)
    }

    /// Makes `pen` the stroke state. Flushes like [`Painter::set_brush`].
    pub fn set_pen(&mut self, pen: Pen) -> Result<()> {
        self.pen = pen;
        self.bind(Slot::Stroke)
    }

    /// Appends one point to the open polygon.
    ///
    /// `u, v` are texel coordinates in the brush's source image; they are
    /// mapped into the bound texture here. Binds the brush when nothing is
    /// bound yet.
    pub fn add_point(&mut self, x: f32, y: f32, u: f32, v: f32, color: Color) -> Result<()> {
        if self.bound.is_none() {
            self.bind(Slot::Fill)?;
        }
        let metrics = self
            .bound
            .as_ref()
            .map_or(self.brush.metrics(), |b| b.state.metrics());
        self.polygon
            .push(PaintVertex::new(x, y, metrics.map(u, v), color));
        Ok(())
    }

    /// Closes the open polygon and flushes the pending run as one draw.
    ///
    /// The polygon is fan-triangulated; fewer than three points are dropped.
    pub fn commit_points(&mut self) {
        self.close_polygon();
        self.flush();
    }

    /// Closes the bracket: flushes, uploads the vertices and marks the canvas
    /// ready for submission.
    pub fn end_paint(mut self) -> Result<()> {
        self.close_polygon();
        self.flush();

        let required = self.canvas.vertices.len();
        let needed_bytes = (required * PaintVertex::SIZE) as u64;
        let fits = self
            .canvas
            .vertex_buffer
            .as_ref()
            .is_some_and(|b| b.capacity() >= needed_bytes);
        if !fits {
            let vertices = required
                .next_power_of_two()
                .max(self.device.config().initial_vertex_capacity);
            let capacity = (vertices * PaintVertex::SIZE) as u64;
            log::debug!("canvas: vertex buffer grows to {vertices} vertices");
            self.canvas.vertex_buffer = Some(self.device.create_vertex_buffer(capacity)?);
        }

        if let Some(buffer) = self.canvas.vertex_buffer.as_ref()
            && required > 0
        {
            let bytes: &[u8] = bytemuck::cast_slice(&self.canvas.vertices);
            self.device.upload_vertex_buffer(buffer, bytes)?;
        }

        self.canvas.state = CanvasState::Ready;
        log::trace!(
            "canvas: bracket ended with {} draws, {} vertices",
            self.canvas.draws.len(),
            required
        );
        Ok(())
    }

    fn bind(&mut self, slot: Slot) -> Result<()> {
        let (state, texture) = match slot {
            Slot::Fill => self.resolve_brush()?,
            Slot::Stroke => (
                PaintState::Stroke {
                    blend: self.pen.blend(),
                    color: self.pen.color(),
                    width: self.pen.width(),
                },
                None,
            ),
        };

        if self.bound.as_ref().is_some_and(|b| b.state == state) {
            return Ok(());
        }

        self.close_polygon();
        self.flush();
        self.bound = None;

        let key = PipelineKey::new(state.kind(), state.blend());
        let pipeline = self.device.pipeline_for(
            self.canvas.pass,
            key,
            self.canvas.width,
            self.canvas.height,
        )?;
        let descriptors = match texture {
            Some(texture) => Some(self.descriptors_for(&pipeline, &texture)?),
            None => None,
        };

        self.bound = Some(Bound {
            state,
            pipeline,
            descriptors,
        });
        Ok(())
    }

    fn resolve_brush(&mut self) -> Result<(PaintState, Option<Rc<Texture>>)> {
        let texture = match self.brush.source() {
            PaintSource::Solid => None,
            PaintSource::Texture(texture) => Some(Rc::clone(texture)),
            PaintSource::Sprite(sprite) => Some(self.device.resolve_sprite(sprite)?.0),
        };
        let state = PaintState::Fill {
            kind: self.brush.kind(),
            blend: self.brush.blend(),
            texture: texture.as_ref().map(|t| t.raw()),
            color: self.brush.color(),
            metrics: self.brush.metrics(),
        };
        Ok((state, texture))
    }

    fn descriptors_for(
        &mut self,
        pipeline: &Rc<Pipeline>,
        texture: &Rc<Texture>,
    ) -> Result<Rc<DescriptorArray>> {
        let key = (pipeline.raw(), texture.raw());
        if let Some(d) = self.canvas.descriptors.get(&key) {
            return Ok(Rc::clone(d));
        }
        let d = Rc::new(self.device.create_descriptor_array(pipeline, texture)?);
        self.canvas.descriptors.insert(key, Rc::clone(&d));
        Ok(d)
    }

    /// Ensures the slot is bound and returns the state to paint with.
    fn state_for(&mut self, slot: Slot) -> Result<PaintState> {
        self.bind(slot)?;
        self.bound
            .as_ref()
            .map(|b| b.state)
            .ok_or(Error::Backend("paint state failed to bind".to_string()))
    }

    fn close_polygon(&mut self) {
        let n = self.polygon.len();
        if n >= 3 {
            let first = self.polygon[0];
            for pair in self.polygon[1..].windows(2) {
                self.canvas.vertices.extend([first, pair[0], pair[1]]);
            }
        } else if n > 0 {
            log::debug!("canvas: dropping degenerate polygon of {n} points");
        }
        self.polygon.clear();
    }

    /// Appends ready-made triangles to the pending run.
    fn push_triangles(&mut self, vertices: &[PaintVertex]) {
        self.close_polygon();
        self.canvas.vertices.extend_from_slice(vertices);
    }

    fn flush(&mut self) {
        let end = self.canvas.vertices.len();
        if end == self.run_start {
            return;
        }
        let Some(bound) = self.bound.as_ref() else {
            // Vertices are only appended while a state is bound.
            self.run_start = end;
            return;
        };
        self.canvas.draws.push(DrawCall {
            pipeline: Rc::clone(&bound.pipeline),
            descriptors: bound.descriptors.clone(),
            first_vertex: self.run_start as u32,
            vertex_count: (end - self.run_start) as u32,
        });
        log::trace!(
            "canvas: flushed {} vertices under {:?}",
            end - self.run_start,
            bound.state.kind()
        );
        self.run_start = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessInit, TextureFormat};
    use crate::coords::{Rect, Vec2};
    use crate::device::{BackendKind, DeviceConfig, Swapchain};
    use crate::paint::{BlendMode, PaintKind};

    const PASS: RenderPass = RenderPass::new(TextureFormat::Rgba8Unorm);
    const BLUE: Color = Color::from_premul(0.0, 0.0, 1.0, 1.0);

    fn device() -> Device {
        Device::new(DeviceConfig::headless().with_atlas_page_size(64)).unwrap()
    }

    fn swapchain(device: &mut Device, w: u32, h: u32) -> Swapchain {
        device
            .create_offscreen_swapchain(w, h, TextureFormat::Rgba8Unorm, 0)
            .unwrap()
    }

    fn submit(device: &mut Device, chain: &Swapchain, canvas: &Canvas) {
        let mut frame = device.acquire_frame(chain).unwrap();
        device.submit(&mut frame, canvas).unwrap();
        device.present(frame).unwrap();
    }

    #[test]
    fn red_quad_is_one_solid_draw_after_clear() {
        let mut device = device();
        let chain = swapchain(&mut device, 64, 64);
        let mut canvas = Canvas::new(chain.render_pass());
        canvas.set_background(Color::BLACK);

        let mut p = canvas.begin_paint(&mut device, true, 64, 64);
        p.set_brush(Brush::solid(Color::RED)).unwrap();
        for (x, y) in [(0.0, 0.0), (32.0, 0.0), (32.0, 32.0), (0.0, 32.0)] {
            p.add_point(x, y, 0.0, 0.0, Color::RED).unwrap();
        }
        p.commit_points();
        p.end_paint().unwrap();

        submit(&mut device, &chain, &canvas);

        let headless = device.headless().unwrap();
        let subs = headless.submissions();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].clear, Some(Color::BLACK));
        assert_eq!(subs[0].draws.len(), 1);

        let draw = &subs[0].draws[0];
        assert_eq!(draw.kind, PaintKind::Solid);
        assert_eq!(draw.texture, None);
        assert_eq!(draw.vertices.len(), 6);
        assert!(draw.vertices.iter().all(|v| v.color == Color::RED.to_array()));

        let positions: Vec<[f32; 2]> =
            draw.vertices.iter().map(|v| [v.position[0], v.position[1]]).collect();
        assert_eq!(
            positions,
            vec![[0.0, 0.0], [32.0, 0.0], [32.0, 32.0], [0.0, 0.0], [32.0, 32.0], [0.0, 32.0]]
        );
    }

    #[test]
    fn shapes_sharing_state_batch_into_one_draw() {
        let mut device = device();
        let mut canvas = Canvas::new(PASS);

        let mut p = canvas.begin_paint(&mut device, false, 128, 128);
        p.set_brush(Brush::solid(BLUE)).unwrap();
        for i in 0..25 {
            p.fill_rect(Rect::new(i as f32 * 4.0, 0.0, 3.0, 3.0)).unwrap();
        }
        // Rebinding an equal brush keeps the run open.
        p.set_brush(Brush::solid(BLUE)).unwrap();
        p.fill_rect(Rect::new(0.0, 10.0, 3.0, 3.0)).unwrap();
        p.end_paint().unwrap();

        assert_eq!(canvas.draw_calls().len(), 1);
        assert_eq!(canvas.draw_calls()[0].vertex_count(), 26 * 6);
        assert_eq!(canvas.clear_color(), None);
    }

    #[test]
    fn state_change_flushes_previous_run_in_order() {
        let mut device = device();
        let mut canvas = Canvas::new(PASS);

        let mut p = canvas.begin_paint(&mut device, true, 64, 64);
        p.set_brush(Brush::solid(Color::RED)).unwrap();
        p.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0)).unwrap();
        p.fill_rect(Rect::new(8.0, 0.0, 4.0, 4.0)).unwrap();
        p.set_brush(Brush::solid(BLUE)).unwrap();
        p.fill_rect(Rect::new(16.0, 0.0, 4.0, 4.0)).unwrap();
        p.set_brush(Brush::solid(BLUE).with_blend(BlendMode::Additive)).unwrap();
        p.fill_rect(Rect::new(24.0, 0.0, 4.0, 4.0)).unwrap();
        p.end_paint().unwrap();

        let draws = canvas.draw_calls();
        assert_eq!(draws.len(), 3);
        assert_eq!((draws[0].first_vertex(), draws[0].vertex_count()), (0, 12));
        assert_eq!((draws[1].first_vertex(), draws[1].vertex_count()), (12, 6));
        assert_eq!((draws[2].first_vertex(), draws[2].vertex_count()), (18, 6));
        assert_eq!(draws[2].pipeline().blend(), BlendMode::Additive);

        let v = canvas.vertices();
        assert!(v[..12].iter().all(|v| v.color == Color::RED.to_array()));
        assert!(v[12..].iter().all(|v| v.color == BLUE.to_array()));
        assert_eq!(v[0].position[0], 0.0);
        assert_eq!(v[6].position[0], 8.0);
    }

    #[test]
    fn sprite_draw_binds_page_texture_and_maps_uvs() {
        let mut device = device();
        let chain = swapchain(&mut device, 64, 64);
        let mut canvas = Canvas::new(chain.render_pass());

        let _pad = device.allocate_sprite(&[9u8; 6 * 6 * 4], 6, 6).unwrap();
        let sprite = device.allocate_sprite(&[200u8; 4 * 4 * 4], 4, 4).unwrap();
        let rect = sprite.allocation().unwrap().rect();

        let mut p = canvas.begin_paint(&mut device, false, 64, 64);
        p.draw_sprite(&sprite, Rect::new(10.0, 10.0, 8.0, 8.0), Color::WHITE)
            .unwrap();
        p.end_paint().unwrap();
        submit(&mut device, &chain, &canvas);

        let page = sprite.allocation().unwrap().page();
        let page_texture = device.atlas().page_texture(page).unwrap().raw();
        let headless = device.headless().unwrap();
        let draw = &headless.submissions()[0].draws[0];
        assert_eq!(draw.kind, PaintKind::Textured);
        assert_eq!(draw.texture, Some(page_texture));

        let u0 = rect.x as f32 / 64.0;
        let u1 = (rect.x + 4) as f32 / 64.0;
        assert_eq!(draw.vertices[0].uv[0], u0);
        assert_eq!(draw.vertices[1].uv[0], u1);
    }

    #[test]
    fn empty_sprite_paints_with_white_texture() {
        let mut device = device();
        let mut canvas = Canvas::new(PASS);
        let white = device.white_texture().raw();

        let mut p = canvas.begin_paint(&mut device, false, 16, 16);
        p.set_brush(Brush::sprite(Default::default(), Color::WHITE)).unwrap();
        p.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0)).unwrap();
        p.end_paint().unwrap();

        assert_eq!(canvas.draw_calls()[0].texture(), Some(white));
    }

    #[test]
    fn degenerate_polygon_is_dropped() {
        let mut device = device();
        let mut canvas = Canvas::new(PASS);

        let mut p = canvas.begin_paint(&mut device, false, 16, 16);
        p.add_point(0.0, 0.0, 0.0, 0.0, Color::RED).unwrap();
        p.add_point(5.0, 0.0, 0.0, 0.0, Color::RED).unwrap();
        p.commit_points();
        p.end_paint().unwrap();

        assert!(canvas.vertices().is_empty());
        assert!(canvas.draw_calls().is_empty());
    }

    #[test]
    fn commit_splits_polygons_into_separate_draws() {
        let mut device = device();
        let mut canvas = Canvas::new(PASS);

        let mut p = canvas.begin_paint(&mut device, false, 16, 16);
        for _ in 0..2 {
            for (x, y) in [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (2.0, 6.0), (0.0, 4.0)] {
                p.add_point(x, y, 0.0, 0.0, Color::WHITE).unwrap();
            }
            p.commit_points();
        }
        p.end_paint().unwrap();

        let counts: Vec<u32> = canvas.draw_calls().iter().map(|d| d.vertex_count()).collect();
        assert_eq!(counts, vec![9, 9]);
    }

    #[test]
    fn stroke_line_extrudes_by_half_width() {
        let mut device = device();
        let mut canvas = Canvas::new(PASS);

        let mut p = canvas.begin_paint(&mut device, false, 32, 32);
        p.set_pen(Pen::new(Color::RED, 2.0)).unwrap();
        p.stroke_line(Vec2::new(0.0, 5.0), Vec2::new(10.0, 5.0)).unwrap();
        p.stroke_line(Vec2::new(3.0, 3.0), Vec2::new(3.0, 3.0)).unwrap();
        p.end_paint().unwrap();

        let v = canvas.vertices();
        assert_eq!(v.len(), 6);
        let ys: Vec<f32> = v.iter().map(|v| v.position[1]).collect();
        assert!(ys.iter().all(|&y| y == 4.0 || y == 6.0), "{ys:?}");
        assert_eq!(canvas.draw_calls().len(), 1);
    }

    #[test]
    fn fill_then_stroke_switches_state() {
        let mut device = device();
        let mut canvas = Canvas::new(PASS);

        let mut p = canvas.begin_paint(&mut device, false, 32, 32);
        p.fill_rect(Rect::new(0.0, 0.0, 8.0, 8.0)).unwrap();
        p.stroke_rect(Rect::new(0.0, 0.0, 8.0, 8.0)).unwrap();
        p.end_paint().unwrap();

        let draws = canvas.draw_calls();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[1].vertex_count(), 4 * 6);
    }

    #[test]
    fn abandoned_bracket_blocks_submit_and_is_discarded() {
        let mut device = device();
        let chain = swapchain(&mut device, 16, 16);
        let mut canvas = Canvas::new(chain.render_pass());

        {
            let mut p = canvas.begin_paint(&mut device, false, 16, 16);
            p.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0)).unwrap();
        }
        assert_eq!(canvas.state(), CanvasState::Painting);

        let mut frame = device.acquire_frame(&chain).unwrap();
        assert_eq!(device.submit(&mut frame, &canvas), Err(Error::PaintNotFinished));

        let mut p = canvas.begin_paint(&mut device, false, 16, 16);
        p.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0)).unwrap();
        p.end_paint().unwrap();
        assert_eq!(canvas.vertices().len(), 6);
        assert_eq!(canvas.vertices()[2].position[0], 2.0);

        device.submit(&mut frame, &canvas).unwrap();
        device.present(frame).unwrap();
    }

    #[test]
    fn target_shape_change_recompiles_between_brackets() {
        let mut device = device();
        let mut canvas = Canvas::new(PASS);

        for (w, h) in [(64, 64), (128, 128), (64, 64)] {
            let mut p = canvas.begin_paint(&mut device, false, w, h);
            p.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap();
            p.end_paint().unwrap();
            assert_eq!(canvas.draw_calls()[0].pipeline().target_size(), (w, h));
        }
        assert_eq!(device.pipeline_cache().stats().compiles, 3);
        assert_eq!(device.pipeline_cache().len(), 1);
    }

    #[test]
    fn compile_failure_surfaces_at_set_brush() {
        let mut device = Device::new(DeviceConfig::headless().with_backend(BackendKind::Headless(
            HeadlessInit { fail_pipeline_compile: true, ..Default::default() },
        )))
        .unwrap();
        let mut canvas = Canvas::new(PASS);

        let mut p = canvas.begin_paint(&mut device, false, 16, 16);
        let err = p.set_brush(Brush::solid(Color::RED)).unwrap_err();
        assert!(matches!(err, Error::PipelineCompileFailed { kind: PaintKind::Solid, .. }));
    }

    #[test]
    fn switching_devices_reallocates_vertex_buffer() {
        let mut first = device();
        let mut second = device();
        let chain = swapchain(&mut second, 16, 16);
        let mut canvas = Canvas::new(chain.render_pass());

        let mut p = canvas.begin_paint(&mut first, false, 16, 16);
        p.fill_rect(Rect::new(0.0, 0.0, 4.0, 4.0)).unwrap();
        p.end_paint().unwrap();

        let mut p = canvas.begin_paint(&mut second, false, 16, 16);
        p.fill_rect(Rect::new(2.0, 2.0, 4.0, 4.0)).unwrap();
        p.end_paint().unwrap();
        assert!(second.owns_vertex_buffer(canvas.vertex_buffer().unwrap()));
        assert!(!first.owns_vertex_buffer(canvas.vertex_buffer().unwrap()));

        submit(&mut second, &chain, &canvas);
        let headless = second.headless().unwrap();
        assert_eq!(headless.stats().vertex_buffers_created, 1);
        let draw = &headless.submissions()[0].draws[0];
        assert_eq!(draw.vertices[0].position[0], 2.0);
    }

    #[test]
    fn vertex_buffer_grows_to_fit() {
        let mut device = Device::new(DeviceConfig {
            initial_vertex_capacity: 8,
            ..DeviceConfig::headless()
        })
        .unwrap();
        let mut canvas = Canvas::new(PASS);

        let mut p = canvas.begin_paint(&mut device, false, 64, 64);
        for i in 0..5 {
            p.fill_rect(Rect::new(i as f32, 0.0, 1.0, 1.0)).unwrap();
        }
        p.end_paint().unwrap();

        let capacity = canvas.vertex_buffer().unwrap().capacity();
        assert_eq!(capacity, 32 * PaintVertex::SIZE as u64);
    }
}
