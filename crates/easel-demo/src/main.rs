//! Windowed demo: paints rectangles, an atlas sprite and a stroked outline
//! every redraw through a surface swapchain.

use std::sync::Arc;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use easel_engine::atlas::Sprite;
use easel_engine::canvas::Canvas;
use easel_engine::coords::{Rect, Vec2};
use easel_engine::device::{Device, DeviceConfig, Swapchain};
use easel_engine::logging::{LoggingConfig, init_logging};
use easel_engine::paint::{BlendMode, Brush, Color, Pen};

const CHECKER: u32 = 32;

/// Everything bound to the live window.
struct Surface {
    window: Arc<Window>,
    device: Device,
    swapchain: Swapchain,
    canvas: Canvas,
    sprite: Sprite,
}

impl Surface {
    fn new(event_loop: &ActiveEventLoop) -> Result<Self> {
        let attrs = Window::default_attributes()
            .with_title("easel demo")
            .with_inner_size(LogicalSize::new(800.0, 600.0));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let mut device =
            Device::new(DeviceConfig::from_env()).context("failed to create device")?;
        let size = window.inner_size();
        let swapchain = device
            .create_surface_swapchain(Arc::clone(&window), size.width, size.height)
            .context("failed to create surface swapchain")?;

        let sprite = device
            .allocate_sprite(&checkerboard(CHECKER), CHECKER, CHECKER)
            .context("failed to allocate checkerboard sprite")?;

        let mut canvas = Canvas::new(swapchain.render_pass());
        canvas.set_background(Color::from_rgba_u8(24, 26, 32, 255));

        Ok(Self {
            window,
            device,
            swapchain,
            canvas,
            sprite,
        })
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.device
            .resize_swapchain(&mut self.swapchain, width, height)
            .context("failed to resize swapchain")
    }

    fn redraw(&mut self) -> Result<()> {
        let (w, h) = self.swapchain.size();
        if w == 0 || h == 0 {
            return Ok(());
        }

        let mut p = self.canvas.begin_paint(&mut self.device, true, w, h);

        p.set_brush(Brush::solid(Color::from_straight(0.9, 0.3, 0.2, 1.0)))?;
        for i in 0..8 {
            p.fill_rect(Rect::new(20.0 + i as f32 * 40.0, 20.0, 30.0, 30.0))?;
        }

        let glow = Color::from_straight(0.2, 0.6, 0.9, 0.5);
        p.set_brush(Brush::solid(glow).with_blend(BlendMode::Additive))?;
        p.fill_rect(Rect::new(40.0, 40.0, 200.0, 120.0))?;

        p.draw_sprite(&self.sprite, Rect::new(300.0, 100.0, 128.0, 128.0), Color::WHITE)?;

        p.set_pen(Pen::new(Color::WHITE, 2.0))?;
        p.stroke_rect(Rect::new(296.0, 96.0, 136.0, 136.0))?;
        p.stroke_line(Vec2::new(20.0, 260.0), Vec2::new(w as f32 - 20.0, 260.0))?;

        p.end_paint()?;

        let mut frame = match self.device.acquire_frame(&self.swapchain) {
            Ok(frame) => frame,
            Err(e) if e.is_transient() => {
                log::debug!("skipping frame: {e}");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        self.device.submit(&mut frame, &self.canvas)?;
        self.device.present(frame)?;
        Ok(())
    }
}

fn checkerboard(size: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let light = ((x / 4) + (y / 4)) % 2 == 0;
            let v = if light { 230 } else { 60 };
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
    }
    pixels
}

#[derive(Default)]
struct Demo {
    surface: Option<Surface>,
}

impl ApplicationHandler for Demo {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.surface.is_some() {
            return;
        }
        match Surface::new(event_loop) {
            Ok(surface) => {
                surface.window.request_redraw();
                self.surface = Some(surface);
            }
            Err(e) => {
                log::error!("failed to start: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(surface) = &self.surface {
            surface.window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };

        let result = match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
                Ok(())
            }
            WindowEvent::Resized(size) => surface.resize(size.width, size.height),
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = surface.window.inner_size();
                surface.resize(size.width, size.height)
            }
            WindowEvent::RedrawRequested => surface.redraw(),
            _ => Ok(()),
        };

        if let Err(e) = result {
            log::error!("{e:#}");
            event_loop.exit();
        }
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut demo = Demo::default();
    event_loop
        .run_app(&mut demo)
        .context("winit event loop terminated with error")?;
    Ok(())
}
