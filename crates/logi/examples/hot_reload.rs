//! Shader hot-reload test.
//!
//! Renders one lit cube. While it runs, edit any file under
//! `crates/logi/shaders/` (try the tonemap curve in `present.wgsl` or the
//! light falloff in `shading.wgsl`) and save — the renderer recompiles it
//! live. A file with errors logs the failure and keeps the previous
//! program bound.

use std::sync::Arc;
use std::time::Instant;

use logi::forward::mesh;
use logi::prelude::*;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

fn main() {
    env_logger::init();

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let mut app = App {
        window: None,
        gpu: None,
        renderer: None,
        cube: None,
        start: Instant::now(),
    };
    event_loop.run_app(&mut app).expect("Event loop error");
}

struct App {
    window: Option<Arc<Window>>,
    gpu: Option<GpuContext>,
    renderer: Option<Renderer>,
    cube: Option<Arc<GeometryBuffer>>,
    start: Instant,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let attrs = Window::default_attributes()
                .with_title("logi — shader hot-reload")
                .with_inner_size(winit::dpi::LogicalSize::new(960.0, 540.0));
            let window = Arc::new(
                event_loop
                    .create_window(attrs)
                    .expect("Failed to create window"),
            );

            let gpu = GpuContext::new(window.clone());
            let renderer = Renderer::new(&gpu, &RenderConfig::default());
            let (vertices, indices) = mesh::cube();
            let cube = Arc::new(GeometryBuffer::with_indices(
                &gpu.device,
                "cube",
                &vertices,
                &indices,
            ));

            self.gpu = Some(gpu);
            self.renderer = Some(renderer);
            self.cube = Some(cube);
            self.window = Some(window);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::Resized(size) => {
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.resize(size.width, size.height);
                }
            }

            WindowEvent::RedrawRequested => {
                let (Some(gpu), Some(renderer), Some(cube)) =
                    (self.gpu.as_ref(), self.renderer.as_mut(), self.cube.as_ref())
                else {
                    return;
                };

                let (width, height) = gpu.surface_size();
                renderer.update(gpu, width, height);

                let time = self.start.elapsed().as_secs_f32();
                let eye = Vec3::new(3.0, 2.0, 3.0);
                let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
                let proj = Mat4::perspective_rh(
                    60f32.to_radians(),
                    width as f32 / height.max(1) as f32,
                    0.1,
                    100.0,
                );
                renderer.uniforms.view = view;
                renderer.uniforms.proj = proj;
                renderer.uniforms.inv_proj = proj.inverse();
                renderer.uniforms.view_proj = proj * view;
                renderer.uniforms.view_pos = eye;
                renderer.uniforms.time = time;
                renderer.uniforms.lights.lights[0] = Light {
                    position: Vec3::new(time.cos() * 2.5, 2.0, time.sin() * 2.5),
                    radius: 8.0,
                    color: Vec3::new(1.0, 0.9, 0.7),
                    intensity: 4.0,
                };

                let mut attrib = Attrib::new(cube.clone());
                attrib.model = Mat4::from_rotation_y(time * 0.5);
                renderer.add_attrib(attrib);

                match renderer.draw(gpu) {
                    Ok(()) => renderer.present(),
                    Err(e) => log::warn!("Surface error: {e:?}"),
                }
                renderer.flush_attribs();

                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }
}
