//! Forward+ demo — a grid of cubes under a swarm of animated point lights.
//!
//! Space toggles light animation, G toggles light gizmos, D toggles the
//! tile-occupancy heatmap.

use std::sync::Arc;
use std::time::Instant;

use logi::forward::mesh;
use logi::prelude::*;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

const GRID: i32 = 6;
const ACTIVE_LIGHTS: usize = 48;

fn main() {
    env_logger::init();

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let mut app = App {
        window: None,
        gpu: None,
        renderer: None,
        scene: None,
        start: Instant::now(),
        animate: true,
    };
    event_loop.run_app(&mut app).expect("Event loop error");
}

struct Scene {
    cube: Arc<GeometryBuffer>,
    lights: Lights,
    phases: Vec<f32>,
}

impl Scene {
    fn new(gpu: &GpuContext) -> Self {
        let (vertices, indices) = mesh::cube();
        let cube = Arc::new(GeometryBuffer::with_indices(
            &gpu.device,
            "demo cube",
            &vertices,
            &indices,
        ));

        let mut lights = Lights::default();
        let mut phases = Vec::with_capacity(ACTIVE_LIGHTS);
        for i in 0..ACTIVE_LIGHTS {
            let t = i as f32 / ACTIVE_LIGHTS as f32;
            let hue = t * std::f32::consts::TAU;
            lights.lights[i] = Light {
                position: Vec3::ZERO,
                radius: 4.0,
                color: Vec3::new(
                    0.5 + 0.5 * hue.sin(),
                    0.5 + 0.5 * (hue + 2.1).sin(),
                    0.5 + 0.5 * (hue + 4.2).sin(),
                ),
                intensity: 3.0,
            };
            phases.push(t * std::f32::consts::TAU);
        }

        Self {
            cube,
            lights,
            phases,
        }
    }

    fn animate_lights(&mut self, time: f32) {
        let span = GRID as f32;
        for (light, phase) in self.lights.lights[..ACTIVE_LIGHTS].iter_mut().zip(&self.phases) {
            let angle = time * 0.4 + phase;
            light.position = Vec3::new(
                angle.cos() * span * 1.2,
                1.5 + (time * 0.9 + phase).sin() * 1.0,
                angle.sin() * span * 1.2,
            );
        }
    }
}

struct App {
    window: Option<Arc<Window>>,
    gpu: Option<GpuContext>,
    renderer: Option<Renderer>,
    scene: Option<Scene>,
    start: Instant,
    animate: bool,
}

impl App {
    fn render_frame(&mut self) {
        let (Some(gpu), Some(renderer), Some(scene)) =
            (self.gpu.as_ref(), self.renderer.as_mut(), self.scene.as_mut())
        else {
            return;
        };

        let (width, height) = gpu.surface_size();
        renderer.update(gpu, width, height);

        let time = self.start.elapsed().as_secs_f32();
        if self.animate {
            scene.animate_lights(time);
        }

        // Camera orbiting the grid.
        let eye = Vec3::new(time.cos() * 14.0, 9.0, time.sin() * 14.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(
            60f32.to_radians(),
            width as f32 / height.max(1) as f32,
            0.1,
            200.0,
        );

        renderer.uniforms.view = view;
        renderer.uniforms.proj = proj;
        renderer.uniforms.inv_proj = proj.inverse();
        renderer.uniforms.view_proj = proj * view;
        renderer.uniforms.view_pos = eye;
        renderer.uniforms.time = time;
        renderer.uniforms.lights = scene.lights;

        // Floor slab.
        let mut floor = Attrib::new(scene.cube.clone());
        floor.model = Mat4::from_scale_rotation_translation(
            Vec3::new(GRID as f32 * 4.0, 0.2, GRID as f32 * 4.0),
            glam::Quat::IDENTITY,
            Vec3::new(0.0, -0.6, 0.0),
        );
        floor.material.diffuse = Vec3::splat(0.35);
        floor.material.roughness = 0.9;
        renderer.add_attrib(floor);

        // Cube grid with varying material response.
        for gx in -GRID / 2..GRID / 2 {
            for gz in -GRID / 2..GRID / 2 {
                let mut cube = Attrib::new(scene.cube.clone());
                cube.model = Mat4::from_translation(Vec3::new(
                    gx as f32 * 2.0 + 1.0,
                    0.0,
                    gz as f32 * 2.0 + 1.0,
                ));
                cube.material.diffuse = Vec3::new(0.7, 0.65, 0.6);
                cube.material.metallic = (gx + GRID / 2) as f32 / GRID as f32;
                cube.material.roughness =
                    0.1 + 0.8 * (gz + GRID / 2) as f32 / GRID as f32;
                renderer.add_attrib(cube);
            }
        }

        match renderer.draw(gpu) {
            Ok(()) => {
                let stats = renderer.stats();
                let _ = renderer.render_text(
                    gpu,
                    10.0,
                    height as f32 - 30.0,
                    0.5,
                    &format!(
                        "{} draws ({} opaque / {} alpha), culling: {}",
                        stats.geometry_draws,
                        stats.opaque_draws,
                        stats.alpha_draws,
                        stats.culling_dispatched
                    ),
                    Vec3::ONE,
                );
                renderer.present();
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost, will reconfigure");
            }
            Err(e) => log::warn!("Surface error: {e:?}"),
        }
        renderer.flush_attribs();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let attrs = Window::default_attributes()
                .with_title("logi — forward+ demo")
                .with_inner_size(winit::dpi::LogicalSize::new(1280.0, 720.0));
            let window = Arc::new(
                event_loop
                    .create_window(attrs)
                    .expect("Failed to create window"),
            );

            let mut gpu = GpuContext::new(window.clone());
            let config = RenderConfig::load_or_default("render_config.json");
            gpu.set_present_mode(config.present_mode());
            let renderer = Renderer::new(&gpu, &config);
            let scene = Scene::new(&gpu);

            self.gpu = Some(gpu);
            self.renderer = Some(renderer);
            self.scene = Some(scene);
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

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Space) => self.animate = !self.animate,
                    PhysicalKey::Code(KeyCode::KeyG) => {
                        if let Some(renderer) = self.renderer.as_mut() {
                            renderer.uniforms.light_debug = !renderer.uniforms.light_debug;
                        }
                    }
                    PhysicalKey::Code(KeyCode::KeyD) => {
                        if let Some(renderer) = self.renderer.as_mut() {
                            renderer.uniforms.debug = !renderer.uniforms.debug;
                        }
                    }
                    _ => {}
                }
            }

            WindowEvent::RedrawRequested => {
                self.render_frame();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }
}
