use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec3};
use image::RgbImage;
use log::{info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use stool_viewer::{load_rgb_image, FrameError, Programs, RenderState, Renderer, SceneConfig};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;

    let mut scene = match options.config.as_deref() {
        Some(path) => SceneConfig::load(path)
            .with_context(|| format!("failed to load scene config {path}"))?,
        None => SceneConfig::default(),
    };
    if let Some((width, height)) = options.size {
        scene.width = width;
        scene.height = height;
    }

    let programs = Programs::compile().context("failed to build shader programs")?;
    let texture = match options.texture.as_deref() {
        Some(path) => Some(load_rgb_image(path).context("failed to load texture")?),
        None => None,
    };

    let mut state = RenderState::new(scene);
    for &(x, y) in &options.pointer {
        state.pointer_moved(x, y);
    }

    if options.summary_only {
        print_summary(&state, &programs, texture.as_ref());
        return Ok(());
    }

    match run_interactive(state.clone(), programs.clone(), texture.clone()) {
        Ok(()) => Ok(()),
        Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
            eprintln!(
                "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
            );
            print_summary(&state, &programs, texture.as_ref());
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn run_interactive(
    state: RenderState,
    programs: Programs,
    texture: Option<RgbImage>,
) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = AppState {
        state,
        programs,
        texture,
        renderer: None,
        last_error: None,
    };
    event_loop
        .run_app(&mut app)
        .context("event loop terminated with error")?;

    app.shutdown();

    if let Some(err) = app.last_error {
        return Err(err);
    }

    Ok(())
}

struct AppState {
    state: RenderState,
    programs: Programs,
    texture: Option<RgbImage>,
    renderer: Option<Renderer>,
    last_error: Option<anyhow::Error>,
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        if let Err(err) = self.create_renderer(event_loop) {
            self.last_error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Err(err) = self.process_event(event_loop, window_id, event) {
            self.last_error = Some(err);
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.as_ref() {
            renderer.window().request_redraw();
        }
    }
}

impl AppState {
    fn create_renderer(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let scene = self.state.scene();
        let attributes = Window::default_attributes()
            .with_title(scene.title.clone())
            .with_inner_size(PhysicalSize::new(scene.width, scene.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );

        let mut renderer = block_on(Renderer::new(Arc::clone(&window), &self.programs))?;
        if let Some(image) = self.texture.as_ref() {
            renderer
                .upload_texture(image)
                .context("failed to upload texture")?;
        }
        let size = window.inner_size();
        self.state.resize(size.width, size.height);
        info!("window ready at {}x{}", size.width, size.height);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn process_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        if window_id != renderer.window_id() {
            return Ok(());
        }

        match event {
            WindowEvent::CloseRequested => {
                self.renderer = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                info!("resized to {}x{}", size.width, size.height);
                renderer.resize(size);
                self.state.resize(size.width, size.height);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.state.pointer_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::CursorLeft { .. } => {
                self.state.camera_mut().reset_latch();
            }
            WindowEvent::RedrawRequested => {
                let frame = self.state.frame();
                match renderer.render(&frame) {
                    Ok(()) => {}
                    Err(FrameError::Surface(
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated,
                    )) => {
                        let size = renderer.size();
                        renderer.resize(size);
                    }
                    Err(FrameError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                        return Err(anyhow!("GPU is out of memory"));
                    }
                    Err(FrameError::Surface(wgpu::SurfaceError::Timeout)) => {
                        info!("Surface timeout; retrying next frame");
                    }
                    Err(FrameError::Surface(err)) => {
                        warn!("skipping frame: {err}");
                    }
                    Err(err @ FrameError::Uniform(_)) => {
                        return Err(err).context("failed to upload frame uniforms");
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.renderer.take().is_some() {
            info!("event loop exited with the window still open");
        }
        let camera = self.state.camera();
        info!(
            "final camera yaw={:.2} pitch={:.2}",
            camera.yaw(),
            camera.pitch()
        );
    }
}

fn print_summary(state: &RenderState, programs: &Programs, texture: Option<&RgbImage>) {
    let frame = state.frame();
    let viewport = state.viewport();
    let camera = state.camera();

    for program in [&programs.object, &programs.lamp] {
        let names: Vec<&str> = program.uniform_names().collect();
        println!(
            "Compiled {} program with {} uniform(s): {}",
            program.label(),
            names.len(),
            names.join(", ")
        );
    }
    if let Some(image) = texture {
        println!("Texture {}x{}", image.width(), image.height());
    }
    println!(
        "Viewport {}x{} aspect={:.3}",
        viewport.width,
        viewport.height,
        viewport.aspect()
    );
    println!(
        "Camera yaw={:.2} pitch={:.2} eye={}",
        camera.yaw(),
        camera.pitch(),
        format_vec3(camera.orbit())
    );
    println!("Object color {}", format_vec3(frame.object.object_color));
    println!("Light position {}", format_vec3(frame.object.light_position));
    print_matrix("Object model", &frame.object.model);
    print_matrix("Lamp model", &frame.lamp.model);
    print_matrix("View", &frame.object.view);
    print_matrix("Projection", &frame.object.projection);
}

fn format_vec3(value: Vec3) -> String {
    format!("({:.2}, {:.2}, {:.2})", value.x, value.y, value.z)
}

fn print_matrix(name: &str, matrix: &Mat4) {
    println!("{name}:");
    // Printed row by row; glam stores columns.
    let rows = matrix.transpose().to_cols_array_2d();
    for row in rows {
        println!(
            "  [{:8.3} {:8.3} {:8.3} {:8.3}]",
            row[0], row[1], row[2], row[3]
        );
    }
}

#[derive(Debug, Default, PartialEq)]
struct CliOptions {
    config: Option<String>,
    texture: Option<String>,
    size: Option<(u32, u32)>,
    pointer: Vec<(f32, f32)>,
    summary_only: bool,
}

const USAGE: &str = "Usage: stool-viewer [--config FILE] [--texture FILE] [--size WxH] [--pointer X,Y]... [--summary-only]";

impl CliOptions {
    fn parse() -> Result<Self> {
        Self::parse_from(env::args().skip(1))
    }

    fn parse_from(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{flag} expects a value\n{USAGE}"))
            };
            match arg.as_str() {
                "--config" => options.config = Some(value("--config")?),
                "--texture" => options.texture = Some(value("--texture")?),
                "--size" => options.size = Some(parse_size(&value("--size")?)?),
                "--pointer" => options.pointer.push(parse_pointer(&value("--pointer")?)?),
                "--summary-only" => options.summary_only = true,
                other => {
                    return Err(anyhow!("Unknown argument: {other}\n{USAGE}"));
                }
            }
        }
        Ok(options)
    }
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| anyhow!("--size expects WIDTHxHEIGHT, got {value}"))?;
    let width: u32 = width.trim().parse().context("invalid window width")?;
    let height: u32 = height.trim().parse().context("invalid window height")?;
    if width == 0 || height == 0 {
        return Err(anyhow!("window size must be non-zero, got {value}"));
    }
    Ok((width, height))
}

fn parse_pointer(value: &str) -> Result<(f32, f32)> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| anyhow!("--pointer expects X,Y, got {value}"))?;
    let x: f32 = x.trim().parse().context("invalid pointer x")?;
    let y: f32 = y.trim().parse().context("invalid pointer y")?;
    Ok((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions> {
        CliOptions::parse_from(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn no_arguments_opens_default_window() {
        assert_eq!(parse(&[]).unwrap(), CliOptions::default());
    }

    #[test]
    fn parses_every_flag() {
        let options = parse(&[
            "--config",
            "scene.json",
            "--texture",
            "wood.jpg",
            "--size",
            "1024x768",
            "--pointer",
            "400,300",
            "--pointer",
            "410.5, 290",
            "--summary-only",
        ])
        .unwrap();
        assert_eq!(options.config.as_deref(), Some("scene.json"));
        assert_eq!(options.texture.as_deref(), Some("wood.jpg"));
        assert_eq!(options.size, Some((1024, 768)));
        assert_eq!(options.pointer, vec![(400.0, 300.0), (410.5, 290.0)]);
        assert!(options.summary_only);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(&["--size", "0x600"]).is_err());
        assert!(parse(&["--size", "800"]).is_err());
        assert!(parse(&["--pointer", "1;2"]).is_err());
        assert!(parse(&["--texture"]).is_err());
        assert!(parse(&["--fullscreen"]).is_err());
    }
}
