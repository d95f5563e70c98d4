use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use wgpu_bridge::animation::AnimationId;
use wgpu_bridge::device::{SurfaceSize, SurfaceSource};
use wgpu_bridge::job::ChannelSink;
use wgpu_bridge::session::FrameStatus;
use wgpu_bridge::{Bridge, BridgeConfig, BridgeError, Handle};

use crate::config::HostConfig;

/// Runs the event loop until the window closes.
pub fn run(config: HostConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut host = Host::new(config);

    event_loop
        .run_app(&mut host)
        .context("winit event loop terminated with error")?;

    Ok(())
}

struct RunningJob {
    handle: Handle,
    lines: Receiver<String>,
}

struct Host {
    config: HostConfig,
    bridge: Bridge,
    animation: AnimationId,

    window: Option<Arc<Window>>,
    session: Option<Handle>,
    job: Option<RunningJob>,
    exit_requested: bool,
}

impl Host {
    fn new(config: HostConfig) -> Self {
        Self {
            animation: config.animation,
            bridge: Bridge::new(BridgeConfig::default()),
            config,
            window: None,
            session: None,
            job: None,
            exit_requested: false,
        }
    }

    fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<Arc<Window>> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;
        Ok(Arc::new(window))
    }

    fn create_session(&mut self) -> Result<()> {
        let Some(window) = self.window.clone() else {
            return Ok(());
        };
        let size = window.inner_size();
        let source = SurfaceSource::from_target(
            Arc::clone(&window),
            SurfaceSize::new(size.width, size.height),
        );

        let handle = self
            .bridge
            .create_session(source, self.animation)
            .with_context(|| format!("failed to create session for animation {}", self.animation))?;
        log::info!("session {handle} created");

        self.session = Some(handle);
        self.update_title();
        window.request_redraw();
        Ok(())
    }

    fn destroy_session(&mut self) {
        if let Some(handle) = self.session.take() {
            if let Err(err) = self.bridge.destroy_session(handle) {
                log::warn!("destroying session {handle}: {err}");
            }
        }
    }

    fn recreate_session(&mut self) {
        self.destroy_session();
        if let Err(err) = self.create_session() {
            log::error!("{err:#}");
            self.request_exit();
        }
    }

    fn update_title(&self) {
        let (Some(window), Some(handle)) = (&self.window, self.session) else {
            return;
        };
        match self.bridge.session_snapshot(handle) {
            Ok(snapshot) => window.set_title(&format!(
                "{} - {}",
                self.config.title, snapshot.animation_name
            )),
            Err(err) => log::warn!("reading session {handle}: {err}"),
        }
    }

    fn redraw(&mut self) {
        let Some(handle) = self.session else {
            return;
        };
        match self.bridge.frame(handle) {
            Ok(FrameStatus::Presented | FrameStatus::Skipped) => {}
            Err(BridgeError::SurfaceLost) => {
                log::warn!("surface lost, recreating session");
                self.recreate_session();
            }
            Err(err) => {
                log::error!("frame failed: {err}");
                self.request_exit();
            }
        }
    }

    fn resize(&mut self) {
        let (Some(window), Some(handle)) = (&self.window, self.session) else {
            return;
        };
        let size = window.inner_size();
        if let Err(err) = self.bridge.resize_session(handle, size.width, size.height) {
            log::error!("resize failed: {err}");
        }
        window.request_redraw();
    }

    fn cycle_animation(&mut self) {
        let Some(handle) = self.session else {
            return;
        };
        let ids = self.bridge.registry().ids();
        let next = ids
            .iter()
            .position(|id| *id == self.animation)
            .map_or(0, |i| (i + 1) % ids.len());
        let Some(&next) = ids.get(next) else {
            return;
        };

        match self.bridge.change_animation(handle, next) {
            Ok(_) => {
                self.animation = next;
                self.update_title();
            }
            Err(err) => log::error!("changing animation to {next}: {err}"),
        }
    }

    fn toggle_job(&mut self) {
        if let Some(job) = self.job.take() {
            self.stop_job(job);
            return;
        }

        let (sink, lines) = ChannelSink::unbounded();
        match self
            .bridge
            .start_compute_job(self.config.job.clone(), Arc::new(sink))
        {
            Ok(handle) => {
                log::info!("compute job {handle} started");
                self.job = Some(RunningJob { handle, lines });
            }
            Err(err) => log::error!("starting compute job: {err}"),
        }
    }

    fn stop_job(&mut self, job: RunningJob) {
        if let Err(err) = self.bridge.cancel_compute_job(job.handle) {
            log::warn!("cancelling job {}: {err}", job.handle);
        }
        print_lines(&job.lines);
    }

    fn drain_job(&mut self) {
        let Some(job) = &self.job else {
            return;
        };
        print_lines(&job.lines);

        // A job that ended on its own still owns its handle until cancelled.
        let finished = self
            .bridge
            .job_phase(job.handle)
            .map_or(true, |phase| phase.is_finished());
        if finished {
            if let Some(job) = self.job.take() {
                self.stop_job(job);
            }
        }
    }

    fn on_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match event.physical_key {
            PhysicalKey::Code(KeyCode::Space) => self.cycle_animation(),
            PhysicalKey::Code(KeyCode::KeyJ) => self.toggle_job(),
            PhysicalKey::Code(KeyCode::Escape) => self.request_exit(),
            _ => {}
        }
    }

    fn shutdown(&mut self) {
        self.destroy_session();
        if let Some(job) = self.job.take() {
            self.stop_job(job);
        }
    }
}

fn print_lines(lines: &Receiver<String>) {
    for line in lines.try_iter() {
        println!("{line}");
    }
}

impl ApplicationHandler for Host {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            match self.create_window(event_loop) {
                Ok(window) => self.window = Some(window),
                Err(err) => {
                    log::error!("failed to create initial window: {err:#}");
                    event_loop.exit();
                    return;
                }
            }
        }

        if self.session.is_none() {
            if let Err(err) = self.create_session() {
                log::error!("{err:#}");
                event_loop.exit();
            }
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        // The native surface goes away while suspended.
        self.destroy_session();
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        self.drain_job();

        if self.exit_requested {
            self.shutdown();
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match &event {
            WindowEvent::CloseRequested => self.request_exit(),
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => self.resize(),
            WindowEvent::KeyboardInput { event, .. } => self.on_key(event),
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }

        if self.exit_requested {
            self.shutdown();
            event_loop.exit();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}
