use std::sync::Arc;
use std::time::Duration;

use ab_glyph::FontArc;
use anyhow::{anyhow, Result};
use pixels::{Pixels, SurfaceTexture};
use predex_core::{
    ClickTracker, InputEvent, Key, Layout, Point, ResponseMarks, Screen, TextPayload,
};
use predex_experiment::{
    CollectRequest, CollectorError, PresentationSurface, ResponseCollector, SurfaceError,
};
use predex_render::{EntryLayout, EntryView, SkiaRenderer};
use predex_timing::Timer;
use tracing::{debug, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalPosition, LogicalSize, PhysicalPosition, PhysicalSize},
    event::{ElementState, Ime, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key as WinitKey, NamedKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Fullscreen, Window, WindowId, WindowLevel},
};

const ENTRY_SIZE: LogicalSize<f64> = LogicalSize::new(560.0, 240.0);
const STARTUP_PUMPS: usize = 500;

/// Window plus the frame buffer drawn into it
struct Canvas {
    // Dropped before the window it presents to
    pixels: Pixels<'static>,
    renderer: SkiaRenderer,
    window: Arc<Window>,
}

impl Canvas {
    fn new(window: Arc<Window>, font: FontArc) -> Result<Self> {
        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));
        let texture = SurfaceTexture::new(width, height, window.clone());
        let pixels = Pixels::new(width, height, texture)?;
        let renderer = SkiaRenderer::new(width, height, window.scale_factor(), font)?;
        Ok(Self {
            pixels,
            renderer,
            window,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        let (width, height) = (size.width.max(1), size.height.max(1));
        self.pixels.resize_surface(width, height)?;
        self.pixels.resize_buffer(width, height)?;
        self.renderer
            .resize(width, height, self.window.scale_factor())?;
        debug!(width, height, "canvas resized");
        Ok(())
    }
}

/// Full-screen page the controller draws on
struct Stage {
    canvas: Canvas,
    last_screen: Option<Screen>,
    cursor: Point,
}

impl Stage {
    fn draw(&mut self, screen: &Screen) -> Result<Layout> {
        let layout = self
            .canvas
            .renderer
            .render_screen(screen, self.canvas.pixels.frame_mut())?;
        self.canvas.pixels.render()?;
        Ok(layout)
    }

    fn redraw(&mut self) {
        if let Some(screen) = self.last_screen.take() {
            if let Err(err) = self.draw(&screen) {
                warn!(error = %err, "redraw failed");
            }
            self.last_screen = Some(screen);
        }
    }
}

/// The always-on-top IME window used for one response
struct EntryWindow {
    canvas: Canvas,
    prompt: String,
    confirm_label: String,
    text: String,
    preedit: String,
    ime_seen: bool,
    cursor: Point,
    clicks: ClickTracker,
    layout: Option<EntryLayout>,
    /// Set on the first non-empty composition or commit, read after each pump
    typed: bool,
    confirmed: bool,
    dirty: bool,
}

impl EntryWindow {
    fn draw(&mut self) -> Result<()> {
        let view = EntryView {
            prompt: &self.prompt,
            text: &self.text,
            preedit: &self.preedit,
            confirm_label: &self.confirm_label,
        };
        let layout = self
            .canvas
            .renderer
            .render_entry(&view, self.canvas.pixels.frame_mut())?;
        self.canvas.pixels.render()?;

        // Keeps the candidate popup next to the field
        self.canvas.window.set_ime_cursor_area(
            PhysicalPosition::new(layout.field.x as f64, layout.field.y as f64),
            PhysicalSize::new(layout.field.width as f64, layout.field.height as f64),
        );
        self.layout = Some(layout);
        self.dirty = false;
        Ok(())
    }

    fn commit(&mut self, raw: &str) {
        match TextPayload::decode(Some(raw)) {
            TextPayload::Valid(text) => {
                self.text.push_str(&text);
                self.typed = true;
                self.dirty = true;
            }
            TextPayload::Malformed => warn!(?raw, "ignoring malformed text input"),
            TextPayload::Ignorable => {}
        }
    }

    /// Confirms with whatever is visible, composition included
    fn confirm(&mut self) {
        if !self.preedit.is_empty() {
            let preedit = std::mem::take(&mut self.preedit);
            self.text.push_str(&preedit);
        }
        self.confirmed = true;
    }

    fn handle(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::Ime(Ime::Enabled) => self.ime_seen = true,
            WindowEvent::Ime(Ime::Preedit(text, _)) => {
                self.ime_seen = true;
                if !text.is_empty() {
                    self.typed = true;
                }
                self.preedit = text;
                self.dirty = true;
            }
            WindowEvent::Ime(Ime::Commit(text)) => {
                self.ime_seen = true;
                self.preedit.clear();
                self.commit(&text);
                self.dirty = true;
            }
            WindowEvent::Ime(Ime::Disabled) => {
                self.preedit.clear();
                self.dirty = true;
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                match &event.logical_key {
                    // Enter inside a composition belongs to the IME
                    WinitKey::Named(NamedKey::Enter) if self.preedit.is_empty() => self.confirm(),
                    WinitKey::Named(NamedKey::Backspace) if self.preedit.is_empty() => {
                        self.dirty |= self.text.pop().is_some();
                    }
                    _ if !self.ime_seen => {
                        if let Some(text) = event.text.as_deref() {
                            self.commit(text);
                        }
                    }
                    _ => {}
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Point::new(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => self.clicks.press(self.cursor),
                ElementState::Released => {
                    let target = self.layout.map(|l| l.confirm);
                    if self.clicks.release(self.cursor, target) {
                        self.confirm();
                    }
                }
            },
            // Closing the collector submits it
            WindowEvent::CloseRequested => self.confirm(),
            WindowEvent::Resized(size) => {
                if let Err(err) = self.canvas.resize(size) {
                    warn!(error = %err, "collector resize failed");
                }
                self.dirty = true;
            }
            WindowEvent::RedrawRequested => self.dirty = true,
            _ => {}
        }
    }
}

struct EntryRequest {
    title: String,
    prompt: String,
    confirm_label: String,
}

/// Event-loop side state, driven by `pump_app_events`
struct Shell {
    font: FontArc,
    windowed: bool,
    stage: Option<Stage>,
    entry: Option<EntryWindow>,
    pending_entry: Option<EntryRequest>,
    events: Vec<InputEvent>,
    startup_error: Option<String>,
    entry_error: Option<String>,
    closed: bool,
}

impl Shell {
    fn create_stage(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("no monitor available"))?;

        let mut attributes = Window::default_attributes()
            .with_title("문장 예측 실험")
            .with_resizable(self.windowed);
        attributes = if self.windowed {
            attributes.with_inner_size(LogicalSize::new(1280.0, 800.0))
        } else {
            attributes.with_fullscreen(Some(Fullscreen::Borderless(Some(monitor.clone()))))
        };

        let window = Arc::new(event_loop.create_window(attributes)?);
        window.set_cursor_visible(true);
        let size = window.inner_size();
        info!(
            width = size.width,
            height = size.height,
            scale_factor = window.scale_factor(),
            refresh_hz = monitor.refresh_rate_millihertz().map(|mhz| mhz as f64 / 1000.0),
            windowed = self.windowed,
            "display configured"
        );

        self.stage = Some(Stage {
            canvas: Canvas::new(window, self.font.clone())?,
            last_screen: None,
            cursor: Point::default(),
        });
        Ok(())
    }

    fn create_entry(&mut self, event_loop: &ActiveEventLoop, request: EntryRequest) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title(request.title)
            .with_inner_size(ENTRY_SIZE)
            .with_resizable(false)
            .with_window_level(WindowLevel::AlwaysOnTop)
            .with_active(true);
        let attributes = match self.stage_window().and_then(|w| w.current_monitor()) {
            Some(monitor) => {
                let scale = monitor.scale_factor();
                let area = monitor.size().to_logical::<f64>(scale);
                let origin = monitor.position().to_logical::<f64>(scale);
                attributes.with_position(LogicalPosition::new(
                    origin.x + (area.width - ENTRY_SIZE.width) / 2.0,
                    origin.y + (area.height - ENTRY_SIZE.height) / 2.0,
                ))
            }
            None => attributes,
        };

        let window = Arc::new(event_loop.create_window(attributes)?);
        window.set_ime_allowed(true);
        window.focus_window();

        let mut entry = EntryWindow {
            canvas: Canvas::new(window, self.font.clone())?,
            prompt: request.prompt,
            confirm_label: request.confirm_label,
            text: String::new(),
            preedit: String::new(),
            ime_seen: false,
            cursor: Point::default(),
            clicks: ClickTracker::new(),
            layout: None,
            typed: false,
            confirmed: false,
            dirty: true,
        };
        entry.draw()?;
        self.entry = Some(entry);
        Ok(())
    }

    fn stage_window(&self) -> Option<&Arc<Window>> {
        self.stage.as_ref().map(|s| &s.canvas.window)
    }

    fn stage_event(&mut self, event: WindowEvent) {
        let Some(stage) = self.stage.as_mut() else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => self.events.push(InputEvent::CloseRequested),
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                let key = match &event.logical_key {
                    WinitKey::Named(NamedKey::Enter) => Key::Enter,
                    WinitKey::Named(NamedKey::Escape) => Key::Escape,
                    WinitKey::Named(NamedKey::Space) => Key::Space,
                    WinitKey::Named(NamedKey::Backspace) => Key::Backspace,
                    _ => Key::Other,
                };
                self.events.push(InputEvent::KeyPressed(key));
                match TextPayload::decode(event.text.as_deref()) {
                    TextPayload::Valid(text) => self.events.push(InputEvent::Text(text)),
                    TextPayload::Malformed => warn!("ignoring malformed key text"),
                    TextPayload::Ignorable => {}
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                stage.cursor = Point::new(position.x as f32, position.y as f32);
                self.events.push(InputEvent::PointerMoved(stage.cursor));
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => self.events.push(match state {
                ElementState::Pressed => InputEvent::PointerPressed(stage.cursor),
                ElementState::Released => InputEvent::PointerReleased(stage.cursor),
            }),
            WindowEvent::Resized(size) => {
                if let Err(err) = stage.canvas.resize(size) {
                    warn!(error = %err, "surface resize failed");
                }
                stage.redraw();
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = stage.canvas.window.inner_size();
                if let Err(err) = stage.canvas.resize(size) {
                    warn!(error = %err, "surface rescale failed");
                }
                stage.redraw();
            }
            WindowEvent::RedrawRequested => stage.redraw(),
            _ => {}
        }
    }
}

impl ApplicationHandler for Shell {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.stage.is_some() || self.closed {
            return;
        }
        if let Err(err) = self.create_stage(event_loop) {
            self.startup_error = Some(err.to_string());
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if let Some(entry) = self.entry.as_mut() {
            if entry.canvas.window.id() == window_id {
                entry.handle(event);
                return;
            }
        }
        if self.stage_window().is_some_and(|w| w.id() == window_id) {
            self.stage_event(event);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(request) = self.pending_entry.take() {
            if let Err(err) = self.create_entry(event_loop, request) {
                self.entry_error = Some(err.to_string());
            }
        }
        if let Some(entry) = self.entry.as_mut() {
            if entry.dirty {
                if let Err(err) = entry.draw() {
                    warn!(error = %err, "collector draw failed");
                }
            }
        }
    }
}

/// winit implementation of the presentation surface and the collector.
///
/// The controller owns the loop; every call here pumps pending window events
/// without blocking.
pub struct DisplayFrontend {
    event_loop: EventLoop<()>,
    shell: Shell,
    poll: Duration,
}

impl DisplayFrontend {
    pub fn new(font: FontArc, windowed: bool, poll: Duration) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        let mut frontend = Self {
            event_loop,
            shell: Shell {
                font,
                windowed,
                stage: None,
                entry: None,
                pending_entry: None,
                events: Vec::new(),
                startup_error: None,
                entry_error: None,
                closed: false,
            },
            poll,
        };

        for _ in 0..STARTUP_PUMPS {
            frontend.pump(poll)?;
            if let Some(err) = frontend.shell.startup_error.take() {
                return Err(anyhow!("cannot open presentation window: {err}"));
            }
            if frontend.shell.stage.is_some() {
                frontend.shell.events.clear();
                return Ok(frontend);
            }
        }
        Err(anyhow!("presentation window did not appear"))
    }

    fn pump(&mut self, timeout: Duration) -> Result<()> {
        match self.event_loop.pump_app_events(Some(timeout), &mut self.shell) {
            PumpStatus::Continue => Ok(()),
            PumpStatus::Exit(code) => Err(anyhow!("event loop exited with code {code}")),
        }
    }

    fn pump_now(&mut self) {
        if let Err(err) = self.pump(Duration::ZERO) {
            debug!(error = %err, "event pump stopped");
        }
    }

    fn stage_window(&self) -> Result<&Arc<Window>, SurfaceError> {
        self.shell.stage_window().ok_or(SurfaceError::Closed)
    }
}

impl PresentationSurface for DisplayFrontend {
    fn present(&mut self, screen: &Screen) -> Result<Layout, SurfaceError> {
        // Apply pending resizes before laying out
        self.pump_now();
        let stage = self.shell.stage.as_mut().ok_or(SurfaceError::Closed)?;
        let layout = stage
            .draw(screen)
            .map_err(|err| SurfaceError::Render(err.to_string()))?;
        stage.last_screen = Some(screen.clone());
        Ok(layout)
    }

    fn poll_input(&mut self) -> Vec<InputEvent> {
        self.pump_now();
        std::mem::take(&mut self.shell.events)
    }

    fn flush_input(&mut self) {
        self.pump_now();
        self.shell.events.retain(InputEvent::survives_flush);
    }

    fn release_exclusive(&mut self) -> Result<(), SurfaceError> {
        let windowed = self.shell.windowed;
        let window = self.stage_window()?;
        if !windowed {
            window.set_fullscreen(None);
        }
        window.set_window_level(WindowLevel::Normal);
        self.pump_now();
        Ok(())
    }

    fn reclaim_exclusive(&mut self) -> Result<(), SurfaceError> {
        let windowed = self.shell.windowed;
        let window = self.stage_window()?;
        if !windowed {
            let monitor = window.current_monitor();
            if monitor.is_none() {
                return Err(SurfaceError::Exclusive("window has no monitor".into()));
            }
            window.set_fullscreen(Some(Fullscreen::Borderless(monitor)));
        }
        window.focus_window();
        self.pump_now();
        Ok(())
    }

    fn close(&mut self) {
        if self.shell.closed {
            return;
        }
        self.shell.entry = None;
        self.shell.stage = None;
        self.shell.closed = true;
        self.pump_now();
        info!("presentation surface closed");
    }
}

impl ResponseCollector for DisplayFrontend {
    fn collect<T: Timer>(
        &mut self,
        request: &CollectRequest,
        timer: &T,
    ) -> Result<ResponseMarks, CollectorError> {
        if self.shell.closed {
            return Err(CollectorError::Unavailable("surface closed".into()));
        }
        self.shell.entry = None;
        self.shell.entry_error = None;
        self.shell.pending_entry = Some(EntryRequest {
            title: request.title.clone(),
            prompt: request.prompt.clone(),
            confirm_label: request.confirm_label.clone(),
        });

        // The window is created from the next loop iteration
        let poll = self.poll;
        while self.shell.pending_entry.is_some() {
            self.pump(poll)
                .map_err(|err| CollectorError::Unavailable(err.to_string()))?;
        }
        if let Some(err) = self.shell.entry_error.take() {
            return Err(CollectorError::Unavailable(err));
        }
        if self.shell.entry.is_none() {
            return Err(CollectorError::Unavailable("collector window missing".into()));
        }

        let opened_at = timer.now();
        let mut first_input_at = None;
        debug!(reference = request.reference, opened_at, "collector opened");

        loop {
            if self.pump(poll).is_err() {
                self.shell.entry = None;
                return Err(CollectorError::Interrupted);
            }
            let now = timer.now();
            let Some(entry) = self.shell.entry.as_mut() else {
                return Err(CollectorError::Interrupted);
            };
            if entry.typed && first_input_at.is_none() {
                first_input_at = Some(now);
            }
            if entry.confirmed {
                let text = std::mem::take(&mut entry.text);
                self.shell.entry = None;
                self.pump_now();
                return Ok(ResponseMarks {
                    text,
                    opened_at,
                    first_input_at,
                    closed_at: now,
                });
            }
        }
    }
}
