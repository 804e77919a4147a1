//! Flow control and application event loop.
//!
//! A "flow" is a scene that handles user input, updates its state and
//! provides renderable objects each frame. The engine owns the window, the GPU
//! [`Context`] and the camera controls; flows only describe what is drawn.
//!
//! # User-facing types
//!
//! - [`GraphicsFlow<S, E>`] is the trait for scenes that handle events and rendering
//! - [`Out<E>`] carries futures whose results come back as custom events
//!
//! # Lifecycle Flow
//!
//! Each frame:
//! 1. Reconfigure the surface if the drawable size changed
//! 2. Apply orbit input and upload the camera
//! 3. Call `on_update` on all flows
//! 4. Collect `on_render` and draw culled meshes, then double sided ones
//! 5. Present and request the next frame

use std::{fmt::Debug, iter, pin::Pin, sync::Arc};

use instant::{Duration, Instant};

use winit::{
    application::ApplicationHandler,
    event::{MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::Window,
};

use crate::{
    config::SceneConfig,
    context::{Context, InitContext, MouseButtonState, needs_resize},
    data_structures::model::DrawModel,
    render::{Instanced, Render},
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Output of the lifecycle hooks.
///
/// `Out::FutEvent` holds futures that are driven in the background. Each
/// result is delivered to `on_custom_events` once it resolves; the futures
/// have no side effects until then.
///
/// `Empty` is the default output used when nothing has to be awaited.
pub enum Out<E> {
    FutEvent(Vec<Box<dyn Future<Output = E>>>),
    Empty,
}

impl<E> Default for Out<E> {
    fn default() -> Self {
        Self::Empty
    }
}

/// Trait for implementing a renderable scene.
///
/// # Lifecycle
///
/// 1. `on_init()` is called once after the context exists; the only place to mutate it freely
/// 2. `on_window_events()` is called for each winit window event
/// 3. `on_update()` is called every frame
/// 4. `on_custom_events()` receives the results of futures returned from the hooks
/// 5. `on_render()` is called each frame and specifies how to render `self`
pub trait GraphicsFlow<S, E> {
    fn on_init(&mut self, ctx: &mut Context, state: &mut S) -> Out<E>;

    /// Called every frame with the time since the previous frame.
    fn on_update(&mut self, ctx: &Context, state: &mut S, dt: Duration) -> Out<E>;

    fn on_window_events(&mut self, ctx: &Context, state: &mut S, event: &WindowEvent) -> Out<E>;

    /// Handle custom application events.
    ///
    /// Returns the event if it was not consumed, allowing it to be passed to
    /// the next flow. Returning `None` means the event was consumed.
    fn on_custom_events(&mut self, ctx: &mut Context, state: &mut S, event: E) -> Option<E>;

    fn on_render(&self) -> Render<'_>;
}

impl<State, Event> Debug for dyn GraphicsFlow<State, Event> + 'static {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GraphicsFlow")
    }
}

/// A flow constructor takes an `InitContext` and asynchronously returns a
/// boxed `GraphicsFlow`.
pub type FlowConstructor<S, E> =
    Box<dyn FnOnce(InitContext) -> Pin<Box<dyn Future<Output = Box<dyn GraphicsFlow<S, E>>>>>>;

/// GPU context, app state, and surface status.
#[derive(Debug)]
pub struct AppState<State: 'static> {
    pub(crate) ctx: Context,
    state: State,
    is_surface_configured: bool,
}

impl<State: Default> AppState<State> {
    async fn new(window: Arc<Window>, config: &SceneConfig) -> anyhow::Result<Self> {
        let ctx = Context::new(window, config).await?;
        Ok(Self {
            ctx,
            state: State::default(),
            is_surface_configured: false,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.ctx.resize(width, height) {
            self.is_surface_configured = true;
        }
    }

    /// Matches the surface to the drawable before a frame is drawn.
    fn fit_to_display(&mut self) {
        let (width, height) = self.ctx.display_size();
        if !self.is_surface_configured || needs_resize(self.ctx.surface_size(), (width, height)) {
            self.resize(width, height);
        }
    }

    fn render<Event>(
        &mut self,
        graphics_flows: &[Box<dyn GraphicsFlow<State, Event>>],
    ) -> Result<(), wgpu::SurfaceError> {
        // Rendering requires the surface to be configured
        if !self.is_surface_configured {
            return Ok(());
        }

        let output = self.ctx.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let (target, resolve_target) = match &self.ctx.msaa_view {
            Some(msaa_view) => (msaa_view, Some(&view)),
            None => (&view, None),
        };

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.ctx.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });

            let mut culled: Vec<Instanced> = Vec::new();
            let mut double_sided: Vec<Instanced> = Vec::new();
            for flow in graphics_flows {
                flow.on_render().set_pipelines(&mut culled, &mut double_sided);
            }

            let batches = [
                (&self.ctx.pipelines.culled, culled),
                (&self.ctx.pipelines.double_sided, double_sided),
            ];
            for (pipeline, batch) in batches {
                if batch.is_empty() {
                    continue;
                }
                render_pass.set_pipeline(pipeline);
                for instanced in batch {
                    render_pass.set_vertex_buffer(1, instanced.instance.slice(..));
                    render_pass.draw_model_instanced(
                        instanced.model,
                        0..instanced.amount as u32,
                        &self.ctx.camera.bind_group,
                        &self.ctx.light.bind_group,
                    );
                }
            }
        }

        self.ctx.queue.submit(iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

type PendingEvent<Event> = Pin<Box<dyn Future<Output = Event>>>;

/// Drives the futures flows hand out and feeds their results back into the
/// event loop as [`FlowEvent::Custom`].
struct FlowOutputs<State: 'static, Event: 'static> {
    proxy: EventLoopProxy<FlowEvent<State, Event>>,
    #[cfg(not(target_arch = "wasm32"))]
    pending: futures::stream::FuturesUnordered<PendingEvent<Event>>,
}

impl<State: 'static, Event: 'static> FlowOutputs<State, Event> {
    fn new(proxy: EventLoopProxy<FlowEvent<State, Event>>) -> Self {
        Self {
            proxy,
            #[cfg(not(target_arch = "wasm32"))]
            pending: futures::stream::FuturesUnordered::new(),
        }
    }

    fn handle(&mut self, out: Out<Event>) {
        let futures = match out {
            Out::FutEvent(futures) => futures,
            Out::Empty => return,
        };
        for future in futures {
            let future: PendingEvent<Event> = Pin::from(future);
            #[cfg(not(target_arch = "wasm32"))]
            self.pending.push(future);

            #[cfg(target_arch = "wasm32")]
            {
                let proxy = self.proxy.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    let event = future.await;
                    if proxy.send_event(FlowEvent::Custom(event)).is_err() {
                        log::warn!("Event loop closed before an event could be delivered");
                    }
                });
            }
        }
    }

    /// Polls the pending futures inside the runtime and forwards the finished
    /// ones. The runtime's worker threads drive the IO in between.
    #[cfg(not(target_arch = "wasm32"))]
    fn poll(&mut self, async_runtime: &tokio::runtime::Runtime) {
        if self.pending.is_empty() {
            return;
        }
        let _guard = async_runtime.enter();
        for event in drain_ready(&mut self.pending) {
            if self.proxy.send_event(FlowEvent::Custom(event)).is_err() {
                log::warn!("Event loop closed before an event could be delivered");
            }
        }
    }
}

/// Takes every result that is ready without blocking. Futures that are still
/// pending stay queued and are polled again on the next call once woken.
#[cfg(not(target_arch = "wasm32"))]
fn drain_ready<Event>(
    pending: &mut futures::stream::FuturesUnordered<PendingEvent<Event>>,
) -> Vec<Event> {
    use futures::StreamExt;
    use std::task::Poll;

    let mut cx = std::task::Context::from_waker(futures::task::noop_waker_ref());
    let mut ready = Vec::new();
    while let Poll::Ready(Some(event)) = pending.poll_next_unpin(&mut cx) {
        ready.push(event);
    }
    ready
}

pub struct App<State: 'static, Event: 'static> {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    config: SceneConfig,
    outputs: FlowOutputs<State, Event>,
    state: Option<AppState<State>>,
    // This will hold the fully initialized flows once they are ready.
    graphics_flows: Vec<Box<dyn GraphicsFlow<State, Event>>>,
    // Taken on the first resume.
    constructors: Option<Vec<FlowConstructor<State, Event>>>,
    last_time: Instant,
    error: Option<anyhow::Error>,
}

impl<State, Event> App<State, Event>
where
    State: 'static + Default,
    Event: 'static,
{
    fn new(
        event_loop: &EventLoop<FlowEvent<State, Event>>,
        config: SceneConfig,
        constructors: Vec<FlowConstructor<State, Event>>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            config,
            outputs: FlowOutputs::new(event_loop.create_proxy()),
            state: None,
            graphics_flows: Vec::new(),
            constructors: Some(constructors),
            last_time: Instant::now(),
            error: None,
        })
    }

    fn start(
        &mut self,
        mut app_state: AppState<State>,
        flows: Vec<Box<dyn GraphicsFlow<State, Event>>>,
    ) {
        log::info!("Context ready, starting {} flow(s)", flows.len());
        self.graphics_flows = flows;
        for flow in self.graphics_flows.iter_mut() {
            let out = flow.on_init(&mut app_state.ctx, &mut app_state.state);
            self.outputs.handle(out);
        }
        app_state.ctx.window.request_redraw();
        self.last_time = Instant::now();
        self.state = Some(app_state);
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("App initialization failed: {error:#}");
        self.error = Some(error);
        event_loop.exit();
    }

    fn redraw(&mut self) {
        let Some(app) = self.state.as_mut() else {
            return;
        };
        let dt = self.last_time.elapsed();
        self.last_time = Instant::now();

        #[cfg(not(target_arch = "wasm32"))]
        self.outputs.poll(&self.async_runtime);

        app.fit_to_display();
        app.ctx.update_camera();
        for flow in self.graphics_flows.iter_mut() {
            let out = flow.on_update(&app.ctx, &mut app.state, dt);
            self.outputs.handle(out);
        }

        match app.render(&self.graphics_flows) {
            Ok(()) => {}
            // Reconfigure the surface if it's lost or outdated
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let (width, height) = app.ctx.display_size();
                app.resize(width, height);
            }
            Err(wgpu::SurfaceError::Timeout) => log::warn!("Surface timed out, skipping a frame"),
            Err(e) => log::error!("Unable to render {e}"),
        }
        app.ctx.window.request_redraw();
    }
}

pub(crate) enum FlowEvent<State: 'static, Event: 'static> {
    #[allow(dead_code)]
    Initialized {
        state: AppState<State>,
        flows: Vec<Box<dyn GraphicsFlow<State, Event>>>,
    },
    #[allow(dead_code)]
    InitFailed(anyhow::Error),
    Custom(Event),
}

impl<State, Event> Debug for FlowEvent<State, Event> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized { state: _, flows } => {
                f.debug_struct("Initialized").field("flows", flows).finish()
            }
            Self::InitFailed(e) => f.debug_tuple("InitFailed").field(e).finish(),
            Self::Custom(_) => f.write_str("Custom(E)"),
        }
    }
}

impl<State: 'static + Default, Event: 'static> ApplicationHandler<FlowEvent<State, Event>>
    for App<State, Event>
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(constructors) = self.constructors.take() else {
            return;
        };

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title(&self.config.title);

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            let canvas = web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.get_element_by_id(&self.config.canvas_id));
            match canvas {
                Some(canvas) => {
                    window_attributes =
                        window_attributes.with_canvas(Some(canvas.unchecked_into()));
                }
                None => {
                    let message = format!("No canvas with id {:?}", self.config.canvas_id);
                    self.fail(event_loop, anyhow::anyhow!(message));
                    return;
                }
            }
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.fail(event_loop, e.into());
                return;
            }
        };

        let config = self.config.clone();
        let init_future = async move {
            let app_state = AppState::<State>::new(window, &config).await?;
            let flow_futures: Vec<_> = constructors
                .into_iter()
                .map(|constructor| constructor((&app_state.ctx).into()))
                .collect();
            let flows: Vec<_> = futures::future::join_all(flow_futures).await;
            Ok::<_, anyhow::Error>((app_state, flows))
        };

        #[cfg(not(target_arch = "wasm32"))]
        match self.async_runtime.block_on(init_future) {
            Ok((app_state, flows)) => self.start(app_state, flows),
            Err(e) => self.fail(event_loop, e),
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.outputs.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let event = match init_future.await {
                    Ok((state, flows)) => FlowEvent::Initialized { state, flows },
                    Err(e) => FlowEvent::InitFailed(e),
                };
                if proxy.send_event(event).is_err() {
                    log::error!("Event loop closed during initialization");
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: FlowEvent<State, Event>) {
        match event {
            FlowEvent::Initialized { state, flows } => self.start(state, flows),
            FlowEvent::InitFailed(e) => self.fail(event_loop, e),
            FlowEvent::Custom(custom_event) => {
                if let Some(app) = &mut self.state {
                    let result = self
                        .graphics_flows
                        .iter_mut()
                        .fold(Some(custom_event), |event, flow| {
                            flow.on_custom_events(&mut app.ctx, &mut app.state, event?)
                        });
                    if result.is_some() {
                        log::warn!("Custom event was not consumed by any flow");
                    }
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(app) = self.state.as_mut() else {
            return;
        };

        let ctx = &mut app.ctx;
        ctx.camera.controller.handle_window_events(&event);
        match &event {
            WindowEvent::CursorMoved { position, .. } => {
                let (dx, dy) = ctx.mouse.moved_to(*position);
                match ctx.mouse.pressed {
                    MouseButtonState::Left => ctx.camera.controller.rotate(dx, dy),
                    MouseButtonState::Right => ctx.camera.controller.pan(dx, dy),
                    MouseButtonState::None => (),
                }
            }
            WindowEvent::CursorLeft { .. } => {
                ctx.mouse.coords = None;
                ctx.mouse.pressed = MouseButtonState::None;
            }
            WindowEvent::MouseInput {
                state: button_state,
                button,
                ..
            } => match (button, button_state.is_pressed()) {
                (MouseButton::Left, true) => ctx.mouse.pressed = MouseButtonState::Left,
                (MouseButton::Right, true) => ctx.mouse.pressed = MouseButtonState::Right,
                (_, false) => ctx.mouse.pressed = MouseButtonState::None,
                _ => (),
            },
            _ => (),
        }

        for flow in self.graphics_flows.iter_mut() {
            let out = flow.on_window_events(&app.ctx, &mut app.state, &event);
            self.outputs.handle(out);
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => app.resize(size.width, size.height),
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }
}

/// Installs the logger and runs `constructors` until the window closes.
///
/// Returns an error if the window or the GPU context cannot be created.
pub fn run<State: 'static + Default, Event: 'static>(
    config: SceneConfig,
    constructors: Vec<FlowConstructor<State, Event>>,
) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        // GPU backends are chatty at info
        let env = env_logger::Env::default()
            .default_filter_or("info,wgpu_core=warn,wgpu_hal=warn,naga=warn");
        if let Err(e) = env_logger::Builder::from_env(env).try_init() {
            eprintln!("Warning: Could not initialize logger: {e}");
        }
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info).unwrap_throw();
    }

    let event_loop: EventLoop<FlowEvent<State, Event>> = EventLoop::with_user_event().build()?;
    #[allow(unused_mut)]
    let mut app: App<State, Event> = App::new(&event_loop, config, constructors)?;

    #[cfg(not(target_arch = "wasm32"))]
    {
        event_loop.run_app(&mut app)?;
        if let Some(error) = app.error.take() {
            return Err(error);
        }
    }

    #[cfg(target_arch = "wasm32")]
    {
        use winit::platform::web::EventLoopExtWebSys;
        event_loop.spawn_app(app);
    }

    Ok(())
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use futures::{FutureExt, channel::oneshot, stream::FuturesUnordered};

    use super::*;

    fn pending_event<F: Future<Output = u32> + 'static>(future: F) -> PendingEvent<u32> {
        Box::pin(future)
    }

    #[test]
    fn ready_futures_are_delivered_on_the_first_poll() {
        let mut pending = FuturesUnordered::new();
        pending.push(pending_event(async { 1 }));
        pending.push(pending_event(async { 2 }));

        let mut events = drain_ready(&mut pending);
        events.sort();

        assert_eq!(events, vec![1, 2]);
        assert!(pending.is_empty());
    }

    #[test]
    fn woken_futures_are_delivered_on_a_later_poll() {
        let (sender, receiver) = oneshot::channel::<u32>();
        let mut pending = FuturesUnordered::new();
        pending.push(pending_event(receiver.map(|result| result.unwrap_or(0))));
        pending.push(pending_event(async { 7 }));

        assert_eq!(drain_ready(&mut pending), vec![7]);
        assert_eq!(pending.len(), 1);
        assert!(drain_ready(&mut pending).is_empty());

        sender.send(42).unwrap();
        assert_eq!(drain_ready(&mut pending), vec![42]);
        assert!(pending.is_empty());
    }

    #[test]
    fn nothing_pending_yields_nothing() {
        let mut pending: FuturesUnordered<PendingEvent<u32>> = FuturesUnordered::new();
        assert!(drain_ready(&mut pending).is_empty());
    }
}
