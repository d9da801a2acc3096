use crate::clipboard::{EnigoKeys, SystemClipboard};
use crate::config::{self, Config};
use crate::generate::{self, GenerationClient};
use crate::hotkey;
use crate::pipeline::SubstitutionPipeline;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, hotkey::HotKey};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use tray_icon::menu::{Menu, MenuEvent, MenuId, MenuItem};
use tray_icon::{TrayIcon, TrayIconBuilder};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy};
use winit::window::{Window, WindowId};
use wry::http::Request;
use wry::{WebView, WebViewBuilder};

struct AppState {
    cfg: Arc<Mutex<Config>>,
    hotkey_manager: GlobalHotKeyManager,
    registered: Option<HotKey>,
    hotkey_warning: Option<String>,
    settings_error: Option<String>,
    settings_saved: bool,
    trigger_tx: mpsc::Sender<()>,
    busy: Arc<AtomicBool>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcMessage {
    RequestState,
    SaveSettings {
        endpoint: String,
        prompt_template: String,
        hotkey: String,
    },
    Close,
}

#[derive(Debug, Serialize)]
struct UiState {
    endpoint: String,
    prompt_template: String,
    hotkey: String,
    hotkey_warning: Option<String>,
    error: Option<String>,
    saved: bool,
}

struct TrayHandle {
    _tray: TrayIcon,
    settings_id: MenuId,
    quit_id: MenuId,
}

#[derive(Debug)]
enum UserEvent {
    Ipc(IpcMessage),
    Menu(MenuEvent),
    Hotkey(u32),
}

type AppResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

struct Ghostwrite {
    state: AppState,
    window: Option<Arc<Window>>,
    webview: Option<WebView>,
    tray: Option<TrayHandle>,
    proxy: EventLoopProxy<UserEvent>,
}

impl Ghostwrite {
    fn new(proxy: EventLoopProxy<UserEvent>) -> AppResult<Self> {
        let cfg = Arc::new(Mutex::new(config::load_or_init()?));
        let hotkey_manager = GlobalHotKeyManager::new()?;
        let (trigger_tx, busy) = spawn_pipeline_worker(Arc::clone(&cfg));

        let state = AppState {
            cfg,
            hotkey_manager,
            registered: None,
            hotkey_warning: None,
            settings_error: None,
            settings_saved: false,
            trigger_tx,
            busy,
        };

        Ok(Self {
            state,
            window: None,
            webview: None,
            tray: None,
            proxy,
        })
    }
}

impl ApplicationHandler<UserEvent> for Ghostwrite {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let window_attrs = Window::default_attributes()
            .with_title("Ghostwrite")
            .with_visible(false)
            .with_inner_size(LogicalSize::new(560.0, 640.0));

        let window = match event_loop.create_window(window_attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                tracing::error!("failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        // Create webview as child to avoid winit contentView replacement panic
        // See: https://github.com/tauri-apps/wry/issues/1477
        let html = include_str!("../assets/panel.html");
        let proxy = self.proxy.clone();
        let webview = match WebViewBuilder::new()
            .with_html(html)
            .with_ipc_handler(move |req: Request<String>| {
                if let Ok(event) = serde_json::from_str::<IpcMessage>(req.body()) {
                    let _ = proxy.send_event(UserEvent::Ipc(event));
                }
            })
            .with_bounds(wry::Rect {
                position: wry::dpi::Position::Logical(wry::dpi::LogicalPosition::new(0.0, 0.0)),
                size: wry::dpi::Size::Logical(wry::dpi::LogicalSize::new(560.0, 640.0)),
            })
            .build_as_child(&window)
        {
            Ok(wv) => wv,
            Err(e) => {
                tracing::error!("failed to create webview: {}", e);
                event_loop.exit();
                return;
            }
        };

        let tray = match build_tray() {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("failed to create tray: {}", e);
                event_loop.exit();
                return;
            }
        };

        apply_hotkey(&mut self.state);

        // Forward hotkey presses to the event loop
        let hotkey_proxy = self.proxy.clone();
        std::thread::spawn(move || {
            let rx = GlobalHotKeyEvent::receiver();
            while let Ok(event) = rx.recv() {
                let _ = hotkey_proxy.send_event(UserEvent::Hotkey(event.id()));
            }
        });

        // Forward tray menu clicks to the event loop
        let menu_proxy = self.proxy.clone();
        std::thread::spawn(move || {
            let rx = MenuEvent::receiver();
            while let Ok(event) = rx.recv() {
                let _ = menu_proxy.send_event(UserEvent::Menu(event));
            }
        });

        self.window = Some(window);
        self.webview = Some(webview);
        self.tray = Some(tray);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                // Closing the settings window hides it; the tray stays up.
                if let Some(window) = &self.window {
                    window.set_visible(false);
                }
            }
            WindowEvent::Destroyed => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(webview) = &self.webview {
                    let _ = webview.set_bounds(wry::Rect {
                        position: wry::dpi::Position::Logical(wry::dpi::LogicalPosition::new(
                            0.0, 0.0,
                        )),
                        size: wry::dpi::Size::Physical(wry::dpi::PhysicalSize::new(
                            size.width,
                            size.height,
                        )),
                    });
                }
            }
            _ => {}
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: UserEvent) {
        let Some(window) = &self.window else { return };
        let Some(webview) = &self.webview else { return };
        let Some(tray) = &self.tray else { return };

        match event {
            UserEvent::Ipc(msg) => {
                handle_ipc(&mut self.state, msg, window, webview);
            }
            UserEvent::Menu(event) => {
                if event.id == tray.settings_id {
                    open_panel(&mut self.state, window, webview);
                } else if event.id == tray.quit_id {
                    event_loop.exit();
                }
            }
            UserEvent::Hotkey(id) => {
                if self.state.registered.map(|hk| hk.id()) == Some(id) {
                    dispatch_trigger(&self.state);
                }
            }
        }
    }
}

pub fn run() -> AppResult<()> {
    // On macOS, set activation policy to accessory (no dock icon)
    #[cfg(target_os = "macos")]
    {
        use objc2_app_kit::{NSApplication, NSApplicationActivationPolicy};
        use objc2_foundation::MainThreadMarker;

        if let Some(mtm) = MainThreadMarker::new() {
            let app = NSApplication::sharedApplication(mtm);
            app.setActivationPolicy(NSApplicationActivationPolicy::Accessory);
        }
    }

    let event_loop = EventLoop::<UserEvent>::with_user_event()
        .build()
        .map_err(|e| format!("failed to create event loop: {}", e))?;

    let proxy = event_loop.create_proxy();
    let mut app = Ghostwrite::new(proxy)?;

    event_loop
        .run_app(&mut app)
        .map_err(|e| format!("event loop error: {}", e))?;

    Ok(())
}

/// The pipeline owns the only clipboard handle and runs off the UI thread;
/// triggers arrive over a channel and overlapping ones are rejected at
/// dispatch via the shared in-flight flag.
fn spawn_pipeline_worker(cfg: Arc<Mutex<Config>>) -> (mpsc::Sender<()>, Arc<AtomicBool>) {
    let (tx, rx) = mpsc::channel::<()>();
    let busy = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&busy);
    std::thread::spawn(move || {
        let clipboard = match SystemClipboard::new() {
            Ok(c) => c,
            Err(err) => {
                tracing::error!(%err, "clipboard unavailable, substitution disabled");
                return;
            }
        };
        let mut pipeline = SubstitutionPipeline::with_flag(
            clipboard,
            EnigoKeys::new(),
            GenerationClient::new(),
            flag,
        );
        while rx.recv().is_ok() {
            let cfg = cfg.lock().expect("config lock").clone();
            match pipeline.run_cycle(&cfg) {
                Ok(()) => tracing::info!("substitution cycle complete"),
                Err(err) => tracing::warn!(%err, "substitution cycle aborted"),
            }
        }
    });
    (tx, busy)
}

fn dispatch_trigger(state: &AppState) {
    if state.busy.load(Ordering::SeqCst) {
        tracing::warn!("substitution cycle already in flight, ignoring trigger");
        return;
    }
    if state.trigger_tx.send(()).is_err() {
        tracing::error!("pipeline worker is gone, trigger dropped");
    }
}

/// Register the chord currently persisted in the configuration, replacing
/// whatever was registered before. Failure disables the hotkey but keeps
/// the application running.
fn apply_hotkey(state: &mut AppState) {
    let combo = state.cfg.lock().expect("config lock").hotkey.combo.clone();
    let parsed = match hotkey::parse_combo(&combo) {
        Ok(hk) => hk,
        Err(err) => {
            tracing::warn!(%combo, %err, "hotkey chord does not parse, hotkey disabled");
            state.hotkey_warning = Some(format!("Hotkey '{}': {}", combo, err));
            return;
        }
    };

    if let Some(old) = state.registered.take() {
        let _ = state.hotkey_manager.unregister(old);
    }

    match state.hotkey_manager.register(parsed) {
        Ok(()) => {
            tracing::info!(%combo, "registered global hotkey");
            state.registered = Some(parsed);
            state.hotkey_warning = None;
        }
        Err(err) => {
            tracing::warn!(%combo, %err, "failed to register global hotkey, hotkey disabled");
            state.hotkey_warning = Some(format!("Failed to register '{}': {}", combo, err));
        }
    }
}

fn build_tray() -> AppResult<TrayHandle> {
    let menu = Menu::new();
    let settings_item = MenuItem::new("Settings...", true, None);
    let quit_item = MenuItem::new("Quit", true, None);
    let settings_id = settings_item.id().clone();
    let quit_id = quit_item.id().clone();
    menu.append(&settings_item).map_err(boxed)?;
    menu.append(&quit_item).map_err(boxed)?;

    let icon = tray_icon::Icon::from_rgba(icon_rgba(), 16, 16)
        .map_err(|e| format!("failed to create icon: {}", e))?;
    let tray = TrayIconBuilder::new()
        .with_menu(Box::new(menu))
        .with_tooltip("Ghostwrite")
        .with_icon(icon)
        .build()
        .map_err(boxed)?;

    Ok(TrayHandle {
        _tray: tray,
        settings_id,
        quit_id,
    })
}

fn boxed<E: Error + Send + Sync + 'static>(err: E) -> Box<dyn Error + Send + Sync> {
    Box::new(err)
}

// 16x16 slate dot; generated instead of bundling an image asset.
fn icon_rgba() -> Vec<u8> {
    let mut rgba = vec![0u8; 16 * 16 * 4];
    for px in rgba.chunks_exact_mut(4) {
        px.copy_from_slice(&[0x47, 0x56, 0x69, 0xFF]);
    }
    rgba
}

fn open_panel(state: &mut AppState, window: &Window, webview: &WebView) {
    state.settings_error = None;
    state.settings_saved = false;
    send_state(state, webview);
    window.set_visible(true);
    window.focus_window();
}

fn handle_ipc(state: &mut AppState, msg: IpcMessage, window: &Window, webview: &WebView) {
    match msg {
        IpcMessage::RequestState => {
            send_state(state, webview);
        }
        IpcMessage::SaveSettings {
            endpoint,
            prompt_template,
            hotkey,
        } => {
            let endpoint = endpoint.trim().to_string();
            let hotkey = hotkey.trim().to_string();

            if let Some(problem) = validate_settings(&endpoint, &prompt_template, &hotkey) {
                state.settings_error = Some(problem);
                state.settings_saved = false;
                send_state(state, webview);
                return;
            }

            {
                let mut cfg = state.cfg.lock().expect("config lock");
                cfg.endpoint = endpoint;
                cfg.prompt_template = prompt_template;
                cfg.hotkey.combo = hotkey;
            }
            persist_config(state);
            apply_hotkey(state);
            state.settings_saved = state.settings_error.is_none();
            send_state(state, webview);
        }
        IpcMessage::Close => {
            window.set_visible(false);
        }
    }
}

/// The settings form is the only place configuration is validated; the
/// pipeline trusts the store and fails its own way at trigger time.
fn validate_settings(endpoint: &str, template: &str, combo: &str) -> Option<String> {
    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        return Some("Endpoint URL must start with http:// or https://".to_string());
    }
    if serde_json::from_str::<serde_json::Value>(template).is_err() {
        return Some("Prompt template must be valid JSON".to_string());
    }
    if !template.contains(generate::PLACEHOLDER) {
        return Some(format!(
            "Prompt template must contain the {} placeholder",
            generate::PLACEHOLDER
        ));
    }
    if let Err(err) = hotkey::parse_combo(combo) {
        return Some(format!("Hotkey '{}': {}", combo, err));
    }
    None
}

fn persist_config(state: &mut AppState) {
    let cfg = state.cfg.lock().expect("config lock").clone();
    match config::save(&cfg) {
        Ok(()) => {
            state.settings_error = None;
        }
        Err(err) => {
            tracing::warn!(%err, "failed to persist configuration");
            state.settings_error = Some(err.to_string());
        }
    }
}

fn send_state(state: &AppState, webview: &WebView) {
    let cfg = state.cfg.lock().expect("config lock").clone();
    let ui_state = UiState {
        endpoint: cfg.endpoint,
        prompt_template: cfg.prompt_template,
        hotkey: cfg.hotkey.combo,
        hotkey_warning: state.hotkey_warning.clone(),
        error: state.settings_error.clone(),
        saved: state.settings_saved,
    };

    if let Ok(payload) = serde_json::to_string(&ui_state) {
        let script = format!("window.__SET_STATE__({});", payload);
        let _ = webview.evaluate_script(&script);
    }
}
