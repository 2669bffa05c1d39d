// main.rs — window, event loop, and wiring between loader, editor and renderer

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app;
mod renderer;

use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;

use app::EditorApp;
use hotspot_mapper::config::AppConfig;
use hotspot_mapper::i18n::{self, tr};
use hotspot_mapper::loader::{self, LoadResult, IMAGE_EXTENSIONS};
use renderer::Renderer;

use winit::{
    dpi::LogicalSize,
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowBuilder},
};

fn init_logging(filter: &str) {
    // RUST_LOG wins over the configured filter
    let env = env_logger::Env::default().default_filter_or(filter.to_string());
    env_logger::Builder::from_env(env).format_timestamp_millis().init();
}

fn pick_image() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter(&tr("file.filter.images"), &IMAGE_EXTENSIONS)
        .pick_file()
}

fn start_load(app: &mut EditorApp, path: PathBuf, tx: &Sender<LoadResult>) {
    if !loader::is_supported(&path) {
        log::warn!("ignoring unsupported file {}", path.display());
        return;
    }
    app.loading += 1;
    loader::spawn_load(path, tx.clone());
}

fn toggle_fullscreen(app: &mut EditorApp, window: &Window) {
    app.is_fullscreen = !app.is_fullscreen;
    if app.is_fullscreen {
        window.set_fullscreen(Some(Fullscreen::Borderless(None)));
    } else {
        window.set_fullscreen(None);
    }
}

fn main() {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            log::error!("invalid configuration: {e}");
            std::process::exit(2);
        }
    };
    init_logging(&config.log_filter);
    for arg in &config.ignored_args {
        log::warn!("ignoring unknown argument {arg}");
    }
    i18n::init(config.lang.clone());
    log::info!("starting in {:?} mode", config.mode);

    let mut app = EditorApp::new(config);

    let event_loop = EventLoop::new();
    let window = match WindowBuilder::new()
        .with_title(app.title())
        .with_inner_size(LogicalSize::new(1280, 720))
        .build(&event_loop)
    {
        Ok(w) => Arc::new(w),
        Err(e) => {
            log::error!("cannot create window: {e}");
            std::process::exit(1);
        }
    };

    let mut renderer = match pollster::block_on(Renderer::new(window.clone())) {
        Ok(r) => r,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };
    app.max_texture_side = renderer.max_texture_side();

    let mut last_frame_time = Instant::now();
    let mut frame_count = 0;
    let mut fps = 0.0;

    // handle url of the panorama currently uploaded to the GPU
    let mut bound_panorama: Option<String> = None;

    let (tx, rx): (Sender<LoadResult>, Receiver<LoadResult>) = channel();

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        while let Ok(result) = rx.try_recv() {
            app.on_image_loaded(result);
        }

        match event {
            Event::WindowEvent { event, .. } => {
                let response = renderer.egui_state.on_event(&renderer.egui_ctx, &event);
                if response.consumed {
                    return;
                }

                match event {
                    WindowEvent::CloseRequested => {
                        *control_flow = ControlFlow::Exit;
                    }

                    WindowEvent::Resized(new_size) => {
                        renderer.resize(new_size);
                    }

                    WindowEvent::ScaleFactorChanged { new_inner_size, scale_factor } => {
                        renderer.egui_state.set_pixels_per_point(scale_factor as f32);
                        renderer.resize(*new_inner_size);
                    }

                    WindowEvent::KeyboardInput { input, .. } if input.state == ElementState::Pressed => {
                        match input.virtual_keycode {
                            Some(VirtualKeyCode::O) => {
                                if let Some(path) = pick_image() {
                                    start_load(&mut app, path, &tx);
                                }
                            }
                            Some(VirtualKeyCode::F11) => toggle_fullscreen(&mut app, &window),
                            _ => {}
                        }
                    }

                    WindowEvent::DroppedFile(path) => {
                        start_load(&mut app, path, &tx);
                    }

                    _ => {}
                }
            }

            Event::RedrawRequested(_) => {
                frame_count += 1;
                let now = Instant::now();
                let elapsed = now.duration_since(last_frame_time).as_secs_f32();
                if elapsed >= 1.0 {
                    fps = frame_count as f32 / elapsed;
                    frame_count = 0;
                    last_frame_time = now;
                }

                match app.panorama_file() {
                    Some((url, pixels)) if bound_panorama.as_deref() != Some(url.as_str()) => {
                        renderer.load_panorama(&pixels);
                        bound_panorama = Some(url);
                    }
                    Some(_) => {}
                    None if bound_panorama.is_some() => {
                        renderer.clear_panorama();
                        bound_panorama = None;
                    }
                    None => {}
                }

                let mut actions = None;
                let render_result = renderer.render_with_ui(&window, |ctx| {
                    let (a, scene) = app.draw_ui(ctx, fps);
                    actions = Some(a);
                    scene
                });

                if let Some(actions) = actions {
                    if actions.open_dialog {
                        if let Some(path) = pick_image() {
                            start_load(&mut app, path, &tx);
                        }
                    }
                    if let Some(id) = actions.replace_file {
                        if let Some(path) = pick_image() {
                            if loader::is_supported(&path) {
                                app.queue_replacement(path.clone(), id);
                            }
                            start_load(&mut app, path, &tx);
                        }
                    }
                    if actions.toggle_fullscreen {
                        toggle_fullscreen(&mut app, &window);
                    }
                    if actions.lang_changed {
                        window.set_title(&app.title());
                    }
                    if actions.exit {
                        *control_flow = ControlFlow::Exit;
                    }
                }

                match render_result {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => renderer.resize(renderer.size),
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("GPU out of memory");
                        *control_flow = ControlFlow::Exit;
                    }
                    Err(e) => log::warn!("render error: {e:?}"),
                }
            }

            Event::MainEventsCleared => {
                window.request_redraw();
            }

            Event::LoopDestroyed => {
                log::info!(
                    "exiting; image handles acquired {}, released {}",
                    app.ledger.acquired(),
                    app.ledger.released()
                );
            }

            _ => {}
        }
    });
}
