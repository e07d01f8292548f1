//! callpusher — start a livedigital call on an iOS device with a VoIP push.
//!
//! Architecture:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     Form                              │
//! │  bundle id · APNs host · cert/key · token · room      │
//! └──────▲──────────────────────────────────┬────────────┘
//!        │ device token                     │ snapshot
//! ┌──────┴───────────────────┐   ┌──────────▼────────────┐
//! │  Capture                 │   │  Push                 │
//! │  camera → QR decode      │   │  mTLS HTTP/2 → APNs   │
//! └──────────────────────────┘   └───────────────────────┘
//! ```
//!
//! The core (`form`, `capture`, `push`) has no UI dependency. The Tauri
//! shell in `app` is built with the `desktop` feature.

#[cfg(feature = "desktop")]
pub mod app;
pub mod capture;
pub mod form;
pub mod push;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use app::AppState;
    use tauri::Manager;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "callpusher_lib=info,reqwest=warn".into()),
        )
        .init();

    tauri::Builder::default()
        .plugin(tauri_plugin_shell::init())
        .plugin(tauri_plugin_dialog::init())
        .manage(AppState::new())
        .invoke_handler(tauri::generate_handler![
            app::get_form,
            app::list_apns_hosts,
            app::update_field,
            app::browse_file,
            app::toggle_scanner,
            app::start_call,
            app::open_room_link,
        ])
        .on_window_event(|window, event| {
            // The camera must be released before the app tears down.
            if let tauri::WindowEvent::Destroyed = event {
                let state = window.state::<AppState>();
                tauri::async_runtime::block_on(state.stop_scanner());
            }
        })
        .run(tauri::generate_context!())
        .expect("error while running callpusher");
}
