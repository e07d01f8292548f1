//! Application state and Tauri command handlers.
//!
//! This is the glue that binds the webview form to the form, capture and
//! push modules. Every form mutation is echoed back as a `form-changed`
//! event carrying the full snapshot, room link included.

use crate::capture::{self, ScanEvent, ScanHandle, WebcamOpener};
use crate::form::{ApnsHost, FormConfig, FormField};
use crate::push;
use tauri::{AppHandle, Emitter, Manager, State};
use tauri_plugin_dialog::DialogExt;
use tauri_plugin_shell::ShellExt;
use tokio::sync::{Mutex, oneshot};
use tracing::{error, info, warn};

/// Shared application state managed by Tauri.
pub struct AppState {
    form: Mutex<FormConfig>,
    /// Active QR scan (if any). At most one camera is open at a time.
    scan: Mutex<Option<ScanHandle>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            form: Mutex::new(FormConfig::default()),
            scan: Mutex::new(None),
        }
    }

    /// Stop scanning and wait until the camera is released.
    pub async fn stop_scanner(&self) {
        if let Some(handle) = self.scan.lock().await.take() {
            handle.stop().await;
        }
    }
}

fn emit_form(app: &AppHandle, form: &FormConfig) {
    if let Err(e) = app.emit("form-changed", form) {
        warn!("Failed to emit form-changed: {e}");
    }
}

fn emit_scanning(app: &AppHandle, scanning: bool) {
    let _ = app.emit("scan-state", scanning);
}

/// Runs on the scan task for every capture event.
///
/// `scan-state` is the only thing that drives the scan button; it is derived
/// from the event stream so it cannot disagree with the camera.
fn on_scan_event(app: &AppHandle, event: ScanEvent) {
    if let Some(scanning) = event.scanning() {
        emit_scanning(app, scanning);
    }
    match event {
        ScanEvent::Started | ScanEvent::Stopped => {}
        ScanEvent::OpenFailed(reason) => {
            // Retrying is a matter of pressing the button again.
            warn!("QR scan not started: {reason}");
        }
        ScanEvent::Preview(url) => {
            let _ = app.emit("scan-preview", url);
        }
        ScanEvent::Decoded(token) => {
            let state = app.state::<AppState>();
            let mut form = state.form.blocking_lock();
            form.set_device_token(token);
            emit_form(app, &form);
        }
    }
}

/// Current form snapshot.
#[tauri::command]
pub async fn get_form(state: State<'_, AppState>) -> Result<FormConfig, String> {
    Ok(state.form.lock().await.clone())
}

/// The APNs hosts the host selector offers.
#[tauri::command]
pub fn list_apns_hosts() -> Vec<&'static str> {
    ApnsHost::ALL.iter().map(ApnsHost::as_str).collect()
}

/// Apply one edited field.
#[tauri::command]
pub async fn update_field(
    state: State<'_, AppState>,
    app: AppHandle,
    field: FormField,
    value: String,
) -> Result<FormConfig, String> {
    let mut form = state.form.lock().await;
    form.set_field(field, &value).map_err(|e| e.to_string())?;
    emit_form(&app, &form);
    Ok(form.clone())
}

/// Pick the certificate or key file with the native file dialog.
#[tauri::command]
pub async fn browse_file(
    state: State<'_, AppState>,
    app: AppHandle,
    field: FormField,
) -> Result<FormConfig, String> {
    if !matches!(field, FormField::CertFile | FormField::KeyFile) {
        return Err(format!("{field:?} is not a file field"));
    }

    let (tx, rx) = oneshot::channel();
    app.dialog().file().pick_file(move |picked| {
        let _ = tx.send(picked);
    });
    let picked = rx.await.map_err(|e| e.to_string())?;

    let mut form = state.form.lock().await;
    if let Some(picked) = picked {
        let path = picked.into_path().map_err(|e| e.to_string())?;
        form.set_field(field, &path.to_string_lossy())
            .map_err(|e| e.to_string())?;
        emit_form(&app, &form);
    }
    Ok(form.clone())
}

/// Start scanning for a device token QR code, or stop a running scan.
/// The outcome reaches the UI as `scan-state` events only.
#[tauri::command]
pub async fn toggle_scanner(state: State<'_, AppState>, app: AppHandle) -> Result<(), String> {
    let mut scan_guard = state.scan.lock().await;

    // A finished handle is a scan that ended by itself; start a new one.
    if let Some(handle) = scan_guard.take() {
        if !handle.is_finished() {
            handle.stop().await;
            return Ok(());
        }
    }

    let app_clone = app.clone();
    let handle = capture::start_scan(WebcamOpener::default(), move |event| {
        on_scan_event(&app_clone, event)
    });
    *scan_guard = Some(handle);
    info!("QR scan requested");

    Ok(())
}

/// Send the VoIP push that starts the call.
#[tauri::command]
pub async fn start_call(state: State<'_, AppState>) -> Result<String, String> {
    let form = state.form.lock().await.clone();
    info!(
        "Starting call in room {} for token {}",
        form.room_alias(),
        form.device_token()
    );

    let receipt = push::send_push(&form).await.map_err(|e| {
        error!("Push failed: {e}");
        e.to_string()
    })?;

    Ok(match receipt.apns_id {
        Some(id) => format!("Push sent ({}), apns-id {id}", receipt.status),
        None => format!("Push sent ({})", receipt.status),
    })
}

/// Open the room link in the system browser.
#[tauri::command]
#[allow(deprecated)]
pub async fn open_room_link(state: State<'_, AppState>, app: AppHandle) -> Result<(), String> {
    let link = state.form.lock().await.room_link().to_string();
    app.shell().open(link, None).map_err(|e| e.to_string())
}
