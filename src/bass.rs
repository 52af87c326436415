// BASS audio library bindings, loaded at runtime, and the stream-URL playback backend
use libloading::{Library, Symbol};
use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_uint, c_ulong, c_void};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::PlaybackError;
use crate::playback::{PlaybackHandle, PlaybackService};
use crate::settings::EngineSettings;
use crate::track::Locator;

pub type DownloadProc = unsafe extern "C" fn(buffer: *const c_void, length: c_uint, user: *mut c_void);

pub type BassInit = unsafe extern "system" fn(device: c_int, freq: c_uint, flags: c_uint, win: *mut c_void, dsguid: *mut c_void) -> c_int;
pub type BassFree = unsafe extern "system" fn() -> c_int;
pub type BassSetConfig = unsafe extern "system" fn(option: c_uint, value: c_uint) -> c_uint;
pub type BassSetConfigPtr = unsafe extern "system" fn(option: c_uint, value: *const u8) -> c_uint;
pub type BassStreamCreateUrl = unsafe extern "system" fn(url: *const c_char, offset: c_ulong, flags: c_uint, proc_: Option<DownloadProc>, user: *mut c_void) -> u32;
pub type BassStreamFree = unsafe extern "system" fn(handle: u32) -> c_int;
pub type BassChannelPlay = unsafe extern "system" fn(handle: u32, restart: c_int) -> c_int;
pub type BassChannelStop = unsafe extern "system" fn(handle: u32) -> c_int;
pub type BassChannelSetAttribute = unsafe extern "system" fn(handle: u32, attrib: c_uint, value: f32) -> c_int;
pub type BassErrorGetCode = unsafe extern "system" fn() -> c_int;

pub const BASS_DEVICE_DEFAULT: c_int = -1;
pub const BASS_CONFIG_BUFFER: c_uint = 0;
pub const BASS_CONFIG_NET_BUFFER: c_uint = 10;
pub const BASS_CONFIG_NET_TIMEOUT: c_uint = 11;
pub const BASS_CONFIG_NET_AGENT: c_uint = 16;

pub const BASS_STREAM_BLOCK: c_uint = 0x100000;
pub const BASS_STREAM_STATUS: c_uint = 0x800000;

pub const BASS_ATTRIB_VOL: c_uint = 2;

pub const BASS_ERROR_ALREADY: c_int = 14;
pub const BASS_ERROR_WASAPI: c_int = 48;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36\0";

fn candidate_paths() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["bass.dll", "./bass.dll", "./bin/bass.dll", "bin/bass.dll"]
    } else if cfg!(target_os = "macos") {
        &["libbass.dylib", "./libbass.dylib", "./bin/libbass.dylib", "bin/libbass.dylib"]
    } else {
        &["libbass.so", "./libbass.so", "./bin/libbass.so", "bin/libbass.so"]
    }
}

/// Load the BASS shared library, preferring an explicitly configured path
pub fn load_bass_library(custom: Option<&Path>) -> Result<Library, PlaybackError> {
    let mut attempts: Vec<PathBuf> = Vec::new();
    if let Some(path) = custom {
        attempts.push(path.to_path_buf());
    }
    attempts.extend(candidate_paths().iter().map(PathBuf::from));

    for path in &attempts {
        if let Ok(lib) = unsafe { Library::new(path) } {
            crate::log_info!("[bass] Loaded BASS library from: {}", path.display());
            return Ok(lib);
        }
    }

    Err(PlaybackError::Unavailable(format!(
        "could not load the BASS library (tried {})",
        attempts
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )))
}

/// Human-readable name for a BASS error code
pub fn bass_error_name(code: c_int) -> &'static str {
    match code {
        0 => "BASS_OK",
        1 => "BASS_ERROR_MEM: Memory error",
        2 => "BASS_ERROR_FILEOPEN: Can't open the file",
        3 => "BASS_ERROR_DRIVER: Can't find a free/valid driver",
        5 => "BASS_ERROR_HANDLE: Invalid handle",
        6 => "BASS_ERROR_FORMAT: Unsupported sample format",
        8 => "BASS_ERROR_INIT: BASS_Init has not been successfully called",
        14 => "BASS_ERROR_ALREADY: Already initialized",
        18 => "BASS_ERROR_NOCHAN: Can't get a free channel",
        20 => "BASS_ERROR_ILLPARAM: An illegal parameter was specified",
        23 => "BASS_ERROR_DEVICE: Illegal device number",
        25 => "BASS_ERROR_FREQ: Illegal sample rate",
        32 => "BASS_ERROR_NONET: No internet connection could be opened",
        37 => "BASS_ERROR_NOTAVAIL: Requested data is not available",
        40 => "BASS_ERROR_TIMEOUT: Connection timed out",
        41 => "BASS_ERROR_FILEFORM: Unsupported file format",
        44 => "BASS_ERROR_CODEC: Codec is not available/supported",
        46 => "BASS_ERROR_BUSY: The device is busy",
        47 => "BASS_ERROR_UNSTREAMABLE: Unstreamable file",
        48 => "BASS_ERROR_WASAPI: WASAPI is not available",
        _ => "BASS unknown error",
    }
}

pub fn error_get_code(lib: &Library) -> c_int {
    unsafe {
        let f: Symbol<BassErrorGetCode> = match lib.get(b"BASS_ErrorGetCode") { Ok(f) => f, Err(_) => return -1 };
        f()
    }
}

pub fn bass_err(lib: &Library) -> String {
    let code = error_get_code(lib);
    format!("{} ({})", bass_error_name(code), code)
}

// ---- Thin wrappers over BASS symbols ----

pub fn bass_init(lib: &Library, device: c_int, freq: c_uint, flags: c_uint) -> c_int {
    unsafe {
        let f: Symbol<BassInit> = match lib.get(b"BASS_Init") { Ok(f) => f, Err(_) => return 0 };
        f(device, freq, flags, std::ptr::null_mut(), std::ptr::null_mut())
    }
}

pub fn bass_free(lib: &Library) -> c_int {
    unsafe {
        let f: Symbol<BassFree> = match lib.get(b"BASS_Free") { Ok(f) => f, Err(_) => return 0 };
        f()
    }
}

pub fn bass_set_config(lib: &Library, option: c_uint, value: c_uint) -> c_uint {
    unsafe {
        let f: Symbol<BassSetConfig> = match lib.get(b"BASS_SetConfig") { Ok(f) => f, Err(_) => return 0 };
        f(option, value)
    }
}

pub fn bass_set_config_ptr(lib: &Library, option: c_uint, value: *const u8) -> c_uint {
    unsafe {
        let f: Symbol<BassSetConfigPtr> = match lib.get(b"BASS_SetConfigPtr") { Ok(f) => f, Err(_) => return 0 };
        f(option, value)
    }
}

pub fn stream_create_url(lib: &Library, url: &CString, flags: c_uint) -> u32 {
    unsafe {
        let f: Symbol<BassStreamCreateUrl> = match lib.get(b"BASS_StreamCreateURL") { Ok(f) => f, Err(_) => return 0 };
        f(url.as_ptr(), 0, flags, None, std::ptr::null_mut())
    }
}

pub fn stream_free(lib: &Library, handle: u32) -> c_int {
    unsafe {
        let f: Symbol<BassStreamFree> = match lib.get(b"BASS_StreamFree") { Ok(f) => f, Err(_) => return 0 };
        f(handle)
    }
}

pub fn channel_play(lib: &Library, handle: u32, restart: c_int) -> c_int {
    unsafe {
        let f: Symbol<BassChannelPlay> = match lib.get(b"BASS_ChannelPlay") { Ok(f) => f, Err(_) => return 0 };
        f(handle, restart)
    }
}

pub fn channel_stop(lib: &Library, handle: u32) -> c_int {
    unsafe {
        let f: Symbol<BassChannelStop> = match lib.get(b"BASS_ChannelStop") { Ok(f) => f, Err(_) => return 0 };
        f(handle)
    }
}

pub fn channel_set_attribute(lib: &Library, handle: u32, attrib: c_uint, value: f32) -> c_int {
    unsafe {
        let f: Symbol<BassChannelSetAttribute> = match lib.get(b"BASS_ChannelSetAttribute") { Ok(f) => f, Err(_) => return 0 };
        f(handle, attrib, value)
    }
}

/// An initialized output device; freed when the last stream and backend drop
struct BassDevice {
    lib: Library,
}

impl Drop for BassDevice {
    fn drop(&mut self) {
        bass_free(&self.lib);
        crate::log_debug!("[bass] Device freed");
    }
}

/// Plays remote streams through BASS
pub struct BassPlayback {
    device: Arc<BassDevice>,
    volume: f32,
}

impl BassPlayback {
    pub fn load(settings: &EngineSettings) -> Result<Self, PlaybackError> {
        let lib = load_bass_library(settings.bass_library.as_deref())?;

        // Buffer length must be configured before init
        bass_set_config(&lib, BASS_CONFIG_BUFFER, settings.buffer_size_ms);

        if bass_init(&lib, BASS_DEVICE_DEFAULT, 44100, 0) == 0 {
            let code = error_get_code(&lib);
            if code == BASS_ERROR_ALREADY {
                crate::log_info!("[bass] Already initialized, continuing");
            } else if code == BASS_ERROR_WASAPI && bass_init(&lib, BASS_DEVICE_DEFAULT, 48000, 0) != 0 {
                crate::log_info!("[bass] Initialized at 48000 Hz fallback");
            } else {
                return Err(PlaybackError::Init(format!("{} ({})", bass_error_name(code), code)));
            }
        }

        bass_set_config(&lib, BASS_CONFIG_NET_TIMEOUT, settings.net_timeout_ms);
        bass_set_config(&lib, BASS_CONFIG_NET_BUFFER, settings.net_buffer_ms);
        bass_set_config_ptr(&lib, BASS_CONFIG_NET_AGENT, USER_AGENT.as_ptr());

        crate::log_info!(
            "[bass] Ready: buffer={}ms net_timeout={}ms net_buffer={}ms",
            settings.buffer_size_ms,
            settings.net_timeout_ms,
            settings.net_buffer_ms
        );

        Ok(Self {
            device: Arc::new(BassDevice { lib }),
            volume: settings.volume,
        })
    }
}

impl PlaybackService for BassPlayback {
    fn start(&self, locator: &Locator) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
        let url = CString::new(locator.as_str())
            .map_err(|_| PlaybackError::InvalidLocator(locator.to_string()))?;
        let lib = &self.device.lib;

        let handle = stream_create_url(lib, &url, BASS_STREAM_STATUS | BASS_STREAM_BLOCK);
        if handle == 0 {
            return Err(PlaybackError::Stream(bass_err(lib)));
        }

        // Owned from here on so every failure path frees the stream
        let mut stream = BassStream {
            device: Arc::clone(&self.device),
            handle,
            stopped: false,
            released: false,
        };

        channel_set_attribute(lib, handle, BASS_ATTRIB_VOL, self.volume);

        if channel_play(lib, handle, 0) == 0 {
            let err = bass_err(lib);
            stream.release();
            return Err(PlaybackError::Start(err));
        }

        crate::log_debug!("[bass] Stream {} playing", handle);
        Ok(Box::new(stream))
    }
}

struct BassStream {
    device: Arc<BassDevice>,
    handle: u32,
    stopped: bool,
    released: bool,
}

impl PlaybackHandle for BassStream {
    fn stop(&mut self) {
        if self.stopped || self.released {
            return;
        }
        self.stopped = true;
        channel_stop(&self.device.lib, self.handle);
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if stream_free(&self.device.lib, self.handle) == 0 {
            crate::log_warn!("[bass] Failed to free stream {}: {}", self.handle, bass_err(&self.device.lib));
        }
    }
}

impl Drop for BassStream {
    fn drop(&mut self) {
        self.stop();
        self.release();
    }
}
