#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};

use masbarato_lib::camera::{CameraBridge, CaptureDevice, PermissionState};
use masbarato_lib::decode::DecodedSymbol;
use masbarato_lib::guidance::GuidanceHint;
use masbarato_lib::{ErrorKind, ScanConfig, ScanListener, ScanSessionState};

const LEFT_ODD: [&str; 10] = [
    "0001101", "0011001", "0010011", "0111101", "0100011", "0110001", "0101111", "0111011",
    "0110111", "0001011",
];
const LEFT_EVEN: [&str; 10] = [
    "0100111", "0110011", "0011011", "0100001", "0011101", "0111001", "0000101", "0010001",
    "0001001", "0010111",
];
const RIGHT: [&str; 10] = [
    "1110010", "1100110", "1101100", "1000010", "1011100", "1001110", "1010000", "1000100",
    "1001000", "1110100",
];
/// 'O' = odd (L) set, 'E' = even (G) set, indexed by the leading digit.
const PARITY: [&str; 10] = [
    "OOOOOO", "OOEOEE", "OOEEOE", "OOEEEO", "OEOOEE", "OEEOOE", "OEEEOO", "OEOEOE", "OEOEEO",
    "OEEOEO",
];

/// Module pattern of a 13-digit EAN, '1' for bars.
pub fn ean13_modules(code: &str) -> String {
    let digits: Vec<usize> = code
        .chars()
        .map(|c| c.to_digit(10).expect("digit") as usize)
        .collect();
    assert_eq!(digits.len(), 13);

    let mut modules = String::from("101");
    for (i, parity) in PARITY[digits[0]].chars().enumerate() {
        let table = if parity == 'O' { &LEFT_ODD } else { &LEFT_EVEN };
        modules.push_str(table[digits[i + 1]]);
    }
    modules.push_str("01010");
    for &digit in &digits[7..] {
        modules.push_str(RIGHT[digit]);
    }
    modules.push_str("101");
    modules
}

/// A camera frame showing `code` across its full height with a quiet zone.
pub fn barcode_frame(code: &str, dark: u8, light: u8) -> RgbImage {
    let modules: Vec<bool> = ean13_modules(code).chars().map(|c| c == '1').collect();
    let unit = 3u32;
    let quiet = 12u32;
    let width = (modules.len() as u32 + 2 * quiet) * unit;
    RgbImage::from_fn(width, 48, |x, _| {
        let module = (x / unit) as i64 - quiet as i64;
        let is_bar = module >= 0 && (module as usize) < modules.len() && modules[module as usize];
        let value = if is_bar { dark } else { light };
        Rgb([value, value, value])
    })
}

pub fn blank_frame() -> RgbImage {
    RgbImage::from_pixel(200, 48, Rgb([230, 230, 230]))
}

pub fn granted_bridge() -> CameraBridge {
    let bridge = CameraBridge::new();
    bridge.set_devices(vec![
        CaptureDevice::new("front-0", "Front Camera"),
        CaptureDevice::new("back-0", "Back Camera"),
    ]);
    bridge.set_permission(PermissionState::Granted);
    bridge
}

/// Short timings so sessions react within a test's patience.
pub fn fast_config() -> ScanConfig {
    ScanConfig {
        native_poll_ms: 20,
        fallback_interval_ms: 20,
        detection_pause_ms: 150,
        cooldown_ms: 60_000,
        ..ScanConfig::default()
    }
}

#[derive(Default)]
pub struct Recorder {
    pub detected: Mutex<Vec<DecodedSymbol>>,
    pub errors: Mutex<Vec<(ErrorKind, String)>>,
    pub hints: Mutex<Vec<GuidanceHint>>,
    pub states: Mutex<Vec<ScanSessionState>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn detected_values(&self) -> Vec<String> {
        self.detected
            .lock()
            .unwrap()
            .iter()
            .map(|symbol| symbol.value.clone())
            .collect()
    }

    pub fn error_kinds(&self) -> Vec<ErrorKind> {
        self.errors.lock().unwrap().iter().map(|(kind, _)| *kind).collect()
    }

    pub fn states(&self) -> Vec<ScanSessionState> {
        self.states.lock().unwrap().clone()
    }
}

impl ScanListener for Recorder {
    fn on_detected(&self, symbol: &DecodedSymbol) {
        self.detected.lock().unwrap().push(symbol.clone());
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        self.errors.lock().unwrap().push((kind, message.to_string()));
    }

    fn on_hint(&self, hint: &GuidanceHint) {
        self.hints.lock().unwrap().push(hint.clone());
    }

    fn on_state_changed(&self, state: &ScanSessionState) {
        self.states.lock().unwrap().push(state.clone());
    }
}

/// Poll `condition` every 10 ms for up to two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
