//! Scanline decoder for linear retail symbologies: EAN-13, UPC-A and EAN-8.
//!
//! Each sampled row is binarized at the midpoint of its own luminance range
//! and turned into alternating bar/space runs. Candidate symbols are located
//! by their start guard, checked for quiet zones and guard widths, and every
//! digit is matched against the module-width tables by least total error.
//! Rows are also read right-to-left so upside-down packages decode.

use std::collections::BTreeSet;

use image::GrayImage;

use super::SymbolFormat;

/// Rows flatter than this (max - min luminance) are skipped.
const MIN_ROW_CONTRAST: u8 = 48;
/// Largest summed deviation, in modules, accepted for one digit.
const MAX_DIGIT_ERROR: f32 = 1.2;
/// Guard elements may be this far from one module wide.
const GUARD_TOLERANCE: f32 = 0.5;
/// Light margin required on both sides, in modules.
const QUIET_ZONE_MODULES: f32 = 3.0;
/// Rows sampled on each side of the centre line.
const ROWS_PER_SIDE: u32 = 12;

const EAN13_RUNS: usize = 59;
const EAN13_MODULES: f32 = 95.0;
const EAN8_RUNS: usize = 43;
const EAN8_MODULES: f32 = 67.0;

/// Module widths of the L set (space first). R codes share these widths but
/// start with a bar; G codes are the same widths reversed.
const L_WIDTHS: [[u8; 4]; 10] = [
    [3, 2, 1, 1],
    [2, 2, 2, 1],
    [2, 1, 2, 2],
    [1, 4, 1, 1],
    [1, 1, 3, 2],
    [1, 2, 3, 1],
    [1, 1, 1, 4],
    [1, 3, 1, 2],
    [1, 2, 1, 3],
    [3, 1, 1, 2],
];

/// L/G parity of the six left-hand digits for each implied leading digit.
/// Bit 5 is the first left digit; a set bit means G.
const FIRST_DIGIT_PARITY: [u8; 10] = [0x00, 0x0B, 0x0D, 0x0E, 0x13, 0x19, 0x1C, 0x15, 0x16, 0x1A];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeSet {
    L,
    G,
}

impl CodeSet {
    fn widths(self, digit: u8) -> [u8; 4] {
        let [a, b, c, d] = L_WIDTHS[digit as usize];
        match self {
            CodeSet::L => [a, b, c, d],
            CodeSet::G => [d, c, b, a],
        }
    }

    fn flipped(self) -> Self {
        match self {
            CodeSet::L => CodeSet::G,
            CodeSet::G => CodeSet::L,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    dark: bool,
    width: u32,
}

/// A decoded linear symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearMatch {
    pub text: String,
    pub format: SymbolFormat,
}

/// Software decoder restricted to the requested formats.
#[derive(Debug, Clone)]
pub struct LinearDecoder {
    ean13: bool,
    upca: bool,
    ean8: bool,
}

impl LinearDecoder {
    pub const SUPPORTED: [SymbolFormat; 3] =
        [SymbolFormat::Ean13, SymbolFormat::UpcA, SymbolFormat::Ean8];

    pub fn new(formats: &BTreeSet<SymbolFormat>) -> Self {
        Self {
            ean13: formats.contains(&SymbolFormat::Ean13),
            upca: formats.contains(&SymbolFormat::UpcA),
            ean8: formats.contains(&SymbolFormat::Ean8),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ean13 || self.upca || self.ean8
    }

    /// First symbol found scanning rows outward from the centre.
    pub fn decode(&self, gray: &GrayImage) -> Option<LinearMatch> {
        if !self.is_enabled() || gray.width() == 0 {
            return None;
        }
        let width = gray.width() as usize;
        let raw = gray.as_raw();
        scan_rows(gray.height()).into_iter().find_map(|y| {
            let start = y as usize * width;
            self.decode_row(&raw[start..start + width])
        })
    }

    pub fn decode_row(&self, row: &[u8]) -> Option<LinearMatch> {
        let runs = binarize_row(row)?;
        if let Some(found) = self.decode_runs(&runs, false) {
            return Some(found);
        }
        // Same runs, read with the right-to-left tables.
        self.decode_runs(&runs, true)
    }

    fn decode_runs(&self, runs: &[Run], reversed: bool) -> Option<LinearMatch> {
        for start in 1..runs.len() {
            if !runs[start].dark {
                continue;
            }
            if self.ean13 || self.upca {
                if let Some(found) = decode_ean13(runs, start, reversed)
                    .and_then(|digits| self.classify_ean13(digits))
                {
                    return Some(found);
                }
            }
            if self.ean8 {
                if let Some(text) = decode_ean8(runs, start, reversed) {
                    return Some(LinearMatch {
                        text,
                        format: SymbolFormat::Ean8,
                    });
                }
            }
        }
        None
    }

    /// UPC-A is EAN-13 with a leading zero; report it as 12 digits when asked for.
    fn classify_ean13(&self, digits: String) -> Option<LinearMatch> {
        if self.upca {
            if let Some(upc) = digits.strip_prefix('0') {
                return Some(LinearMatch {
                    text: upc.to_string(),
                    format: SymbolFormat::UpcA,
                });
            }
        }
        self.ean13.then_some(LinearMatch {
            text: digits,
            format: SymbolFormat::Ean13,
        })
    }
}

fn scan_rows(height: u32) -> Vec<u32> {
    if height == 0 {
        return Vec::new();
    }
    let middle = height / 2;
    let step = (height / (2 * ROWS_PER_SIDE + 1)).max(1);
    let mut rows = vec![middle];
    for k in 1..=ROWS_PER_SIDE {
        let offset = k * step;
        if middle + offset < height {
            rows.push(middle + offset);
        }
        if offset <= middle {
            rows.push(middle - offset);
        }
    }
    rows
}

fn binarize_row(row: &[u8]) -> Option<Vec<Run>> {
    let first = *row.first()?;
    let (min, max) = row
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &value| (lo.min(value), hi.max(value)));
    if max - min < MIN_ROW_CONTRAST {
        return None;
    }
    let threshold = ((u16::from(min) + u16::from(max)) / 2) as u8;

    let mut runs = Vec::new();
    let mut current = Run {
        dark: first < threshold,
        width: 0,
    };
    for &value in row {
        let dark = value < threshold;
        if dark == current.dark {
            current.width += 1;
        } else {
            runs.push(current);
            current = Run { dark, width: 1 };
        }
    }
    runs.push(current);
    Some(runs)
}

fn total_width(runs: &[Run]) -> f32 {
    runs.iter().map(|run| run.width as f32).sum()
}

fn quiet_zones_ok(runs: &[Run], start: usize, len: usize, module: f32) -> bool {
    let min_quiet = QUIET_ZONE_MODULES * module;
    let before = runs[start - 1];
    let after = match runs.get(start + len) {
        Some(run) => *run,
        None => return false,
    };
    !before.dark
        && !after.dark
        && before.width as f32 >= min_quiet
        && after.width as f32 >= min_quiet
}

fn guards_ok(guard: &[Run], module: f32) -> bool {
    guard
        .iter()
        .all(|run| (run.width as f32 / module - 1.0).abs() <= GUARD_TOLERANCE)
}

fn match_digit(runs: &[Run], sets: &[CodeSet]) -> Option<(u8, CodeSet)> {
    let total: u32 = runs.iter().map(|run| run.width).sum();
    if total == 0 {
        return None;
    }
    let scale = 7.0 / total as f32;

    let mut best: Option<(f32, u8, CodeSet)> = None;
    for &set in sets {
        for digit in 0..10u8 {
            let error: f32 = runs
                .iter()
                .zip(set.widths(digit))
                .map(|(run, modules)| (run.width as f32 * scale - f32::from(modules)).abs())
                .sum();
            if best.map_or(true, |(best_error, _, _)| error < best_error) {
                best = Some((error, digit, set));
            }
        }
    }

    let (error, digit, set) = best?;
    (error <= MAX_DIGIT_ERROR).then_some((digit, set))
}

fn read_digits(runs: &[Run], sets: &[CodeSet]) -> Option<Vec<(u8, CodeSet)>> {
    runs.chunks_exact(4)
        .map(|chunk| match_digit(chunk, sets))
        .collect()
}

/// Map halves read right-to-left back onto the printed left/right halves.
///
/// Read backwards, R codes look like G codes and L/G codes swap, so the
/// first half read is the printed right half and the second half carries
/// flipped parity.
fn orient(
    first: Vec<(u8, CodeSet)>,
    second: Vec<(u8, CodeSet)>,
    reversed: bool,
) -> (Vec<(u8, CodeSet)>, Vec<(u8, CodeSet)>) {
    if !reversed {
        return (first, second);
    }
    let left = second
        .into_iter()
        .rev()
        .map(|(digit, set)| (digit, set.flipped()))
        .collect();
    let right = first.into_iter().rev().collect();
    (left, right)
}

/// GS1 mod-10: the rightmost data digit carries weight 3, alternating leftward.
fn checksum_ok(digits: &[u8]) -> bool {
    let Some((&check, data)) = digits.split_last() else {
        return false;
    };
    let sum: u32 = data
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &digit)| u32::from(digit) * if i % 2 == 0 { 3 } else { 1 })
        .sum();
    (10 - sum % 10) % 10 == u32::from(check)
}

fn to_text(digits: &[u8]) -> String {
    digits.iter().map(|digit| char::from(b'0' + digit)).collect()
}

fn decode_ean13(runs: &[Run], start: usize, reversed: bool) -> Option<String> {
    if start == 0 || start + EAN13_RUNS > runs.len() {
        return None;
    }
    let symbol = &runs[start..start + EAN13_RUNS];
    let module = total_width(symbol) / EAN13_MODULES;
    if !quiet_zones_ok(runs, start, EAN13_RUNS, module)
        || !guards_ok(&symbol[0..3], module)
        || !guards_ok(&symbol[27..32], module)
        || !guards_ok(&symbol[56..59], module)
    {
        return None;
    }

    let (first_sets, second_sets): (&[CodeSet], &[CodeSet]) = if reversed {
        (&[CodeSet::G], &[CodeSet::L, CodeSet::G])
    } else {
        (&[CodeSet::L, CodeSet::G], &[CodeSet::L])
    };
    let first = read_digits(&symbol[3..27], first_sets)?;
    let second = read_digits(&symbol[32..56], second_sets)?;
    let (left, right) = orient(first, second, reversed);

    let parity = left
        .iter()
        .enumerate()
        .filter(|(_, (_, set))| *set == CodeSet::G)
        .fold(0u8, |mask, (i, _)| mask | 1 << (5 - i));
    let lead = FIRST_DIGIT_PARITY.iter().position(|&p| p == parity)? as u8;

    let digits: Vec<u8> = std::iter::once(lead)
        .chain(left.iter().map(|(digit, _)| *digit))
        .chain(right.iter().map(|(digit, _)| *digit))
        .collect();
    checksum_ok(&digits).then(|| to_text(&digits))
}

fn decode_ean8(runs: &[Run], start: usize, reversed: bool) -> Option<String> {
    if start == 0 || start + EAN8_RUNS > runs.len() {
        return None;
    }
    let symbol = &runs[start..start + EAN8_RUNS];
    let module = total_width(symbol) / EAN8_MODULES;
    if !quiet_zones_ok(runs, start, EAN8_RUNS, module)
        || !guards_ok(&symbol[0..3], module)
        || !guards_ok(&symbol[19..24], module)
        || !guards_ok(&symbol[40..43], module)
    {
        return None;
    }

    let sets: &[CodeSet] = if reversed { &[CodeSet::G] } else { &[CodeSet::L] };
    let first = read_digits(&symbol[3..19], sets)?;
    let second = read_digits(&symbol[24..40], sets)?;
    let (left, right) = orient(first, second, reversed);

    let digits: Vec<u8> = left
        .iter()
        .chain(right.iter())
        .map(|(digit, _)| *digit)
        .collect();
    checksum_ok(&digits).then(|| to_text(&digits))
}
