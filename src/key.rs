//! The 24-key harmonic wheel and the semitone-shift relation between keys.
//!
//! Keys are stored by index: `index = (position - 1) * 2 + mode`, with mode
//! `A` (minor) = 0 and `B` (major) = 1. Transposing a key by one semitone keeps
//! its mode and moves it 7 positions around the wheel (5 positions for a
//! downward shift).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MixError;

/// Number of keys on the wheel.
pub const NUM_KEYS: usize = 24;

/// Key mode: the letter half of a Camelot code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// `A` keys.
    Minor,
    /// `B` keys.
    Major,
}

impl Mode {
    fn index(self) -> usize {
        match self {
            Mode::Minor => 0,
            Mode::Major => 1,
        }
    }

    /// Camelot letter for this mode.
    pub fn letter(self) -> char {
        match self {
            Mode::Minor => 'A',
            Mode::Major => 'B',
        }
    }
}

/// A key on the wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Key(u8);

/// Semitone transposition applied to a track's base key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Shift {
    /// One semitone down.
    Down,
    /// Untouched.
    #[default]
    Zero,
    /// One semitone up.
    Up,
}

/// How two keys sit relative to each other on the wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Identical keys.
    Same,
    /// Neighbouring positions, same mode (e.g. 8A / 9A, 12B / 1B).
    AdjacentSameMode,
    /// Same position, relative major/minor (e.g. 8A / 8B).
    SamePositionOtherMode,
    /// Anything else.
    Other,
}

// Pitch class (C = 0) of position 1 in each mode: 1A = Ab minor, 1B = B major.
const POSITION_ONE_PITCH: [u8; 2] = [8, 11];

const MINOR_NAMES: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];
const MAJOR_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

/// `SHIFT_TABLE[key * 3 + (shift + 1)]` = effective key index.
pub static SHIFT_TABLE: [u8; NUM_KEYS * 3] = build_shift_table();

const fn build_shift_table() -> [u8; NUM_KEYS * 3] {
    // Wheel offsets for shifts -1, 0, +1.
    let offsets = [5usize, 0, 7];
    let mut table = [0u8; NUM_KEYS * 3];
    let mut key = 0;
    while key < NUM_KEYS {
        let pos0 = key / 2;
        let mode = key % 2;
        let mut s = 0;
        while s < 3 {
            table[key * 3 + s] = (((pos0 + offsets[s]) % 12) * 2 + mode) as u8;
            s += 1;
        }
        key += 1;
    }
    table
}

const fn all_keys() -> [Key; NUM_KEYS] {
    let mut keys = [Key(0); NUM_KEYS];
    let mut i = 0;
    while i < NUM_KEYS {
        keys[i] = Key(i as u8);
        i += 1;
    }
    keys
}

impl Key {
    /// All 24 keys in index order (1A, 1B, 2A, ... 12B).
    pub const ALL: [Key; NUM_KEYS] = all_keys();

    /// Key at a storage index, if in range.
    pub fn from_index(index: usize) -> Option<Key> {
        (index < NUM_KEYS).then_some(Key(index as u8))
    }

    /// Key from a wheel position (1-12) and mode.
    pub fn new(position: u8, mode: Mode) -> Option<Key> {
        if !(1..=12).contains(&position) {
            return None;
        }
        Some(Key((position - 1) * 2 + mode.index() as u8))
    }

    /// Key from a pitch class (C = 0) and mode.
    pub fn from_pitch(pitch: u8, mode: Mode) -> Key {
        let base = POSITION_ONE_PITCH[mode.index()];
        // 7 is its own inverse mod 12.
        let pos0 = ((pitch % 12 + 12 - base) as usize * 7) % 12;
        Key((pos0 * 2 + mode.index()) as u8)
    }

    #[inline(always)]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Wheel position, 1-12.
    pub fn position(self) -> u8 {
        self.0 / 2 + 1
    }

    pub fn mode(self) -> Mode {
        if self.0 % 2 == 0 {
            Mode::Minor
        } else {
            Mode::Major
        }
    }

    /// Pitch class of the tonic, C = 0.
    pub fn pitch_class(self) -> u8 {
        let base = POSITION_ONE_PITCH[self.mode().index()] as usize;
        ((base + 7 * (self.position() as usize - 1)) % 12) as u8
    }

    /// Conventional name, e.g. "A minor" for 8A.
    pub fn name(self) -> String {
        let pitch = self.pitch_class() as usize;
        match self.mode() {
            Mode::Minor => format!("{} minor", MINOR_NAMES[pitch]),
            Mode::Major => format!("{} major", MAJOR_NAMES[pitch]),
        }
    }

    /// The key this one becomes under `shift`.
    #[inline(always)]
    pub fn shifted(self, shift: Shift) -> Key {
        Key(SHIFT_TABLE[self.index() * 3 + shift.index()])
    }

    /// The base keys that land on `self` under each shift, in shift order.
    pub fn shift_sources(self) -> [(Key, Shift); 3] {
        Shift::ALL.map(|s| (self.shifted(s.inverse()), s))
    }

    /// Where `other` sits relative to `self` on the wheel.
    pub fn relation(self, other: Key) -> Relation {
        if self == other {
            return Relation::Same;
        }
        let diff = self.position().abs_diff(other.position());
        let wheel_distance = diff.min(12 - diff);
        match (wheel_distance, self.mode() == other.mode()) {
            (0, false) => Relation::SamePositionOtherMode,
            (1, true) => Relation::AdjacentSameMode,
            _ => Relation::Other,
        }
    }

    /// Parse Camelot notation: "8A", "08a", "12B".
    pub fn parse_camelot(raw: &str) -> Option<Key> {
        let trimmed = raw.trim().to_ascii_uppercase();
        if trimmed.len() < 2 || !trimmed.is_ascii() {
            return None;
        }
        let (number, letter) = trimmed.split_at(trimmed.len() - 1);
        let mode = match letter {
            "A" => Mode::Minor,
            "B" => Mode::Major,
            _ => return None,
        };
        let position: u8 = number.parse().ok()?;
        Key::new(position, mode)
    }

    /// Parse standard notation: "Am", "C#m", "Bb major", "Eb minor", "F".
    pub fn parse_standard(raw: &str) -> Option<Key> {
        let normalized = raw
            .trim()
            .replace('\u{266F}', "#")
            .replace('\u{266D}', "b");
        let lower = normalized.to_ascii_lowercase();

        let (root, mode) = [
            ("minor", Mode::Minor),
            ("min", Mode::Minor),
            ("major", Mode::Major),
            ("maj", Mode::Major),
            ("m", Mode::Minor),
        ]
        .iter()
        .find(|(suffix, _)| lower.ends_with(suffix) && lower.len() > suffix.len())
        .map(|&(suffix, mode)| (&normalized[..normalized.len() - suffix.len()], mode))
        .unwrap_or((normalized.as_str(), Mode::Major));

        let mut chars = root.chars().filter(|c| !c.is_whitespace());
        let natural = match chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let pitch = match chars.next() {
            None => natural,
            Some('#') => natural + 1,
            Some('b') | Some('B') => natural + 11,
            Some(_) => return None,
        };
        if chars.next().is_some() {
            return None;
        }
        Some(Key::from_pitch(pitch % 12, mode))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.position(), self.mode().letter())
    }
}

impl FromStr for Key {
    type Err = MixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::parse_camelot(s)
            .or_else(|| Key::parse_standard(s))
            .ok_or_else(|| MixError::InvalidKey(s.to_string()))
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for Key {
    type Error = MixError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Shift {
    /// Shifts in table order: -1, 0, +1.
    pub const ALL: [Shift; 3] = [Shift::Down, Shift::Zero, Shift::Up];

    /// Column in the shift table: `shift + 1`.
    #[inline(always)]
    pub fn index(self) -> usize {
        match self {
            Shift::Down => 0,
            Shift::Zero => 1,
            Shift::Up => 2,
        }
    }

    #[inline(always)]
    pub fn from_index(index: usize) -> Shift {
        Shift::ALL[index]
    }

    pub fn semitones(self) -> i8 {
        self.index() as i8 - 1
    }

    #[inline(always)]
    pub fn is_shifted(self) -> bool {
        self != Shift::Zero
    }

    pub fn inverse(self) -> Shift {
        Shift::from_index(2 - self.index())
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}", self.semitones())
    }
}

impl From<Shift> for i8 {
    fn from(shift: Shift) -> Self {
        shift.semitones()
    }
}

impl TryFrom<i8> for Shift {
    type Error = MixError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Shift::Down),
            0 => Ok(Shift::Zero),
            1 => Ok(Shift::Up),
            other => Err(MixError::InvalidShift(other)),
        }
    }
}

/// Effective key of `base` under `shift`.
#[inline(always)]
pub fn effective_key(base: Key, shift: Shift) -> Key {
    base.shifted(shift)
}

/// Relation between two keys; used when building cost tables.
pub fn relation(a: Key, b: Key) -> Relation {
    a.relation(b)
}
