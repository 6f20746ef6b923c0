use picword_cache::Atom;
use std::fmt;

/// Separates the word from the talker in an audio stimulus file stem.
pub const KEY_SEPARATOR: char = '-';

/// The target of one trial: which word is heard, spoken by which talker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrialItem {
    pub word: Atom,
    pub talker: Atom,
}

impl TrialItem {
    pub fn new(word: impl Into<Atom>, talker: impl Into<Atom>) -> Self {
        Self {
            word: word.into(),
            talker: talker.into(),
        }
    }

    /// Parses an audio file stem of the form `word-talker`.
    ///
    /// Stems with no separator, more than one separator, or an empty half do
    /// not name a stimulus and yield `None`.
    pub fn parse_key(stem: &str) -> Option<Self> {
        let (word, talker) = stem.split_once(KEY_SEPARATOR)?;
        if word.is_empty() || talker.is_empty() || talker.contains(KEY_SEPARATOR) {
            return None;
        }
        Some(Self::new(word, talker))
    }

    /// Key of the audio stimulus for this item.
    pub fn audio_key(&self) -> String {
        format!("{}{}{}", self.word, KEY_SEPARATOR, self.talker)
    }
}

impl fmt::Display for TrialItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.audio_key())
    }
}

/// Edge a tile slides in from or out toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Top,
    Bottom,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Top,
        Direction::Bottom,
        Direction::Left,
        Direction::Right,
    ];

    /// Unit offset pointing toward the edge, in screen coordinates.
    pub fn offset(&self) -> (f32, f32) {
        match self {
            Direction::Top => (0.0, -1.0),
            Direction::Bottom => (0.0, 1.0),
            Direction::Left => (-1.0, 0.0),
            Direction::Right => (1.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStyle {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStack {
    Front,
    Back,
}
