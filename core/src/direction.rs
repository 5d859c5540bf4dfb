//! The ten movement directions: eight compass points plus up and down.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode,
)]
pub enum Direction {
    North,
    Northeast,
    East,
    Southeast,
    South,
    Southwest,
    West,
    Northwest,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 10] = [
        Direction::North,
        Direction::Northeast,
        Direction::East,
        Direction::Southeast,
        Direction::South,
        Direction::Southwest,
        Direction::West,
        Direction::Northwest,
        Direction::Up,
        Direction::Down,
    ];

    /// The opposite direction. Pure.
    pub fn reverse(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::Northeast => Direction::Southwest,
            Direction::East => Direction::West,
            Direction::Southeast => Direction::Northwest,
            Direction::South => Direction::North,
            Direction::Southwest => Direction::Northeast,
            Direction::West => Direction::East,
            Direction::Northwest => Direction::Southeast,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// Grid offset `(dx, dy, dz)`. North decreases y, up increases z.
    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            Direction::North => (0, -1, 0),
            Direction::Northeast => (1, -1, 0),
            Direction::East => (1, 0, 0),
            Direction::Southeast => (1, 1, 0),
            Direction::South => (0, 1, 0),
            Direction::Southwest => (-1, 1, 0),
            Direction::West => (-1, 0, 0),
            Direction::Northwest => (-1, -1, 0),
            Direction::Up => (0, 0, 1),
            Direction::Down => (0, 0, -1),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::Northeast => "northeast",
            Direction::East => "east",
            Direction::Southeast => "southeast",
            Direction::South => "south",
            Direction::Southwest => "southwest",
            Direction::West => "west",
            Direction::Northwest => "northwest",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    /// Short form used in exit listings.
    pub fn short(self) -> &'static str {
        match self {
            Direction::North => "n",
            Direction::Northeast => "ne",
            Direction::East => "e",
            Direction::Southeast => "se",
            Direction::South => "s",
            Direction::Southwest => "sw",
            Direction::West => "w",
            Direction::Northwest => "nw",
            Direction::Up => "u",
            Direction::Down => "d",
        }
    }

    /// Parse a direction word; accepts the full name, any unambiguous
    /// prefix of it, or the short form. Case-insensitive.
    pub fn parse(word: &str) -> Option<Direction> {
        let lower = word.to_lowercase();
        if lower.is_empty() {
            return None;
        }
        // Short forms first; "s" alone must mean south, not southeast.
        for dir in Direction::ALL {
            if dir.short() == lower {
                return Some(dir);
            }
        }
        // Among prefix matches, the shortest label wins so that "so" means
        // south rather than southeast.
        Direction::ALL
            .into_iter()
            .filter(|dir| dir.label().starts_with(&lower))
            .min_by_key(|dir| dir.label().len())
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
