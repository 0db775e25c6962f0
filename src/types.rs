use chrono::{DateTime, NaiveDate, Utc};

// ---------------------------------------------------------------------------
// Board side / result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "white" => Some(Color::White),
            "black" => Some(Color::Black),
            _ => None,
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Win,
    Lose,
    Draw,
}

impl GameResult {
    pub fn as_str(self) -> &'static str {
        match self {
            GameResult::Win => "win",
            GameResult::Lose => "lose",
            GameResult::Draw => "draw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "win" => Some(GameResult::Win),
            "lose" => Some(GameResult::Lose),
            "draw" => Some(GameResult::Draw),
            _ => None,
        }
    }
}

impl std::fmt::Display for GameResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Flat per-game row (the match schema)
// ---------------------------------------------------------------------------

/// One standard-variant game, flattened from the export JSON.
/// `game_id` is the uniqueness key across the merged dataset;
/// `played_as` and `opponent_color` are complementary by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRow {
    pub game_id: String,
    pub rated: bool,
    pub speed: String,
    pub created_at: DateTime<Utc>,
    pub last_move_at: DateTime<Utc>,
    pub status: String,
    pub source: String,
    pub player_name: String,
    pub played_as: Color,
    pub opponent_name: Option<String>,
    pub opponent_color: Color,
    pub player_rating: Option<i64>,
    pub player_rating_diff: Option<i64>,
    pub opponent_rating: Option<i64>,
    pub opponent_rating_diff: Option<i64>,
    pub result: GameResult,
    pub opening_eco: Option<String>,
    pub opening_name: Option<String>,
    pub opening_ply: Option<i64>,
    pub tournament: bool,
    pub time_control: Option<String>,
    pub move_count: Option<i64>,
    pub turns: Option<i64>,
}

// ---------------------------------------------------------------------------
// Rating history
// ---------------------------------------------------------------------------

/// One observed rating for one perf category on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatingPoint {
    pub category: String,
    pub date: NaiveDate,
    pub rating: i64,
}
