//! Statistics over ledger records
//!
//! Level 3 - Step-level implementation
//!
//! The margin of error is a fixed normal approximation,
//! `z = (1 - 0.5 * (1 - confidence)) * 2`. Stop thresholds are calibrated
//! against exactly this formula, so it must not be swapped for an exact
//! binomial interval.

use serde::Serialize;

use crate::error::{BenchError, Result};
use crate::ledger::GameRecord;

pub const CONFIDENCE_95: f64 = 0.95;
pub const CONFIDENCE_99: f64 = 0.99;

const BLACK_WINS: &str = "B+";
const WHITE_WINS: &str = "W+";
const RESIGNATIONS: [&str; 2] = ["B+R", "W+R"];

/// Multiplier used by [`margin_of_error`]
pub fn z_score(confidence: f64) -> f64 {
    let alpha = 1.0 - confidence;
    (1.0 - 0.5 * alpha) * 2.0
}

/// Half-width of the interval around `p`, in percentage points
///
/// `n` must be positive.
pub fn margin_of_error(p: f64, n: usize, confidence: f64) -> f64 {
    z_score(confidence) * ((1.0 / n as f64) * p * (1.0 - p)).sqrt() * 100.0
}

/// Decided games split by winner
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct WinRate {
    pub white_wins: usize,
    pub black_wins: usize,
    /// Rows whose referee result names no winner (e.g. unrepaired `?`)
    pub unresolved: usize,
}

impl WinRate {
    /// Number of decided games
    pub fn games(&self) -> usize {
        self.white_wins + self.black_wins
    }

    /// Proportion of white wins
    pub fn p(&self) -> f64 {
        self.white_wins as f64 / self.games() as f64
    }

    pub fn margin(&self, confidence: f64) -> f64 {
        margin_of_error(self.p(), self.games(), confidence)
    }
}

/// Count wins by the referee's verdict
pub fn win_rate(records: &[GameRecord]) -> Result<WinRate> {
    let mut rate = WinRate {
        white_wins: 0,
        black_wins: 0,
        unresolved: 0,
    };

    for record in records {
        let referee = record.result_referee();
        if referee.starts_with(WHITE_WINS) {
            rate.white_wins += 1;
        } else if referee.starts_with(BLACK_WINS) {
            rate.black_wins += 1;
        } else {
            rate.unresolved += 1;
        }
    }

    if rate.games() == 0 {
        return Err(BenchError::InsufficientData { what: "win rate" });
    }

    Ok(rate)
}

/// How often both programs reported the same final score
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ScoreAgreement {
    /// Games not decided by resignation
    pub games: usize,
    pub same_score: usize,
}

impl ScoreAgreement {
    pub fn p(&self) -> f64 {
        self.same_score as f64 / self.games as f64
    }

    pub fn margin(&self, confidence: f64) -> f64 {
        margin_of_error(self.p(), self.games, confidence)
    }
}

/// Compare self-reported scores, skipping resignations
pub fn score_agreement(records: &[GameRecord]) -> Result<ScoreAgreement> {
    let counted: Vec<&GameRecord> = records
        .iter()
        .filter(|r| !is_resignation(r.result_referee()))
        .collect();

    if counted.is_empty() {
        return Err(BenchError::InsufficientData { what: "score agreement" });
    }

    let same_score = counted
        .iter()
        .filter(|r| r.result_white() == r.result_black())
        .count();

    Ok(ScoreAgreement {
        games: counted.len(),
        same_score,
    })
}

fn is_resignation(referee: &str) -> bool {
    RESIGNATIONS.iter().any(|prefix| referee.starts_with(prefix))
}

/// Score-agreement figures as printed in reports
#[derive(Clone, Debug, Serialize)]
pub struct ScoringSummary {
    pub games: usize,
    pub same_score: usize,
    pub same_score_percentage: f64,
    pub error95: f64,
    pub error99: f64,
}

/// Everything reported for one ledger
#[derive(Clone, Debug, Serialize)]
pub struct Summary {
    pub wins: usize,
    pub games: usize,
    pub unresolved: usize,
    pub win_percentage: f64,
    pub error95: f64,
    pub error99: f64,
    pub scoring: Option<ScoringSummary>,
}

impl Summary {
    /// Summarize a record set; fails only if no game was decided
    pub fn from_records(records: &[GameRecord]) -> Result<Self> {
        let rate = win_rate(records)?;

        let scoring = match score_agreement(records) {
            Ok(agreement) => Some(ScoringSummary {
                games: agreement.games,
                same_score: agreement.same_score,
                same_score_percentage: agreement.p() * 100.0,
                error95: agreement.margin(CONFIDENCE_95),
                error99: agreement.margin(CONFIDENCE_99),
            }),
            Err(BenchError::InsufficientData { .. }) => None,
            Err(e) => return Err(e),
        };

        Ok(Self {
            wins: rate.white_wins,
            games: rate.games(),
            unresolved: rate.unresolved,
            win_percentage: rate.p() * 100.0,
            error95: rate.margin(CONFIDENCE_95),
            error99: rate.margin(CONFIDENCE_99),
            scoring,
        })
    }

    /// One-line win report, e.g. `63.0% wins (63 games of 100, ± 9.41 at 95%, ± 10.14 at 99%)`
    pub fn wins_line(&self) -> String {
        format!(
            "{:.2}% wins ({} games of {}, ± {:.2} at 95%, ± {:.2} at 99%)",
            self.win_percentage, self.wins, self.games, self.error95, self.error99
        )
    }

    /// One-line score agreement report, if any comparable games exist
    pub fn scoring_line(&self) -> Option<String> {
        self.scoring.as_ref().map(|s| {
            format!(
                "{:.2}% same score ({} of {}, ± {:.2} at 95%, ± {:.2} at 99%)",
                s.same_score_percentage, s.same_score, s.games, s.error95, s.error99
            )
        })
    }
}
