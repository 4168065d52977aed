//! Read-only projections of a match for display: per-throw running totals,
//! averages and checkout flags.
//!
//! Projection never fails. Legs that are missing a competitor are skipped,
//! and averages over zero darts come back as `None`.

use serde::{Deserialize, Serialize};

use crate::{Leg, LegCompetitor, ScoreAsYouGo, Side};

/// Placeholder shown where an average cannot be computed.
pub const NO_AVERAGE: &str = "-";

/// Presentation toggles for a leg. Never persisted with the match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegDisplayOptions {
    pub show_throws: bool,
    pub show_average: bool,
}

/// One visit with the running figures after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrowRow {
    pub index: usize,
    pub score: u32,
    pub number_of_darts: u32,
    pub bust: bool,
    pub running_score: u32,
    pub remaining: i64,
    pub running_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorStatistics {
    pub side: Side,
    pub name: String,
    pub throws: Vec<ThrowRow>,
    pub score: u32,
    pub remaining: i64,
    pub number_of_darts: u32,
    pub average: Option<f64>,
    pub one_dart_average: Option<f64>,
    pub checked_out: bool,
    pub bust: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegStatistics {
    pub index: u32,
    pub starting_score: u32,
    pub home: CompetitorStatistics,
    /// Absent in single-player matches.
    pub away: Option<CompetitorStatistics>,
    pub winner: Option<Side>,
    pub display: LegDisplayOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStatistics {
    pub home_name: String,
    pub away_name: Option<String>,
    pub home_score: u32,
    pub away_score: u32,
    pub legs: Vec<LegStatistics>,
    pub home_average: Option<f64>,
    pub away_average: Option<f64>,
    pub home_one_dart_average: Option<f64>,
    pub away_one_dart_average: Option<f64>,
    pub finished: bool,
    pub winner: Option<Side>,
}

/// Three-dart average: points per three darts thrown.
pub fn average(score: u32, number_of_darts: u32) -> Option<f64> {
    if number_of_darts == 0 {
        return None;
    }
    Some(f64::from(score) / (f64::from(number_of_darts) / 3.0))
}

/// Points per single dart.
pub fn one_dart_average(score: u32, number_of_darts: u32) -> Option<f64> {
    average(score, number_of_darts).map(|a| a / 3.0)
}

pub fn round2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn format_average(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}", round2dp(v)),
        _ => NO_AVERAGE.to_string(),
    }
}

fn project_competitor(
    side: Side,
    name: &str,
    competitor: &LegCompetitor,
    starting_score: u32,
) -> CompetitorStatistics {
    let mut running_score = 0;
    let mut running_darts = 0;
    let throws = competitor
        .throws
        .iter()
        .enumerate()
        .map(|(index, t)| {
            running_score += t.counted_score();
            running_darts += t.number_of_darts;
            ThrowRow {
                index,
                score: t.score,
                number_of_darts: t.number_of_darts,
                bust: t.bust,
                running_score,
                remaining: i64::from(starting_score) - i64::from(running_score),
                running_average: average(running_score, running_darts),
            }
        })
        .collect();

    CompetitorStatistics {
        side,
        name: name.to_string(),
        throws,
        score: competitor.score,
        remaining: competitor.remaining(starting_score),
        number_of_darts: competitor.number_of_darts,
        average: average(competitor.score, competitor.number_of_darts),
        one_dart_average: one_dart_average(competitor.score, competitor.number_of_darts),
        checked_out: competitor.has_checked_out(starting_score),
        bust: competitor.bust,
    }
}

/// Project one leg. Returns `None` for a leg missing competitor data.
pub fn project_leg(sayg: &ScoreAsYouGo, index: u32, leg: &Leg) -> Option<LegStatistics> {
    let home = leg.home.as_ref()?;
    let away = leg.away.as_ref()?;
    let home = project_competitor(Side::Home, sayg.side_name(Side::Home), home, leg.starting_score);
    let away = (!sayg.is_single_player()).then(|| {
        project_competitor(Side::Away, sayg.side_name(Side::Away), away, leg.starting_score)
    });
    Some(LegStatistics {
        index,
        starting_score: leg.starting_score,
        home,
        away,
        winner: leg.winner,
        display: LegDisplayOptions::default(),
    })
}

/// Project the whole match.
pub fn project_match(sayg: &ScoreAsYouGo) -> MatchStatistics {
    let legs: Vec<LegStatistics> = sayg
        .legs
        .iter()
        .filter_map(|(index, leg)| project_leg(sayg, *index, leg))
        .collect();

    let totals = |side: Side| {
        legs.iter()
            .filter_map(|l| match side {
                Side::Home => Some(&l.home),
                Side::Away => l.away.as_ref(),
            })
            .fold((0, 0), |(score, darts), c| {
                (score + c.score, darts + c.number_of_darts)
            })
    };
    let (home_total, home_darts) = totals(Side::Home);
    let (away_total, away_darts) = totals(Side::Away);
    let single = sayg.is_single_player();

    MatchStatistics {
        home_name: sayg.your_name.clone(),
        away_name: sayg.opponent_name.clone(),
        home_score: sayg.home_score,
        away_score: sayg.away_score,
        home_average: average(home_total, home_darts),
        away_average: if single { None } else { average(away_total, away_darts) },
        home_one_dart_average: one_dart_average(home_total, home_darts),
        away_one_dart_average: if single {
            None
        } else {
            one_dart_average(away_total, away_darts)
        },
        finished: sayg.is_finished(),
        winner: sayg.winner(),
        legs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LegThrow;

    #[test]
    fn three_and_one_dart_averages() {
        assert_eq!(average(123, 3), Some(123.0));
        assert_eq!(one_dart_average(123, 3), Some(41.0));
        assert_eq!(average(100, 6), Some(50.0));
    }

    #[test]
    fn no_darts_renders_placeholder() {
        assert_eq!(average(0, 0), None);
        assert_eq!(format_average(None), "-");
        assert_eq!(format_average(Some(f64::NAN)), "-");
        assert_eq!(format_average(Some(100.0 / 3.0)), "33.33");
    }

    #[test]
    fn running_figures_follow_each_throw() {
        let mut sayg = ScoreAsYouGo::new("Alice", Some("Bob".into()), 3, 501);
        sayg.ensure_current_leg();
        let leg = sayg.current_leg_mut().unwrap();
        let home = leg.competitor_mut(Side::Home);
        home.push(LegThrow::new(100));
        home.push(LegThrow::bust(60));
        home.push(LegThrow::new(41));

        let stats = project_match(&sayg);
        let rows = &stats.legs[0].home.throws;
        assert_eq!(rows[0].running_score, 100);
        assert_eq!(rows[0].remaining, 401);
        assert_eq!(rows[1].running_score, 100);
        assert_eq!(rows[1].running_average, Some(50.0));
        assert_eq!(rows[2].remaining, 360);
        assert_eq!(stats.legs[0].home.average, Some(47.0));
        assert_eq!(stats.home_average, Some(47.0));
        assert_eq!(stats.away_average, None);
    }

    #[test]
    fn malformed_leg_is_skipped() {
        let mut sayg = ScoreAsYouGo::new("Alice", Some("Bob".into()), 3, 501);
        sayg.ensure_current_leg();
        sayg.legs.get_mut(&0).unwrap().home = None;
        let stats = project_match(&sayg);
        assert!(stats.legs.is_empty());
        assert_eq!(stats.home_average, None);
    }

    #[test]
    fn single_player_has_no_away_projection() {
        let mut sayg = ScoreAsYouGo::new("Solo", None, 1, 501);
        sayg.ensure_current_leg();
        let stats = project_match(&sayg);
        assert!(stats.legs[0].away.is_none());
        assert_eq!(stats.away_name, None);
    }
}
