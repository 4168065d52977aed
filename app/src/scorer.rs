//! Interactive terminal scorer.
//!
//! Reads one line at a time from stdin and drives a `LiveSyncBridge`. A bare
//! number is a visit score (or, while a checkout waits for confirmation, the
//! number of darts used); everything else is a clap subcommand.

use std::io::{BufRead, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use sayg::{
    LegPhase, LiveSyncBridge, MatchStatistics, SaygError, SaygListener, ScoreAsYouGo, Side,
    ThrowEdit, format_average, project_leg, project_match,
};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct Line {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub(crate) enum Command {
    /// Choose who throws first in the current leg
    First { side: Side },
    /// Confirm a checkout with the darts used on the final visit
    Darts { count: u32 },
    /// Undo a pending checkout
    Cancel,
    /// Correct a recorded visit in any leg
    Edit {
        /// Leg number, counting from 1
        leg: u32,
        side: Side,
        index: usize,
        #[arg(long)]
        score: Option<u32>,
        /// Zero deletes the visit
        #[arg(long)]
        darts: Option<u32>,
        #[arg(long)]
        bust: Option<bool>,
    },
    /// Save the match now
    Save,
    /// Show leg-by-leg statistics
    Stats,
    /// Follow live updates for this match
    Live { mode: Toggle },
    Quit,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Toggle {
    On,
    Off,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Input {
    Empty,
    Throw(String),
    Command(Command),
}

/// Parse one line of input. `checkout_pending` turns a bare number into a
/// dart count.
pub(crate) fn parse_line(line: &str, checkout_pending: bool) -> Result<Input, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }
    if line.chars().all(|c| c.is_ascii_digit()) {
        if checkout_pending {
            let count = line.parse().map_err(|_| format!("not a dart count: {line}"))?;
            return Ok(Input::Command(Command::Darts { count }));
        }
        return Ok(Input::Throw(line.to_string()));
    }
    Line::try_parse_from(line.split_whitespace())
        .map(|l| Input::Command(l.command))
        .map_err(|e| e.render().to_string())
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Prints notable moments as they happen.
pub struct TerminalListener;

impl SaygListener for TerminalListener {
    fn on_180(&self, side_name: &str) {
        println!("*** ONE HUNDRED AND EIGHTY! ({side_name}) ***");
    }

    fn on_hi_check(&self, side_name: &str, score: u32) {
        println!("*** {side_name} checks out {score}! ***");
    }

    fn on_score_change(&self, home: u32, away: u32) {
        println!("legs: {home} - {away}");
    }

    fn on_load_error(&self, message: &str) {
        eprintln!("load failed: {message}");
    }

    fn on_saved(&self, sayg: &ScoreAsYouGo) {
        if let Some(id) = sayg.id {
            println!("saved {id}");
        }
    }

    fn on_live_update(&self, sayg: &ScoreAsYouGo) {
        println!("\nlive update received");
        println!("{}", render_status(sayg));
    }
}

pub fn listener() -> Arc<dyn SaygListener> {
    Arc::new(TerminalListener)
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn remaining_line(sayg: &ScoreAsYouGo) -> Option<String> {
    let index = sayg.active_leg_index();
    let leg = sayg.active_leg()?;
    let stats = project_leg(sayg, index, leg)?;
    let mut parts = vec![format!(
        "{} {} (avg {})",
        stats.home.name,
        stats.home.remaining,
        format_average(stats.home.average)
    )];
    if let Some(away) = &stats.away {
        parts.push(format!(
            "{} {} (avg {})",
            away.name,
            away.remaining,
            format_average(away.average)
        ));
    }
    Some(format!("leg {}: {}", index + 1, parts.join(" | ")))
}

/// One status block: match score, remaining scores and what happens next.
pub(crate) fn render_status(sayg: &ScoreAsYouGo) -> String {
    let mut out = match &sayg.opponent_name {
        Some(away) => format!(
            "{} {} - {} {} (best of {})",
            sayg.your_name, sayg.home_score, sayg.away_score, away, sayg.number_of_legs
        ),
        None => format!(
            "{}: {} of {} legs",
            sayg.your_name, sayg.home_score, sayg.number_of_legs
        ),
    };

    if sayg.is_finished() {
        let result = match sayg.winner() {
            Some(side) => format!("{} wins", sayg.side_name(side)),
            None => "drawn".to_string(),
        };
        out.push_str(&format!("\nmatch over: {result}"));
        return out;
    }

    if let Some(line) = remaining_line(sayg) {
        out.push('\n');
        out.push_str(&line);
    }
    let prompt = match sayg.active_leg().map(|leg| leg.phase()) {
        Some(LegPhase::AwaitingFirstThrower) => {
            "who throws first? (first home|away)".to_string()
        }
        Some(LegPhase::InProgress(side)) => format!("{} to throw", sayg.side_name(side)),
        Some(LegPhase::AwaitingCheckoutConfirmation(side)) => format!(
            "{} checked out. darts used? (1-3, or cancel)",
            sayg.side_name(side)
        ),
        Some(LegPhase::Complete(side)) => format!("leg won by {}", sayg.side_name(side)),
        None => "no leg in play".to_string(),
    };
    out.push('\n');
    out.push_str(&prompt);
    out
}

/// Leg-by-leg visit table plus match averages.
pub(crate) fn render_statistics(stats: &MatchStatistics) -> String {
    let mut out = String::new();
    for leg in &stats.legs {
        let winner = match leg.winner {
            Some(Side::Home) => format!(" (won by {})", leg.home.name),
            Some(Side::Away) => match &leg.away {
                Some(away) => format!(" (won by {})", away.name),
                None => String::new(),
            },
            None => String::new(),
        };
        out.push_str(&format!("leg {}{winner}\n", leg.index + 1));
        for competitor in std::iter::once(&leg.home).chain(leg.away.as_ref()) {
            out.push_str(&format!(
                "  {:<12} avg {:>6}  darts {:>3}  left {:>4}\n",
                competitor.name,
                format_average(competitor.average),
                competitor.number_of_darts,
                competitor.remaining
            ));
            let visits: Vec<String> = competitor
                .throws
                .iter()
                .map(|t| {
                    if t.bust {
                        format!("{}x", t.score)
                    } else {
                        t.score.to_string()
                    }
                })
                .collect();
            if !visits.is_empty() {
                out.push_str(&format!("    {}\n", visits.join(" ")));
            }
        }
    }
    out.push_str(&format!(
        "match average: {} {}",
        stats.home_name,
        format_average(stats.home_average)
    ));
    if let Some(away) = &stats.away_name {
        out.push_str(&format!(" | {away} {}", format_average(stats.away_average)));
    }
    out
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

enum Flow {
    Continue,
    Quit,
}

/// Run the scorer until `quit` or end of input.
pub fn run(mut bridge: LiveSyncBridge) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        let sayg = bridge.snapshot();
        println!("\n{}", render_status(&sayg));
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let pending = sayg.pending_checkout_leg().is_some();
        let input = match parse_line(&line, pending) {
            Ok(input) => input,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        match execute(&mut bridge, input) {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(e) => {
                tracing::warn!("scorer: {e}");
                println!("warning: {e}");
            }
        }
        report(&mut bridge);
    }
    bridge.disable_live_updates();
    Ok(())
}

fn execute(bridge: &mut LiveSyncBridge, input: Input) -> Result<Flow, SaygError> {
    let change = match input {
        Input::Empty => return Ok(Flow::Continue),
        Input::Throw(text) => bridge.record_throw_text(&text)?,
        Input::Command(command) => match command {
            Command::First { side } => bridge.choose_player_sequence(side)?,
            Command::Darts { count } => bridge.confirm_checkout(count)?,
            Command::Cancel => bridge.cancel_checkout()?,
            Command::Edit {
                leg,
                side,
                index,
                score,
                darts,
                bust,
            } => {
                let edit = ThrowEdit {
                    score,
                    number_of_darts: darts,
                    bust,
                };
                // Legs are shown 1-based.
                bridge.edit_throw(leg.saturating_sub(1), side, index, edit)?
            }
            Command::Save => {
                bridge.save()?;
                return Ok(Flow::Continue);
            }
            Command::Stats => {
                println!("{}", render_statistics(&project_match(&bridge.snapshot())));
                return Ok(Flow::Continue);
            }
            Command::Live { mode: Toggle::On } => {
                let id = match bridge.snapshot().id {
                    Some(id) => id,
                    None => bridge.save()?.ok_or(SaygError::NoId)?,
                };
                bridge.enable_live_updates(true, id)?;
                println!("following live updates for {id}");
                return Ok(Flow::Continue);
            }
            Command::Live { mode: Toggle::Off } => {
                bridge.disable_live_updates();
                return Ok(Flow::Continue);
            }
            Command::Quit => return Ok(Flow::Quit),
        },
    };
    if change.is_none() {
        println!("(ignored)");
    }
    Ok(Flow::Continue)
}

/// Surface anything the bridge is holding for the user.
fn report(bridge: &mut LiveSyncBridge) {
    if let Some(failure) = bridge.save_failure() {
        println!("save refused: {}", failure.errors.join("; "));
        bridge.dismiss_save_failure();
    }
    if let Some(warning) = bridge.publish_warning() {
        println!("{warning}");
        bridge.dismiss_publish_warning();
    }
    if let Some(error) = bridge.take_live_error() {
        println!("live channel: {error}");
    }
}
