use std::error::Error;
use std::io::{self, stdin, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{error::ErrorKind, Args, CommandFactory, Parser, Subcommand};
use crossterm::event::KeyCode;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::tty::IsTty;
use itertools::Itertools;

use cogtrial::config::{Config, ConfigStore, FileConfigStore};
use cogtrial::engine::cat_chaser::{CatColor, BOARD_CELLS};
use cogtrial::engine::count_comparison::{Cell, Cloud};
use cogtrial::engine::number_pressing::PressProblem;
use cogtrial::engine::shape_rotation::Point;
use cogtrial::export::{all_sessions, write_csv};
use cogtrial::game::{GameCode, GameMode, GameSettings, Problem};
use cogtrial::gateway::{Gateway, InMemoryGateway, SqliteGateway};
use cogtrial::input::{AnswerPad, KeyAction};
use cogtrial::logging::init_tracing;
use cogtrial::runtime::{dispatch, CrosstermEventSource, FixedTicker, GameEvent, Runner};
use cogtrial::session::SessionStore;
use cogtrial::stats::{compute_metrics, round_breakdown, SessionMetrics};
use cogtrial::timer::{SystemClock, TICK_RATE_MS};

/// timed cognitive mini-games in the terminal
#[derive(Parser, Debug)]
#[clap(version, about)]
pub struct Cli {
    /// session database (defaults to the state directory)
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// keep sessions in memory only; nothing is saved
    #[clap(long, global = true)]
    memory: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// play a game
    Play(PlayArgs),
    /// list stored sessions, newest first
    History {
        /// only sessions of this game
        #[clap(long, value_parser = parse_game)]
        game: Option<GameCode>,
        #[clap(long, default_value_t = 1)]
        page: usize,
        #[clap(long, default_value_t = 10)]
        limit: usize,
    },
    /// show metrics of one session
    Stats { session_id: i64 },
    /// write every stored session to a CSV file
    Export {
        path: PathBuf,
        #[clap(long, value_parser = parse_game)]
        game: Option<GameCode>,
    },
    /// list the available games
    Games,
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// game code or slug, e.g. n-back or RPS
    #[clap(value_parser = parse_game)]
    game: GameCode,

    /// number of trials
    #[clap(short = 'r', long)]
    rounds: Option<usize>,

    /// per-trial time limit in milliseconds, 0 disables it
    #[clap(short = 't', long)]
    time_limit_ms: Option<u64>,

    /// level, round or difficulty of the game (see `games`)
    #[clap(short = 'l', long)]
    level: Option<u32>,

    /// levels played one after another, e.g. 1,2,3 (rps, number-pressing,
    /// shape-rotation); trials are split evenly between them
    #[clap(long, value_delimiter = ',')]
    levels: Vec<u32>,

    /// limit for the whole session in milliseconds
    #[clap(long)]
    session_limit_ms: Option<u64>,

    /// hide per-trial feedback
    #[clap(long)]
    real_mode: bool,

    /// n-back shape group (group1..group5 or random)
    #[clap(long)]
    group: Option<String>,

    /// seed for reproducible problems
    #[clap(long)]
    seed: Option<u64>,

    /// remember rounds, time limit, level and real mode as defaults
    #[clap(long)]
    save_config: bool,
}

impl PlayArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(rounds) = self.rounds {
            config.round_count = rounds;
        }
        if let Some(limit) = self.time_limit_ms {
            config.time_limit_ms = limit;
        }
        if let Some(level) = self.level {
            config.set_level(self.game, level);
        }
        config.real_mode |= self.real_mode;
    }

    fn settings(&self, config: &Config) -> GameSettings {
        GameSettings {
            session_time_limit_ms: self.session_limit_ms,
            rounds: self.levels.clone(),
            shape_group: self.group.clone(),
            seed: self.seed,
            ..config.settings_for(self.game)
        }
    }
}

fn parse_game(s: &str) -> Result<GameCode, String> {
    s.parse().map_err(|e: cogtrial::error::GameError| e.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config_store = FileConfigStore::new();
    let mut config = config_store.load();
    init_tracing(&config.log_level);

    match cli.command {
        Command::Games => list_games(),
        Command::History { game, page, limit } => {
            let gateway = open_gateway(cli.db, cli.memory, &config)?;
            history(gateway.as_ref(), game, page, limit).await?;
        }
        Command::Stats { session_id } => {
            let gateway = open_gateway(cli.db, cli.memory, &config)?;
            session_stats(gateway.as_ref(), session_id).await?;
        }
        Command::Export { path, game } => {
            let gateway = open_gateway(cli.db, cli.memory, &config)?;
            let sessions = all_sessions(gateway.as_ref(), game).await?;
            write_csv(&sessions, std::fs::File::create(&path)?)?;
            println!("exported {} sessions to {}", sessions.len(), path.display());
        }
        Command::Play(args) => {
            if !stdin().is_tty() {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
            }
            args.apply(&mut config);
            if args.save_config {
                config_store.save(&config)?;
            }
            let settings = args.settings(&config);
            let gateway = open_gateway(cli.db, cli.memory, &config)?;
            play(gateway, args.game, settings).await?;
        }
    }

    Ok(())
}

fn open_gateway(db: Option<PathBuf>, memory: bool, config: &Config) -> Result<Arc<dyn Gateway>, Box<dyn Error>> {
    if memory {
        return Ok(Arc::new(InMemoryGateway::new()));
    }
    let gateway = match db.or_else(|| config.db_path.clone()) {
        Some(path) => SqliteGateway::open(path)?,
        None => SqliteGateway::new()?,
    };
    Ok(Arc::new(gateway))
}

fn list_games() {
    for game in GameCode::ALL {
        let levels = match game {
            GameCode::NBack => "1 (2-back), 2 (2/3-back)",
            GameCode::ShapeRotation => "1 (free shapes), 2 (grid shapes)",
            GameCode::Rps => "1 (your card), 2 (opponent's card), 3 (mixed)",
            GameCode::NumberPressing => "1 (target), 2 (sequence)",
            GameCode::CatChaser => "0 (auto), 4-16 mice",
            GameCode::CountComparison => "1 (traps on the smaller side)",
        };
        println!("{:<16} {:<20} levels: {levels}", game.slug(), game.name());
    }
}

fn print_metrics(metrics: &SessionMetrics) {
    println!(
        "trials {}  correct {}  accuracy {:.2}%  avg {:.0}ms  sd {:.0}ms  score {:.2}",
        metrics.total_trials,
        metrics.total_correct,
        metrics.overall_accuracy,
        metrics.average_response_time_ms,
        metrics.response_time_std_dev_ms,
        metrics.total_score,
    );
}

async fn history(
    gateway: &dyn Gateway,
    game: Option<GameCode>,
    page: usize,
    limit: usize,
) -> Result<(), Box<dyn Error>> {
    let result = gateway
        .get_paginated_sessions_with_results(game, page, limit)
        .await?;
    if result.sessions.is_empty() {
        println!("no sessions on page {page} ({} total)", result.total_count);
        return Ok(());
    }
    for record in &result.sessions {
        println!(
            "#{:<5} {:<16} {}  rounds {:<3} accuracy {:>6.2}%  avg {:>5.0}ms",
            record.session_id,
            record.game_code.slug(),
            record.play_datetime.format("%Y-%m-%d %H:%M"),
            record.settings.round_count,
            record.metrics.overall_accuracy,
            record.metrics.average_response_time_ms,
        );
    }
    let pages = result.total_count.div_ceil(limit);
    println!("page {page} of {pages} ({} sessions)", result.total_count);
    Ok(())
}

async fn session_stats(gateway: &dyn Gateway, session_id: i64) -> Result<(), Box<dyn Error>> {
    let outcomes = gateway.get_session_results(session_id).await?;
    print_metrics(&compute_metrics(&outcomes));
    for (round, metrics) in round_breakdown(&outcomes) {
        print!("  round {round}: ");
        print_metrics(&metrics);
    }
    Ok(())
}

/// Writes one line in raw mode.
fn say(line: impl AsRef<str>) -> io::Result<()> {
    write_line(&mut io::stdout().lock(), line.as_ref())
}

fn write_line(out: &mut impl Write, line: &str) -> io::Result<()> {
    write!(out, "{line}\r\n")?;
    out.flush()
}

fn fmt_points(points: &[Point]) -> String {
    points
        .iter()
        .map(|pt| format!("({:.0},{:.0})", pt.x, pt.y))
        .join(" ")
}

/// Bold words in capitals, large ones starred, gaps as runs of spaces.
fn fmt_cloud(cloud: &Cloud) -> String {
    cloud
        .cells
        .iter()
        .map(|cell| match cell {
            Cell::Word { size, bold } => {
                let word = if *bold {
                    cloud.word.to_uppercase()
                } else {
                    cloud.word.clone()
                };
                if *size >= 1.2 {
                    format!("*{word}*")
                } else {
                    word
                }
            }
            Cell::Gap { width } => " ".repeat(width.round() as usize),
        })
        .join(" ")
}

fn describe(problem: &Problem) -> Vec<String> {
    match problem {
        Problem::NBack(p) => vec![format!("shape: {}", p.shape)],
        Problem::Rps(p) => vec![format!("{} holds {}", p.holder, p.given)],
        Problem::NumberPressing(PressProblem::Target(n)) => vec![format!("press {n}")],
        Problem::NumberPressing(PressProblem::Sequence { double_press, skip }) => vec![
            "press 1 to 9 in order".to_string(),
            format!(
                "twice: [{}]  skip: [{}]",
                double_press.iter().join(" "),
                skip.iter().join(" ")
            ),
        ],
        Problem::ShapeRotation(p) => vec![
            format!("shape {}: at most {} moves", p.shape, p.min_moves),
            format!("from {}", fmt_points(&p.initial)),
            format!("to   {}", fmt_points(&p.target)),
        ],
        Problem::CountComparison(p) => vec![
            "which side has more words?".to_string(),
            format!("left:  {}", fmt_cloud(&p.left)),
            format!("right: {}", fmt_cloud(&p.right)),
        ],
        Problem::CatChaser(p) => {
            let red = p.cats.get(p.red_cat).copied();
            let blue = p.cats.get(p.blue_cat).copied();
            let mut lines: Vec<String> = (0..BOARD_CELLS)
                .chunks(6)
                .into_iter()
                .map(|row| {
                    row.map(|cell| match (Some(cell) == red, Some(cell) == blue) {
                        (true, _) => 'R',
                        (_, true) => 'B',
                        _ if p.cats.contains(&cell) => 'c',
                        _ if p.mice.contains(&cell) => 'm',
                        _ => '.',
                    })
                    .join(" ")
                })
                .collect();
            let color = match p.target {
                CatColor::Red => "red (R)",
                CatColor::Blue => "blue (B)",
            };
            lines.push(format!("did the {color} cat catch a mouse?"));
            lines
        }
    }
}

async fn play(gateway: Arc<dyn Gateway>, game: GameCode, settings: GameSettings) -> Result<(), Box<dyn Error>> {
    let real_mode = settings.real_mode;
    let rounds = settings.round_count;
    let mut store = SessionStore::new(gateway, Arc::new(SystemClock::new()));
    store.start_game(game, settings).await?;

    enable_raw_mode()?;
    let played = play_loop(&mut store, game, real_mode, rounds).await;
    disable_raw_mode()?;
    played?;

    if store.game_mode() == GameMode::Result {
        println!();
        print_metrics(&store.metrics());
        match (store.session_id(), store.result_notice()) {
            (Some(id), _) => println!("saved as session #{id}"),
            (None, Some(notice)) => println!("{notice}"),
            (None, None) => {}
        }
        if let Some(err) = store.last_error() {
            println!("finished early: {err}");
        }
    }
    Ok(())
}

async fn play_loop(
    store: &mut SessionStore,
    game: GameCode,
    real_mode: bool,
    rounds: usize,
) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let mut pad = AnswerPad::new(game);
    let mut shown = None;
    let mut reported = 0;

    say(format!("{} -- {}  [esc] quit", game.name(), pad.help()))?;

    while store.game_mode() == GameMode::Playing {
        if let Some(trial) = store.current_trial() {
            if shown != Some(trial.index) {
                shown = Some(trial.index);
                pad.clear();
                say("")?;
                say(format!("trial {}/{}", trial.index + 1, rounds))?;
                for line in describe(&trial.problem) {
                    say(line)?;
                }
            }
        }

        let event = match runner.step() {
            GameEvent::Key(key) if !store.is_pending() => {
                let problem = store.current_trial().map(|t| &t.problem);
                match pad.on_key(&key, problem) {
                    KeyAction::Quit => {
                        store.reset_game();
                        break;
                    }
                    KeyAction::Pending => {
                        say(format!("> {}", pad.draft()))?;
                        continue;
                    }
                    KeyAction::Ignored => continue,
                    KeyAction::Answer { choice, confidence } => match store.current_trial() {
                        Some(trial) => GameEvent::Submit {
                            trial_index: trial.index,
                            choice,
                            response_time_ms: store.elapsed_in_trial_ms(),
                            confidence,
                        },
                        None => continue,
                    },
                }
            }
            GameEvent::Key(key) => match key.code {
                KeyCode::Char('t') => GameEvent::Retry,
                KeyCode::Esc => {
                    store.reset_game();
                    break;
                }
                _ => continue,
            },
            other => other,
        };

        match dispatch(store, event).await {
            Ok(_) => {}
            Err(err) if err.is_transport() && store.game_mode() == GameMode::Playing => {
                say(format!("gateway error: {err}  [t] retry  [esc] quit"))?;
            }
            Err(err) => return Err(err.into()),
        }

        for outcome in store.results().iter().skip(reported) {
            if !real_mode {
                let verdict = if outcome.is_correct { "correct" } else { "wrong" };
                say(format!(
                    "{verdict}: {} (expected {}) in {}ms",
                    outcome.player_choice, outcome.correct_choice, outcome.response_time_ms
                ))?;
            }
        }
        reported = store.results().len();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn raw_mode_lines_end_with_crlf() {
        let mut out = Vec::new();
        write_line(&mut out, "trial 1/3").unwrap();
        assert_eq!(out, b"trial 1/3\r\n");
    }

    #[test]
    fn write_failures_are_reported() {
        let err = write_line(&mut ClosedPipe, "lost").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
