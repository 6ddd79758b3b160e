use clap::{Parser, Subcommand, ValueEnum};
use setwise::{
    app_dirs::AppDirs,
    clock::SystemClock,
    config::{ConfigStore, FileConfigStore},
    db::Database,
    events::SessionEvent,
    history::{export_csv, SqliteHistory},
    models::Exercise,
    notify::{LogScheduler, NoopScheduler, NotificationScheduler},
    rest_timer::RestState,
    runtime::{ConsoleEvent, FixedTicker, Runner, StdinCommandSource},
    session::{SessionEngine, Services},
    util::{ceil_secs, format_clock},
};
use std::{error::Error, io, path::PathBuf, time::Duration};
use tracing_subscriber::{fmt, EnvFilter};

const TICK_RATE_MS: u64 = 100;

/// track sets, rest and personal records from the terminal
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "A workout session tracker: log sets, dropsets and warm-ups, run rest timers that survive restarts, and keep personal records and workout history."
)]
pub struct Cli {
    /// database file (defaults to the platform state directory)
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// config file (defaults to the platform config directory)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// log output format
    #[clap(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Copy, Clone, ValueEnum, strum_macros::Display)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// start a workout, optionally with exercises given as "Name:sets"
    Start {
        name: String,
        #[clap(short = 'e', long = "exercise", value_parser = parse_exercise)]
        exercises: Vec<Exercise>,
    },
    /// add an exercise to the current workout
    Add {
        name: String,
        #[clap(short = 's', long, default_value_t = 3)]
        sets: u32,
        /// make it a timed hold with this target in seconds
        #[clap(long)]
        hold: Option<u32>,
        /// alternative exercise names
        #[clap(long = "alt")]
        alternatives: Vec<String>,
    },
    /// log a set for the current exercise
    Log {
        weight: f64,
        reps: u32,
        #[clap(long)]
        warmup: bool,
    },
    /// log a timed hold for the current exercise
    Hold { secs: u32 },
    /// insert warm-up sets ramping to a working weight
    Warmup { weight: f64, reps: u32 },
    /// configure dropsets for the current exercise
    Dropsets {
        #[clap(long)]
        off: bool,
        #[clap(short = 'n', long)]
        count: Option<u32>,
        #[clap(short = 'r', long)]
        reduction: Option<f64>,
    },
    /// revert the last set
    Undo,
    /// control the rest timer
    Rest {
        #[clap(subcommand)]
        action: RestAction,
    },
    /// pause the workout timer
    Pause,
    /// resume the workout timer
    Resume,
    /// restart the workout timer from zero
    ResetTimer,
    /// jump to an exercise by its 1-based position
    Select { position: usize },
    /// replace the current exercise with an alternative
    Swap { name: String },
    /// show the current workout
    Status,
    /// follow the rest countdown; type skip, done, +N or -N
    Watch,
    /// finish the workout and record it
    Finish,
    /// abandon the workout
    Cancel,
    /// list finished workouts
    History {
        #[clap(short = 'n', long, default_value_t = 10)]
        limit: usize,
        #[clap(long)]
        csv: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum RestAction {
    Skip,
    Done,
    Add { secs: i64 },
    Sub { secs: i64 },
}

/// `+N` extends the rest by N seconds, `-N` shortens it.
fn parse_watch_adjustment(input: &str) -> Option<RestAction> {
    let secs = input.parse::<i64>().ok()?;
    if input.starts_with('+') {
        Some(RestAction::Add { secs })
    } else if secs < 0 {
        // i64::MIN has no positive counterpart; the engine rejects the stand-in
        Some(RestAction::Sub {
            secs: secs.checked_neg().unwrap_or(i64::MAX),
        })
    } else {
        None
    }
}

fn parse_exercise(arg: &str) -> Result<Exercise, String> {
    let (name, sets) = match arg.rsplit_once(':') {
        Some((name, sets)) => {
            let sets = sets
                .trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid set count in {arg:?}"))?;
            (name.trim(), sets)
        }
        None => (arg.trim(), 3),
    };
    if name.is_empty() {
        return Err("exercise name is empty".into());
    }
    Ok(Exercise::new(name, sets))
}

fn init_tracing(log_format: LogFormat) -> Result<(), Box<dyn Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| format!("failed to init tracing: {err}"))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| format!("failed to init tracing: {err}"))?,
    }

    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::SetCompleted {
            exercise,
            set_number,
            weight,
            reps,
            is_warmup,
            dropsets,
            ..
        } => {
            let kind = if *is_warmup { "warm-up" } else { "set" };
            print!("{exercise}: {kind} {set_number} {weight} x {reps}");
            if *dropsets > 0 {
                print!(" (+{dropsets} drops)");
            }
            println!();
        }
        SessionEvent::PrAchieved(pr) => {
            println!("New PR! {} {} x {}", pr.exercise, pr.weight, pr.reps)
        }
        SessionEvent::ExerciseAdvanced { to, .. } => println!("Next exercise: #{}", to + 1),
        SessionEvent::PhaseChanged { .. } => {}
        SessionEvent::RestStarted { total_secs } if *total_secs > 0 => {
            println!("Rest {}", format_clock(*total_secs))
        }
        SessionEvent::RestStarted { .. } => {}
        SessionEvent::RestFinished { outcome } => println!("Rest {outcome}"),
        SessionEvent::SetUndone { removed, .. } => println!("Undid {removed} entries"),
        SessionEvent::SessionFinished(summary) => {
            println!(
                "Finished {}: {} | {} sets | {} exercises | volume {}",
                summary.name,
                format_clock(summary.duration_secs),
                summary.total_sets,
                summary.exercise_count,
                summary.total_volume
            );
            for pr in &summary.prs {
                println!("  PR {} {} x {}", pr.exercise, pr.weight, pr.reps);
            }
        }
        SessionEvent::WorkoutCancelled => println!("Workout cancelled"),
    }
}

fn print_status(engine: &SessionEngine) {
    let Some(workout) = engine.workout() else {
        println!("No active workout");
        return;
    };
    let paused = if engine.is_workout_timer_paused() {
        " (paused)"
    } else {
        ""
    };
    println!(
        "{} | {}{}",
        workout.name,
        format_clock(engine.workout_elapsed().num_seconds()),
        paused
    );
    let current = engine.current_exercise_index();
    for (i, ex) in workout.exercises.iter().enumerate() {
        let marker = if Some(i) == current { ">" } else { " " };
        println!(
            "{marker} {}. {} [{}] {}/{}",
            i + 1,
            ex.name,
            ex.kind,
            ex.working_count(),
            ex.target_sets
        );
        for set in &ex.sets {
            let label = if set.is_warmup {
                "W".to_string()
            } else if let Some(drop) = set.dropset_number {
                format!("{}.{drop}", set.set_number)
            } else {
                set.set_number.to_string()
            };
            match set.hold_secs {
                Some(secs) => println!("      {label}: hold {}", format_clock(secs as i64)),
                None => println!("      {label}: {} x {}", set.weight, set.reps),
            }
        }
    }
    if let Some(remaining) = engine.rest_remaining() {
        println!("Resting: {} left", format_clock(ceil_secs(remaining)));
    } else if engine.pending_advance_at().is_some() {
        println!("Resting");
    }
    if let Some(ex) = engine.current_exercise() {
        if let Some(last) = engine.suggested_weight(&ex.name) {
            println!("Last time: {} x {}", last.weight, last.reps);
        }
    }
}

/// Follows the rest countdown until it ends or `q` is typed
fn watch(engine: &mut SessionEngine) {
    let runner = Runner::new(
        StdinCommandSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    let mut last_shown = None;
    loop {
        match runner.step() {
            ConsoleEvent::Tick => {
                engine.tick();
            }
            ConsoleEvent::Command(cmd) => {
                let result = match cmd.as_str() {
                    "q" | "quit" => break,
                    "skip" => Ok(engine.skip_rest()),
                    "done" => Ok(engine.complete_rest()),
                    other => match parse_watch_adjustment(other) {
                        Some(RestAction::Add { secs }) => engine.extend_rest(secs),
                        Some(RestAction::Sub { secs }) => engine.reduce_rest(secs),
                        _ => {
                            eprintln!("unknown command: {other}");
                            Ok(false)
                        }
                    },
                };
                if let Err(err) = result {
                    eprintln!("{err}");
                }
            }
        }

        let resting = engine.rest_remaining().is_some() || engine.pending_advance_at().is_some();
        if !resting {
            break;
        }
        if let Some(remaining) = engine.rest_remaining() {
            let secs = ceil_secs(remaining);
            if last_shown != Some(secs) {
                println!("{}", format_clock(secs));
                last_shown = Some(secs);
            }
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let config_store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };
    let config = config_store.load();

    let db_path = cli
        .db
        .clone()
        .or_else(AppDirs::db_path)
        .ok_or("could not determine a database location; pass --db")?;
    let db = Database::open(&db_path)?;

    if let Command::History { limit, csv } = &cli.command {
        let summaries = SqliteHistory::new(db).list_recent(*limit)?;
        if *csv {
            export_csv(&summaries, io::stdout().lock())?;
        } else if summaries.is_empty() {
            println!("No workouts yet");
        } else {
            for s in &summaries {
                println!(
                    "{} {} | {} | {} sets | volume {} | {} PRs",
                    s.finished_at.format("%Y-%m-%d"),
                    s.name,
                    format_clock(s.duration_secs),
                    s.total_sets,
                    s.total_volume,
                    s.prs.len()
                );
            }
        }
        return Ok(());
    }

    let notifier: Box<dyn NotificationScheduler> = if config.notifications_enabled {
        Box::new(LogScheduler)
    } else {
        Box::new(NoopScheduler)
    };
    let mut engine = SessionEngine::new(
        Services::sqlite(db, notifier),
        Box::new(SystemClock),
        config,
    );
    engine.subscribe(Box::new(print_event));
    engine.resume();

    match cli.command {
        Command::Start { name, exercises } => {
            engine.start_workout(&name, exercises)?;
            println!("Started {name}");
        }
        Command::Add {
            name,
            sets,
            hold,
            alternatives,
        } => {
            let exercise = match hold {
                Some(secs) => Exercise::hold(name, sets, Some(secs)),
                None => Exercise::new(name, sets),
            }
            .with_alternatives(alternatives);
            let index = engine.add_exercise(exercise)?;
            println!("Added exercise #{}", index + 1);
        }
        Command::Log {
            weight,
            reps,
            warmup,
        } => {
            engine.complete_set(weight, reps, warmup)?;
        }
        Command::Hold { secs } => {
            engine.complete_hold_set(secs)?;
        }
        Command::Warmup { weight, reps } => {
            let added = engine.add_warmup_sets(weight, reps)?;
            println!("Added {added} warm-up sets");
        }
        Command::Dropsets {
            off,
            count,
            reduction,
        } => {
            engine.configure_dropsets(!off, count, reduction)?;
        }
        Command::Undo => {
            if !engine.undo_last_set() {
                println!("Nothing to undo");
            }
        }
        Command::Rest { action } => {
            let changed = match action {
                RestAction::Skip => engine.skip_rest(),
                RestAction::Done => engine.complete_rest(),
                RestAction::Add { secs } => engine.extend_rest(secs)?,
                RestAction::Sub { secs } => engine.reduce_rest(secs)?,
            };
            if !changed {
                println!("No rest timer running");
            } else if let Some(remaining) = engine.rest_remaining() {
                println!("Rest {} left", format_clock(ceil_secs(remaining)));
            }
        }
        Command::Pause => {
            engine.pause_workout_timer();
        }
        Command::Resume => {
            engine.resume_workout_timer();
        }
        Command::ResetTimer => {
            engine.reset_workout_timer();
        }
        Command::Select { position } => {
            if position == 0 || !engine.select_exercise(position - 1) {
                println!("No exercise at position {position}");
            }
        }
        Command::Swap { name } => engine.switch_to_alternative(&name)?,
        Command::Status => print_status(&engine),
        Command::Watch => {
            if matches!(engine.rest_state(), RestState::Active { .. })
                || engine.pending_advance_at().is_some()
            {
                watch(&mut engine);
            } else {
                println!("No rest timer running");
            }
        }
        Command::Finish => {
            engine.finish_workout()?;
        }
        Command::Cancel => engine.cancel_workout()?,
        Command::History { .. } => {}
    }

    engine.suspend();
    Ok(())
}
