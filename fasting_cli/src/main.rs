use chrono::{DateTime, Duration, FixedOffset, Utc};
use clap::{Parser, Subcommand};
use fasting_core::*;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::MissedTickBehavior;

#[derive(Parser)]
#[command(name = "fastr")]
#[command(about = "Intermittent fasting tracker with metabolic zones", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Pretend the current time is this RFC 3339 timestamp
    #[arg(long, global = true, hide = true, value_parser = parse_timestamp)]
    now: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a fast
    Start {
        /// Built-in plan (16:8, 18:6, 20:4, OMAD)
        #[arg(long, conflicts_with = "hours")]
        plan: Option<String>,

        /// Custom goal in whole hours (1-72)
        #[arg(long)]
        hours: Option<u32>,
    },

    /// End the running fast
    End,

    /// Show the running fast (default)
    Status,

    /// Move the start of the running fast
    EditStart {
        /// How long ago the fast started, e.g. 5h, 90m, 1h30m
        #[arg(long, value_parser = parse_ago, conflicts_with = "at", required_unless_present = "at")]
        ago: Option<Duration>,

        /// Exact start time (RFC 3339)
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,
    },

    /// Follow the running fast until it completes or Ctrl-C
    Watch,

    /// Show streaks, totals and badges
    Profile,

    /// List the metabolic zones
    Zones,

    /// List the built-in fasting plans
    Plans,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    fasting_core::logging::init_with_verbosity(cli.verbose);

    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Zones => {
            print_zones();
            Ok(())
        }
        Commands::Plans => {
            print_plans(&config);
            Ok(())
        }
        command => run_session_command(command, &config, data_dir, cli.now).await,
    }
}

/// Build the engine around the data directory, run one command and flush effects
async fn run_session_command(
    command: Commands,
    config: &Config,
    data_dir: PathBuf,
    now_override: Option<DateTime<Utc>>,
) -> Result<()> {
    std::fs::create_dir_all(&data_dir)?;
    let paths = DataPaths::new(&data_dir);
    let offset = config.calendar_offset();

    // Held until the effects are drained, so commands from separate
    // processes never interleave their transitions
    let mut lock = lock_data_dir(&paths);
    let now = now_override.unwrap_or_else(Utc::now);
    tracing::debug!("Using data directory {:?} at {}", data_dir, now);

    let collaborator = Arc::new(LocalCollaborator::new(&paths.journal, &paths.context));
    let (sink, dispatcher) = spawn_dispatcher(collaborator);
    let mut engine = SessionEngine::open(&paths, offset, Arc::new(sink), now);

    let result = match command {
        Commands::Start { plan, hours } => cmd_start(&mut engine, config, plan, hours, now, &offset),
        Commands::End => {
            cmd_end(&mut engine, now);
            Ok(())
        }
        Commands::Status => {
            cmd_status(&mut engine, now, &offset);
            Ok(())
        }
        Commands::EditStart { ago, at } => cmd_edit_start(&mut engine, ago, at, now, &offset),
        Commands::Watch => {
            cmd_watch(&mut engine, config, &paths, &mut lock, Clock::starting_at(now)).await
        }
        Commands::Profile => cmd_profile(&engine, &paths, &offset),
        Commands::Zones | Commands::Plans => Ok(()),
    };

    if let Err(e) = &result {
        tracing::debug!("Command failed: {}", e);
    }
    if engine.has_unsaved_session() {
        eprintln!("warning: the session could not be saved to {}", paths.session.display());
    }

    // Engine holds the last sink handle; drop it before draining
    drop(engine);
    dispatcher.shutdown().await;
    tracing::debug!("Effect queue drained");
    drop(lock);

    result
}

/// Take the data directory lock, or run unlocked if the lock file can't be opened
fn lock_data_dir(paths: &DataPaths) -> Option<DataLock> {
    match DataLock::acquire(&paths.lock) {
        Ok(lock) => Some(lock),
        Err(e) => {
            tracing::warn!("Running without data lock {:?}: {}", paths.lock, e);
            None
        }
    }
}

/// Clock for long-running commands, counting from the command's start time
struct Clock {
    origin: DateTime<Utc>,
    started: Instant,
}

impl Clock {
    fn starting_at(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            started: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.origin + Duration::milliseconds(self.started.elapsed().as_millis() as i64)
    }
}

fn cmd_start(
    engine: &mut SessionEngine,
    config: &Config,
    plan: Option<String>,
    hours: Option<u32>,
    now: DateTime<Utc>,
    offset: &FixedOffset,
) -> Result<()> {
    let (label, goal) = match (plan, hours) {
        (_, Some(hours)) => (format!("{}h custom", hours), custom_goal_seconds(hours)?),
        (plan, None) => {
            let name = plan.unwrap_or_else(|| config.fasting.default_plan.clone());
            let plan = find_plan(&name)
                .ok_or_else(|| Error::Other(format!("Unknown plan '{}'", name)))?;
            (plan.name.to_string(), plan.goal_seconds())
        }
    };

    engine.start(goal, now)?;

    println!("✓ Started {} fast at {}", label, format_time(now, offset));
    println!("  Goal: {}", format_hms(goal));
    println!(
        "  Ends: {}",
        format_time(now + Duration::milliseconds((goal * 1000.0) as i64), offset)
    );
    Ok(())
}

fn cmd_end(engine: &mut SessionEngine, now: DateTime<Utc>) {
    match engine.end(now) {
        Some(completed) => print_completed(&completed),
        None => println!("No fast in progress."),
    }
}

fn cmd_status(engine: &mut SessionEngine, now: DateTime<Utc>, offset: &FixedOffset) {
    if let Some(completed) = engine.tick(now) {
        print_completed(&completed);
        return;
    }

    if !engine.is_fasting() {
        println!("Not fasting.");
        let profile = engine.profile();
        println!(
            "  Streak: {} day(s), {} fast(s) completed",
            profile.current_streak, profile.total_fasts_completed
        );
        return;
    }

    let zone = engine.current_zone();
    let elapsed = engine.elapsed();

    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {} {}", zone.emoji, zone.name.to_uppercase());
    println!("╰─────────────────────────────────────────╯");
    println!();
    if let Some(start) = from_epoch_seconds(engine.start_timestamp()) {
        println!("  Started:   {}", format_time(start, offset));
    }
    println!(
        "  Elapsed:   {} ({:.0}% of {})",
        format_hms(elapsed),
        engine.progress() * 100.0,
        format_hms(engine.goal())
    );
    println!("  Remaining: {}", format_hms(engine.remaining()));
    println!("  In zone:   {}", format_hms(engine.time_in_current_zone()));
    if let (Some(next), Some(wait)) = (zones::next_zone(elapsed), zones::time_to_next_zone(elapsed)) {
        println!("  Next:      {} {} in {}", next.emoji, next.name, format_hms(wait));
    }
    println!();
    for line in zone.trivia {
        println!("  ℹ {}", line);
    }
    println!();
}

fn cmd_edit_start(
    engine: &mut SessionEngine,
    ago: Option<Duration>,
    at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    offset: &FixedOffset,
) -> Result<()> {
    let new_start = match (at, ago) {
        (Some(at), _) => at,
        (None, Some(ago)) => now.checked_sub_signed(ago).ok_or_else(|| {
            Error::Other(format!(
                "--ago {}s reaches past the earliest supported time",
                ago.num_seconds()
            ))
        })?,
        (None, None) => return Err(Error::Other("pass --ago or --at".into())),
    };

    engine.edit_start_time(new_start, now)?;

    println!("✓ Start moved to {}", format_time(new_start, offset));
    println!(
        "  Elapsed: {} ({} {})",
        format_hms(engine.elapsed()),
        engine.current_zone().emoji,
        engine.current_zone().name
    );
    if engine.elapsed() < 0.0 {
        println!("  The new start is in the future; the clock counts from zero until then.");
    }
    if engine.elapsed() >= engine.goal() {
        println!("  Goal already reached; the fast completes on the next status or watch.");
    }
    Ok(())
}

/// Follow the fast, taking the data lock only for the length of each tick so
/// other commands can run in between
async fn cmd_watch(
    engine: &mut SessionEngine,
    config: &Config,
    paths: &DataPaths,
    lock: &mut Option<DataLock>,
    clock: Clock,
) -> Result<()> {
    if !engine.is_fasting() {
        println!("No fast in progress. Start one with `fastr start`.");
        return Ok(());
    }

    let locking = lock.take().is_some();

    let mut interval =
        tokio::time::interval(std::time::Duration::from_millis(config.fasting.tick_interval_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut last_zone = engine.current_zone().name;
    let mut stdout = io::stdout();

    loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                tracing::info!("Watch interrupted");
                println!();
                println!("Stopped watching; the fast is still running.");
                return Ok(());
            }
            _ = interval.tick() => {
                let _guard = if locking {
                    match DataLock::try_acquire(&paths.lock)? {
                        Some(guard) => Some(guard),
                        None => {
                            tracing::debug!("Data directory busy, skipping tick");
                            continue;
                        }
                    }
                } else {
                    None
                };

                let now = clock.now();
                engine.reload(now);
                if !engine.is_fasting() {
                    println!();
                    println!("The fast was ended by another command.");
                    return Ok(());
                }

                if let Some(completed) = engine.tick(now) {
                    println!();
                    print_completed(&completed);
                    return Ok(());
                }

                let zone = engine.current_zone();
                if zone.name != last_zone {
                    println!();
                    println!("→ Entered {} {}", zone.emoji, zone.name);
                    last_zone = zone.name;
                }

                print!(
                    "\r{} {:<15} {}  {:>3.0}%  ",
                    zone.emoji,
                    zone.name,
                    format_hms(engine.elapsed()),
                    engine.progress() * 100.0
                );
                stdout.flush()?;
            }
        }
    }
}

fn cmd_profile(engine: &SessionEngine, paths: &DataPaths, offset: &FixedOffset) -> Result<()> {
    let profile = engine.profile();
    let logged = read_intervals(&paths.journal)?;

    println!("Current streak:  {} day(s)", profile.current_streak);
    println!("Longest streak:  {} day(s)", profile.longest_streak);
    println!("Fasts completed: {}", profile.total_fasts_completed);
    if let Some(last) = profile.last_fast_date {
        println!("Last fast:       {}", format_time(last, offset));
    }
    if let Some(longest) = logged.iter().map(|i| i.duration_secs).reduce(f64::max) {
        println!("Longest logged:  {}", format_hms(longest));
    }

    println!();
    println!("Badges:");
    for badge in badges::all() {
        let mark = if profile.has_badge(badge.id) { "🏅" } else { "  " };
        println!("  {} {:<22} {}", mark, badge.name, badge.description);
    }
    Ok(())
}

fn print_zones() {
    let all = zones::all();
    let mut from = 0.0;
    for (i, zone) in all.iter().enumerate() {
        let range = if i + 1 == all.len() {
            format!("{:.0}h+", from / 3600.0)
        } else {
            format!("{:.0}h to {:.0}h", from / 3600.0, zone.threshold_seconds / 3600.0)
        };
        println!("{} {:<15} {}", zone.emoji, zone.name, range);
        for benefit in zone.benefits {
            println!("     • {}", benefit);
        }
        from = zone.threshold_seconds;
    }
}

fn print_plans(config: &Config) {
    for plan in plans::default_plans() {
        let marker = if plan.name.eq_ignore_ascii_case(&config.fasting.default_plan) {
            " (default)"
        } else {
            ""
        };
        println!("{:<6} {}h fast{}", plan.name, plan.hours, marker);
    }
    println!("Custom fasts: --hours 1 to {}", plans::MAX_CUSTOM_HOURS);
}

fn print_completed(completed: &CompletedFast) {
    if completed.reached_goal() {
        println!("🎉 Goal reached!");
    }
    println!(
        "✓ Fast ended after {} (goal {})",
        format_hms(completed.elapsed_secs),
        format_hms(completed.goal_secs)
    );

    let Some(outcome) = &completed.outcome else {
        return;
    };

    println!(
        "  Streak: {} day(s), {} fast(s) completed",
        outcome.current_streak, outcome.total_fasts_completed
    );
    for badge in &outcome.newly_unlocked {
        println!("  🏅 Unlocked: {}: {}", badge.name, badge.description);
    }
    if let Err(e) = &outcome.persisted {
        eprintln!("warning: {}", e);
    }
}

/// `HH:MM:SS`, with a leading minus for negative durations
fn format_hms(secs: f64) -> String {
    let sign = if secs < 0.0 { "-" } else { "" };
    let total = secs.abs().floor() as u64;
    format!(
        "{}{:02}:{:02}:{:02}",
        sign,
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

fn format_time(at: DateTime<Utc>, offset: &FixedOffset) -> String {
    at.with_timezone(offset).format("%Y-%m-%d %H:%M").to_string()
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{}': {}", s, e))
}

/// Parse `5h`, `90m`, `1h30m`, `45s` and similar into a duration
fn parse_ago(s: &str) -> std::result::Result<Duration, String> {
    let mut total = 0i64;
    let mut digits = String::new();

    for c in s.trim().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        let unit = match c {
            'h' | 'H' => 3600,
            'm' | 'M' => 60,
            's' | 'S' => 1,
            _ => return Err(format!("unexpected '{}' in duration '{}'", c, s)),
        };
        if digits.is_empty() {
            return Err(format!("missing number before '{}' in '{}'", c, s));
        }
        let value: i64 = digits
            .parse()
            .map_err(|_| format!("number too large in '{}'", s))?;
        total = value
            .checked_mul(unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| format!("duration '{}' is too long", s))?;
        digits.clear();
    }

    if !digits.is_empty() {
        return Err(format!("missing unit (h, m or s) after '{}' in '{}'", digits, s));
    }
    if total == 0 {
        return Err(format!("duration '{}' must be positive", s));
    }
    Duration::try_seconds(total).ok_or_else(|| format!("duration '{}' is too long", s))
}
