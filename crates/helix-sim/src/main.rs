//! helix-sim - demo harness driving `helix-core` with a simulated learner.
//!
//! Not a host application: stands in for the UI/audio layers the scheduler
//! core is deliberately silent on, so the engine can be exercised end to end
//! from the command line.

mod content;
mod learner;

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use helix_core::{
    AdaptedAction, AdaptationEngine, ItemMode, LegoId, NextAction, RoundResult, ThreadId,
};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use content::DemoCourse;
use learner::SimulatedLearner;

#[derive(Parser)]
#[command(name = "helix-sim")]
#[command(about = "Drives helix-core with a simulated learner")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0=error, 1=warn, 2=info, 3=debug)
    #[arg(short, long, default_value = "2")]
    verbosity: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one simulated session and print a summary report.
    Run {
        /// RNG seed for reproducibility
        #[arg(short = 'S', long, default_value = "42")]
        seed: u64,

        /// Number of learner responses to simulate
        #[arg(short, long, default_value = "60")]
        items: u32,

        /// Number of helix threads to run concurrently
        #[arg(short, long, default_value = "3")]
        threads: u8,

        /// Learner's baseline reaction time in milliseconds
        #[arg(short, long, default_value = "1400")]
        base_latency_ms: u32,
    },

    /// Print the bundled demo course's baskets without running a session.
    Inspect,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbosity);

    match cli.command {
        Commands::Run {
            seed,
            items,
            threads,
            base_latency_ms,
        } => run_session(seed, items, threads, base_latency_ms),
        Commands::Inspect => inspect_course(),
    }
}

fn inspect_course() -> Result<()> {
    let config = helix_core::config::LegoIntroductionConfig::default();
    let course = DemoCourse::load(&config)?;
    for seed in &course.seeds {
        println!("SEED {} ({})", seed.seed_id, seed.pair.target_text);
        for lego in &seed.legos {
            let basket = &course.baskets[&lego.id];
            println!(
                "  LEGO {} [{:?}] debut phrases={} eternal pool={}",
                lego.id,
                lego.kind,
                basket.debut_phrases.len(),
                basket.eternal_pool.len()
            );
        }
    }
    Ok(())
}

struct SessionReport {
    completions: u32,
    spikes: u32,
    repeats: u32,
    breakdowns: u32,
}

fn run_session(seed: u64, items: u32, threads: u8, base_latency_ms: u32) -> Result<()> {
    let mut engine = AdaptationEngine::new(threads, 5);
    let config = engine.config().resolve().lego_introduction.clone();
    let course = DemoCourse::load(&config)?;

    engine
        .helix_mut()
        .distribute_seeds(&course.seeds, "demo-course".into(), threads);

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut learner = SimulatedLearner::new(base_latency_ms);
    let mut clock: DateTime<Utc> = Utc::now();

    let bar = ProgressBar::new(items as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut report = SessionReport {
        completions: 0,
        spikes: 0,
        repeats: 0,
        breakdowns: 0,
    };

    let mut guard_iterations = 0u32;
    while report.completions < items {
        guard_iterations += 1;
        if guard_iterations > items * 20 {
            tracing::warn!("bailing out: threads exhausted well before reaching the item target");
            break;
        }

        let action = engine.next_item(&mut rng, clock);
        match action {
            NextAction::ThreadExhausted => break,
            NextAction::StartRound { thread_id, lego_id } => {
                engine.helix_mut().start_round(thread_id, lego_id.clone(), &config);
                step_round(&mut engine, &course, thread_id, &lego_id, &mut learner, &mut rng, &mut clock, &mut report, &bar, &config);
            }
            NextAction::ContinueRound { thread_id, lego_id } => {
                step_round(&mut engine, &course, thread_id, &lego_id, &mut learner, &mut rng, &mut clock, &mut report, &bar, &config);
            }
            NextAction::PracticeReady { thread_id, lego_id } => {
                let basket = &course.baskets[&lego_id];
                let latency = learner.respond(&mut rng);
                clock += ChronoDuration::milliseconds(latency as i64);
                let item = engine.process_completion(
                    lego_id.clone(),
                    course.lego_kind(&lego_id),
                    thread_id,
                    latency,
                    basket.debut.word_count.max(5),
                    ItemMode::Review,
                    None,
                    &mut rng,
                    clock,
                );
                record(&mut report, &item);
                clock += ChronoDuration::milliseconds(item.pause_duration_ms as i64);
                bar.set_position(report.completions as u64);
            }
        }
    }
    bar.finish_and_clear();

    info!(
        completions = report.completions,
        spikes = report.spikes,
        repeats = report.repeats,
        breakdowns = report.breakdowns,
        "session finished"
    );
    println!(
        "session: {} responses, {} spikes, {} repeats, {} breakdowns, final pause multiplier {:.2}",
        report.completions,
        report.spikes,
        report.repeats,
        report.breakdowns,
        engine.get_pause_duration_multiplier(),
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn step_round(
    engine: &mut AdaptationEngine,
    course: &DemoCourse,
    thread_id: ThreadId,
    lego_id: &LegoId,
    learner: &mut SimulatedLearner,
    rng: &mut impl rand::Rng,
    clock: &mut DateTime<Utc>,
    report: &mut SessionReport,
    bar: &ProgressBar,
    round_config: &helix_core::config::LegoIntroductionConfig,
) {
    let basket = &course.baskets[lego_id];
    let (round_state, progress) = engine.helix_mut().round_and_progress_mut(thread_id, lego_id);
    let (Some(round_state), Some(progress)) = (round_state, progress) else {
        return;
    };
    let result = helix_core::RoundEngine::next(round_state, basket, progress, round_config, rng);

    match result {
        RoundResult::PlayIntroAudio { .. } => {
            tracing::debug!(lego = %lego_id, "intro audio played");
        }
        RoundResult::PresentDebutLego { .. } => {
            tracing::debug!(lego = %lego_id, "debut lego presented");
        }
        RoundResult::PresentPhrase { phrase } => {
            let latency = learner.respond(rng);
            *clock += ChronoDuration::milliseconds(latency as i64);
            let item = engine.process_completion(
                lego_id.clone(),
                course.lego_kind(lego_id),
                thread_id,
                latency,
                phrase.word_count.max(5),
                ItemMode::Introduction,
                None,
                rng,
                *clock,
            );
            record(report, &item);
            *clock += ChronoDuration::milliseconds(item.pause_duration_ms as i64);
            bar.set_position(report.completions as u64);
        }
        RoundResult::ContinueSpacedRep => {
            let latency = learner.respond(rng);
            *clock += ChronoDuration::milliseconds(latency as i64);
            let item = engine.process_completion(
                lego_id.clone(),
                course.lego_kind(lego_id),
                thread_id,
                latency,
                basket.debut.word_count.max(5),
                ItemMode::Practice,
                None,
                rng,
                *clock,
            );
            record(report, &item);
            *clock += ChronoDuration::milliseconds(item.pause_duration_ms as i64);
            bar.set_position(report.completions as u64);
        }
        RoundResult::Complete { lego_id } => {
            engine.helix_mut().complete_round(thread_id, &lego_id);
            tracing::info!(lego = %lego_id, "round complete");
        }
    }
}

fn record(report: &mut SessionReport, item: &helix_core::AdaptedItem) {
    report.completions += 1;
    match item.action {
        AdaptedAction::Continue => {}
        AdaptedAction::Repeat => {
            report.repeats += 1;
            report.spikes += 1;
        }
        AdaptedAction::Breakdown => {
            report.breakdowns += 1;
            report.spikes += 1;
        }
    }
}
