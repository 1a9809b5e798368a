//! az: CLI binary for self-play training runs.
//!
//! Subcommands:
//! - train
//! - selfplay
//! - arena
//! - config check

use std::env;
use std::path::{Path, PathBuf};
use std::process;

use az_controller::{load_checkpoint, IterationController};
use az_core::{Config, Game, Outcome, TicTacToe};
use az_eval::{Arena, ArenaSettings};
use az_model::TabularEvaluator;
use az_runtime::{SelfPlayConfig, SelfPlayEngine, WorkerPool};

fn print_help() {
    eprintln!(
        r#"az - self-play training loop (tic-tac-toe)

USAGE:
    az <COMMAND> [OPTIONS]

COMMANDS:
    train               Run the iteration loop described by a config
    selfplay            Play self-play games and print a summary
    arena               Pit two checkpoints against each other
    config check        Validate a YAML config

OPTIONS:
    -h, --help          Print this help message
    -V, --version       Print version

Logging is controlled with RUST_LOG (default: info).
Run `az <COMMAND> --help` for command options.
"#
    );
}

fn print_version() {
    println!("az {}", env!("CARGO_PKG_VERSION"));
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("{msg}");
    process::exit(1);
}

/// Value following the flag at `args[i]`.
fn flag_value<'a>(args: &'a [String], i: usize) -> &'a str {
    match args.get(i + 1) {
        Some(v) => v,
        None => fail(format!("Missing value for {}", args[i])),
    }
}

fn parse_flag<T: std::str::FromStr>(args: &[String], i: usize) -> T {
    let v = flag_value(args, i);
    v.parse()
        .unwrap_or_else(|_| fail(format!("Invalid {} value: {v}", args[i])))
}

fn load_config(path: &Path) -> Config {
    let cfg = Config::load(path)
        .unwrap_or_else(|e| fail(format!("Failed to load config {}: {e}", path.display())));
    if let Err(e) = cfg.validate() {
        fail(format!("Invalid config {}: {e}", path.display()));
    }
    log::debug!("loaded config {}", path.display());
    cfg
}

fn load_evaluator(dir: &Path) -> TabularEvaluator {
    match load_checkpoint::<TabularEvaluator>(dir) {
        Ok(ck) => ck.evaluator,
        Err(e) => fail(format!("Failed to load checkpoint: {e}")),
    }
}

fn outcome_label(o: Outcome) -> &'static str {
    match o {
        Outcome::Win(p) => p.as_str(),
        Outcome::Draw => "draw",
    }
}

fn cmd_train(args: &[String]) {
    let mut config_path: Option<PathBuf> = None;
    let mut num_iters: Option<u32> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"az train

USAGE:
    az train --config cfg.yaml [--num-iters N]

OPTIONS:
    --config PATH     Path to YAML config (required)
    --num-iters N     Override controller.num_iters
"#
                );
                return;
            }
            "--config" => {
                config_path = Some(PathBuf::from(flag_value(args, i)));
                i += 2;
            }
            "--num-iters" => {
                num_iters = Some(parse_flag(args, i));
                i += 2;
            }
            other => fail(format!(
                "Unknown option for `az train`: {other}\nRun `az train --help` for usage."
            )),
        }
    }

    let Some(config_path) = config_path else {
        fail("Missing --config");
    };
    let mut cfg = load_config(&config_path);
    if let Some(n) = num_iters {
        cfg.controller.num_iters = n;
    }

    let game = TicTacToe;
    let initial = TabularEvaluator::new(game.action_space());
    let mut ctrl = IterationController::new(cfg, &game, initial)
        .unwrap_or_else(|e| fail(format!("Failed to start: {e}")));
    let run_dir = ctrl.run_dir().to_path_buf();
    let summary = ctrl
        .run()
        .unwrap_or_else(|e| fail(format!("Run failed: {e}")));

    for r in &summary.iterations {
        let arena = match r.arena {
            Some(a) => format!(
                "arena {}-{}-{}",
                a.candidate_wins, a.incumbent_wins, a.draws
            ),
            None => "arena off".to_string(),
        };
        println!(
            "iteration {}: {} games, {} examples, corpus {}, {}, {}",
            r.iteration,
            r.games,
            r.examples_generated,
            r.corpus_size,
            arena,
            r.verdict.as_str()
        );
    }
    println!(
        "Run complete. iterations={} accepted={} best={} stopped_early={} dir={}",
        summary.iterations.len(),
        summary.accepted(),
        summary
            .best_iteration
            .map(|b| b.to_string())
            .unwrap_or_else(|| "none".to_string()),
        summary.stopped_early,
        run_dir.display()
    );
}

fn cmd_selfplay(args: &[String]) {
    let mut config_path: Option<PathBuf> = None;
    let mut checkpoint: Option<PathBuf> = None;
    let mut games: Option<usize> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"az selfplay

USAGE:
    az selfplay --config cfg.yaml [--games N] [--checkpoint DIR]

OPTIONS:
    --config PATH       Path to YAML config (required)
    --games N           Number of games (default: selfplay.num_eps)
    --checkpoint DIR    Play with a saved evaluator (default: untrained)
"#
                );
                return;
            }
            "--config" => {
                config_path = Some(PathBuf::from(flag_value(args, i)));
                i += 2;
            }
            "--checkpoint" => {
                checkpoint = Some(PathBuf::from(flag_value(args, i)));
                i += 2;
            }
            "--games" => {
                games = Some(parse_flag(args, i));
                i += 2;
            }
            other => fail(format!(
                "Unknown option for `az selfplay`: {other}\nRun `az selfplay --help` for usage."
            )),
        }
    }

    let Some(config_path) = config_path else {
        fail("Missing --config");
    };
    let cfg = load_config(&config_path);
    let game = TicTacToe;
    let evaluator = match &checkpoint {
        Some(dir) => load_evaluator(dir),
        None => TabularEvaluator::new(game.action_space()),
    };
    let n = games.unwrap_or(cfg.selfplay.num_eps as usize);

    let pool = WorkerPool::new(cfg.selfplay.workers as usize)
        .unwrap_or_else(|e| fail(format!("Failed to start worker pool: {e}")));
    let engine = SelfPlayEngine::new(&game, &evaluator, SelfPlayConfig::from(&cfg));
    let records = engine
        .play_games(&pool, n)
        .unwrap_or_else(|e| fail(format!("Self-play failed: {e}")));

    let mut wins = [0usize; 2];
    let mut draws = 0usize;
    let mut examples = 0usize;
    for r in &records {
        match r.outcome {
            Outcome::Win(p) => wins[p.index()] += 1,
            Outcome::Draw => draws += 1,
        }
        examples += r.examples.len();
        println!(
            "game {}: {} plies, outcome {}, actions {:?}",
            r.game_index,
            r.plies(),
            outcome_label(r.outcome),
            r.actions
        );
    }
    println!(
        "games: {} first_wins: {} second_wins: {} draws: {} examples: {}",
        records.len(),
        wins[0],
        wins[1],
        draws,
        examples
    );
}

fn cmd_arena(args: &[String]) {
    let mut config_path: Option<PathBuf> = None;
    let mut incumbent: Option<PathBuf> = None;
    let mut candidate: Option<PathBuf> = None;
    let mut games: Option<u32> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!(
                    r#"az arena

USAGE:
    az arena --config cfg.yaml --incumbent DIR --candidate DIR [--games N]

OPTIONS:
    --config PATH       Path to YAML config (required)
    --incumbent DIR     Checkpoint directory of the incumbent (required)
    --candidate DIR     Checkpoint directory of the candidate (required)
    --games N           Override arena.arena_compare
"#
                );
                return;
            }
            "--config" => {
                config_path = Some(PathBuf::from(flag_value(args, i)));
                i += 2;
            }
            "--incumbent" => {
                incumbent = Some(PathBuf::from(flag_value(args, i)));
                i += 2;
            }
            "--candidate" => {
                candidate = Some(PathBuf::from(flag_value(args, i)));
                i += 2;
            }
            "--games" => {
                games = Some(parse_flag(args, i));
                i += 2;
            }
            other => fail(format!(
                "Unknown option for `az arena`: {other}\nRun `az arena --help` for usage."
            )),
        }
    }

    let (Some(config_path), Some(incumbent), Some(candidate)) =
        (config_path, incumbent, candidate)
    else {
        fail("`az arena` requires --config, --incumbent and --candidate");
    };
    let cfg = load_config(&config_path);
    let inc = load_evaluator(&incumbent);
    let cand = load_evaluator(&candidate);

    let mut settings = ArenaSettings::from(&cfg);
    if let Some(g) = games {
        settings.games = g;
    }
    if settings.games == 0 {
        fail("Arena needs at least one game (--games or arena.arena_compare)");
    }
    let pool = WorkerPool::new(cfg.selfplay.workers as usize)
        .unwrap_or_else(|e| fail(format!("Failed to start worker pool: {e}")));
    let game = TicTacToe;
    let arena = Arena::new(&game, settings);
    let result = arena
        .compare(&pool, &inc, &cand)
        .unwrap_or_else(|e| fail(format!("Arena failed: {e}")));
    let verdict = arena.decide(&result);

    let ratio = result
        .win_ratio(settings.draw_policy)
        .map(|r| format!("{r:.4}"))
        .unwrap_or_else(|| "n/a".to_string());
    println!(
        "games={} candidate_wins={} incumbent_wins={} draws={} win_ratio={} threshold={} verdict={}",
        result.games,
        result.candidate_wins,
        result.incumbent_wins,
        result.draws,
        ratio,
        settings.update_threshold,
        verdict.as_str()
    );
}

fn cmd_config_check(args: &[String]) {
    let Some(path) = args.first() else {
        fail("Usage: az config check <config.yaml>");
    };
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("Failed to read {path}: {e}")));
    let cfg = Config::from_yaml(&text).unwrap_or_else(|e| fail(format!("Invalid config: {e}")));
    if let Err(e) = cfg.validate() {
        fail(format!("Invalid config: {e}"));
    }
    println!(
        "ok: {path} (config_hash={})",
        az_logging::hash_config_bytes(text.as_bytes())
    );
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        process::exit(0);
    }
    az_logging::init_logging("info");

    match args[1].as_str() {
        "-h" | "--help" | "help" => print_help(),
        "-V" | "--version" => print_version(),
        "train" => cmd_train(&args[2..]),
        "selfplay" => cmd_selfplay(&args[2..]),
        "arena" => cmd_arena(&args[2..]),
        "config" => match args.get(2).map(String::as_str) {
            Some("check") => cmd_config_check(&args[3..]),
            _ => fail("Usage: az config check <config.yaml>"),
        },
        cmd => fail(format!("Unknown command: {cmd}\nRun `az --help` for usage.")),
    }
}
