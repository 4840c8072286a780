//! nnue-tool: NNUE ネットワークの読み込み・検証・評価・書き出し
//!
//! ```text
//! nnue-tool verify
//! nnue-tool eval --fen "<FEN>" --moves e2e4 e7e5
//! nnue-tool trace
//! nnue-tool save --tier small --output small.nnue
//! nnue-tool info
//! ```

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{debug, info};

use chess_nnue::eval::{EvalConfig, EvalState, Evaluator};
use chess_nnue::nnue::{BIG_L1, NetSize, NnueNetwork, SMALL_L1};
use chess_nnue::position::{Position, START_FEN};
use chess_nnue::types::{Color, Value};

#[derive(Parser, Debug)]
#[command(name = "nnue-tool", about = "Load, verify, evaluate and export NNUE networks", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct GlobalArgs {
    /// 評価関数の設定ファイル（TOML）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// big tier のファイル名（設定ファイルより優先）
    #[arg(long, global = true)]
    eval_file: Option<String>,

    /// small tier のファイル名（設定ファイルより優先）
    #[arg(long, global = true)]
    eval_file_small: Option<String>,

    /// 追加の探索ディレクトリ
    #[arg(long, global = true)]
    network_dir: Option<PathBuf>,

    /// ログレベル（RUST_LOG より優先）
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the configured networks and check that both tiers are available
    Verify,
    /// Print the static evaluation of a position
    Eval(PositionArgs),
    /// Print the per-piece and per-bucket breakdown of a position
    Trace(PositionArgs),
    /// Write a loaded network back to disk
    Save(SaveArgs),
    /// Show what each tier loaded
    Info,
}

#[derive(Args, Debug, Clone)]
struct PositionArgs {
    /// 局面（省略時は平手初期局面）
    #[arg(long, default_value = START_FEN)]
    fen: String,

    /// FEN の局面から指す手（UCI 形式）
    #[arg(long, num_args = 1..)]
    moves: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct SaveArgs {
    #[arg(long, value_enum, default_value_t = TierArg::Big)]
    tier: TierArg,

    /// 出力先（省略できるのは既定ネットワークのみ）
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TierArg {
    Big,
    Small,
}

impl From<TierArg> for NetSize {
    fn from(t: TierArg) -> Self {
        match t {
            TierArg::Big => NetSize::Big,
            TierArg::Small => NetSize::Small,
        }
    }
}

fn init_logger(level: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder
        .format(|buf, record| {
            writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args())
        })
        .write_style(env_logger::WriteStyle::Never)
        .target(env_logger::Target::Stderr)
        .init();
}

/// 設定ファイルを読み、コマンドライン引数で上書きする
fn build_config(args: &GlobalArgs) -> Result<EvalConfig> {
    let mut config = match &args.config {
        Some(path) => EvalConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EvalConfig::default(),
    };
    if let Some(name) = &args.eval_file {
        config.eval_file_big = name.clone();
    }
    if let Some(name) = &args.eval_file_small {
        config.eval_file_small = name.clone();
    }
    if let Some(dir) = &args.network_dir {
        config.network_dir = Some(dir.clone());
    }
    Ok(config)
}

/// FEN と指し手列から局面と評価状態を作る
fn build_position(args: &PositionArgs) -> Result<(Position, EvalState)> {
    let mut pos = Position::empty();
    pos.set_fen(&args.fen).with_context(|| format!("invalid FEN: {}", args.fen))?;

    let mut state = EvalState::new();
    for text in &args.moves {
        let m = pos.parse_uci_move(text).ok_or_else(|| anyhow!("invalid move: {text}"))?;
        let dirty = pos.do_move(m);
        state.push(dirty);
        debug!("applied {text}");
    }
    Ok((pos, state))
}

/// 白視点の pawn 単位
fn white_pawns(pos: &Position, v: Value) -> f64 {
    let v = if pos.side_to_move() == Color::White { v } else { -v };
    0.01 * v.to_cp() as f64
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.global.log_level.as_deref());

    let config = build_config(&cli.global)?;
    let mut evaluator = Evaluator::new(config).context("failed to create evaluator")?;
    evaluator.init();

    match cli.command {
        Commands::Verify => {
            evaluator.verify_or_exit();
            println!("ok");
        }
        Commands::Eval(args) => {
            evaluator.verify_or_exit();
            let (pos, mut state) = build_position(&args)?;
            for tier in NetSize::ALL {
                let mut fresh = EvalState::with_capacity(1);
                let (v, complexity) = evaluator.evaluate_net(tier, &pos, &mut fresh, false);
                println!(
                    "{:<5} net    {:+.2} (white side, complexity {complexity})",
                    tier.to_string(),
                    white_pawns(&pos, v)
                );
            }
            let v = evaluator.evaluate(&pos, &mut state);
            println!("evaluation   {:+.2} (white side)", white_pawns(&pos, v));
        }
        Commands::Trace(args) => {
            evaluator.verify_or_exit();
            let (pos, _) = build_position(&args)?;
            println!("{pos}");
            print!("{}", evaluator.trace(&pos));
        }
        Commands::Save(args) => {
            let tier = NetSize::from(args.tier);
            let path = evaluator
                .save_file(args.output.as_deref(), tier)
                .with_context(|| format!("failed to save the {tier} net"))?;
            info!("saved {tier} net to {}", path.display());
        }
        Commands::Info => {
            for tier in NetSize::ALL {
                let hash = match tier {
                    NetSize::Big => NnueNetwork::<BIG_L1>::hash_value(),
                    NetSize::Small => NnueNetwork::<SMALL_L1>::hash_value(),
                };
                match evaluator.loaded_file(tier) {
                    Some(file) => println!(
                        "{:<5} {file} hash={hash:#010x} description=\"{}\"",
                        tier.to_string(),
                        evaluator.description(tier)
                    ),
                    None => println!(
                        "{:<5} not loaded (expected {}, hash={hash:#010x})",
                        tier.to_string(),
                        evaluator.config().eval_file(tier)
                    ),
                }
            }
        }
    }
    Ok(())
}
