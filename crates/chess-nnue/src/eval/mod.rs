//! 評価関数の外側
//!
//! - [`config`]: TOML 設定と戦略ノブ
//! - [`evaluator`]: ネットワークの読み込み・検証・保存と静的評価
//! - [`trace`]: 評価値の内訳表示

mod config;
mod evaluator;
mod trace;

pub use config::{EvalConfig, EvalOptions, STRATEGY_MAX, STRATEGY_MIN};
pub use evaluator::{EvalState, EvaluatorContext, INTERNAL_SOURCE};
pub use trace::{format_cp_aligned_dot, format_cp_compact};

use crate::nnue::{BIG_L1, SMALL_L1};

/// 既定サイズの評価関数
pub type Evaluator = EvaluatorContext<BIG_L1, SMALL_L1>;
