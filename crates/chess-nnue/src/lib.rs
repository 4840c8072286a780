//! chess-nnue: チェス用 NNUE 評価関数
//!
//! HalfKAv2_hm 特徴量による 2 tier（big / small）の NNUE ネットワークを、
//! 指し手ごとの差分更新で評価する。
//!
//! # 使い方
//!
//! ```no_run
//! use chess_nnue::eval::{EvalConfig, EvalState, Evaluator};
//! use chess_nnue::position::Position;
//!
//! let mut evaluator = Evaluator::new(EvalConfig::default())?;
//! evaluator.init();
//! evaluator.verify()?;
//!
//! let mut pos = Position::startpos();
//! let mut state = EvalState::new();
//! let m = pos.parse_uci_move("e2e4").unwrap();
//! let dirty = pos.do_move(m);
//! state.push(dirty);
//! let v = evaluator.evaluate(&pos, &mut state);
//! println!("{v}");
//! # Ok::<(), chess_nnue::nnue::NnueError>(())
//! ```

pub mod eval;
pub mod nnue;
pub mod position;
pub mod types;

pub use eval::{EvalConfig, EvalState, Evaluator, EvaluatorContext};
pub use nnue::{NetSize, NnueError, NnueResult};
pub use position::Position;
pub use types::{Color, Move, Piece, PieceType, Square, Value};
