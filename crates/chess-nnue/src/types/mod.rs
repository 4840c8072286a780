//! 基本型
//!
//! 評価関数が盤面側から受け取る最小限の型をまとめる。

mod color;
mod moves;
mod piece;
mod square;
mod value;

pub use color::Color;
pub use moves::{Move, MoveKind};
pub use piece::{Piece, PieceType};
pub use square::Square;
pub use value::Value;
