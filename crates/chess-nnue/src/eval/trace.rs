//! 評価値の内訳表示（デバッグ用）
//!
//! - 駒ごとの寄与: その駒を取り除いた局面との差（白視点）
//! - バケットごとの PSQT / positional の内訳
//! - big tier 単体の評価値と最終評価値
//!
//! 表示はすべて big tier を使い、毎回新しいアキュムレータで計算する。

use std::fmt::Write as _;

use super::evaluator::{EvalState, EvaluatorContext};
use crate::nnue::NetSize;
use crate::nnue::constants::{LAYER_STACKS, OUTPUT_SCALE};
use crate::nnue::NnueNetwork;
use crate::position::Position;
use crate::types::{Color, PieceType, Square, Value};

const BOARD_ROWS: usize = 3 * 8 + 1;
const BOARD_COLS: usize = 8 * 8 + 1;

/// centipawn を 5 文字に詰めて表示（`+1.23`, `-12.3`, `+123 `）
pub fn format_cp_compact(v: Value) -> String {
    let sign = if v.raw() < 0 {
        '-'
    } else if v.raw() > 0 {
        '+'
    } else {
        ' '
    };
    let cp = v.to_cp().abs();
    let body = if cp >= 10000 {
        format!("{}{}{} ", cp / 10000, cp % 10000 / 1000, cp % 1000 / 100)
    } else if cp >= 1000 {
        format!("{}{}.{}", cp / 1000, cp % 1000 / 100, cp % 100 / 10)
    } else {
        format!("{}.{}{}", cp / 100, cp % 100 / 10, cp % 10)
    };
    format!("{sign}{body}")
}

/// pawn 単位で小数 2 桁に揃えて表示（`+  1.23`）
pub fn format_cp_aligned_dot(v: Value) -> String {
    let sign = if v.raw() < 0 {
        '-'
    } else if v.raw() > 0 {
        '+'
    } else {
        ' '
    };
    let pawns = (0.01 * v.to_cp() as f64).abs();
    format!("{sign}{pawns:6.2}")
}

/// 白視点に直す
#[inline]
fn white_pov(pos: &Position, v: Value) -> Value {
    if pos.side_to_move() == Color::White { v } else { -v }
}

/// 盤面の 1 マス分の枠と中身を書き込む
fn write_square(board: &mut [[u8; BOARD_COLS]; BOARD_ROWS], sq: Square, piece_char: char, value: Option<Value>) {
    let x = sq.file() as usize * 8;
    let y = (7 - sq.rank() as usize) * 3;
    for i in 1..8 {
        board[y][x + i] = b'-';
        board[y + 3][x + i] = b'-';
    }
    for i in 1..3 {
        board[y + i][x] = b'|';
        board[y + i][x + 8] = b'|';
    }
    board[y][x] = b'+';
    board[y][x + 8] = b'+';
    board[y + 3][x] = b'+';
    board[y + 3][x + 8] = b'+';
    if piece_char != ' ' {
        board[y + 1][x + 4] = piece_char as u8;
    }
    if let Some(v) = value {
        for (i, b) in format_cp_compact(v).bytes().enumerate() {
            board[y + 2][x + 2 + i] = b;
        }
    }
}

impl<const BIG: usize, const SMALL: usize> EvaluatorContext<BIG, SMALL> {
    /// big tier の raw 評価値（白視点、新しいアキュムレータで計算）
    fn raw_big_white(&self, pos: &Position) -> Value {
        let mut state = EvalState::<BIG, SMALL>::with_capacity(1);
        let (v, _) = self.evaluate_net(NetSize::Big, pos, &mut state, false);
        white_pov(pos, v)
    }

    /// 評価値の内訳を文字列で返す
    pub fn trace(&self, pos: &Position) -> String {
        let mut ss = String::new();
        ss.push('\n');
        ss.push_str(&self.trace_network(pos));
        ss.push('\n');

        let nnue = self.raw_big_white(pos);
        let _ = writeln!(
            ss,
            "NNUE evaluation        {:+.2} (white side)",
            0.01 * nnue.to_cp() as f64
        );

        // optimism は 0 として評価する
        let mut state = EvalState::<BIG, SMALL>::with_capacity(1);
        let v = white_pov(pos, self.evaluate(pos, &mut state));
        let _ = writeln!(
            ss,
            "Final evaluation       {:+.2} (white side) [with scaled NNUE, ...]",
            0.01 * v.to_cp() as f64
        );
        ss
    }

    /// 駒ごとの寄与とバケット表
    fn trace_network(&self, pos: &Position) -> String {
        let mut board = [[b' '; BOARD_COLS]; BOARD_ROWS];

        // 駒を 1 つずつ取り除いて差分を取る
        let base = self.raw_big_white(pos);
        let mut scratch = pos.clone();
        for sq in Square::all() {
            let pc = pos.piece_on(sq);
            let value = match pc.piece_type() {
                Some(pt) if pt != PieceType::King => {
                    scratch.remove_piece(sq);
                    let eval = self.raw_big_white(&scratch);
                    scratch.put_piece(pc, sq);
                    Some(base - eval)
                }
                _ => None,
            };
            write_square(&mut board, sq, pc.to_fen_char(), value);
        }

        let mut ss = String::new();
        ss.push_str(" NNUE derived piece values:\n");
        for row in &board {
            ss.push_str(&String::from_utf8_lossy(row));
            ss.push('\n');
        }
        ss.push('\n');

        // バケット別の内訳（アキュムレータは 1 回計算して使い回す）
        let network = self.big_network();
        let mut state = EvalState::<BIG, SMALL>::with_capacity(1);
        let correct_bucket = NnueNetwork::<BIG>::bucket_for(pos);

        let _ = writeln!(
            ss,
            " NNUE network contributions {}",
            if pos.side_to_move() == Color::White { "(White to move)" } else { "(Black to move)" }
        );
        ss.push_str("+------------+------------+------------+------------+\n");
        ss.push_str("|   Bucket   |  Material  | Positional |   Total    |\n");
        ss.push_str("|            |   (PSQT)   |  (Layers)  |            |\n");
        ss.push_str("+------------+------------+------------+------------+\n");

        for bucket in 0..LAYER_STACKS {
            let (psqt, positional) =
                network.evaluate_bucket(self.features(), pos, &mut state.big, bucket);
            let psqt = Value::new(psqt / OUTPUT_SCALE);
            let positional = Value::new(positional / OUTPUT_SCALE);

            let _ = write!(
                ss,
                "|  {bucket}         |  {}   |  {}   |  {}   |",
                format_cp_aligned_dot(psqt),
                format_cp_aligned_dot(positional),
                format_cp_aligned_dot(psqt + positional)
            );
            if bucket == correct_bucket {
                ss.push_str(" <-- this bucket is used");
            }
            ss.push('\n');
        }
        ss.push_str("+------------+------------+------------+------------+\n");
        ss
    }
}
