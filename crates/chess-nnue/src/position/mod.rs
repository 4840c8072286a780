//! 局面（Position）
//!
//! 評価関数が必要とする盤面情報だけを持つ最小限の局面表現。
//! 指し手生成と合法性判定は探索側の責務なので、ここでは
//! 「指し手で盤面がどう変わるか」と差分情報（DirtyPiece）の生成のみを扱う。

mod fen;
mod state;

pub use fen::{FenError, MAX_PIECES, START_FEN};
pub use state::{ChangedPiece, DirtyPiece};

use crate::types::{Color, Move, MoveKind, Piece, PieceType, Square, Value};
use state::StateInfo;

// キャスリング権のビット
const WHITE_OO: u8 = 1;
const WHITE_OOO: u8 = 2;
const BLACK_OO: u8 = 4;
const BLACK_OOO: u8 = 8;

/// 局面
#[derive(Clone)]
pub struct Position {
    board: [Piece; Square::NUM],
    /// 手番別の占有ビットボード
    by_color: [u64; Color::NUM],
    /// 駒コード別の枚数
    piece_count: [i32; Piece::NUM],
    /// 手番別のキング位置（盤上に無ければ None）
    king_square: [Option<Square>; Color::NUM],
    /// 手番別の non-pawn material
    non_pawn_material: [i32; Color::NUM],
    side_to_move: Color,
    castling: u8,
    ep_square: Option<Square>,
    rule50: i32,
    game_ply: i32,
    history: Vec<StateInfo>,
}

impl Default for Position {
    fn default() -> Self {
        Self::empty()
    }
}

impl Position {
    /// 駒のない空の局面（白番）
    pub fn empty() -> Self {
        Self {
            board: [Piece::NONE; Square::NUM],
            by_color: [0; Color::NUM],
            piece_count: [0; Piece::NUM],
            king_square: [None; Color::NUM],
            non_pawn_material: [0; Color::NUM],
            side_to_move: Color::White,
            castling: 0,
            ep_square: None,
            rule50: 0,
            game_ply: 0,
            history: Vec::new(),
        }
    }

    /// 平手初期局面
    pub fn startpos() -> Self {
        let mut pos = Self::empty();
        // START_FEN は常に正しい
        let _ = pos.set_fen(START_FEN);
        pos
    }

    // =========================================================================
    // 照会
    // =========================================================================

    #[inline]
    pub fn piece_on(&self, sq: Square) -> Piece {
        self.board[sq.index()]
    }

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    /// キングの位置（盤上に無ければ None）
    #[inline]
    pub fn king_square(&self, color: Color) -> Option<Square> {
        self.king_square[color.index()]
    }

    /// 指定した駒の枚数
    #[inline]
    pub fn count(&self, pc: Piece) -> i32 {
        self.piece_count[pc.index()]
    }

    /// 駒種の枚数（両手番合計）
    #[inline]
    pub fn count_type(&self, pt: PieceType) -> i32 {
        self.count(Piece::make(Color::White, pt)) + self.count(Piece::make(Color::Black, pt))
    }

    /// 盤上の駒の総数（キングを含む）
    #[inline]
    pub fn count_all(&self) -> i32 {
        (self.by_color[0] | self.by_color[1]).count_ones() as i32
    }

    /// 手番側の non-pawn material
    #[inline]
    pub fn non_pawn_material_of(&self, color: Color) -> i32 {
        self.non_pawn_material[color.index()]
    }

    /// 両手番の non-pawn material 合計
    #[inline]
    pub fn non_pawn_material(&self) -> i32 {
        self.non_pawn_material[0] + self.non_pawn_material[1]
    }

    /// 50 手ルールのカウンタ（駒取り・歩の移動でリセット）
    #[inline]
    pub fn rule50_count(&self) -> i32 {
        self.rule50
    }

    #[inline]
    pub fn game_ply(&self) -> i32 {
        self.game_ply
    }

    #[inline]
    pub fn ep_square(&self) -> Option<Square> {
        self.ep_square
    }

    /// 盤上の全駒を A1 から順に列挙
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        let mut bb = self.by_color[0] | self.by_color[1];
        std::iter::from_fn(move || {
            if bb == 0 {
                return None;
            }
            let idx = bb.trailing_zeros() as usize;
            bb &= bb - 1;
            let sq = Square::from_index_unchecked(idx);
            Some((sq, self.board[idx]))
        })
    }

    /// 駒割りだけの簡易評価値（手番側から見た値）
    pub fn simple_eval(&self) -> Value {
        let us = self.side_to_move;
        let them = !us;
        let pawns = self.count(Piece::make(us, PieceType::Pawn))
            - self.count(Piece::make(them, PieceType::Pawn));
        Value::new(
            Value::PAWN_VALUE * pawns + self.non_pawn_material_of(us)
                - self.non_pawn_material_of(them),
        )
    }

    // =========================================================================
    // 盤面編集
    // =========================================================================

    /// 駒を置く（置き換えは行わない。空きマスであること）
    pub fn put_piece(&mut self, pc: Piece, sq: Square) {
        debug_assert!(self.board[sq.index()].is_none());
        let Some(pt) = pc.piece_type() else {
            return;
        };
        let c = pc.color();
        self.board[sq.index()] = pc;
        self.by_color[c.index()] |= sq.bit();
        self.piece_count[pc.index()] += 1;
        match pt {
            PieceType::King => self.king_square[c.index()] = Some(sq),
            PieceType::Pawn => {}
            _ => self.non_pawn_material[c.index()] += pt.value(),
        }
    }

    /// 駒を取り除き、取り除いた駒を返す
    pub fn remove_piece(&mut self, sq: Square) -> Piece {
        let pc = self.board[sq.index()];
        let Some(pt) = pc.piece_type() else {
            return Piece::NONE;
        };
        let c = pc.color();
        self.board[sq.index()] = Piece::NONE;
        self.by_color[c.index()] &= !sq.bit();
        self.piece_count[pc.index()] -= 1;
        match pt {
            PieceType::King => {
                if self.king_square[c.index()] == Some(sq) {
                    self.king_square[c.index()] = None;
                }
            }
            PieceType::Pawn => {}
            _ => self.non_pawn_material[c.index()] -= pt.value(),
        }
        pc
    }

    #[inline]
    fn move_piece(&mut self, from: Square, to: Square) {
        let pc = self.remove_piece(from);
        self.put_piece(pc, to);
    }

    /// 手番と 50 手カウンタを設定（局面の組み立て用）
    pub fn set_side_to_move(&mut self, color: Color) {
        self.side_to_move = color;
    }

    pub fn set_rule50(&mut self, rule50: i32) {
        self.rule50 = rule50;
    }

    // =========================================================================
    // 指し手の適用
    // =========================================================================

    /// 指し手を適用し、差分更新用の駒移動情報を返す
    ///
    /// 合法性は検査しない。移動元に手番側の駒があることだけを前提とする。
    pub fn do_move(&mut self, m: Move) -> DirtyPiece {
        let us = self.side_to_move;
        let pc = self.piece_on(m.from);
        debug_assert!(!pc.is_none() && pc.color() == us);

        let mut dp = DirtyPiece::new();
        let mut captured = Piece::NONE;
        let prev = StateInfo {
            mv: Some(m),
            captured: Piece::NONE,
            castling: self.castling,
            ep_square: self.ep_square,
            rule50: self.rule50,
        };
        self.rule50 += 1;
        self.ep_square = None;

        match m.kind {
            MoveKind::Castling => {
                let (rook_from, rook_to) = castling_rook_squares(m.to);
                let rook = self.piece_on(rook_from);
                dp.push(pc, Some(m.from), Some(m.to));
                dp.push(rook, Some(rook_from), Some(rook_to));
                self.remove_piece(rook_from);
                self.move_piece(m.from, m.to);
                self.put_piece(rook, rook_to);
            }
            MoveKind::EnPassant => {
                let cap_sq = Square::new(m.to.file(), m.from.rank());
                captured = self.remove_piece(cap_sq);
                dp.push(pc, Some(m.from), Some(m.to));
                dp.push(captured, Some(cap_sq), None);
                self.move_piece(m.from, m.to);
                self.rule50 = 0;
            }
            MoveKind::Normal | MoveKind::Promotion(_) => {
                captured = self.remove_piece(m.to);
                let promotion = match m.kind {
                    MoveKind::Promotion(pt) => Some(Piece::make(us, pt)),
                    _ => None,
                };
                dp.push(pc, Some(m.from), if promotion.is_some() { None } else { Some(m.to) });
                if !captured.is_none() {
                    dp.push(captured, Some(m.to), None);
                    self.rule50 = 0;
                }
                self.remove_piece(m.from);
                match promotion {
                    Some(promoted) => {
                        dp.push(promoted, None, Some(m.to));
                        self.put_piece(promoted, m.to);
                    }
                    None => self.put_piece(pc, m.to),
                }
                if pc.piece_type() == Some(PieceType::Pawn) {
                    self.rule50 = 0;
                    if m.from.rank().abs_diff(m.to.rank()) == 2 {
                        self.ep_square =
                            Some(Square::new(m.from.file(), (m.from.rank() + m.to.rank()) / 2));
                    }
                }
            }
        }

        self.castling &= !(castling_mask(m.from) | castling_mask(m.to));
        self.history.push(StateInfo { captured, ..prev });
        self.side_to_move = !us;
        self.game_ply += 1;
        dp
    }

    /// 直前の do_move を取り消す
    pub fn undo_move(&mut self) {
        let Some(st) = self.history.pop() else {
            return;
        };
        self.side_to_move = !self.side_to_move;
        self.game_ply -= 1;
        self.castling = st.castling;
        self.ep_square = st.ep_square;
        self.rule50 = st.rule50;

        let Some(m) = st.mv else {
            return;
        };
        let us = self.side_to_move;
        match m.kind {
            MoveKind::Castling => {
                let (rook_from, rook_to) = castling_rook_squares(m.to);
                let rook = self.remove_piece(rook_to);
                self.move_piece(m.to, m.from);
                self.put_piece(rook, rook_from);
            }
            MoveKind::EnPassant => {
                self.move_piece(m.to, m.from);
                let cap_sq = Square::new(m.to.file(), m.from.rank());
                self.put_piece(st.captured, cap_sq);
            }
            MoveKind::Normal => {
                self.move_piece(m.to, m.from);
                if !st.captured.is_none() {
                    self.put_piece(st.captured, m.to);
                }
            }
            MoveKind::Promotion(_) => {
                self.remove_piece(m.to);
                self.put_piece(Piece::make(us, PieceType::Pawn), m.from);
                if !st.captured.is_none() {
                    self.put_piece(st.captured, m.to);
                }
            }
        }
    }

    /// 手番だけを渡す（null move）。駒移動情報は空
    pub fn do_null_move(&mut self) -> DirtyPiece {
        self.history.push(StateInfo {
            mv: None,
            captured: Piece::NONE,
            castling: self.castling,
            ep_square: self.ep_square,
            rule50: self.rule50,
        });
        self.ep_square = None;
        self.rule50 += 1;
        self.side_to_move = !self.side_to_move;
        self.game_ply += 1;
        DirtyPiece::new()
    }

    /// null move を取り消す
    pub fn undo_null_move(&mut self) {
        debug_assert!(self.history.last().is_some_and(|st| st.mv.is_none()));
        self.undo_move();
    }

    /// キャスリング権を持っているか（`kingside = true` で O-O）
    pub fn can_castle(&self, color: Color, kingside: bool) -> bool {
        let bit = match (color, kingside) {
            (Color::White, true) => WHITE_OO,
            (Color::White, false) => WHITE_OOO,
            (Color::Black, true) => BLACK_OO,
            (Color::Black, false) => BLACK_OOO,
        };
        self.castling & bit != 0
    }

    /// UCI 形式の指し手文字列を、この局面での Move に変換する
    ///
    /// キャスリング・アンパッサンは盤面から判定する。移動元が空なら None。
    pub fn parse_uci_move(&self, s: &str) -> Option<Move> {
        if s.len() < 4 || s.len() > 5 {
            return None;
        }
        let from = Square::parse(s.get(0..2)?)?;
        let to = Square::parse(s.get(2..4)?)?;
        let pc = self.piece_on(from);
        let pt = pc.piece_type()?;
        if let Some(c) = s.chars().nth(4) {
            let promo = Piece::from_fen_char(c)?.piece_type()?;
            return Some(Move::promotion(from, to, promo));
        }
        if pt == PieceType::King && from.file().abs_diff(to.file()) == 2 {
            return Some(Move::castling(from, to));
        }
        if pt == PieceType::Pawn && from.file() != to.file() && self.piece_on(to).is_none() {
            return Some(Move::en_passant(from, to));
        }
        Some(Move::normal(from, to))
    }
}

/// キャスリング時のルークの移動元/移動先（キングの移動先から決まる）
fn castling_rook_squares(king_to: Square) -> (Square, Square) {
    let rank = king_to.rank();
    if king_to.file() == 6 {
        (Square::new(7, rank), Square::new(5, rank))
    } else {
        (Square::new(0, rank), Square::new(3, rank))
    }
}

/// マスに関係するキャスリング権（駒が動く/取られると失われる）
fn castling_mask(sq: Square) -> u8 {
    match sq {
        Square::E1 => WHITE_OO | WHITE_OOO,
        Square::H1 => WHITE_OO,
        Square::A1 => WHITE_OOO,
        Square::E8 => BLACK_OO | BLACK_OOO,
        Square::H8 => BLACK_OO,
        Square::A8 => BLACK_OOO,
        _ => 0,
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, " +---+---+---+---+---+---+---+---+")?;
        for rank in (0..8).rev() {
            for file in 0..8 {
                write!(f, " | {}", self.piece_on(Square::new(file, rank)).to_fen_char())?;
            }
            writeln!(f, " | {}", rank + 1)?;
            writeln!(f, " +---+---+---+---+---+---+---+---+")?;
        }
        writeln!(f, "   a   b   c   d   e   f   g   h")?;
        write!(f, "\nFen: {}", self.to_fen())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(s: &str) -> Square {
        Square::parse(s).unwrap()
    }

    #[test]
    fn test_startpos_counts() {
        let pos = Position::startpos();
        assert_eq!(pos.count_all(), 32);
        assert_eq!(pos.count_type(PieceType::Pawn), 16);
        assert_eq!(pos.king_square(Color::White), Some(Square::E1));
        assert_eq!(pos.king_square(Color::Black), Some(Square::E8));
        assert_eq!(pos.non_pawn_material_of(Color::White), 2 * 781 + 2 * 825 + 2 * 1276 + 2538);
        assert_eq!(pos.simple_eval(), Value::ZERO);
    }

    #[test]
    fn test_do_undo_capture() {
        let mut pos = Position::empty();
        pos.set_fen("4k3/8/8/3p4/4P3/8/8/4K3 w - - 5 10").unwrap();
        let before = pos.to_fen();
        let m = pos.parse_uci_move("e4d5").unwrap();
        let dp = pos.do_move(m);
        assert_eq!(dp.len(), 2);
        assert_eq!(dp.pieces()[0], ChangedPiece { piece: Piece::W_PAWN, from: Some(sq("e4")), to: Some(sq("d5")) });
        assert_eq!(dp.pieces()[1], ChangedPiece { piece: Piece::B_PAWN, from: Some(sq("d5")), to: None });
        assert_eq!(pos.rule50_count(), 0);
        assert_eq!(pos.side_to_move(), Color::Black);
        pos.undo_move();
        assert_eq!(pos.to_fen(), before);
    }

    #[test]
    fn test_castling_dirty_piece() {
        let mut pos = Position::empty();
        pos.set_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let before = pos.to_fen();
        let m = pos.parse_uci_move("e1g1").unwrap();
        assert_eq!(m.kind, MoveKind::Castling);
        let dp = pos.do_move(m);
        assert_eq!(dp.moved_piece(), Piece::W_KING);
        assert_eq!(dp.pieces()[1], ChangedPiece { piece: Piece::W_ROOK, from: Some(sq("h1")), to: Some(sq("f1")) });
        assert_eq!(pos.piece_on(sq("f1")), Piece::W_ROOK);
        assert_eq!(pos.king_square(Color::White), Some(sq("g1")));
        assert!(!pos.can_castle(Color::White, true));
        assert!(pos.can_castle(Color::Black, false));
        pos.undo_move();
        assert_eq!(pos.to_fen(), before);
    }

    #[test]
    fn test_promotion_capture_dirty_piece() {
        let mut pos = Position::empty();
        pos.set_fen("1r2k3/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let m = pos.parse_uci_move("a7b8q").unwrap();
        let dp = pos.do_move(m);
        assert_eq!(dp.len(), 3);
        assert_eq!(dp.pieces()[0].to, None);
        assert_eq!(dp.pieces()[1].piece, Piece::B_ROOK);
        assert_eq!(dp.pieces()[2], ChangedPiece { piece: Piece::W_QUEEN, from: None, to: Some(sq("b8")) });
        assert_eq!(pos.non_pawn_material_of(Color::White), Value::QUEEN_VALUE);
        assert_eq!(pos.non_pawn_material_of(Color::Black), 0);
        pos.undo_move();
        assert_eq!(pos.piece_on(sq("a7")), Piece::W_PAWN);
        assert_eq!(pos.piece_on(sq("b8")), Piece::B_ROOK);
    }

    #[test]
    fn test_en_passant() {
        let mut pos = Position::empty();
        pos.set_fen("4k3/8/8/8/3p4/8/4P3/4K3 w - - 0 1").unwrap();
        pos.do_move(pos.parse_uci_move("e2e4").unwrap());
        assert_eq!(pos.ep_square(), Some(sq("e3")));
        let m = pos.parse_uci_move("d4e3").unwrap();
        assert_eq!(m.kind, MoveKind::EnPassant);
        let dp = pos.do_move(m);
        assert_eq!(dp.pieces()[1], ChangedPiece { piece: Piece::W_PAWN, from: Some(sq("e4")), to: None });
        assert_eq!(pos.count(Piece::W_PAWN), 0);
        pos.undo_move();
        assert_eq!(pos.piece_on(sq("e4")), Piece::W_PAWN);
        assert_eq!(pos.piece_on(sq("d4")), Piece::B_PAWN);
    }

    #[test]
    fn test_null_move() {
        let mut pos = Position::startpos();
        let dp = pos.do_null_move();
        assert!(dp.is_empty());
        assert_eq!(dp.moved_piece(), Piece::NONE);
        assert_eq!(pos.side_to_move(), Color::Black);
        pos.undo_null_move();
        assert_eq!(pos.to_fen(), START_FEN);
    }

    #[test]
    fn test_simple_eval_side_relative() {
        let mut pos = Position::empty();
        pos.set_fen("4k3/8/8/8/8/8/PP6/R3K3 b - - 0 1").unwrap();
        assert_eq!(pos.simple_eval(), Value::new(-(2 * 208 + 1276)));
    }
}
