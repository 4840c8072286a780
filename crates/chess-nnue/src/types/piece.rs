//! 駒種（PieceType）と駒（Piece）
//!
//! 駒は `color << 3 | piece_type` の 4bit で表す。
//! 白駒は 1..=6、黒駒は 9..=14、0 は駒なし。

use super::{Color, Value};

/// 駒種
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PieceType {
    Pawn = 1,
    Knight = 2,
    Bishop = 3,
    Rook = 4,
    Queen = 5,
    King = 6,
}

impl PieceType {
    /// 全駒種
    pub const ALL: [PieceType; 6] = [
        PieceType::Pawn,
        PieceType::Knight,
        PieceType::Bishop,
        PieceType::Rook,
        PieceType::Queen,
        PieceType::King,
    ];

    /// 中盤の駒価値（キングは 0）
    #[inline]
    pub const fn value(self) -> i32 {
        match self {
            PieceType::Pawn => Value::PAWN_VALUE,
            PieceType::Knight => Value::KNIGHT_VALUE,
            PieceType::Bishop => Value::BISHOP_VALUE,
            PieceType::Rook => Value::ROOK_VALUE,
            PieceType::Queen => Value::QUEEN_VALUE,
            PieceType::King => 0,
        }
    }

    #[inline]
    const fn from_u8(v: u8) -> Option<PieceType> {
        match v {
            1 => Some(PieceType::Pawn),
            2 => Some(PieceType::Knight),
            3 => Some(PieceType::Bishop),
            4 => Some(PieceType::Rook),
            5 => Some(PieceType::Queen),
            6 => Some(PieceType::King),
            _ => None,
        }
    }
}

/// 駒（手番付き）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Piece(u8);

impl Piece {
    /// 駒コードの総数（配列サイズ用）
    pub const NUM: usize = 16;

    /// 駒なし
    pub const NONE: Piece = Piece(0);

    pub const W_PAWN: Piece = Piece(1);
    pub const W_KNIGHT: Piece = Piece(2);
    pub const W_BISHOP: Piece = Piece(3);
    pub const W_ROOK: Piece = Piece(4);
    pub const W_QUEEN: Piece = Piece(5);
    pub const W_KING: Piece = Piece(6);
    pub const B_PAWN: Piece = Piece(9);
    pub const B_KNIGHT: Piece = Piece(10);
    pub const B_BISHOP: Piece = Piece(11);
    pub const B_ROOK: Piece = Piece(12);
    pub const B_QUEEN: Piece = Piece(13);
    pub const B_KING: Piece = Piece(14);

    /// 手番と駒種から生成
    #[inline]
    pub const fn make(color: Color, pt: PieceType) -> Piece {
        Piece(((color as u8) << 3) | pt as u8)
    }

    /// 駒コードから生成（不正なコードなら None）
    #[inline]
    pub const fn from_index(index: usize) -> Option<Piece> {
        if index < Self::NUM && PieceType::from_u8((index & 7) as u8).is_some() {
            Some(Piece(index as u8))
        } else {
            None
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// 駒の手番（駒なしの場合は White を返すので呼び出し側で判定すること）
    #[inline]
    pub const fn color(self) -> Color {
        if self.0 & 8 != 0 { Color::Black } else { Color::White }
    }

    /// 駒種（駒なしなら None）
    #[inline]
    pub const fn piece_type(self) -> Option<PieceType> {
        PieceType::from_u8(self.0 & 7)
    }

    /// FEN の駒文字から生成
    pub fn from_fen_char(c: char) -> Option<Piece> {
        let color = if c.is_ascii_uppercase() { Color::White } else { Color::Black };
        let pt = match c.to_ascii_lowercase() {
            'p' => PieceType::Pawn,
            'n' => PieceType::Knight,
            'b' => PieceType::Bishop,
            'r' => PieceType::Rook,
            'q' => PieceType::Queen,
            'k' => PieceType::King,
            _ => return None,
        };
        Some(Piece::make(color, pt))
    }

    /// FEN の駒文字（駒なしは ' '）
    pub fn to_fen_char(self) -> char {
        let c = match self.piece_type() {
            Some(PieceType::Pawn) => 'p',
            Some(PieceType::Knight) => 'n',
            Some(PieceType::Bishop) => 'b',
            Some(PieceType::Rook) => 'r',
            Some(PieceType::Queen) => 'q',
            Some(PieceType::King) => 'k',
            None => return ' ',
        };
        match self.color() {
            Color::White => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }
}
