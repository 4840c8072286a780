//! 指し手（Move）
//!
//! 合法性の判定は行わない。評価関数のテストと差分更新の検証に必要な
//! 「盤面をどう変えるか」だけを表現する。

use super::{PieceType, Square};

/// 指し手の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveKind {
    Normal,
    /// 成る駒種
    Promotion(PieceType),
    EnPassant,
    /// キャスリング（from/to はキングの移動元/移動先）
    Castling,
}

/// 指し手
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub kind: MoveKind,
}

impl Move {
    #[inline]
    pub const fn normal(from: Square, to: Square) -> Move {
        Move { from, to, kind: MoveKind::Normal }
    }

    #[inline]
    pub const fn promotion(from: Square, to: Square, pt: PieceType) -> Move {
        Move { from, to, kind: MoveKind::Promotion(pt) }
    }

    #[inline]
    pub const fn en_passant(from: Square, to: Square) -> Move {
        Move { from, to, kind: MoveKind::EnPassant }
    }

    #[inline]
    pub const fn castling(from: Square, to: Square) -> Move {
        Move { from, to, kind: MoveKind::Castling }
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let MoveKind::Promotion(pt) = self.kind {
            let c = match pt {
                PieceType::Knight => 'n',
                PieceType::Bishop => 'b',
                PieceType::Rook => 'r',
                _ => 'q',
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
