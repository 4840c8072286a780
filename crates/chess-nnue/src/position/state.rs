//! 局面の履歴情報と差分更新用の駒移動情報

use crate::types::{Move, Piece, Square};

/// 差分更新用の駒移動情報（固定長バッファでヒープ確保を回避）
///
/// `pieces()[0]` は常に動いた駒（キャスリングならキング）。
/// 取られた駒は `to = None`、成った駒は `from = None` で表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyPiece {
    /// 変化した駒（最大3つ: 動いた駒 + 取られた駒 + 成った駒）
    pieces: [ChangedPiece; Self::MAX_PIECES],
    /// 有効な pieces 要素数
    len: u8,
}

impl DirtyPiece {
    /// pieces の最大要素数
    pub const MAX_PIECES: usize = 3;

    /// 新しい DirtyPiece を作成（null move はこのまま使う）
    #[inline]
    pub const fn new() -> Self {
        Self {
            pieces: [ChangedPiece::EMPTY; Self::MAX_PIECES],
            len: 0,
        }
    }

    /// 駒変化を追加
    #[inline]
    pub fn push(&mut self, piece: Piece, from: Option<Square>, to: Option<Square>) {
        let idx = self.len as usize;
        debug_assert!(idx < Self::MAX_PIECES);
        self.pieces[idx] = ChangedPiece { piece, from, to };
        self.len += 1;
    }

    /// 駒変化のスライスを取得
    #[inline]
    pub fn pieces(&self) -> &[ChangedPiece] {
        &self.pieces[..self.len as usize]
    }

    /// 変化した駒の数
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 最初に動いた駒（null move なら `Piece::NONE`）
    #[inline]
    pub fn moved_piece(&self) -> Piece {
        if self.len == 0 { Piece::NONE } else { self.pieces[0].piece }
    }
}

impl Default for DirtyPiece {
    fn default() -> Self {
        Self::new()
    }
}

/// 1 駒分の変更情報
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedPiece {
    pub piece: Piece,
    /// 変更前の位置（盤上に無ければ None）
    pub from: Option<Square>,
    /// 変更後の位置（盤上に無ければ None）
    pub to: Option<Square>,
}

impl ChangedPiece {
    /// 空の ChangedPiece（固定長配列の初期化用）
    pub const EMPTY: Self = Self {
        piece: Piece::NONE,
        from: None,
        to: None,
    };
}

/// undo に必要な情報
#[derive(Debug, Clone)]
pub(super) struct StateInfo {
    /// 指した手（null move なら None）
    pub mv: Option<Move>,
    /// 取った駒
    pub captured: Piece,
    /// 指す前のキャスリング権
    pub castling: u8,
    /// 指す前のアンパッサン対象マス
    pub ep_square: Option<Square>,
    /// 指す前の 50 手ルールカウンタ
    pub rule50: i32,
}
