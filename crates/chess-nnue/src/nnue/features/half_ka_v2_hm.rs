//! HalfKAv2_hm 特徴量
//!
//! Half-Mirror King + All pieces
//!
//! 主な特徴:
//! - 自玉が e..h 筋に来るよう盤面を左右反転する（Half-Mirror）
//! - キングバケット: 32 バケット（8段 × 4筋）
//! - 駒平面: 自駒/敵駒 × 5 駒種 + 両キング共通の 1 平面 = 11 平面（704）
//! - 入力次元: 32 × 704 = 22,528
//!
//! インデックス計算は [`make_index_not_cached`] が唯一の定義で、
//! [`HalfKAv2_hm::init`] が全組合せを表に展開する。評価中は表引きのみ。

use crate::nnue::accumulator::{IndexList, MAX_ACTIVE_FEATURES, MAX_CHANGED_FEATURES};
use crate::position::{DirtyPiece, Position};
use crate::types::{Color, Piece, PieceType, Square};

// =============================================================================
// 駒平面のオフセット（W = 視点側, B = 相手側）
// =============================================================================

const PS_NONE: u32 = 0;
const PS_W_PAWN: u32 = 0;
const PS_B_PAWN: u32 = 64;
const PS_W_KNIGHT: u32 = 2 * 64;
const PS_B_KNIGHT: u32 = 3 * 64;
const PS_W_BISHOP: u32 = 4 * 64;
const PS_B_BISHOP: u32 = 5 * 64;
const PS_W_ROOK: u32 = 6 * 64;
const PS_B_ROOK: u32 = 7 * 64;
const PS_W_QUEEN: u32 = 8 * 64;
const PS_B_QUEEN: u32 = 9 * 64;
const PS_KING: u32 = 10 * 64;

/// 駒平面の総数 × マス数
pub const PS_NB: u32 = 11 * 64;

/// [視点][駒コード] → 駒平面オフセット
///
/// 白視点では白駒が W（自駒）、黒視点では W と B が入れ替わる。
const PIECE_SQUARE_INDEX: [[u32; Piece::NUM]; Color::NUM] = [
    [
        PS_NONE, PS_W_PAWN, PS_W_KNIGHT, PS_W_BISHOP, PS_W_ROOK, PS_W_QUEEN, PS_KING, PS_NONE,
        PS_NONE, PS_B_PAWN, PS_B_KNIGHT, PS_B_BISHOP, PS_B_ROOK, PS_B_QUEEN, PS_KING, PS_NONE,
    ],
    [
        PS_NONE, PS_B_PAWN, PS_B_KNIGHT, PS_B_BISHOP, PS_B_ROOK, PS_B_QUEEN, PS_KING, PS_NONE,
        PS_NONE, PS_W_PAWN, PS_W_KNIGHT, PS_W_BISHOP, PS_W_ROOK, PS_W_QUEEN, PS_KING, PS_NONE,
    ],
];

/// キングバケット番号（0..32）
///
/// 自陣 1 段目が 28..31、敵陣側ほど小さい。筋は d/e を軸に左右対称。
#[inline]
pub const fn king_bucket(perspective: Color, ksq: Square) -> u32 {
    let file = ksq.file();
    let mirrored_file = if file < 4 { file } else { 7 - file };
    (7 - ksq.relative_rank(perspective) as u32) * 4 + mirrored_file as u32
}

/// 駒のマスを XOR する向き補正
///
/// 自玉が a..d 筋なら左右反転（H1/H8）、e..h 筋ならそのまま（A1/A8）。
/// 黒視点は上下反転も加わる。
#[inline]
pub const fn orient(perspective: Color, ksq: Square) -> u32 {
    let base = if ksq.file() < 4 { Square::H1.index() } else { Square::A1.index() };
    match perspective {
        Color::White => base as u32,
        Color::Black => (base ^ 56) as u32,
    }
}

/// 特徴量インデックス（表を使わない直接計算）
#[inline]
pub const fn make_index_not_cached(perspective: Color, s: Square, pc: Piece, ksq: Square) -> u32 {
    (s.index() as u32 ^ orient(perspective, ksq))
        + PIECE_SQUARE_INDEX[perspective.index()][pc.index()]
        + king_bucket(perspective, ksq) * PS_NB
}

/// HalfKAv2_hm 特徴量
///
/// 全 [視点][マス][駒][自玉] の組合せを展開したインデックス表を持つ。
/// 自玉が動いた場合にアキュムレータの全計算が必要になる。
#[allow(non_camel_case_types)]
pub struct HalfKAv2_hm {
    table: Box<[u32]>,
}

impl HalfKAv2_hm {
    /// 特徴量名（トレース出力用）
    pub const NAME: &'static str = "HalfKAv2_hm(Friend)";

    /// 評価関数ファイルに埋め込まれるハッシュ値
    pub const HASH_VALUE: u32 = 0x7f23_4cb8;

    /// 特徴量の次元数: 64 × 704 / 2 = 22,528
    pub const DIMENSIONS: usize = Square::NUM * PS_NB as usize / 2;

    /// 同時にアクティブになる最大数（盤上の全駒）
    pub const MAX_ACTIVE: usize = 32;

    const TABLE_LEN: usize = Color::NUM * Square::NUM * Piece::NUM * Square::NUM;

    /// インデックス表を構築する
    pub fn init() -> Self {
        let mut table = vec![0u32; Self::TABLE_LEN].into_boxed_slice();
        for perspective in Color::ALL {
            for s in Square::all() {
                for pc_index in 0..Piece::NUM {
                    // 無効な駒コードも PS_NONE 扱いで埋めておく
                    let pc = Piece::from_index(pc_index).unwrap_or(Piece::NONE);
                    for ksq in Square::all() {
                        table[Self::slot(perspective, s, pc_index, ksq)] =
                            make_index_not_cached(perspective, s, pc, ksq);
                    }
                }
            }
        }
        Self { table }
    }

    #[inline]
    const fn slot(perspective: Color, s: Square, pc_index: usize, ksq: Square) -> usize {
        ((perspective.index() * Square::NUM + s.index()) * Piece::NUM + pc_index) * Square::NUM
            + ksq.index()
    }

    /// 特徴量インデックス（表引き）
    #[inline]
    pub fn make_index(&self, perspective: Color, s: Square, pc: Piece, ksq: Square) -> usize {
        self.table[Self::slot(perspective, s, pc.index(), ksq)] as usize
    }

    /// アクティブな特徴量インデックスを追記
    ///
    /// 盤上の全駒（両キングを含む）を走査する。視点側のキングが盤上に無い場合は
    /// 何も追加しない（アキュムレータはバイアスのみになる）。
    pub fn append_active_indices(
        &self,
        pos: &Position,
        perspective: Color,
        active: &mut IndexList<MAX_ACTIVE_FEATURES>,
    ) {
        let Some(ksq) = pos.king_square(perspective) else {
            return;
        };
        for (s, pc) in pos.pieces() {
            active.push(self.make_index(perspective, s, pc, ksq));
        }
    }

    /// 変化した特徴量インデックスを追記
    ///
    /// 移動元があれば removed、移動先があれば added に入る。
    pub fn append_changed_indices(
        &self,
        ksq: Option<Square>,
        dirty_piece: &DirtyPiece,
        perspective: Color,
        removed: &mut IndexList<MAX_CHANGED_FEATURES>,
        added: &mut IndexList<MAX_CHANGED_FEATURES>,
    ) {
        let Some(ksq) = ksq else {
            return;
        };
        for cp in dirty_piece.pieces() {
            if let Some(from) = cp.from {
                removed.push(self.make_index(perspective, from, cp.piece, ksq));
            }
            if let Some(to) = cp.to {
                added.push(self.make_index(perspective, to, cp.piece, ksq));
            }
        }
    }

    /// 差分更新 1 手分のコスト
    #[inline]
    pub fn update_cost(dirty_piece: &DirtyPiece) -> i32 {
        dirty_piece.len() as i32
    }

    /// 全計算のコスト
    #[inline]
    pub fn refresh_cost(pos: &Position) -> i32 {
        pos.count_all()
    }

    /// この手で視点側の全計算が必要になるか（自玉が動いた）
    #[inline]
    pub fn requires_refresh(dirty_piece: &DirtyPiece, perspective: Color) -> bool {
        dirty_piece.moved_piece() == Piece::make(perspective, PieceType::King)
    }
}

impl std::fmt::Debug for HalfKAv2_hm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HalfKAv2_hm").field("entries", &self.table.len()).finish()
    }
}
