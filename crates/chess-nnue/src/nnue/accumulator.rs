//! Accumulator - 入力特徴量の累積値を保持
//!
//! Feature Transformer の出力（バイアス + アクティブ特徴量の重み行の和）を
//! 視点ごとに保持し、差分更新対応の評価値計算を行うための中間バッファ。
//!
//! 探索の 1 ノードにつき 1 エントリを [`AccumulatorStack`] に積む。
//! エントリは `previous` で親ノードを指し、指し手の差分（[`DirtyPiece`]）を持つ。

use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use super::constants::{CACHE_LINE_SIZE, PSQT_BUCKETS};
use super::error::{NnueError, NnueResult};
use super::features::HalfKAv2_hm;
use crate::position::{DirtyPiece, Position};
use crate::types::{Color, Value};

/// 同時にアクティブになる特徴量の最大数
pub const MAX_ACTIVE_FEATURES: usize = HalfKAv2_hm::MAX_ACTIVE;

/// 1 手で変化する特徴量の最大数（removed / added それぞれ）
pub const MAX_CHANGED_FEATURES: usize = DirtyPiece::MAX_PIECES;

/// スタックの事前確保数（探索の最大深さ + 余裕）
pub const MAX_PATH_LENGTH: usize = Value::MAX_PLY as usize + 10;

// =============================================================================
// Aligned / AlignedBox
// =============================================================================

/// アライメントを保証するラッパー（64バイト = キャッシュライン）
#[repr(C, align(64))]
#[derive(Clone, Copy)]
pub struct Aligned<T>(pub T);

impl<T: Default> Default for Aligned<T> {
    fn default() -> Self {
        Self(T::default())
    }
}

/// ゼロ埋めで有効な値になる型
///
/// # Safety
/// 全ビット 0 が `Self` の有効な値であること。
pub unsafe trait ZeroInit: Copy {}

unsafe impl ZeroInit for i8 {}
unsafe impl ZeroInit for u8 {}
unsafe impl ZeroInit for i16 {}
unsafe impl ZeroInit for i32 {}
unsafe impl ZeroInit for u32 {}

/// キャッシュラインにアラインされたゼロ初期化ヒープ配列
///
/// 重み行列やアキュムレータなど、SIMD でまとめて読む大きな配列に使う。
pub struct AlignedBox<T: ZeroInit> {
    ptr: NonNull<T>,
    len: usize,
}

// SAFETY: 所有権は Box と同じく排他的
unsafe impl<T: ZeroInit + Send> Send for AlignedBox<T> {}
unsafe impl<T: ZeroInit + Sync> Sync for AlignedBox<T> {}

impl<T: ZeroInit> AlignedBox<T> {
    fn layout(len: usize) -> Option<Layout> {
        let bytes = len.checked_mul(size_of::<T>())?;
        Layout::from_size_align(bytes.max(1), CACHE_LINE_SIZE).ok()
    }

    /// ゼロ初期化で確保する（失敗時は Allocation エラー）
    pub fn try_new_zeroed(len: usize) -> NnueResult<Self> {
        let bytes = len.saturating_mul(size_of::<T>());
        let layout = Self::layout(len).ok_or(NnueError::Allocation { bytes })?;
        // SAFETY: layout のサイズは 1 以上
        let raw = unsafe { alloc_zeroed(layout) } as *mut T;
        let ptr = NonNull::new(raw).ok_or(NnueError::Allocation { bytes })?;
        Ok(Self { ptr, len })
    }

    /// ゼロ初期化で確保する（失敗時はプロセスを中断）
    pub fn new_zeroed(len: usize) -> Self {
        match Self::try_new_zeroed(len) {
            Ok(b) => b,
            Err(_) => handle_alloc_error(
                Self::layout(len).unwrap_or_else(|| Layout::new::<Aligned<u8>>()),
            ),
        }
    }
}

impl<T: ZeroInit> Deref for AlignedBox<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        // SAFETY: ptr は len 要素分確保済みで、ゼロ初期化されている
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: ZeroInit> DerefMut for AlignedBox<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: 同上。&mut self により排他
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: ZeroInit> Clone for AlignedBox<T> {
    fn clone(&self) -> Self {
        let mut b = Self::new_zeroed(self.len);
        b.copy_from_slice(self);
        b
    }
}

impl<T: ZeroInit> Drop for AlignedBox<T> {
    fn drop(&mut self) {
        if let Some(layout) = Self::layout(self.len) {
            // SAFETY: 同じ layout で確保したポインタ
            unsafe { dealloc(self.ptr.as_ptr() as *mut u8, layout) };
        }
    }
}

impl<T: ZeroInit + std::fmt::Debug> std::fmt::Debug for AlignedBox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBox").field("len", &self.len).finish()
    }
}

// =============================================================================
// IndexList
// =============================================================================

/// 特徴量インデックスの固定長リスト（ヒープ確保なし）
#[derive(Clone, Copy)]
pub struct IndexList<const N: usize> {
    indices: [usize; N],
    len: usize,
}

impl<const N: usize> IndexList<N> {
    #[inline]
    pub const fn new() -> Self {
        Self { indices: [0; N], len: 0 }
    }

    /// 追加（満杯なら false を返して捨てる）
    #[inline]
    pub fn push(&mut self, index: usize) -> bool {
        if self.len >= N {
            debug_assert!(false, "IndexList overflow (capacity {N})");
            return false;
        }
        self.indices[self.len] = index;
        self.len += 1;
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.indices[..self.len]
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, usize> {
        self.as_slice().iter()
    }
}

impl<const N: usize> Default for IndexList<N> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Accumulator
// =============================================================================

/// アキュムレータ
///
/// - `accumulation[perspective]`: L1 次元の累積値（i16）
/// - `psqt_accumulation[perspective]`: PSQT バケットごとの累積値（i32）
/// - `computed[perspective]`: その視点が計算済みかどうか
pub struct Accumulator<const L1: usize> {
    pub accumulation: [AlignedBox<i16>; 2],
    pub psqt_accumulation: [Aligned<[i32; PSQT_BUCKETS]>; 2],
    pub computed: [bool; 2],
}

impl<const L1: usize> Accumulator<L1> {
    pub fn new() -> Self {
        Self {
            accumulation: [AlignedBox::new_zeroed(L1), AlignedBox::new_zeroed(L1)],
            psqt_accumulation: [Aligned([0; PSQT_BUCKETS]); 2],
            computed: [false; 2],
        }
    }

    /// 視点ごとの累積値
    #[inline]
    pub fn get(&self, perspective: Color) -> &[i16] {
        &self.accumulation[perspective.index()]
    }

    /// 視点ごとの PSQT 累積値
    #[inline]
    pub fn psqt(&self, perspective: Color) -> &[i32; PSQT_BUCKETS] {
        &self.psqt_accumulation[perspective.index()].0
    }

    /// 別のアキュムレータから 1 視点分をコピー
    #[inline]
    pub fn copy_perspective_from(&mut self, other: &Self, perspective: Color) {
        let p = perspective.index();
        self.accumulation[p].copy_from_slice(&other.accumulation[p]);
        self.psqt_accumulation[p] = other.psqt_accumulation[p];
    }
}

impl<const L1: usize> Default for Accumulator<L1> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const L1: usize> Clone for Accumulator<L1> {
    fn clone(&self) -> Self {
        Self {
            accumulation: [self.accumulation[0].clone(), self.accumulation[1].clone()],
            psqt_accumulation: self.psqt_accumulation,
            computed: self.computed,
        }
    }
}

// =============================================================================
// AccumulatorStack
// =============================================================================

/// スタックエントリ（探索の 1 ノード分）
pub struct StackEntry<const L1: usize> {
    pub accumulator: Accumulator<L1>,
    /// 親ノードからこのノードへの駒移動
    pub dirty_piece: DirtyPiece,
    /// 親ノードのインデックス（ルートなら None）
    pub previous: Option<usize>,
}

impl<const L1: usize> StackEntry<L1> {
    fn new() -> Self {
        Self {
            accumulator: Accumulator::new(),
            dirty_piece: DirtyPiece::new(),
            previous: None,
        }
    }
}

/// アキュムレータスタック
///
/// 1 つの探索スレッドが 1 tier につき 1 つ所有する。`push`/`pop` は
/// 局面の do_move/undo_move と必ず対にすること。
pub struct AccumulatorStack<const L1: usize> {
    stack: Vec<StackEntry<L1>>,
    current_idx: usize,
}

impl<const L1: usize> AccumulatorStack<L1> {
    /// 新規作成（探索の最大深さ分を事前確保）
    pub fn new() -> Self {
        Self::with_capacity(MAX_PATH_LENGTH)
    }

    /// 事前確保数を指定して作成
    pub fn with_capacity(capacity: usize) -> Self {
        let stack = (0..capacity.max(1)).map(|_| StackEntry::new()).collect();
        Self { stack, current_idx: 0 }
    }

    /// リセット（新しいルート局面で呼ぶ）
    pub fn reset(&mut self) {
        for entry in &mut self.stack {
            entry.accumulator.computed = [false; 2];
            entry.previous = None;
            entry.dirty_piece = DirtyPiece::new();
        }
        self.current_idx = 0;
    }

    /// プッシュ（do_move の直後に呼ぶ）
    pub fn push(&mut self, dirty_piece: DirtyPiece) {
        let prev = self.current_idx;
        self.current_idx += 1;
        if self.current_idx >= self.stack.len() {
            self.stack.push(StackEntry::new());
        }
        let entry = &mut self.stack[self.current_idx];
        entry.dirty_piece = dirty_piece;
        entry.previous = Some(prev);
        entry.accumulator.computed = [false; 2];
    }

    /// ポップ（undo_move の直後に呼ぶ）
    pub fn pop(&mut self) {
        if self.current_idx > 0 {
            self.current_idx -= 1;
        }
    }

    /// 現在のインデックス
    #[inline]
    pub fn current_index(&self) -> usize {
        self.current_idx
    }

    /// 現在のエントリ
    #[inline]
    pub fn current(&self) -> &StackEntry<L1> {
        &self.stack[self.current_idx]
    }

    /// 現在のエントリ（可変）
    #[inline]
    pub fn current_mut(&mut self) -> &mut StackEntry<L1> {
        &mut self.stack[self.current_idx]
    }

    /// 指定インデックスのエントリ
    #[inline]
    pub fn entry_at(&self, idx: usize) -> &StackEntry<L1> {
        &self.stack[idx]
    }

    /// 指定インデックスのエントリ（可変）
    #[inline]
    pub fn entry_at_mut(&mut self, idx: usize) -> &mut StackEntry<L1> {
        &mut self.stack[idx]
    }

    /// 2 つのエントリを同時に借用する（`from < to`）
    #[inline]
    pub(crate) fn pair_mut(&mut self, from: usize, to: usize) -> (&StackEntry<L1>, &mut StackEntry<L1>) {
        debug_assert!(from < to);
        let (head, tail) = self.stack.split_at_mut(to);
        (&head[from], &mut tail[0])
    }

    /// 差分更新の起点になるエントリを探す
    ///
    /// 現在ノードから親をたどり、視点 `perspective` が計算済みのエントリを探す。
    /// 途中で自玉が動いた手に当たるか、差分更新の累積コストが全計算のコストを
    /// 上回った時点で打ち切る。
    ///
    /// 戻り値のエントリが計算済みなら差分更新、未計算なら全計算を行う。
    pub fn find_usable_accumulator(&self, pos: &Position, perspective: Color) -> usize {
        let p = perspective.index();
        let mut idx = self.current_idx;
        let mut gain = HalfKAv2_hm::refresh_cost(pos);

        while let Some(prev) = self.stack[idx].previous {
            let entry = &self.stack[idx];
            if entry.accumulator.computed[p] {
                break;
            }
            if HalfKAv2_hm::requires_refresh(&entry.dirty_piece, perspective) {
                break;
            }
            gain -= HalfKAv2_hm::update_cost(&entry.dirty_piece) + 1;
            if gain < 0 {
                break;
            }
            idx = prev;
        }
        idx
    }
}

impl<const L1: usize> Default for AccumulatorStack<L1> {
    fn default() -> Self {
        Self::new()
    }
}
