//! NNUE 定数定義
//!
//! 次元定数・スケーリング定数・ファイル形式定数。
//! 2 つの tier（big / small）は L1 だけが異なり、L2/L3 とバケット数は共通。

// =============================================================================
// 次元定義
// =============================================================================

/// Big tier の Feature Transformer 出力次元（片視点）
pub const BIG_L1: usize = 2560;

/// Small tier の Feature Transformer 出力次元（片視点）
pub const SMALL_L1: usize = 128;

/// fc_0 の主出力次元（fc_0 はこれに skip 用の 1 出力を加えた 16 出力）
pub const L2: usize = 15;

/// fc_1 の出力次元
pub const L3: usize = 32;

/// fc_0 の出力次元（main(15) + skip(1)）
pub const FC_0_OUTPUTS: usize = L2 + 1;

/// fc_1 の入力次元（SqrCReLU(15) + CReLU(15)）
pub const FC_1_INPUTS: usize = L2 * 2;

/// PSQT バケット数
pub const PSQT_BUCKETS: usize = 8;

/// LayerStack（バケット別ネットワーク）数
pub const LAYER_STACKS: usize = 8;

// =============================================================================
// スケーリング定数
// =============================================================================

/// 出力スケール（ネットワーク出力 ÷ 16 = 内部評価値）
pub const OUTPUT_SCALE: i32 = 16;

/// 隠れ層の重みスケール（2^6 = 64）
pub const WEIGHT_SCALE_BITS: u32 = 6;

/// SqrClippedReLU のシフト量（2 * 6 + 7 = 19）
pub const SQR_SHIFT_BITS: u32 = 2 * WEIGHT_SCALE_BITS + 7;

/// skip 接続の換算: 量子化 1.0 = 127 << 6 を 600 * OUTPUT_SCALE に揃える
pub const SKIP_NUMERATOR: i32 = 600 * OUTPUT_SCALE;
pub const SKIP_DENOMINATOR: i32 = 127 * (1 << WEIGHT_SCALE_BITS);

/// SIMD 幅（アフィン層の入力はこの倍数にパディングされる）
pub const MAX_SIMD_WIDTH: usize = 32;

/// キャッシュラインサイズ
pub const CACHE_LINE_SIZE: usize = 64;

// =============================================================================
// ファイル形式
// =============================================================================

/// 評価関数ファイルのバージョン
pub const NNUE_VERSION: u32 = 0x7AF3_2F20;

/// LEB128 圧縮ブロックのマジック文字列
pub const LEB128_MAGIC: &[u8; 17] = b"COMPRESSED_LEB128";

/// big tier のデフォルトファイル名
pub const DEFAULT_EVAL_FILE_BIG: &str = "nn-0000000000a0.nnue";

/// small tier のデフォルトファイル名
pub const DEFAULT_EVAL_FILE_SMALL: &str = "nn-ecb35f70ff2a.nnue";

/// ネットワーク配布元（verify のエラーメッセージ用）
pub const NETWORK_DOWNLOAD_URL: &str = "https://tests.stockfishchess.org/api/nn/";

// =============================================================================
// 評価関数の閾値
// =============================================================================

/// 駒割りの絶対値がこれを超えたら NNUE を呼ばずに駒割りを返す
pub const LAZY_THRESHOLD: i32 = 2700;

/// 駒割りの絶対値がこれを超えたら small tier を使う
pub const SMALL_NET_THRESHOLD: i32 = 1050;

/// hint_common_parent_position で small tier を選ぶ閾値
pub const HINT_SMALL_NET_THRESHOLD: i32 = 1500;

/// アフィン層の入力パディング後の次元
#[inline]
pub const fn padded_input(n: usize) -> usize {
    n.div_ceil(MAX_SIMD_WIDTH) * MAX_SIMD_WIDTH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_input() {
        assert_eq!(padded_input(30), 32);
        assert_eq!(padded_input(32), 32);
        assert_eq!(padded_input(BIG_L1), BIG_L1);
        assert_eq!(padded_input(1), 32);
    }

    #[test]
    fn test_shift_constants() {
        assert_eq!(SQR_SHIFT_BITS, 19);
        assert_eq!(SKIP_DENOMINATOR, 8128);
        assert_eq!(LEB128_MAGIC.len(), 17);
    }
}
