//! ネットワーク層の実装
//!
//! - `AffineTransform`: 全結合アフィン変換層（入力×重み + バイアス）
//! - `ClippedReLU`: 整数スケーリング付きのクリップ付き ReLU 層
//! - `SqrClippedReLU`: 二乗してからクリップする ReLU 層

use std::io::{Read, Write};

use super::accumulator::AlignedBox;
use super::constants::{SQR_SHIFT_BITS, WEIGHT_SCALE_BITS, padded_input};
use super::error::NnueResult;
use super::io::{read_i8s, read_i32s, write_i8s, write_i32s};

/// AVX2 での水平加算（i32×8 → i32）
#[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
#[inline]
unsafe fn hsum_i32_avx2(v: std::arch::x86_64::__m256i) -> i32 {
    use std::arch::x86_64::*;

    let hi = _mm256_extracti128_si256(v, 1);
    let lo = _mm256_castsi256_si128(v);
    let sum128 = _mm_add_epi32(lo, hi);
    let hi64 = _mm_unpackhi_epi64(sum128, sum128);
    let sum64 = _mm_add_epi32(sum128, hi64);
    let hi32 = _mm_shuffle_epi32(sum64, 1);
    let sum32 = _mm_add_epi32(sum64, hi32);
    _mm_cvtsi128_si32(sum32)
}

// =============================================================================
// AffineTransform
// =============================================================================

/// アフィン変換層
///
/// 重みは出力行ごとに `PADDED_INPUT` バイト（行優先）。
/// パディング部分の重みは 0 で、入力側のパディングも 0 であること。
pub struct AffineTransform<const INPUT_DIM: usize, const OUTPUT_DIM: usize> {
    /// バイアス
    pub biases: [i32; OUTPUT_DIM],
    /// 重み（64バイトアライン）
    pub weights: AlignedBox<i8>,
}

impl<const INPUT_DIM: usize, const OUTPUT_DIM: usize> AffineTransform<INPUT_DIM, OUTPUT_DIM> {
    pub const PADDED_INPUT: usize = padded_input(INPUT_DIM);

    /// ゼロ重みの層を作成
    pub fn new_zeroed() -> NnueResult<Self> {
        Ok(Self {
            biases: [0; OUTPUT_DIM],
            weights: AlignedBox::try_new_zeroed(OUTPUT_DIM * Self::PADDED_INPUT)?,
        })
    }

    /// 構造ハッシュ
    pub const fn hash_value(prev_hash: u32) -> u32 {
        let mut h = 0xCC03_DAE4u32.wrapping_add(OUTPUT_DIM as u32);
        h ^= prev_hash >> 1;
        h ^= prev_hash << 31;
        h
    }

    /// 出力 `out` の入力 `input` に対する重み
    #[inline]
    pub fn weight(&self, out: usize, input: usize) -> i8 {
        self.weights[out * Self::PADDED_INPUT + input]
    }

    #[inline]
    pub fn weight_mut(&mut self, out: usize, input: usize) -> &mut i8 {
        &mut self.weights[out * Self::PADDED_INPUT + input]
    }

    /// パラメータを読み込む（バイアス i32 → 重み i8）
    pub fn read_parameters<R: Read>(&mut self, reader: &mut R) -> NnueResult<()> {
        read_i32s(reader, &mut self.biases)?;
        read_i8s(reader, &mut self.weights)
    }

    pub fn write_parameters<W: Write>(&self, writer: &mut W) -> NnueResult<()> {
        write_i32s(writer, &self.biases)?;
        write_i8s(writer, &self.weights)
    }

    /// 順伝播
    ///
    /// `input` は `PADDED_INPUT` バイト以上（パディング部は 0）。
    pub fn propagate(&self, input: &[u8], output: &mut [i32; OUTPUT_DIM]) {
        debug_assert!(
            input.len() >= Self::PADDED_INPUT,
            "input length {} is less than PADDED_INPUT {}",
            input.len(),
            Self::PADDED_INPUT
        );

        // AVX2: 1 行 32 バイトずつ maddubs で積和
        #[cfg(all(target_arch = "x86_64", target_feature = "avx2"))]
        {
            // SAFETY:
            // - input.len() >= PADDED_INPUT、PADDED_INPUT は 32 の倍数
            // - weights.len() == OUTPUT_DIM * PADDED_INPUT
            // - 入力は 0..=127 なので maddubs の i16 飽和は起きない
            unsafe {
                use std::arch::x86_64::*;

                let ones = _mm256_set1_epi16(1);
                let in_ptr = input.as_ptr();
                let w_ptr = self.weights.as_ptr();
                for (j, out) in output.iter_mut().enumerate() {
                    let row = w_ptr.add(j * Self::PADDED_INPUT);
                    let mut acc = _mm256_setzero_si256();
                    for k in (0..Self::PADDED_INPUT).step_by(32) {
                        let x = _mm256_loadu_si256(in_ptr.add(k) as *const __m256i);
                        let w = _mm256_loadu_si256(row.add(k) as *const __m256i);
                        let product = _mm256_maddubs_epi16(x, w);
                        acc = _mm256_add_epi32(acc, _mm256_madd_epi16(product, ones));
                    }
                    *out = self.biases[j].wrapping_add(hsum_i32_avx2(acc));
                }
            }
            return;
        }

        // スカラーフォールバック
        #[allow(unreachable_code)]
        {
            self.propagate_scalar(input, output);
        }
    }

    /// スカラー版の順伝播
    pub fn propagate_scalar(&self, input: &[u8], output: &mut [i32; OUTPUT_DIM]) {
        for (j, out) in output.iter_mut().enumerate() {
            let row = &self.weights[j * Self::PADDED_INPUT..j * Self::PADDED_INPUT + INPUT_DIM];
            let dot = row
                .iter()
                .zip(input)
                .fold(0i32, |acc, (&w, &x)| acc.wrapping_add(w as i32 * x as i32));
            *out = self.biases[j].wrapping_add(dot);
        }
    }
}

impl<const INPUT_DIM: usize, const OUTPUT_DIM: usize> Clone for AffineTransform<INPUT_DIM, OUTPUT_DIM> {
    fn clone(&self) -> Self {
        Self { biases: self.biases, weights: self.weights.clone() }
    }
}

// =============================================================================
// ClippedReLU
// =============================================================================

/// ClippedReLU 層
///
/// 入力: i32、出力: u8（`(x >> 6)` を 0..=127 にクランプ）
pub struct ClippedReLU<const DIM: usize>;

impl<const DIM: usize> ClippedReLU<DIM> {
    /// 構造ハッシュ
    pub const fn hash_value(prev_hash: u32) -> u32 {
        0x538D_24C7u32.wrapping_add(prev_hash)
    }

    /// 順伝播
    ///
    /// SSE2 で 16 要素ずつ、残りをスカラーで処理する。
    pub fn propagate(input: &[i32], output: &mut [u8]) {
        debug_assert!(input.len() >= DIM && output.len() >= DIM);
        #[allow(unused_mut)]
        let mut processed: usize = 0;

        #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
        {
            let num_chunks = DIM / 16;
            if num_chunks > 0 {
                // SAFETY: input/output は DIM 要素以上。loadu/storeu なのでアライン不要
                unsafe {
                    use std::arch::x86_64::*;

                    #[cfg(target_feature = "sse4.1")]
                    let zero = _mm_setzero_si128();
                    #[cfg(not(target_feature = "sse4.1"))]
                    let k0x80s = _mm_set1_epi8(-128i8);

                    let in_ptr = input.as_ptr() as *const __m128i;
                    let out_ptr = output.as_mut_ptr() as *mut __m128i;

                    for i in 0..num_chunks {
                        let in0 = _mm_loadu_si128(in_ptr.add(i * 4));
                        let in1 = _mm_loadu_si128(in_ptr.add(i * 4 + 1));
                        let in2 = _mm_loadu_si128(in_ptr.add(i * 4 + 2));
                        let in3 = _mm_loadu_si128(in_ptr.add(i * 4 + 3));

                        let words0 =
                            _mm_srai_epi16(_mm_packs_epi32(in0, in1), WEIGHT_SCALE_BITS as i32);
                        let words1 =
                            _mm_srai_epi16(_mm_packs_epi32(in2, in3), WEIGHT_SCALE_BITS as i32);
                        let packedbytes = _mm_packs_epi16(words0, words1);

                        #[cfg(target_feature = "sse4.1")]
                        let result = _mm_max_epi8(packedbytes, zero);
                        #[cfg(not(target_feature = "sse4.1"))]
                        let result = _mm_subs_epi8(_mm_adds_epi8(packedbytes, k0x80s), k0x80s);

                        _mm_storeu_si128(out_ptr.add(i), result);
                    }
                }
                processed = num_chunks * 16;
            }
        }

        Self::propagate_scalar(&input[processed..DIM], &mut output[processed..DIM]);
    }

    /// スカラー版
    #[inline]
    pub fn propagate_scalar(input: &[i32], output: &mut [u8]) {
        for (out, &x) in output.iter_mut().zip(input) {
            *out = (x >> WEIGHT_SCALE_BITS).clamp(0, 127) as u8;
        }
    }
}

// =============================================================================
// SqrClippedReLU
// =============================================================================

/// SqrClippedReLU 層
///
/// 入力: i32、出力: u8（`min(127, x² >> 19)`）
pub struct SqrClippedReLU<const DIM: usize>;

impl<const DIM: usize> SqrClippedReLU<DIM> {
    /// 順伝播
    ///
    /// SSE2 では i16 に飽和パックしてから上位 16 ビット積を取り、さらに 3 ビット
    /// シフトする（計 19 ビット）。|x| > 32767 はどちらの経路でも 127 になる。
    pub fn propagate(input: &[i32], output: &mut [u8]) {
        debug_assert!(input.len() >= DIM && output.len() >= DIM);
        #[allow(unused_mut)]
        let mut processed: usize = 0;

        #[cfg(all(target_arch = "x86_64", target_feature = "sse2"))]
        {
            let num_chunks = DIM / 16;
            if num_chunks > 0 {
                // SAFETY: ClippedReLU と同じ
                unsafe {
                    use std::arch::x86_64::*;

                    let in_ptr = input.as_ptr() as *const __m128i;
                    let out_ptr = output.as_mut_ptr() as *mut __m128i;

                    for i in 0..num_chunks {
                        let in0 = _mm_loadu_si128(in_ptr.add(i * 4));
                        let in1 = _mm_loadu_si128(in_ptr.add(i * 4 + 1));
                        let in2 = _mm_loadu_si128(in_ptr.add(i * 4 + 2));
                        let in3 = _mm_loadu_si128(in_ptr.add(i * 4 + 3));

                        let words0 = _mm_packs_epi32(in0, in1);
                        let words1 = _mm_packs_epi32(in2, in3);

                        // mulhi で >> 16、残り 3 ビットを論理シフト
                        let sq0 = _mm_srli_epi16(
                            _mm_mulhi_epi16(words0, words0),
                            (SQR_SHIFT_BITS - 16) as i32,
                        );
                        let sq1 = _mm_srli_epi16(
                            _mm_mulhi_epi16(words1, words1),
                            (SQR_SHIFT_BITS - 16) as i32,
                        );

                        _mm_storeu_si128(out_ptr.add(i), _mm_packs_epi16(sq0, sq1));
                    }
                }
                processed = num_chunks * 16;
            }
        }

        Self::propagate_scalar(&input[processed..DIM], &mut output[processed..DIM]);
    }

    /// スカラー版
    #[inline]
    pub fn propagate_scalar(input: &[i32], output: &mut [u8]) {
        for (out, &x) in output.iter_mut().zip(input) {
            let sq = (x as i64 * x as i64) >> SQR_SHIFT_BITS;
            *out = sq.min(127) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nnue::accumulator::Aligned;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_affine_transform_propagate() {
        // PADDED_INPUT = padded_input(2) = 32
        let mut weights = AlignedBox::new_zeroed(64); // 2行 × 32バイト
        weights[0] = 1;
        weights[1] = 2; // 行0: [1, 2, 0, ...]
        weights[32] = 3;
        weights[33] = 4; // 行1: [3, 4, 0, ...]

        let transform: AffineTransform<2, 2> = AffineTransform { biases: [10, 20], weights };

        let mut input = Aligned([0u8; 32]);
        input.0[0] = 1;
        input.0[1] = 2;
        let mut output = [0i32; 2];

        transform.propagate(&input.0, &mut output);

        // output[0] = 10 + 1*1 + 2*2 = 15
        // output[1] = 20 + 1*3 + 2*4 = 31
        assert_eq!(output, [15, 31]);
    }

    #[test]
    fn test_affine_transform_matches_scalar() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let mut transform = AffineTransform::<64, 16>::new_zeroed().unwrap();
        for b in transform.biases.iter_mut() {
            *b = rng.random_range(-5000..5000);
        }
        for j in 0..16 {
            for i in 0..64 {
                *transform.weight_mut(j, i) = rng.random_range(-127..=127);
            }
        }
        let mut input = Aligned([0u8; 64]);
        for x in input.0.iter_mut() {
            *x = rng.random_range(0..=127);
        }

        let mut fast = [0i32; 16];
        let mut slow = [0i32; 16];
        transform.propagate(&input.0, &mut fast);
        transform.propagate_scalar(&input.0, &mut slow);
        assert_eq!(fast, slow);
    }

    #[test]
    fn test_affine_transform_bias_wraps() {
        let mut transform = AffineTransform::<64, 16>::new_zeroed().unwrap();
        for (j, b) in transform.biases.iter_mut().enumerate() {
            *b = if j % 2 == 0 { i32::MAX } else { i32::MIN };
        }
        for j in 0..16 {
            for i in 0..64 {
                *transform.weight_mut(j, i) = if j % 2 == 0 { 1 } else { -1 };
            }
        }
        let input = Aligned([1u8; 64]);

        let mut fast = [0i32; 16];
        let mut slow = [0i32; 16];
        transform.propagate(&input.0, &mut fast);
        transform.propagate_scalar(&input.0, &mut slow);
        assert_eq!(fast, slow);
        assert_eq!(fast[0], i32::MAX.wrapping_add(64));
        assert_eq!(fast[1], i32::MIN.wrapping_sub(64));
    }

    #[test]
    fn test_affine_hash() {
        assert_eq!(AffineTransform::<32, 1>::hash_value(0), 0xCC03_DAE5);
        // prev の最下位ビットは最上位に回る
        assert_eq!(AffineTransform::<32, 1>::hash_value(1), 0xCC03_DAE5 ^ 0x8000_0000);
        assert_eq!(ClippedReLU::<16>::hash_value(1), 0x538D_24C8);
        assert_eq!(ClippedReLU::<16>::hash_value(u32::MAX), 0x538D_24C6);
    }

    #[test]
    fn test_clipped_relu() {
        let input = [0i32, 64, 128, -64, 256, 127 << 6, 1_000_000];
        let mut output = [0u8; 7];

        ClippedReLU::<7>::propagate(&input, &mut output);

        assert_eq!(output, [0, 1, 2, 0, 4, 127, 127]);
    }

    #[test]
    fn test_sqr_clipped_relu() {
        // 2^19 = 524288 → (724^2 >> 19) = 0, (1024^2 >> 19) = 2
        let input = [0i32, 724, 1024, -1024, 8191, 8192, 100_000, -100_000];
        let mut output = [0u8; 8];
        SqrClippedReLU::<8>::propagate(&input, &mut output);
        assert_eq!(output, [0, 0, 2, 2, 127, 127, 127, 127]);
    }

    #[test]
    fn test_simd_matches_scalar() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        for _ in 0..100 {
            let input: Vec<i32> = (0..32)
                .map(|_| match rng.random_range(0..3) {
                    0 => rng.random_range(-200_000..200_000),
                    1 => rng.random_range(-10_000..10_000),
                    _ => rng.random_range(-100..9000),
                })
                .collect();

            let mut fast = [0u8; 32];
            let mut slow = [0u8; 32];
            ClippedReLU::<32>::propagate(&input, &mut fast);
            ClippedReLU::<32>::propagate_scalar(&input, &mut slow);
            assert_eq!(fast, slow);

            SqrClippedReLU::<32>::propagate(&input, &mut fast);
            SqrClippedReLU::<32>::propagate_scalar(&input, &mut slow);
            assert_eq!(fast, slow);
        }
    }
}
