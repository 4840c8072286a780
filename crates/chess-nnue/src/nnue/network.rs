//! NNUE ネットワーク（1 tier 分）
//!
//! - [`Network`]: バケット 1 つ分の全結合スタック
//!   `fc_0 → (SqrClippedReLU, ClippedReLU) → fc_1 → ClippedReLU → fc_2` + skip 接続
//! - [`NnueNetwork`]: Feature Transformer + バケット別 Network 8 個 + 説明文字列
//!
//! ファイル全体の読み書きもここで行う。

use std::io::{Read, Write};

use log::debug;

use super::accumulator::{Aligned, AccumulatorStack};
use super::constants::{
    FC_0_OUTPUTS, FC_1_INPUTS, L2, L3, LAYER_STACKS, MAX_SIMD_WIDTH, SKIP_DENOMINATOR,
    SKIP_NUMERATOR, padded_input,
};
use super::error::NnueResult;
use super::feature_transformer::FeatureTransformer;
use super::features::HalfKAv2_hm;
use super::io::{check_hash, ensure_eof, read_header, write_header, write_u32};
use super::layers::{AffineTransform, ClippedReLU, SqrClippedReLU};
use crate::position::Position;

/// fc_1 の入力バッファ長（30 → 32 にパディング）
const FC_1_PADDED: usize = padded_input(FC_1_INPUTS);

/// fc_2 の入力バッファ長
const FC_2_PADDED: usize = padded_input(L3);

// =============================================================================
// Network（バケット 1 つ分）
// =============================================================================

/// バケット別ネットワーク
pub struct Network<const L1: usize> {
    pub fc_0: AffineTransform<L1, FC_0_OUTPUTS>,
    pub fc_1: AffineTransform<FC_1_INPUTS, L3>,
    pub fc_2: AffineTransform<L3, 1>,
}

impl<const L1: usize> Network<L1> {
    /// 構造ハッシュ
    pub const fn hash_value() -> u32 {
        let mut h = 0xEC42_E90Du32 ^ (L1 as u32 * 2);
        h = AffineTransform::<L1, FC_0_OUTPUTS>::hash_value(h);
        h = ClippedReLU::<FC_0_OUTPUTS>::hash_value(h);
        h = AffineTransform::<FC_1_INPUTS, L3>::hash_value(h);
        h = ClippedReLU::<L3>::hash_value(h);
        h = AffineTransform::<L3, 1>::hash_value(h);
        h
    }

    pub fn new_zeroed() -> NnueResult<Self> {
        Ok(Self {
            fc_0: AffineTransform::new_zeroed()?,
            fc_1: AffineTransform::new_zeroed()?,
            fc_2: AffineTransform::new_zeroed()?,
        })
    }

    /// ハッシュタグとパラメータを読み込む
    pub fn read_parameters<R: Read>(&mut self, reader: &mut R) -> NnueResult<()> {
        check_hash(reader, Self::hash_value())?;
        self.fc_0.read_parameters(reader)?;
        self.fc_1.read_parameters(reader)?;
        self.fc_2.read_parameters(reader)
    }

    pub fn write_parameters<W: Write>(&self, writer: &mut W) -> NnueResult<()> {
        write_u32(writer, Self::hash_value())?;
        self.fc_0.write_parameters(writer)?;
        self.fc_1.write_parameters(writer)?;
        self.fc_2.write_parameters(writer)
    }

    /// 順伝播（出力スケール 16 倍のまま返す）
    pub fn propagate(&self, transformed: &[u8]) -> i32 {
        let mut fc_0_out = Aligned([0i32; FC_0_OUTPUTS]);
        self.fc_0.propagate(transformed, &mut fc_0_out.0);

        // fc_1 入力: sqr[0..15] ++ crelu[0..15]（sqr の 16 番目は上書きされる）
        let mut ac_sqr_0_out = Aligned([0u8; FC_1_PADDED]);
        let mut ac_0_out = Aligned([0u8; FC_0_OUTPUTS]);
        SqrClippedReLU::<FC_0_OUTPUTS>::propagate(&fc_0_out.0, &mut ac_sqr_0_out.0);
        ClippedReLU::<FC_0_OUTPUTS>::propagate(&fc_0_out.0, &mut ac_0_out.0);
        ac_sqr_0_out.0[L2..L2 * 2].copy_from_slice(&ac_0_out.0[..L2]);

        let mut fc_1_out = Aligned([0i32; L3]);
        self.fc_1.propagate(&ac_sqr_0_out.0, &mut fc_1_out.0);

        let mut ac_1_out = Aligned([0u8; FC_2_PADDED]);
        ClippedReLU::<L3>::propagate(&fc_1_out.0, &mut ac_1_out.0);

        let mut fc_2_out = [0i32; 1];
        self.fc_2.propagate(&ac_1_out.0, &mut fc_2_out);

        // skip 接続: fc_0 の最後の出力を 1.0 = 600 * OUTPUT_SCALE に換算
        let fwd_out =
            (fc_0_out.0[L2] as i64 * SKIP_NUMERATOR as i64 / SKIP_DENOMINATOR as i64) as i32;

        fc_2_out[0].wrapping_add(fwd_out)
    }
}

impl<const L1: usize> Clone for Network<L1> {
    fn clone(&self) -> Self {
        Self { fc_0: self.fc_0.clone(), fc_1: self.fc_1.clone(), fc_2: self.fc_2.clone() }
    }
}

// =============================================================================
// NnueNetwork（1 tier 分）
// =============================================================================

/// 1 tier 分の評価関数パラメータ
pub struct NnueNetwork<const L1: usize> {
    pub feature_transformer: FeatureTransformer<L1>,
    pub networks: Vec<Network<L1>>,
    pub description: String,
}

impl<const L1: usize> NnueNetwork<L1> {
    /// L1 は SIMD 幅の倍数であること
    const DIMENSION_CHECK: () = assert!(
        L1 >= MAX_SIMD_WIDTH && L1 % MAX_SIMD_WIDTH == 0,
        "L1 must be a positive multiple of 32"
    );

    /// ファイル全体のハッシュ
    pub const fn hash_value() -> u32 {
        FeatureTransformer::<L1>::hash_value() ^ Network::<L1>::hash_value()
    }

    /// ゼロ重みで確保
    pub fn new_zeroed() -> NnueResult<Self> {
        let () = Self::DIMENSION_CHECK;
        let mut networks = Vec::with_capacity(LAYER_STACKS);
        for _ in 0..LAYER_STACKS {
            networks.push(Network::new_zeroed()?);
        }
        Ok(Self {
            feature_transformer: FeatureTransformer::new_zeroed()?,
            networks,
            description: String::new(),
        })
    }

    /// ストリームから読み込む（ストリーム終端まで消費すること）
    pub fn read<R: Read>(reader: &mut R) -> NnueResult<Self> {
        let mut net = Self::new_zeroed()?;
        net.description = read_header(reader, Self::hash_value())?;
        net.feature_transformer.read_parameters(reader)?;
        for (bucket, network) in net.networks.iter_mut().enumerate() {
            network.read_parameters(reader).map_err(|e| {
                debug!("[NNUE Load] bucket {bucket} failed: {e}");
                e
            })?;
        }
        ensure_eof(reader)?;
        Ok(net)
    }

    /// ストリームへ書き出す
    pub fn write<W: Write>(&self, writer: &mut W) -> NnueResult<()> {
        write_header(writer, Self::hash_value(), &self.description)?;
        self.feature_transformer.write_parameters(writer)?;
        for network in &self.networks {
            network.write_parameters(writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// 駒数からバケット番号を求める
    #[inline]
    pub fn bucket_for(pos: &Position) -> usize {
        (pos.count_all().max(1) as usize - 1) / 4
    }

    /// 指定バケットで評価し、(PSQT, positional) を返す（どちらも出力スケール 16 倍）
    pub fn evaluate_bucket(
        &self,
        features: &HalfKAv2_hm,
        pos: &Position,
        stack: &mut AccumulatorStack<L1>,
        bucket: usize,
    ) -> (i32, i32) {
        debug_assert!(bucket < LAYER_STACKS);
        let mut transformed = Aligned([0u8; L1]);
        let psqt =
            self.feature_transformer.transform(features, pos, stack, &mut transformed.0, bucket);
        let positional = self.networks[bucket].propagate(&transformed.0);
        (psqt, positional)
    }

    /// 現局面のバケットで評価し、(PSQT, positional) を返す
    #[inline]
    pub fn evaluate(
        &self,
        features: &HalfKAv2_hm,
        pos: &Position,
        stack: &mut AccumulatorStack<L1>,
    ) -> (i32, i32) {
        let bucket = Self::bucket_for(pos).min(LAYER_STACKS - 1);
        self.evaluate_bucket(features, pos, stack, bucket)
    }

    /// 両視点のアキュムレータを計算済みにする
    #[inline]
    pub fn hint_common_access(
        &self,
        features: &HalfKAv2_hm,
        pos: &Position,
        stack: &mut AccumulatorStack<L1>,
    ) {
        self.feature_transformer.hint_common_access(features, pos, stack);
    }
}

impl<const L1: usize> Clone for NnueNetwork<L1> {
    fn clone(&self) -> Self {
        Self {
            feature_transformer: self.feature_transformer.clone(),
            networks: self.networks.clone(),
            description: self.description.clone(),
        }
    }
}

impl<const L1: usize> std::fmt::Debug for NnueNetwork<L1> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NnueNetwork")
            .field("l1", &L1)
            .field("hash", &format_args!("{:#010x}", Self::hash_value()))
            .field("description", &self.description)
            .finish()
    }
}
