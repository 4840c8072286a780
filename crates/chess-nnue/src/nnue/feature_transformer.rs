//! Feature Transformer
//!
//! 入力特徴量（HalfKAv2_hm）を L1 次元の累積値に変換する層。
//! 累積値は [`AccumulatorStack`] に保持し、指し手ごとに差分更新する。
//!
//! 重みはファイル上で LEB128 圧縮されている:
//! `hash | biases[L1] | weights[DIMENSIONS][L1] | psqt_weights[DIMENSIONS][PSQT_BUCKETS]`

use std::io::{Read, Write};

use log::debug;
use smallvec::SmallVec;

use super::accumulator::{
    Accumulator, AccumulatorStack, AlignedBox, IndexList, MAX_ACTIVE_FEATURES,
    MAX_CHANGED_FEATURES,
};
use super::constants::PSQT_BUCKETS;
use super::error::NnueResult;
use super::features::HalfKAv2_hm;
use super::io::{check_hash, write_u32};
use super::leb128::{read_leb128, write_leb128};
use crate::position::Position;
use crate::types::Color;

/// Feature Transformer
pub struct FeatureTransformer<const L1: usize> {
    /// バイアス [L1]
    pub biases: AlignedBox<i16>,
    /// 重み [DIMENSIONS][L1]
    pub weights: AlignedBox<i16>,
    /// PSQT 重み [DIMENSIONS][PSQT_BUCKETS]
    pub psqt_weights: AlignedBox<i32>,
}

impl<const L1: usize> FeatureTransformer<L1> {
    /// 入力次元
    pub const INPUT_DIMENSIONS: usize = HalfKAv2_hm::DIMENSIONS;

    /// 出力次元（両視点の L1/2 を連結）
    pub const OUTPUT_DIMENSIONS: usize = L1;

    /// 構造ハッシュ
    pub const fn hash_value() -> u32 {
        HalfKAv2_hm::HASH_VALUE ^ (L1 as u32 * 2)
    }

    /// ゼロ重みで確保
    pub fn new_zeroed() -> NnueResult<Self> {
        Ok(Self {
            biases: AlignedBox::try_new_zeroed(L1)?,
            weights: AlignedBox::try_new_zeroed(L1 * Self::INPUT_DIMENSIONS)?,
            psqt_weights: AlignedBox::try_new_zeroed(PSQT_BUCKETS * Self::INPUT_DIMENSIONS)?,
        })
    }

    /// ハッシュタグとパラメータを読み込む
    pub fn read_parameters<R: Read>(&mut self, reader: &mut R) -> NnueResult<()> {
        check_hash(reader, Self::hash_value())?;
        read_leb128(reader, &mut self.biases)?;
        read_leb128(reader, &mut self.weights)?;
        read_leb128(reader, &mut self.psqt_weights)?;
        Ok(())
    }

    pub fn write_parameters<W: Write>(&self, writer: &mut W) -> NnueResult<()> {
        write_u32(writer, Self::hash_value())?;
        write_leb128(writer, &self.biases)?;
        write_leb128(writer, &self.weights)?;
        write_leb128(writer, &self.psqt_weights)?;
        Ok(())
    }

    /// 特徴量 `index` の重み行
    #[inline]
    pub fn weight_row(&self, index: usize) -> &[i16] {
        &self.weights[index * L1..(index + 1) * L1]
    }

    #[inline]
    pub fn weight_row_mut(&mut self, index: usize) -> &mut [i16] {
        &mut self.weights[index * L1..(index + 1) * L1]
    }

    /// 特徴量 `index` の PSQT 重み
    #[inline]
    pub fn psqt_row(&self, index: usize) -> &[i32] {
        &self.psqt_weights[index * PSQT_BUCKETS..(index + 1) * PSQT_BUCKETS]
    }

    #[inline]
    pub fn psqt_row_mut(&mut self, index: usize) -> &mut [i32] {
        &mut self.psqt_weights[index * PSQT_BUCKETS..(index + 1) * PSQT_BUCKETS]
    }

    #[inline]
    fn add_feature(&self, acc: &mut [i16], psqt: &mut [i32; PSQT_BUCKETS], index: usize) {
        for (a, &w) in acc.iter_mut().zip(self.weight_row(index)) {
            *a = a.wrapping_add(w);
        }
        for (p, &w) in psqt.iter_mut().zip(self.psqt_row(index)) {
            *p = p.wrapping_add(w);
        }
    }

    #[inline]
    fn sub_feature(&self, acc: &mut [i16], psqt: &mut [i32; PSQT_BUCKETS], index: usize) {
        for (a, &w) in acc.iter_mut().zip(self.weight_row(index)) {
            *a = a.wrapping_sub(w);
        }
        for (p, &w) in psqt.iter_mut().zip(self.psqt_row(index)) {
            *p = p.wrapping_sub(w);
        }
    }

    /// アキュムレータの 1 視点を全計算
    pub fn refresh_accumulator(
        &self,
        features: &HalfKAv2_hm,
        pos: &Position,
        perspective: Color,
        acc: &mut Accumulator<L1>,
    ) {
        let p = perspective.index();
        let mut active = IndexList::<MAX_ACTIVE_FEATURES>::new();
        features.append_active_indices(pos, perspective, &mut active);

        let accumulation = &mut acc.accumulation[p];
        let psqt = &mut acc.psqt_accumulation[p].0;
        accumulation.copy_from_slice(&self.biases);
        *psqt = [0; PSQT_BUCKETS];
        for &index in active.iter() {
            self.add_feature(accumulation, psqt, index);
        }
        acc.computed[p] = true;
    }

    /// 現在ノードのアキュムレータの 1 視点を計算済みにする
    ///
    /// 計算済みの祖先が見つかればそこから差分更新（途中のノードも計算済みになる）、
    /// 見つからなければ現在ノードだけを全計算する。
    pub fn update_accumulator(
        &self,
        features: &HalfKAv2_hm,
        pos: &Position,
        stack: &mut AccumulatorStack<L1>,
        perspective: Color,
    ) {
        let p = perspective.index();
        let current = stack.current_index();
        if stack.current().accumulator.computed[p] {
            return;
        }

        let source = stack.find_usable_accumulator(pos, perspective);
        if !stack.entry_at(source).accumulator.computed[p] {
            debug!("[NNUE] refresh {perspective:?} accumulator at ply {current}");
            self.refresh_accumulator(features, pos, perspective, &mut stack.current_mut().accumulator);
            return;
        }

        // 現在ノードから source まで previous をたどる（source は含まない）
        let mut path: SmallVec<[usize; 16]> = SmallVec::new();
        let mut idx = current;
        while idx != source {
            path.push(idx);
            match stack.entry_at(idx).previous {
                Some(prev) => idx = prev,
                None => break,
            }
        }

        // 途中で自玉は動いていないので現在の自玉位置がそのまま使える
        let ksq = pos.king_square(perspective);
        let mut from = source;
        for &to in path.iter().rev() {
            let (prev_entry, entry) = stack.pair_mut(from, to);

            let mut removed = IndexList::<MAX_CHANGED_FEATURES>::new();
            let mut added = IndexList::<MAX_CHANGED_FEATURES>::new();
            features.append_changed_indices(
                ksq,
                &entry.dirty_piece,
                perspective,
                &mut removed,
                &mut added,
            );

            let acc = &mut entry.accumulator;
            acc.copy_perspective_from(&prev_entry.accumulator, perspective);
            let accumulation = &mut acc.accumulation[p];
            let psqt = &mut acc.psqt_accumulation[p].0;
            for &index in removed.iter() {
                self.sub_feature(accumulation, psqt, index);
            }
            for &index in added.iter() {
                self.add_feature(accumulation, psqt, index);
            }
            acc.computed[p] = true;
            from = to;
        }
    }

    /// 両視点のアキュムレータを計算済みにしておく（評価値は計算しない）
    pub fn hint_common_access(
        &self,
        features: &HalfKAv2_hm,
        pos: &Position,
        stack: &mut AccumulatorStack<L1>,
    ) {
        for perspective in Color::ALL {
            self.update_accumulator(features, pos, stack, perspective);
        }
    }

    /// 変換: アキュムレータを更新し、L1 バイトの出力と PSQT 値を返す
    ///
    /// 出力は手番側 → 相手側の順に各 L1/2 バイト。
    /// `out[j] = clamp(acc[j], 0, 127) * clamp(acc[j + L1/2], 0, 127) / 128`
    pub fn transform(
        &self,
        features: &HalfKAv2_hm,
        pos: &Position,
        stack: &mut AccumulatorStack<L1>,
        output: &mut [u8],
        bucket: usize,
    ) -> i32 {
        debug_assert!(output.len() >= L1);
        self.hint_common_access(features, pos, stack);

        let stm = pos.side_to_move();
        let acc = &stack.current().accumulator;
        let psqt =
            ((acc.psqt(stm)[bucket] as i64 - acc.psqt(!stm)[bucket] as i64) / 2) as i32;

        let half = L1 / 2;
        for (p, perspective) in [stm, !stm].into_iter().enumerate() {
            let values = acc.get(perspective);
            let out = &mut output[p * half..(p + 1) * half];
            for (j, o) in out.iter_mut().enumerate() {
                let sum0 = values[j].clamp(0, 127) as u32;
                let sum1 = values[j + half].clamp(0, 127) as u32;
                *o = (sum0 * sum1 / 128) as u8;
            }
        }
        psqt
    }
}

impl<const L1: usize> Clone for FeatureTransformer<L1> {
    fn clone(&self) -> Self {
        Self {
            biases: self.biases.clone(),
            weights: self.weights.clone(),
            psqt_weights: self.psqt_weights.clone(),
        }
    }
}
