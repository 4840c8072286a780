//! 評価関数の窓口
//!
//! [`EvaluatorContext`] は起動時に作成し、全探索スレッドから共有参照される。
//! 重みの再読み込みは `&mut self` を取るので、探索中には行えない。
//!
//! 探索スレッドごとの状態（アキュムレータスタックと optimism）は
//! [`EvalState`] が持つ。

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use super::config::{EvalConfig, EvalOptions};
use crate::nnue::constants::{
    HINT_SMALL_NET_THRESHOLD, LAZY_THRESHOLD, NETWORK_DOWNLOAD_URL, OUTPUT_SCALE,
    SMALL_NET_THRESHOLD,
};
use crate::nnue::{
    AccumulatorStack, BIG_L1, HalfKAv2_hm, NetSize, NnueError, NnueNetwork, NnueResult, SMALL_L1,
};
use crate::position::{DirtyPiece, Position};
use crate::types::{Color, PieceType, Value};

/// 埋め込みネットワークを表す候補名
pub const INTERNAL_SOURCE: &str = "<internal>";

/// adjusted 評価で PSQT と positional の重みをずらす量
const STRATEGY_DELTA: i64 = 24;

// =============================================================================
// EvalState（探索スレッドごと）
// =============================================================================

/// 探索スレッドごとの評価状態
///
/// `Position::do_move` の直後に [`push`](Self::push)、`undo_move` の直後に
/// [`pop`](Self::pop) を呼ぶ。ルート局面を設定し直したら [`reset`](Self::reset)。
pub struct EvalState<const BIG: usize = { BIG_L1 }, const SMALL: usize = { SMALL_L1 }> {
    pub(crate) big: AccumulatorStack<BIG>,
    pub(crate) small: AccumulatorStack<SMALL>,
    /// 手番別の optimism（探索側が設定する）
    pub optimism: [Value; Color::NUM],
}

impl<const BIG: usize, const SMALL: usize> EvalState<BIG, SMALL> {
    pub fn new() -> Self {
        Self {
            big: AccumulatorStack::new(),
            small: AccumulatorStack::new(),
            optimism: [Value::ZERO; Color::NUM],
        }
    }

    /// 事前確保数を指定して作成（トレースやテスト用の小さな状態）
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            big: AccumulatorStack::with_capacity(capacity),
            small: AccumulatorStack::with_capacity(capacity),
            optimism: [Value::ZERO; Color::NUM],
        }
    }

    #[inline]
    pub fn push(&mut self, dirty_piece: DirtyPiece) {
        self.big.push(dirty_piece);
        self.small.push(dirty_piece);
    }

    #[inline]
    pub fn pop(&mut self) {
        self.big.pop();
        self.small.pop();
    }

    /// 全アキュムレータを未計算に戻す
    pub fn reset(&mut self) {
        self.big.reset();
        self.small.reset();
    }

    #[inline]
    pub fn set_optimism(&mut self, color: Color, value: Value) {
        self.optimism[color.index()] = value;
    }

    /// big tier のスタック
    #[inline]
    pub fn big_stack(&self) -> &AccumulatorStack<BIG> {
        &self.big
    }

    /// small tier のスタック
    #[inline]
    pub fn small_stack(&self) -> &AccumulatorStack<SMALL> {
        &self.small
    }
}

impl<const BIG: usize, const SMALL: usize> Default for EvalState<BIG, SMALL> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// EvaluatorContext（プロセス共有）
// =============================================================================

/// 1 tier 分の読み込み状態
struct TierSlot<const L1: usize> {
    network: Box<NnueNetwork<L1>>,
    /// 読み込みに成功したファイル名
    file_name: Option<String>,
    embedded: Option<&'static [u8]>,
}

impl<const L1: usize> TierSlot<L1> {
    fn new() -> NnueResult<Self> {
        Ok(Self { network: Box::new(NnueNetwork::new_zeroed()?), file_name: None, embedded: None })
    }
}

/// 評価関数本体
///
/// 特徴量テーブル、2 tier 分の重み、評価オプションを保持する。
/// 評価は `&self` のみで行うため、`Arc` で全探索スレッドと共有できる。
pub struct EvaluatorContext<const BIG: usize = { BIG_L1 }, const SMALL: usize = { SMALL_L1 }> {
    features: HalfKAv2_hm,
    big: TierSlot<BIG>,
    small: TierSlot<SMALL>,
    options: EvalOptions,
    config: EvalConfig,
}

impl<const BIG: usize, const SMALL: usize> EvaluatorContext<BIG, SMALL> {
    /// 特徴量テーブルを構築し、ゼロ重みの未読み込み状態で作成
    pub fn new(config: EvalConfig) -> NnueResult<Self> {
        let options = config.options()?;
        Ok(Self {
            features: HalfKAv2_hm::init(),
            big: TierSlot::new()?,
            small: TierSlot::new()?,
            options,
            config,
        })
    }

    #[inline]
    pub fn features(&self) -> &HalfKAv2_hm {
        &self.features
    }

    #[inline]
    pub fn options(&self) -> EvalOptions {
        self.options
    }

    pub fn set_options(&mut self, options: EvalOptions) {
        self.options = options;
    }

    #[inline]
    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// 設定を差し替える（重みは [`init`](Self::init) で読み直す）
    pub fn set_config(&mut self, config: EvalConfig) -> NnueResult<()> {
        self.options = config.options()?;
        self.config = config;
        Ok(())
    }

    /// 既定ネットワークのバイト列を `<internal>` 候補として登録
    pub fn register_embedded(&mut self, tier: NetSize, bytes: &'static [u8]) {
        match tier {
            NetSize::Big => self.big.embedded = Some(bytes),
            NetSize::Small => self.small.embedded = Some(bytes),
        }
    }

    /// 読み込みに成功したファイル名
    pub fn loaded_file(&self, tier: NetSize) -> Option<&str> {
        match tier {
            NetSize::Big => self.big.file_name.as_deref(),
            NetSize::Small => self.small.file_name.as_deref(),
        }
    }

    /// ネットワークの説明文字列
    pub fn description(&self, tier: NetSize) -> &str {
        match tier {
            NetSize::Big => &self.big.network.description,
            NetSize::Small => &self.small.network.description,
        }
    }

    #[inline]
    pub fn big_network(&self) -> &NnueNetwork<BIG> {
        &self.big.network
    }

    #[inline]
    pub fn small_network(&self) -> &NnueNetwork<SMALL> {
        &self.small.network
    }

    /// big tier の重みを直接編集する（テストネットワーク作成用）
    pub fn big_network_mut(&mut self) -> &mut NnueNetwork<BIG> {
        &mut self.big.network
    }

    /// small tier の重みを直接編集する（テストネットワーク作成用）
    pub fn small_network_mut(&mut self) -> &mut NnueNetwork<SMALL> {
        &mut self.small.network
    }

    // =========================================================================
    // 読み込み・保存
    // =========================================================================

    /// ストリームから tier の重みを読み込む
    ///
    /// 成功した場合のみ差し替える。失敗時は以前の重みとファイル名が残る。
    pub fn load<R: Read>(&mut self, name: &str, reader: &mut R, tier: NetSize) -> NnueResult<()> {
        match tier {
            NetSize::Big => install(&mut self.big, name, NnueNetwork::read(reader), tier),
            NetSize::Small => install(&mut self.small, name, NnueNetwork::read(reader), tier),
        }
    }

    /// ファイルから読み込む（記録されるファイル名は `name`）
    fn load_path(&mut self, name: &str, path: &Path, tier: NetSize) -> NnueResult<()> {
        let file = File::open(path)?;
        self.load(name, &mut BufReader::new(file), tier)
    }

    /// 起動時の読み込み
    ///
    /// tier ごとに `<internal>`（既定名のときのみ）、作業ディレクトリ、実行ファイルの
    /// ディレクトリ、設定のディレクトリの順に試し、最初に成功したものを使う。
    /// 既に同名で読み込み済みの tier は読み直さない。
    pub fn init(&mut self) {
        for tier in NetSize::ALL {
            let eval_file = self.config.eval_file(tier).to_string();
            if self.loaded_file(tier) == Some(eval_file.as_str()) {
                continue;
            }

            for source in self.candidate_sources(tier, &eval_file) {
                let result = match &source {
                    None => self.load_embedded(tier, &eval_file),
                    Some(path) => self.load_path(&eval_file, path, tier),
                };
                match result {
                    Ok(()) => break,
                    Err(e) => {
                        let shown = source
                            .as_ref()
                            .map_or(INTERNAL_SOURCE.to_string(), |p| p.display().to_string());
                        warn!("[NNUE Load] {tier} net candidate {shown} failed: {e}");
                    }
                }
            }
        }
    }

    /// 候補の一覧（None は埋め込み）
    fn candidate_sources(&self, tier: NetSize, eval_file: &str) -> Vec<Option<PathBuf>> {
        let mut sources = Vec::new();
        let has_embedded = match tier {
            NetSize::Big => self.big.embedded.is_some(),
            NetSize::Small => self.small.embedded.is_some(),
        };
        if has_embedded && eval_file == tier.default_file_name() {
            sources.push(None);
        }
        sources.push(Some(PathBuf::from(eval_file)));
        if let Some(dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
            sources.push(Some(dir.join(eval_file)));
        }
        if let Some(dir) = &self.config.network_dir {
            sources.push(Some(dir.join(eval_file)));
        }
        sources
    }

    fn load_embedded(&mut self, tier: NetSize, name: &str) -> NnueResult<()> {
        let bytes = match tier {
            NetSize::Big => self.big.embedded,
            NetSize::Small => self.small.embedded,
        };
        let bytes = bytes.ok_or_else(|| NnueError::NetworkNotLoaded {
            tier,
            file: INTERNAL_SOURCE.to_string(),
        })?;
        self.load(name, &mut Cursor::new(bytes), tier)
    }

    /// 設定どおりのネットワークが読み込まれているか確認
    ///
    /// 読み込まれていない tier があれば診断を `error!` で出し、エラーを返す。
    pub fn verify(&self) -> NnueResult<()> {
        for tier in NetSize::ALL {
            let eval_file = self.config.eval_file(tier);
            if self.loaded_file(tier) != Some(eval_file) {
                error!(
                    "ERROR: Network evaluation parameters compatible with the engine must be available."
                );
                error!("ERROR: The network file {eval_file} was not loaded successfully.");
                error!(
                    "ERROR: The option {} might need to specify the full path, including the directory name, to the network file.",
                    tier.option_name()
                );
                error!(
                    "ERROR: The default net can be downloaded from: {NETWORK_DOWNLOAD_URL}{}",
                    tier.default_file_name()
                );
                error!("ERROR: The engine will be terminated now.");
                return Err(NnueError::NetworkNotLoaded { tier, file: eval_file.to_string() });
            }
            info!("NNUE evaluation using {eval_file} ({tier})");
        }
        Ok(())
    }

    /// [`verify`](Self::verify) に失敗したらプロセスを終了する
    pub fn verify_or_exit(&self) {
        if self.verify().is_err() {
            std::process::exit(1);
        }
    }

    /// ストリームへ書き出す（読み込み済みの tier のみ）
    pub fn save<W: Write>(&self, writer: &mut W, tier: NetSize) -> NnueResult<()> {
        let file = self.loaded_file(tier).ok_or_else(|| NnueError::NetworkNotLoaded {
            tier,
            file: self.config.eval_file(tier).to_string(),
        })?;
        debug!("[NNUE Save] writing {tier} net {file}");
        match tier {
            NetSize::Big => self.big.network.write(writer),
            NetSize::Small => self.small.network.write(writer),
        }
    }

    /// ファイルへ書き出し、書き出したパスを返す
    ///
    /// `path` を省略できるのは既定（埋め込み）ネットワークの場合のみ。
    pub fn save_file(&self, path: Option<&Path>, tier: NetSize) -> NnueResult<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                if self.loaded_file(tier) != Some(tier.default_file_name()) {
                    warn!("Failed to export a net: a non-embedded net can only be saved if the filename is specified");
                    return Err(NnueError::Config(
                        "a non-embedded net can only be saved if the filename is specified"
                            .to_string(),
                    ));
                }
                PathBuf::from(tier.default_file_name())
            }
        };

        let mut writer = BufWriter::new(File::create(&path)?);
        match self.save(&mut writer, tier) {
            Ok(()) => {
                info!("Network saved successfully to {}", path.display());
                Ok(path)
            }
            Err(e) => {
                warn!("Failed to export a net: {e}");
                Err(e)
            }
        }
    }

    // =========================================================================
    // 評価
    // =========================================================================

    /// tier 単体の評価値と complexity（手番側から見た値）
    ///
    /// `adjusted` なら戦略ノブで PSQT/positional の重みを補正する。
    pub fn evaluate_net(
        &self,
        tier: NetSize,
        pos: &Position,
        state: &mut EvalState<BIG, SMALL>,
        adjusted: bool,
    ) -> (Value, i32) {
        let (psqt, positional) = match tier {
            NetSize::Big => self.big.network.evaluate(&self.features, pos, &mut state.big),
            NetSize::Small => self.small.network.evaluate(&self.features, pos, &mut state.small),
        };
        let complexity = ((psqt as i64 - positional as i64).abs() / OUTPUT_SCALE as i64) as i32;

        let value = if adjusted {
            let m = 1024 - STRATEGY_DELTA + self.options.materialistic as i64;
            let p = 1024 + STRATEGY_DELTA + self.options.positional as i64;
            (m * psqt as i64 + p * positional as i64) / (1024 * OUTPUT_SCALE as i64)
        } else {
            (psqt as i64 + positional as i64) / OUTPUT_SCALE as i64
        };
        (Value::new(value as i32), complexity)
    }

    /// 静的評価値（手番側から見た値）
    ///
    /// 駒割りの差が大きければネットワークを使わずに駒割りを返す。
    /// どちらの場合も 50 手カウンタで減衰させ、テーブルベース帯の手前にクランプする。
    pub fn evaluate(&self, pos: &Position, state: &mut EvalState<BIG, SMALL>) -> Value {
        let stm = pos.side_to_move();
        let simple = pos.simple_eval().raw();

        let v = if simple.abs() > LAZY_THRESHOLD {
            simple
        } else {
            let tier =
                if simple.abs() > SMALL_NET_THRESHOLD { NetSize::Small } else { NetSize::Big };
            let (nnue, complexity) = self.evaluate_net(tier, pos, state, true);
            blend(
                nnue.raw(),
                state.optimism[stm.index()].raw(),
                complexity,
                simple,
                pos.non_pawn_material(),
                pos.count_type(PieceType::Pawn),
            )
        };

        damp_and_clamp(v, pos.rule50_count())
    }

    /// 兄弟局面で共有される祖先のアキュムレータを事前に計算しておく
    pub fn hint_common_parent_position(&self, pos: &Position, state: &mut EvalState<BIG, SMALL>) {
        if pos.simple_eval().raw().abs() > HINT_SMALL_NET_THRESHOLD {
            self.small.network.hint_common_access(&self.features, pos, &mut state.small);
        } else {
            self.big.network.hint_common_access(&self.features, pos, &mut state.big);
        }
    }
}

/// 読み込み結果を tier に反映
fn install<const L1: usize>(
    slot: &mut TierSlot<L1>,
    name: &str,
    result: NnueResult<NnueNetwork<L1>>,
    tier: NetSize,
) -> NnueResult<()> {
    match result {
        Ok(network) => {
            info!("[NNUE Load] {tier} net loaded: {name} ({})", network.description);
            slot.network = Box::new(network);
            slot.file_name = Some(name.to_string());
            Ok(())
        }
        Err(e) => {
            warn!("[NNUE Load] failed to load {tier} net {name}: {e}");
            Err(e)
        }
    }
}

/// optimism・complexity・駒割りとのずれを使ってネットワーク値を混ぜる
pub(crate) fn blend(
    nnue: i32,
    optimism: i32,
    complexity: i32,
    simple: i32,
    non_pawn_material: i32,
    pawn_count: i32,
) -> i32 {
    let nnue = nnue as i64;
    let optimism = optimism as i64;
    let spread = complexity as i64 + (simple as i64 - nnue).abs();

    let optimism = optimism + optimism * spread / 512;
    let nnue = nnue - nnue * spread / 32768;

    let npm = non_pawn_material as i64 / 64;
    ((nnue * (915 + npm + 9 * pawn_count as i64) + optimism * (154 + npm)) / 1024) as i32
}

/// 50 手カウンタによる減衰とテーブルベース帯手前へのクランプ
pub(crate) fn damp_and_clamp(v: i32, rule50: i32) -> Value {
    let damped = v as i64 * (200 - rule50 as i64) / 214;
    let lo = Value::TB_LOSS_IN_MAX_PLY.raw() as i64 + 1;
    let hi = Value::TB_WIN_IN_MAX_PLY.raw() as i64 - 1;
    Value::new(damped.clamp(lo, hi) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    type SmallContext = EvaluatorContext<64, 32>;

    #[test]
    fn test_blend_neutral() {
        // optimism 0、spread 0: v = nnue * (915 + npm + 9 * pawns) / 1024
        assert_eq!(blend(100, 0, 0, 100, 0, 0), 100 * 915 / 1024);
        // npm 6400 → 100, pawns 16 → 144
        assert_eq!(blend(100, 0, 0, 100, 6400, 16), 100 * (915 + 100 + 144) / 1024);
    }

    #[test]
    fn test_blend_uses_pre_update_nnue() {
        // spread = 50 + |0 - 1000| = 1050
        // optimism = 20 + 20 * 1050 / 512 = 61
        // nnue = 1000 - 1000 * 1050 / 32768 = 968
        let expected = (968 * 915 + 61 * 154) / 1024;
        assert_eq!(blend(1000, 20, 50, 0, 0, 0), expected);
    }

    #[test]
    fn test_damp_and_clamp() {
        assert_eq!(damp_and_clamp(214, 0).raw(), 200);
        assert_eq!(damp_and_clamp(214, 100).raw(), 100);
        assert_eq!(damp_and_clamp(-214, 14).raw(), -186);
        assert_eq!(damp_and_clamp(100_000, 0), Value::new(Value::TB_WIN_IN_MAX_PLY.raw() - 1));
        assert_eq!(damp_and_clamp(-100_000, 0), Value::new(-31506));
    }

    #[test]
    fn test_verify_reports_unloaded() {
        let ctx = SmallContext::new(EvalConfig::default()).unwrap();
        let r = ctx.verify();
        assert!(matches!(r, Err(NnueError::NetworkNotLoaded { tier: NetSize::Big, .. })));
    }

    #[test]
    fn test_load_failure_keeps_previous() {
        let mut ctx = SmallContext::new(EvalConfig::default()).unwrap();
        ctx.big_network_mut().description = "first".to_string();
        let mut bytes = Vec::new();
        ctx.big_network().write(&mut bytes).unwrap();
        ctx.load("first.nnue", &mut Cursor::new(&bytes), NetSize::Big).unwrap();

        let mut garbage = Cursor::new(vec![1u8, 2, 3]);
        assert!(ctx.load("second.nnue", &mut garbage, NetSize::Big).is_err());
        assert_eq!(ctx.loaded_file(NetSize::Big), Some("first.nnue"));
        assert_eq!(ctx.description(NetSize::Big), "first");
    }

    #[test]
    fn test_init_prefers_embedded_default() {
        let mut ctx = SmallContext::new(EvalConfig::default()).unwrap();
        ctx.small_network_mut().description = "embedded small".to_string();
        let mut bytes = Vec::new();
        ctx.small_network().write(&mut bytes).unwrap();
        ctx.register_embedded(NetSize::Small, Box::leak(bytes.into_boxed_slice()));

        ctx.init();
        assert_eq!(ctx.loaded_file(NetSize::Small), Some(NetSize::Small.default_file_name()));
        assert_eq!(ctx.loaded_file(NetSize::Big), None);
        assert!(ctx.verify().is_err());
    }

    #[test]
    fn test_save_requires_loaded_net() {
        let ctx = SmallContext::new(EvalConfig::default()).unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            ctx.save(&mut out, NetSize::Small),
            Err(NnueError::NetworkNotLoaded { tier: NetSize::Small, .. })
        ));
        assert!(ctx.save_file(None, NetSize::Big).is_err());
    }

    #[test]
    fn test_eval_state_push_pop() {
        let mut state = EvalState::<64, 32>::with_capacity(2);
        state.push(DirtyPiece::new());
        state.push(DirtyPiece::new());
        assert_eq!(state.big_stack().current_index(), 2);
        assert_eq!(state.small_stack().current_index(), 2);
        state.pop();
        assert_eq!(state.big_stack().current_index(), 1);
        state.reset();
        assert_eq!(state.small_stack().current_index(), 0);
    }
}
