//! NNUE（Efficiently Updatable Neural Network）評価関数
//!
//! アーキテクチャ: HalfKAv2_hm → L1×2 → (15 → 32 → 1) × 8 バケット
//!
//! - big tier: L1 = 2560
//! - small tier: L1 = 128
//!
//! 2 つの tier は L1 以外の構造を共有するので、ネットワーク関連の型は
//! すべて L1 を const generic に取る。

pub mod accumulator;
pub mod constants;
mod error;
mod feature_transformer;
pub mod features;
mod io;
pub mod layers;
pub mod leb128;
mod network;

pub use accumulator::{
    Accumulator, AccumulatorStack, Aligned, AlignedBox, IndexList, MAX_ACTIVE_FEATURES,
    MAX_CHANGED_FEATURES,
};
pub use constants::{BIG_L1, SMALL_L1};
pub use error::{NnueError, NnueResult};
pub use feature_transformer::FeatureTransformer;
pub use features::HalfKAv2_hm;
pub use network::{Network, NnueNetwork};

/// ネットワークの tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetSize {
    Big,
    Small,
}

impl NetSize {
    pub const ALL: [NetSize; 2] = [NetSize::Big, NetSize::Small];

    /// 既定の評価関数ファイル名
    pub const fn default_file_name(self) -> &'static str {
        match self {
            NetSize::Big => constants::DEFAULT_EVAL_FILE_BIG,
            NetSize::Small => constants::DEFAULT_EVAL_FILE_SMALL,
        }
    }

    /// 設定項目名
    pub const fn option_name(self) -> &'static str {
        match self {
            NetSize::Big => "EvalFile",
            NetSize::Small => "EvalFileSmall",
        }
    }
}

impl std::fmt::Display for NetSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetSize::Big => write!(f, "big"),
            NetSize::Small => write!(f, "small"),
        }
    }
}
