//! 評価関数の設定
//!
//! TOML ファイルから読み込める。未指定の項目は既定値になる。
//!
//! ```toml
//! eval_file_big = "nn-0000000000a0.nnue"
//! eval_file_small = "nn-ecb35f70ff2a.nnue"
//! materialistic_strategy = 0
//! positional_strategy = 0
//! network_dir = "/usr/share/nnue"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::nnue::{NetSize, NnueError, NnueResult};

/// 戦略ノブの範囲
pub const STRATEGY_MIN: i32 = -12;
pub const STRATEGY_MAX: i32 = 12;

/// 評価関数の設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// big tier のファイル名
    pub eval_file_big: String,
    /// small tier のファイル名
    pub eval_file_small: String,
    /// 駒割り（PSQT）側の重み補正
    pub materialistic_strategy: i32,
    /// 局面評価（positional）側の重み補正
    pub positional_strategy: i32,
    /// 追加の探索ディレクトリ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_dir: Option<PathBuf>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            eval_file_big: NetSize::Big.default_file_name().to_string(),
            eval_file_small: NetSize::Small.default_file_name().to_string(),
            materialistic_strategy: 0,
            positional_strategy: 0,
            network_dir: None,
        }
    }
}

impl EvalConfig {
    pub fn from_toml_str(s: &str) -> NnueResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| NnueError::Config(e.to_string()))?;
        config.options()?;
        Ok(config)
    }

    /// TOML ファイルから読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> NnueResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> NnueResult<String> {
        toml::to_string(self).map_err(|e| NnueError::Config(e.to_string()))
    }

    /// tier ごとのファイル名（空なら既定名）
    pub fn eval_file(&self, tier: NetSize) -> &str {
        let name = match tier {
            NetSize::Big => &self.eval_file_big,
            NetSize::Small => &self.eval_file_small,
        };
        if name.is_empty() { tier.default_file_name() } else { name }
    }

    /// 範囲検証済みの評価オプション
    pub fn options(&self) -> NnueResult<EvalOptions> {
        EvalOptions::new(self.materialistic_strategy, self.positional_strategy)
    }
}

/// 評価中に参照するオプション（10 倍済み）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalOptions {
    pub materialistic: i32,
    pub positional: i32,
}

impl EvalOptions {
    /// 両ノブを [-12, 12] で検証して作成
    pub fn new(materialistic: i32, positional: i32) -> NnueResult<Self> {
        let check = |name: &'static str, v: i32| {
            if (STRATEGY_MIN..=STRATEGY_MAX).contains(&v) {
                Ok(v * 10)
            } else {
                Err(NnueError::InvalidOption { name, value: v as i64 })
            }
        };
        Ok(Self {
            materialistic: check("Materialistic Evaluation Strategy", materialistic)?,
            positional: check("Positional Evaluation Strategy", positional)?,
        })
    }
}
