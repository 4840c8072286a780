//! NNUE特徴量モジュール
//!
//! 入力特徴量は HalfKAv2_hm の 1 種類のみ。big/small の両 tier で共有する。

mod half_ka_v2_hm;

pub use half_ka_v2_hm::{HalfKAv2_hm, PS_NB, king_bucket, make_index_not_cached, orient};
