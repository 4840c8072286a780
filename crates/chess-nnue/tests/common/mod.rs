//! 統合テスト共通のヘルパー
//!
//! 小さな L1 のネットワークを乱数で作り、合法性を問わないランダムな指し手で
//! 局面を進める。

#![allow(dead_code)]

use chess_nnue::nnue::{FeatureTransformer, NnueNetwork};
use chess_nnue::position::Position;
use chess_nnue::types::{Color, Move, PieceType, Square};
use rand::Rng;
use rand::seq::IndexedRandom;
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;

pub const BIG: usize = 64;
pub const SMALL: usize = 32;

pub type TestContext = chess_nnue::EvaluatorContext<BIG, SMALL>;
pub type TestState = chess_nnue::EvalState<BIG, SMALL>;

pub fn rng(seed: u64) -> Xoshiro256PlusPlus {
    Xoshiro256PlusPlus::seed_from_u64(seed)
}

/// 全パラメータを小さな乱数で埋めたネットワーク
pub fn random_network<const L1: usize>(seed: u64) -> NnueNetwork<L1> {
    let mut rng = rng(seed);
    let mut net = NnueNetwork::<L1>::new_zeroed().unwrap();
    net.description = format!("random network {seed:#x}");

    let ft = &mut net.feature_transformer;
    for b in ft.biases.iter_mut() {
        *b = rng.random_range(-64..64);
    }
    for w in ft.weights.iter_mut() {
        *w = rng.random_range(-24..24);
    }
    for w in ft.psqt_weights.iter_mut() {
        *w = rng.random_range(-2000..2000);
    }
    assert_eq!(ft.weights.len(), L1 * FeatureTransformer::<L1>::INPUT_DIMENSIONS);

    for layer in net.networks.iter_mut() {
        for b in layer.fc_0.biases.iter_mut() {
            *b = rng.random_range(-4000..4000);
        }
        for w in layer.fc_0.weights.iter_mut() {
            *w = rng.random_range(-32..32);
        }
        for b in layer.fc_1.biases.iter_mut() {
            *b = rng.random_range(-4000..4000);
        }
        for w in layer.fc_1.weights.iter_mut() {
            *w = rng.random_range(-64..64);
        }
        for b in layer.fc_2.biases.iter_mut() {
            *b = rng.random_range(-4000..4000);
        }
        for w in layer.fc_2.weights.iter_mut() {
            *w = rng.random_range(-127..=127);
        }
    }
    net
}

/// 両 tier を乱数ネットワークにしたコンテキスト
pub fn random_context(seed: u64) -> TestContext {
    let mut ctx = TestContext::new(Default::default()).unwrap();
    *ctx.big_network_mut() = random_network::<BIG>(seed);
    *ctx.small_network_mut() = random_network::<SMALL>(seed ^ 0x5555);
    ctx
}

pub fn position(fen: &str) -> Position {
    let mut pos = Position::empty();
    pos.set_fen(fen).unwrap();
    pos
}

/// 手番側の駒をランダムに 1 つ選び、自駒と相手キング以外のマスへ動かす
///
/// 最終段に達したポーンはクイーンに成る。
pub fn random_move<R: Rng>(pos: &Position, rng: &mut R) -> Move {
    let us = pos.side_to_move();
    let movers: Vec<Square> = pos
        .pieces()
        .filter(|(_, pc)| pc.color() == us)
        .map(|(sq, _)| sq)
        .collect();

    loop {
        let from = *movers.choose(rng).unwrap();
        let to = Square::from_index(rng.random_range(0..Square::NUM)).unwrap();
        let target = pos.piece_on(to);
        if to == from
            || (!target.is_none() && target.color() == us)
            || target.piece_type() == Some(PieceType::King)
        {
            continue;
        }

        let pt = pos.piece_on(from).piece_type();
        if pt == Some(PieceType::Pawn) && to.relative_rank(us) == 7 {
            return Move::promotion(from, to, PieceType::Queen);
        }
        return Move::normal(from, to);
    }
}

/// 白視点に直す
pub fn white_pov(pos: &Position, v: chess_nnue::Value) -> i32 {
    if pos.side_to_move() == Color::White { v.raw() } else { -v.raw() }
}
