//! プロパティテスト（LEB128・クランプ・差分更新）

mod common;

use std::io::Cursor;

use chess_nnue::nnue::NetSize;
use chess_nnue::nnue::leb128::{decode_signed_leb128, encode_signed_leb128, read_leb128, write_leb128};
use chess_nnue::position::Position;
use chess_nnue::types::Value;
use common::{TestState, random_context, random_move};
use proptest::prelude::*;
use rand_xoshiro::rand_core::SeedableRng;

proptest! {
    #[test]
    fn prop_leb128_i16_roundtrip(v in any::<i16>()) {
        let mut buf = Vec::new();
        encode_signed_leb128(v as i64, &mut buf);
        prop_assert!(buf.len() <= 3);
        let mut pos = 0;
        prop_assert_eq!(decode_signed_leb128::<i16>(&buf, &mut pos).unwrap(), v);
        prop_assert_eq!(pos, buf.len());
    }

    #[test]
    fn prop_leb128_i32_roundtrip(v in any::<i32>()) {
        let mut buf = Vec::new();
        encode_signed_leb128(v as i64, &mut buf);
        prop_assert!(buf.len() <= 5);
        let mut pos = 0;
        prop_assert_eq!(decode_signed_leb128::<i32>(&buf, &mut pos).unwrap(), v);
        prop_assert_eq!(pos, buf.len());
    }

    #[test]
    fn prop_leb128_block_roundtrip(values in prop::collection::vec(any::<i32>(), 0..200)) {
        let mut buf = Vec::new();
        write_leb128(&mut buf, &values).unwrap();
        let mut out = vec![0i32; values.len()];
        read_leb128(&mut Cursor::new(&buf), &mut out).unwrap();
        prop_assert_eq!(out, values);
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 16, .. ProptestConfig::default() })]

    /// 乱数ネットワーク・乱数局面でも評価値はテーブルベース帯の手前に収まる
    #[test]
    fn prop_evaluate_within_bounds(seed in any::<u64>(), plies in 0usize..40, rule50 in 0i32..100) {
        let ctx = random_context(seed);
        let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut pos = Position::startpos();
        let mut state = TestState::new();
        state.set_optimism(pos.side_to_move(), Value::new((seed % 200) as i32 - 100));

        for _ in 0..plies {
            let m = random_move(&pos, &mut rng);
            let dirty = pos.do_move(m);
            state.push(dirty);
        }
        pos.set_rule50(rule50);

        let v = ctx.evaluate(&pos, &mut state);
        prop_assert!(v > Value::TB_LOSS_IN_MAX_PLY);
        prop_assert!(v < Value::TB_WIN_IN_MAX_PLY);

        // 差分更新した値と新しいスタックの値が一致する
        let inc = ctx.evaluate_net(NetSize::Small, &pos, &mut state, true);
        let mut fresh = TestState::with_capacity(1);
        prop_assert_eq!(inc, ctx.evaluate_net(NetSize::Small, &pos, &mut fresh, true));
    }
}
