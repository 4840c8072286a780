//! ネットワークファイルの読み書き

mod common;

use std::fs::File;
use std::io::{BufReader, Cursor};

use chess_nnue::nnue::{NetSize, NnueError, NnueNetwork};
use chess_nnue::position::Position;
use common::{BIG, SMALL, TestContext, TestState, random_context, random_network};

fn serialize<const L1: usize>(net: &NnueNetwork<L1>) -> Vec<u8> {
    let mut buf = Vec::new();
    net.write(&mut buf).unwrap();
    buf
}

#[test]
fn test_header_layout() {
    let net = random_network::<SMALL>(1);
    let buf = serialize(&net);

    assert_eq!(&buf[0..4], &0x7AF3_2F20u32.to_le_bytes());
    assert_eq!(&buf[4..8], &NnueNetwork::<SMALL>::hash_value().to_le_bytes());
    let desc_len = u32::from_le_bytes(buf[8..12].try_into().unwrap()) as usize;
    assert_eq!(&buf[12..12 + desc_len], net.description.as_bytes());
    // 特徴量変換のハッシュの直後に LEB128 ブロックが続く
    let ft_hash = u32::from_le_bytes(buf[12 + desc_len..16 + desc_len].try_into().unwrap());
    assert_eq!(ft_hash, 0x7f23_4cb8 ^ (SMALL as u32 * 2));
    assert_eq!(&buf[16 + desc_len..33 + desc_len], b"COMPRESSED_LEB128");
}

#[test]
fn test_roundtrip_preserves_evaluation() {
    let net = random_network::<BIG>(42);
    let buf = serialize(&net);
    let loaded = NnueNetwork::<BIG>::read(&mut Cursor::new(&buf)).unwrap();
    assert_eq!(serialize(&loaded), buf);

    let mut ctx = TestContext::new(Default::default()).unwrap();
    *ctx.big_network_mut() = net;
    let mut pos = Position::startpos();
    let m = pos.parse_uci_move("d2d4").unwrap();
    pos.do_move(m);
    let mut state = TestState::with_capacity(1);
    let before = ctx.evaluate_net(NetSize::Big, &pos, &mut state, false);

    *ctx.big_network_mut() = loaded;
    let mut state = TestState::with_capacity(1);
    assert_eq!(ctx.evaluate_net(NetSize::Big, &pos, &mut state, false), before);
}

#[test]
fn test_rejections() {
    let buf = serialize(&random_network::<SMALL>(2));

    // バージョン
    let mut bad = buf.clone();
    bad[0] ^= 1;
    assert!(matches!(
        NnueNetwork::<SMALL>::read(&mut Cursor::new(&bad)),
        Err(NnueError::Format(_))
    ));

    // ネットワーク全体のハッシュ
    let mut bad = buf.clone();
    bad[4] ^= 1;
    assert!(matches!(
        NnueNetwork::<SMALL>::read(&mut Cursor::new(&bad)),
        Err(NnueError::HashMismatch { .. })
    ));

    // 別 tier のファイル
    assert!(matches!(
        NnueNetwork::<BIG>::read(&mut Cursor::new(&buf)),
        Err(NnueError::HashMismatch { .. })
    ));

    // 途中で切れている
    for cut in [3, 11, 40, buf.len() / 2, buf.len() - 1] {
        assert!(
            matches!(NnueNetwork::<SMALL>::read(&mut Cursor::new(&buf[..cut])), Err(NnueError::Truncated)),
            "cut at {cut}"
        );
    }

    // 末尾に余分なデータ
    let mut bad = buf.clone();
    bad.extend_from_slice(b"extra");
    assert!(matches!(
        NnueNetwork::<SMALL>::read(&mut Cursor::new(&bad)),
        Err(NnueError::Format(_))
    ));
}

#[test]
fn test_leb128_block_size_mismatch() {
    let net = random_network::<SMALL>(3);
    let mut buf = serialize(&net);
    let desc_len = u32::from_le_bytes(buf[8..12].try_into().unwrap()) as usize;
    // 最初の LEB128 ブロック（バイアス）の宣言バイト数を 1 増やす
    let len_at = 16 + desc_len + 17;
    let declared = u32::from_le_bytes(buf[len_at..len_at + 4].try_into().unwrap());
    buf[len_at..len_at + 4].copy_from_slice(&(declared + 1).to_le_bytes());
    assert!(matches!(
        NnueNetwork::<SMALL>::read(&mut Cursor::new(&buf)),
        Err(NnueError::Format(_))
    ));
}

#[test]
fn test_context_save_and_reload_file() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("small-src.nnue");
    std::fs::write(&src, serialize(&random_network::<SMALL>(4))).unwrap();

    let mut ctx = TestContext::new(Default::default()).unwrap();
    let mut reader = BufReader::new(File::open(&src).unwrap());
    ctx.load("small-src.nnue", &mut reader, NetSize::Small).unwrap();
    assert_eq!(ctx.loaded_file(NetSize::Small), Some("small-src.nnue"));

    let out = dir.path().join("small-out.nnue");
    let written = ctx.save_file(Some(&out), NetSize::Small).unwrap();
    assert_eq!(written, out);
    assert_eq!(std::fs::read(&out).unwrap(), std::fs::read(&src).unwrap());

    // 既定名でないネットワークはファイル名なしでは保存できない
    assert!(matches!(ctx.save_file(None, NetSize::Small), Err(NnueError::Config(_))));
}

#[test]
fn test_init_searches_network_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = chess_nnue::EvalConfig {
        eval_file_big: "big-test.nnue".to_string(),
        eval_file_small: "small-test.nnue".to_string(),
        network_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    let ctx_src = random_context(5);
    std::fs::write(dir.path().join("big-test.nnue"), serialize(ctx_src.big_network())).unwrap();
    std::fs::write(dir.path().join("small-test.nnue"), serialize(ctx_src.small_network()))
        .unwrap();

    let mut ctx = TestContext::new(config).unwrap();
    ctx.init();
    ctx.verify().unwrap();
    assert_eq!(ctx.loaded_file(NetSize::Big), Some("big-test.nnue"));
    assert_eq!(ctx.description(NetSize::Small), ctx_src.small_network().description);
}

#[test]
fn test_init_skips_corrupt_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let config = chess_nnue::EvalConfig {
        eval_file_small: "corrupt.nnue".to_string(),
        network_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    std::fs::write(dir.path().join("corrupt.nnue"), b"not a network").unwrap();

    let mut ctx = TestContext::new(config).unwrap();
    ctx.init();
    assert_eq!(ctx.loaded_file(NetSize::Small), None);
    assert!(matches!(
        ctx.verify(),
        Err(NnueError::NetworkNotLoaded { tier: NetSize::Big, .. })
    ));
}
