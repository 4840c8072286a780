//! LEB128（Little Endian Base 128）圧縮ブロック
//!
//! nnue-pytorch の圧縮形式で使用される可変長整数エンコーディング。
//!
//! ブロック形式:
//! - マジック文字列 `COMPRESSED_LEB128`（17 バイト）
//! - 後続バイト数（u32 LE）
//! - 値ごとの符号付き LEB128

use std::io::{Read, Write};

use super::constants::LEB128_MAGIC;
use super::error::{NnueError, NnueResult};

/// LEB128 で圧縮する整数型
pub trait LebInt: Copy + Default {
    /// ビット幅
    const BITS: u32;

    /// i64 からの切り詰め変換
    fn from_i64(v: i64) -> Self;

    fn to_i64(self) -> i64;
}

macro_rules! impl_leb_int {
    ($($t:ty),*) => {
        $(
            impl LebInt for $t {
                const BITS: u32 = <$t>::BITS;

                #[inline]
                fn from_i64(v: i64) -> Self {
                    v as $t
                }

                #[inline]
                fn to_i64(self) -> i64 {
                    self as i64
                }
            }
        )*
    };
}

impl_leb_int!(i8, i16, i32);

/// 符号付き LEB128 を 1 値エンコードして `out` に追加
///
/// 最小バイト数で出力する（最終バイトの 0x40 が符号ビットと一致した時点で止める）。
pub fn encode_signed_leb128(mut value: i64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = if byte & 0x40 == 0 { value == 0 } else { value == -1 };
        if done {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

/// `buf[*pos..]` から符号付き LEB128 を 1 値デコード
///
/// 符号拡張は `T` のビット幅で行う。継続フラグが `T` の幅を超えて続く場合は
/// 不正な形式として扱う。
pub fn decode_signed_leb128<T: LebInt>(buf: &[u8], pos: &mut usize) -> NnueResult<T> {
    let mut result: i64 = 0;
    let mut shift = 0u32;

    loop {
        let b = *buf.get(*pos).ok_or(NnueError::Truncated)?;
        *pos += 1;

        // 下位7ビットを結果に追加
        result |= ((b & 0x7f) as i64) << shift;
        shift += 7;

        // 継続フラグが0なら終了
        if b & 0x80 == 0 {
            // 符号拡張（最後のバイトの6ビット目が符号ビット）
            if shift < T::BITS && (b & 0x40) != 0 {
                result |= !0i64 << shift;
            }
            return Ok(T::from_i64(result));
        }

        if shift >= T::BITS {
            return Err(NnueError::Format(format!(
                "LEB128 value exceeds {} bits",
                T::BITS
            )));
        }
    }
}

/// 圧縮ブロックを読み込み、`out` を埋める
///
/// マジック不一致は Format、宣言バイト数に満たないストリームは Truncated、
/// 宣言バイト数を使い切らない場合は Format を返す。
pub fn read_leb128<R: Read, T: LebInt>(reader: &mut R, out: &mut [T]) -> NnueResult<()> {
    let mut magic = [0u8; LEB128_MAGIC.len()];
    reader.read_exact(&mut magic)?;
    if &magic != LEB128_MAGIC {
        return Err(NnueError::Format("missing COMPRESSED_LEB128 magic".to_string()));
    }

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let bytes_left = u32::from_le_bytes(len_buf) as u64;

    let mut buf = Vec::new();
    reader.by_ref().take(bytes_left).read_to_end(&mut buf)?;
    if (buf.len() as u64) < bytes_left {
        return Err(NnueError::Truncated);
    }

    let mut pos = 0;
    for slot in out.iter_mut() {
        *slot = decode_signed_leb128(&buf, &mut pos)?;
    }

    if pos != buf.len() {
        return Err(NnueError::Format(format!(
            "LEB128 block declares {} bytes but {} were used",
            buf.len(),
            pos
        )));
    }
    Ok(())
}

/// 圧縮ブロックを書き出す
pub fn write_leb128<W: Write, T: LebInt>(writer: &mut W, values: &[T]) -> NnueResult<()> {
    let mut buf = Vec::with_capacity(values.len() * 2);
    for &v in values {
        encode_signed_leb128(v.to_i64(), &mut buf);
    }
    let len = u32::try_from(buf.len())
        .map_err(|_| NnueError::Format("LEB128 block larger than 4 GiB".to_string()))?;

    writer.write_all(LEB128_MAGIC)?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(v: i64) -> Vec<u8> {
        let mut out = Vec::new();
        encode_signed_leb128(v, &mut out);
        out
    }

    fn decode<T: LebInt>(bytes: &[u8]) -> T {
        let mut pos = 0;
        let v = decode_signed_leb128::<T>(bytes, &mut pos).unwrap();
        assert_eq!(pos, bytes.len());
        v
    }

    #[test]
    fn test_encode_known_values() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(1), vec![0x01]);
        assert_eq!(encode(-1), vec![0x7F]);
        assert_eq!(encode(63), vec![0x3F]);
        assert_eq!(encode(-64), vec![0x40]);
        assert_eq!(encode(64), vec![0xC0, 0x00]);
        assert_eq!(encode(-65), vec![0xBF, 0x7F]);
        assert_eq!(encode(128), vec![0x80, 0x01]);
        assert_eq!(encode(-128), vec![0x80, 0x7F]);
        assert_eq!(encode(i16::MAX as i64), vec![0xFF, 0xFF, 0x01]);
        assert_eq!(encode(i16::MIN as i64), vec![0x80, 0x80, 0x7E]);
    }

    #[test]
    fn test_decode_known_values() {
        assert_eq!(decode::<i16>(&[0x00]), 0);
        assert_eq!(decode::<i16>(&[0x7F]), -1);
        assert_eq!(decode::<i16>(&[0x80, 0x01]), 128);
        assert_eq!(decode::<i16>(&[0xBF, 0x7F]), -65);
        assert_eq!(decode::<i16>(&[0xFF, 0xFF, 0x01]), i16::MAX);
        assert_eq!(decode::<i16>(&[0x80, 0x80, 0x7E]), i16::MIN);
        assert_eq!(decode::<i32>(&[0x80, 0x80, 0x80, 0x80, 0x78]), i32::MIN);
        assert_eq!(decode::<i32>(&[0xFF, 0xFF, 0xFF, 0xFF, 0x07]), i32::MAX);
    }

    #[test]
    fn test_decode_too_long_varint() {
        let mut pos = 0;
        let r = decode_signed_leb128::<i16>(&[0x80, 0x80, 0x80, 0x01], &mut pos);
        assert!(matches!(r, Err(NnueError::Format(_))));
    }

    #[test]
    fn test_block_roundtrip() {
        let values: Vec<i16> = vec![0, 1, -1, 64, -65, 300, i16::MAX, i16::MIN];
        let mut buf = Vec::new();
        write_leb128(&mut buf, &values).unwrap();
        assert_eq!(&buf[..17], LEB128_MAGIC);

        let mut out = vec![0i16; values.len()];
        read_leb128(&mut Cursor::new(&buf), &mut out).unwrap();
        assert_eq!(out, values);
    }

    #[test]
    fn test_block_bad_magic() {
        let mut buf = Vec::new();
        write_leb128(&mut buf, &[1i32, 2, 3]).unwrap();
        buf[0] = b'X';
        let mut out = [0i32; 3];
        let r = read_leb128(&mut Cursor::new(&buf), &mut out);
        assert!(matches!(r, Err(NnueError::Format(_))));
    }

    #[test]
    fn test_block_truncated() {
        let mut buf = Vec::new();
        write_leb128(&mut buf, &[1000i32, -1000, 5]).unwrap();
        buf.truncate(buf.len() - 1);
        let mut out = [0i32; 3];
        let r = read_leb128(&mut Cursor::new(&buf), &mut out);
        assert!(matches!(r, Err(NnueError::Truncated)));
    }

    #[test]
    fn test_block_unused_bytes() {
        // 3 値分のバイト数を宣言し、2 値だけ読む
        let mut buf = Vec::new();
        write_leb128(&mut buf, &[1i16, 2, 3]).unwrap();
        let mut out = [0i16; 2];
        let r = read_leb128(&mut Cursor::new(&buf), &mut out);
        assert!(matches!(r, Err(NnueError::Format(_))));
    }

    #[test]
    fn test_block_too_few_bytes_for_values() {
        let mut buf = Vec::new();
        write_leb128(&mut buf, &[1i16, 2]).unwrap();
        let mut out = [0i16; 3];
        let r = read_leb128(&mut Cursor::new(&buf), &mut out);
        assert!(matches!(r, Err(NnueError::Truncated)));
    }
}
